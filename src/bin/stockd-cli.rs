use bytes::BytesMut;
use std::io::{self, BufRead, Write};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use stockd::resp::{RespParser, RespValue};

/// Usage: stockd-cli [-h host] [-p port] [command args...]
///
/// With a trailing command it runs it once and exits, otherwise it starts a REPL.
#[tokio::main]
async fn main() -> io::Result<()> {
    let mut host = "127.0.0.1".to_string();
    let mut port = 7379u16;
    let mut oneshot = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--host" | "-h" if oneshot.is_empty() => {
                if let Some(h) = args.next() {
                    host = h;
                }
            }
            "--port" | "-p" if oneshot.is_empty() => {
                if let Some(p) = args.next().and_then(|p| p.parse().ok()) {
                    port = p;
                }
            }
            _ => oneshot.push(arg),
        }
    }

    let addr = format!("{host}:{port}");
    let mut stream = TcpStream::connect(&addr).await?;
    let mut buf = BytesMut::with_capacity(4096);

    if !oneshot.is_empty() {
        if let Some(reply) = roundtrip(&mut stream, &mut buf, &oneshot).await? {
            print_resp_value(&reply);
        }
        return Ok(());
    }

    eprintln!("Connected to {addr}");
    let stdin = io::stdin();
    let mut reader = stdin.lock();

    loop {
        print!("stockd> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break; // EOF
        }

        let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if tokens.is_empty() {
            continue;
        }

        match roundtrip(&mut stream, &mut buf, &tokens).await? {
            Some(reply) => print_resp_value(&reply),
            None => {
                eprintln!("Connection closed by server");
                break;
            }
        }

        if tokens[0].eq_ignore_ascii_case("QUIT") {
            break;
        }
    }

    Ok(())
}

/// Send one command; `None` means the server hung up before replying.
async fn roundtrip(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    tokens: &[String],
) -> io::Result<Option<RespValue>> {
    stream
        .write_all(&RespValue::command(tokens).serialize())
        .await?;

    loop {
        match RespParser::parse(buf) {
            Ok(Some(reply)) => return Ok(Some(reply)),
            Ok(None) => {}
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        }
        if stream.read_buf(buf).await? == 0 {
            return Ok(None);
        }
    }
}

fn print_resp_value(value: &RespValue) {
    match value {
        RespValue::Array(Some(items)) if !items.is_empty() => {
            for (i, item) in items.iter().enumerate() {
                print!("{}) ", i + 1);
                print_scalar(item, 3);
            }
        }
        other => print_scalar(other, 0),
    }
}

fn print_scalar(value: &RespValue, indent: usize) {
    match value {
        RespValue::SimpleString(s) => println!("{s}"),
        RespValue::Error(s) => println!("(error) {s}"),
        RespValue::Integer(n) => println!("(integer) {n}"),
        RespValue::BulkString(Some(data)) => println!("\"{}\"", String::from_utf8_lossy(data)),
        RespValue::BulkString(None) | RespValue::Array(None) => println!("(nil)"),
        RespValue::Array(Some(items)) if items.is_empty() => println!("(empty array)"),
        RespValue::Array(Some(items)) => {
            println!();
            let prefix = " ".repeat(indent);
            for (i, item) in items.iter().enumerate() {
                print!("{prefix}{}) ", i + 1);
                print_scalar(item, indent + 3);
            }
        }
    }
}
