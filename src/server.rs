use crate::command::{self, Context};
use crate::config::SharedConfig;
use crate::connection::{ClientState, ServerStats};
use crate::ledger::SharedLedger;
use crate::logging::LogHandle;
use crate::resp::{RespParser, RespValue};
use bytes::BytesMut;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bind to the configured address and serve until `shutdown` is cancelled.
pub async fn run_server(
    ledger: SharedLedger,
    config: SharedConfig,
    log: Option<LogHandle>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = {
        let cfg = config.read().await;
        format!("{}:{}", cfg.bind, cfg.port)
    };
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, ledger, config, log, shutdown).await
}

/// Serve connections from an already bound listener.
pub async fn serve(
    listener: TcpListener,
    ledger: SharedLedger,
    config: SharedConfig,
    log: Option<LogHandle>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!(
        "stockd listening on {} ({} shards)",
        listener.local_addr()?,
        ledger.shard_count()
    );

    let ctx = Context {
        ledger,
        config,
        stats: Arc::new(ServerStats::default()),
        log,
    };

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = result?;
                debug!("New connection from {peer_addr}");

                let ctx = ctx.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    ctx.stats.client_connected();
                    if let Err(e) = handle_connection(stream, &ctx, shutdown).await {
                        debug!("Connection error from {peer_addr}: {e}");
                    }
                    ctx.stats.client_disconnected();
                    debug!("Connection closed: {peer_addr}");
                });
            }
            _ = shutdown.cancelled() => {
                info!("Shutting down...");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    ctx: &Context,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let requires_auth = ctx.config.read().await.requirepass.is_some();
    let mut client = ClientState::new(!requires_auth);
    let mut buf = BytesMut::with_capacity(4096);
    let mut out = Vec::with_capacity(256);

    loop {
        // Answer every complete command already buffered (pipelining), then flush once.
        loop {
            match RespParser::parse(&mut buf) {
                Ok(Some(value)) => {
                    let Some(response) = process_command(value, ctx, &mut client).await else {
                        continue;
                    };
                    response.write_to(&mut out);
                    if client.should_close {
                        stream.write_all(&out).await?;
                        return Ok(());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(client = client.id, "protocol error: {e}");
                    RespValue::error(format!("ERR Protocol error: {e}")).write_to(&mut out);
                    stream.write_all(&out).await?;
                    return Ok(());
                }
            }
        }
        if !out.is_empty() {
            stream.write_all(&out).await?;
            out.clear();
        }

        let idle = {
            let cfg = ctx.config.read().await;
            (cfg.timeout > 0).then(|| Duration::from_secs(cfg.timeout))
        };

        let read = async {
            match idle {
                Some(dur) => tokio::time::timeout(dur, stream.read_buf(&mut buf))
                    .await
                    .unwrap_or(Ok(0)), // idle timeout => treat as disconnect
                None => stream.read_buf(&mut buf).await,
            }
        };

        tokio::select! {
            result = read => {
                if result? == 0 {
                    return Ok(());
                }
            }
            _ = shutdown.cancelled() => return Ok(()),
        }
    }
}

/// Returns `None` for empty inline lines, which get no reply.
async fn process_command(
    value: RespValue,
    ctx: &Context,
    client: &mut ClientState,
) -> Option<RespValue> {
    let items = match value {
        RespValue::Array(Some(items)) if items.is_empty() => return None,
        RespValue::Array(Some(items)) => items,
        _ => return Some(RespValue::error("ERR invalid command format")),
    };

    let cmd_name = match items[0].to_string_lossy() {
        Some(name) => name.to_uppercase(),
        None => return Some(RespValue::error("ERR invalid command name")),
    };
    let args = &items[1..];

    client.commands_processed += 1;
    ctx.stats.command_processed();

    if !client.authenticated && !matches!(cmd_name.as_str(), "AUTH" | "QUIT" | "PING") {
        return Some(RespValue::error("NOAUTH Authentication required."));
    }

    Some(command::dispatch(&cmd_name, args, ctx, client).await)
}
