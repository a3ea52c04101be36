use bytes::{Buf, BytesMut};
use std::io;

const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
const MAX_ARRAY_LEN: usize = 1024 * 1024;
const MAX_NESTING: usize = 128;
const MAX_INLINE_LEN: usize = 64 * 1024;

/// A RESP2 value.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// +OK\r\n
    SimpleString(String),
    /// -ERR message\r\n
    Error(String),
    /// :1000\r\n
    Integer(i64),
    /// $6\r\nfoobar\r\n  or  $-1\r\n (null)
    BulkString(Option<Vec<u8>>),
    /// *2\r\n...  or  *-1\r\n (null)
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Unsigned quantities saturate at `i64::MAX` on the wire.
    pub fn unsigned(n: u64) -> Self {
        RespValue::Integer(i64::try_from(n).unwrap_or(i64::MAX))
    }

    pub fn bulk_string(data: impl Into<Vec<u8>>) -> Self {
        RespValue::BulkString(Some(data.into()))
    }

    pub fn null_bulk_string() -> Self {
        RespValue::BulkString(None)
    }

    pub fn array(items: Vec<RespValue>) -> Self {
        RespValue::Array(Some(items))
    }

    /// Build a command array from its parts.
    pub fn command<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        RespValue::array(
            parts
                .into_iter()
                .map(|p| RespValue::bulk_string(p.as_ref().to_vec()))
                .collect(),
        )
    }

    /// Serialize this value to RESP bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }

    /// Write RESP bytes into the given buffer.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => write_line(buf, b'+', s.as_bytes()),
            RespValue::Error(s) => write_line(buf, b'-', s.as_bytes()),
            RespValue::Integer(n) => write_line(buf, b':', n.to_string().as_bytes()),
            RespValue::BulkString(None) => buf.extend_from_slice(b"$-1\r\n"),
            RespValue::BulkString(Some(data)) => {
                write_line(buf, b'$', data.len().to_string().as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Array(None) => buf.extend_from_slice(b"*-1\r\n"),
            RespValue::Array(Some(items)) => {
                write_line(buf, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.write_to(buf);
                }
            }
        }
    }

    /// Try to interpret this value as a string (for command parsing).
    pub fn as_str(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(Some(data)) => Some(data),
            RespValue::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Convert to a UTF-8 string, if possible.
    pub fn to_string_lossy(&self) -> Option<String> {
        self.as_str()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

fn write_line(buf: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    buf.push(prefix);
    buf.extend_from_slice(body);
    buf.extend_from_slice(b"\r\n");
}

/// Streaming RESP parser.
///
/// Handles partial reads: call `parse()` again as more data arrives. Bytes
/// are only consumed from the buffer once a whole value is available.
pub struct RespParser;

impl RespParser {
    /// Returns `Ok(None)` if the buffer doesn't contain a complete value yet.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        if buf.is_empty() {
            return Ok(None);
        }

        let parsed = match buf[0] {
            b'+' | b'-' | b':' | b'$' | b'*' => parse_at(buf, 0, 0)?,
            _ => parse_inline(buf)?,
        };
        Ok(parsed.map(|(value, consumed)| {
            buf.advance(consumed);
            value
        }))
    }
}

/// Parse one value starting at `pos`, `depth` arrays deep. On success returns
/// the value and the offset just past it.
fn parse_at(
    buf: &[u8],
    pos: usize,
    depth: usize,
) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some((line, next)) = read_line(buf, pos + 1) else {
        return Ok(None);
    };
    let Some(&kind) = buf.get(pos) else {
        return Ok(None);
    };

    match kind {
        b'+' => Ok(Some((RespValue::SimpleString(lossy(line)), next))),
        b'-' => Ok(Some((RespValue::Error(lossy(line)), next))),
        b':' => Ok(Some((RespValue::Integer(parse_int(line, "integer")?), next))),
        b'$' => {
            let len = parse_int(line, "bulk length")?;
            if len == -1 {
                return Ok(Some((RespValue::BulkString(None), next)));
            }
            let len = usize::try_from(len)
                .ok()
                .filter(|n| *n <= MAX_BULK_LEN)
                .ok_or_else(|| RespError::InvalidData("invalid bulk length".into()))?;
            let end = next + len;
            if buf.len() < end + 2 {
                return Ok(None);
            }
            if &buf[end..end + 2] != b"\r\n" {
                return Err(RespError::InvalidData(
                    "missing trailing CRLF after bulk string".into(),
                ));
            }
            Ok(Some((RespValue::BulkString(Some(buf[next..end].to_vec())), end + 2)))
        }
        b'*' => {
            let len = parse_int(line, "multibulk length")?;
            if len < 0 {
                return Ok(Some((RespValue::Array(None), next)));
            }
            let len = len as usize;
            if len > MAX_ARRAY_LEN {
                return Err(RespError::InvalidData("invalid multibulk length".into()));
            }
            if len > 0 && depth >= MAX_NESTING {
                return Err(RespError::InvalidData("too many nested arrays".into()));
            }
            // every element takes at least three bytes ("+\r\n")
            if buf.len() - next < len.saturating_mul(3) {
                return Ok(None);
            }
            let mut items = Vec::with_capacity(len.min(1024));
            let mut cursor = next;
            for _ in 0..len {
                match parse_at(buf, cursor, depth + 1)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((RespValue::Array(Some(items)), cursor)))
        }
        other => Err(RespError::InvalidByte(other)),
    }
}

/// An inline command is plain text terminated by \r\n (or \n). It becomes
/// an array of bulk strings.
fn parse_inline(buf: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some(nl) = buf.iter().position(|&b| b == b'\n') else {
        if buf.len() > MAX_INLINE_LEN {
            return Err(RespError::InvalidData("inline command too long".into()));
        }
        return Ok(None);
    };
    let line = buf[..nl].strip_suffix(b"\r").unwrap_or(&buf[..nl]);
    let items = split_inline(&lossy(line))?
        .into_iter()
        .map(|s| RespValue::BulkString(Some(s.into_bytes())))
        .collect();
    // An empty line yields an empty array, which the server skips.
    Ok(Some((RespValue::Array(Some(items)), nl + 1)))
}

fn read_line(buf: &[u8], from: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(from..)?;
    let at = rest.windows(2).position(|w| w == b"\r\n")?;
    Some((&rest[..at], from + at + 2))
}

fn parse_int(line: &[u8], what: &str) -> Result<i64, RespError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RespError::InvalidData(format!("invalid {what}")))
}

fn lossy(b: &[u8]) -> String {
    String::from_utf8_lossy(b).into_owned()
}

/// Split on whitespace; double quotes group a token and allow \" escapes.
fn split_inline(line: &str) -> Result<Vec<String>, RespError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if quoted {
                    tokens.push(std::mem::take(&mut current));
                }
                quoted = !quoted;
            }
            '\\' if quoted => {
                if let Some(next) = chars.next() {
                    current.push(match next {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                }
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if quoted {
        return Err(RespError::InvalidData("unbalanced quotes in request".into()));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

#[derive(Debug, thiserror::Error)]
pub enum RespError {
    #[error("unexpected type byte '{}'", *.0 as char)]
    InvalidByte(u8),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
