#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("NOTFOUND no such resource '{0}'")]
    NotFound(String),

    #[error("EXISTS resource '{0}' already exists")]
    AlreadyExists(String),

    #[error("ERR amount must be a positive integer, got {0}")]
    InvalidAmount(i64),

    #[error("UNAVAILABLE {0}")]
    Unavailable(String),

    #[error("ERR Protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    Server(String),
}

impl LedgerError {
    pub fn to_resp_error(&self) -> String {
        format!("{self}")
    }

    /// Map an error reply from the server back to its kind.
    pub fn from_resp_error(msg: &str) -> Self {
        if let Some(rest) = msg.strip_prefix("NOTFOUND ") {
            return LedgerError::NotFound(quoted(rest).unwrap_or(rest).to_string());
        }
        if let Some(rest) = msg.strip_prefix("EXISTS ") {
            return LedgerError::AlreadyExists(quoted(rest).unwrap_or(rest).to_string());
        }
        if let Some(rest) = msg.strip_prefix("ERR amount must be a positive integer, got ") {
            if let Ok(n) = rest.trim().parse() {
                return LedgerError::InvalidAmount(n);
            }
        }
        LedgerError::Server(msg.to_string())
    }

    /// Whether the outcome of the failed call is unknown to the caller.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        LedgerError::Unavailable(e.to_string())
    }
}

fn quoted(s: &str) -> Option<&str> {
    let start = s.find('\'')?;
    let end = s.rfind('\'')?;
    (end > start).then(|| &s[start + 1..end])
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resp_error_round_trips_kind() {
        for err in [
            LedgerError::NotFound("sku-1".into()),
            LedgerError::AlreadyExists("sku 2".into()),
            LedgerError::InvalidAmount(-3),
        ] {
            assert_eq!(LedgerError::from_resp_error(&err.to_resp_error()), err);
        }
    }

    #[test]
    fn test_unknown_error_reply_is_server_error() {
        let err = LedgerError::from_resp_error("ERR unknown command 'FOO'");
        assert_eq!(err, LedgerError::Server("ERR unknown command 'FOO'".into()));
    }

    #[test]
    fn test_io_error_is_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(LedgerError::from(io).is_unavailable());
    }
}
