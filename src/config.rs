use crate::ledger::DEFAULT_SHARDS;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    /// Number of lock shards in the ledger. Fixed once the server starts.
    pub shards: usize,
    pub requirepass: Option<String>,
    /// Idle client timeout in seconds, 0 disables it.
    pub timeout: u64,
    /// Default threshold for STOCK.LOWSTOCK without an argument.
    pub low_stock_threshold: u64,
    pub loglevel: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1".to_string(),
            port: 7379,
            shards: DEFAULT_SHARDS,
            requirepass: None,
            timeout: 0,
            low_stock_threshold: 20,
            loglevel: "info".to_string(),
        }
    }
}

/// Parameters exposed through CONFIG GET, in reply order.
pub const PARAMETERS: &[&str] = &[
    "bind",
    "port",
    "shards",
    "requirepass",
    "timeout",
    "low-stock-threshold",
    "loglevel",
];

impl Config {
    pub fn from_args(args: &[String]) -> Self {
        let mut config = Config::default();
        let mut i = 0;
        while i < args.len() {
            let Some(value) = args.get(i + 1) else {
                break;
            };
            let consumed = match args[i].as_str() {
                "--port" => {
                    if let Ok(p) = value.parse() {
                        config.port = p;
                    }
                    true
                }
                "--bind" => {
                    config.bind = value.clone();
                    true
                }
                "--shards" => {
                    if let Ok(n) = value.parse::<usize>() {
                        config.shards = n.max(1);
                    }
                    true
                }
                "--requirepass" => {
                    config.requirepass = Some(value.clone());
                    true
                }
                "--timeout" => {
                    if let Ok(t) = value.parse() {
                        config.timeout = t;
                    }
                    true
                }
                "--low-stock-threshold" => {
                    if let Ok(t) = value.parse() {
                        config.low_stock_threshold = t;
                    }
                    true
                }
                "--loglevel" => {
                    config.loglevel = value.clone();
                    true
                }
                _ => false,
            };
            i += if consumed { 2 } else { 1 };
        }
        config
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key.to_lowercase().as_str() {
            "bind" => Some(self.bind.clone()),
            "port" => Some(self.port.to_string()),
            "shards" => Some(self.shards.to_string()),
            "requirepass" => self.requirepass.clone().or(Some(String::new())),
            "timeout" => Some(self.timeout.to_string()),
            "low-stock-threshold" => Some(self.low_stock_threshold.to_string()),
            "loglevel" => Some(self.loglevel.clone()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key.to_lowercase().as_str() {
            "timeout" => {
                self.timeout = value
                    .parse()
                    .map_err(|_| "Invalid timeout value".to_string())?;
            }
            "low-stock-threshold" => {
                self.low_stock_threshold = value
                    .parse()
                    .map_err(|_| "Invalid low-stock-threshold value".to_string())?;
            }
            "loglevel" => {
                crate::logging::parse_filter(value)?;
                self.loglevel = value.to_string();
            }
            "requirepass" => {
                self.requirepass = (!value.is_empty()).then(|| value.to_string());
            }
            "bind" | "port" | "shards" => {
                return Err(format!("can't set immutable config '{key}'"));
            }
            _ => return Err(format!("Unknown option or number of arguments for CONFIG SET - '{key}'")),
        }
        Ok(())
    }
}

pub type SharedConfig = Arc<RwLock<Config>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_args() {
        let cfg = Config::from_args(&args(&[
            "--port",
            "9000",
            "--shards",
            "0",
            "--verbose",
            "--low-stock-threshold",
            "5",
            "--requirepass",
            "s3cret",
        ]));
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.shards, 1);
        assert_eq!(cfg.low_stock_threshold, 5);
        assert_eq!(cfg.requirepass.as_deref(), Some("s3cret"));
        assert_eq!(cfg.bind, "127.0.0.1");
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let cfg = Config::from_args(&args(&["--port", "http", "--timeout"]));
        assert_eq!(cfg.port, 7379);
        assert_eq!(cfg.timeout, 0);
    }

    #[test]
    fn test_set_and_get() {
        let mut cfg = Config::default();
        cfg.set("LOW-STOCK-THRESHOLD", "3").unwrap();
        assert_eq!(cfg.get("low-stock-threshold").as_deref(), Some("3"));
        assert!(cfg.set("timeout", "soon").is_err());
        assert!(cfg.set("port", "1").is_err());
        cfg.set("requirepass", "pw").unwrap();
        cfg.set("requirepass", "").unwrap();
        assert_eq!(cfg.requirepass, None);
        assert_eq!(cfg.get("nope"), None);
        assert!(cfg.set("loglevel", "stockd=loud").is_err());
        assert_eq!(cfg.loglevel, "info");
        cfg.set("loglevel", "stockd=debug").unwrap();
        for p in PARAMETERS {
            assert!(cfg.get(p).is_some(), "{p}");
        }
    }
}
