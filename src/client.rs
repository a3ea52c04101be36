//! Async client for a remote `stockd` server.
//!
//! Every ledger call is a single request/reply round trip and the server runs
//! it as one indivisible step, so a `reserve` here has the same atomicity as
//! [`Ledger::reserve`](crate::ledger::Ledger::reserve). Connectivity failures surface as
//! [`LedgerError::Unavailable`]. Nothing is retried: after an `Unavailable`
//! reserve the outcome is unknown and retrying could reserve twice.

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{Reservation, Snapshot, StockLevel};
use crate::resp::{RespParser, RespValue};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub struct RemoteLedger {
    stream: TcpStream,
    buf: BytesMut,
}

impl RemoteLedger {
    pub async fn connect(addr: &str) -> LedgerResult<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| LedgerError::Unavailable(format!("connect to {addr}: {e}")))?;
        stream.set_nodelay(true)?;
        Ok(RemoteLedger {
            stream,
            buf: BytesMut::with_capacity(4096),
        })
    }

    pub async fn auth(&mut self, password: &str) -> LedgerResult<()> {
        self.call(&["AUTH", password]).await.map(drop)
    }

    pub async fn ping(&mut self) -> LedgerResult<()> {
        self.call(&["PING"]).await.map(drop)
    }

    pub async fn initialize(&mut self, key: &str, quantity: u64) -> LedgerResult<()> {
        let quantity = quantity.to_string();
        self.call(&["STOCK.INIT", key, quantity.as_str()])
            .await
            .map(drop)
    }

    /// Bulk load in one round trip. Existing keys are skipped.
    pub async fn initialize_many(&mut self, items: &[(&str, u64)]) -> LedgerResult<usize> {
        let quantities: Vec<String> = items.iter().map(|(_, q)| q.to_string()).collect();
        let mut parts = vec!["STOCK.MINIT"];
        for ((key, _), quantity) in items.iter().zip(&quantities) {
            parts.push(*key);
            parts.push(quantity.as_str());
        }
        let created = unsigned(&self.call(&parts).await?)?;
        Ok(created as usize)
    }

    pub async fn reserve(&mut self, key: &str, amount: u64) -> LedgerResult<Reservation> {
        let amount_arg = amount.to_string();
        let reply = self
            .call(&["STOCK.RESERVE", key, amount_arg.as_str()])
            .await?;
        let (granted, remaining) = pair(&reply)?;
        Ok(Reservation {
            key: key.to_string(),
            requested: amount,
            granted: granted == 1,
            remaining,
        })
    }

    pub async fn restock(&mut self, key: &str, amount: u64) -> LedgerResult<u64> {
        let amount = amount.to_string();
        let reply = self
            .call(&["STOCK.RESTOCK", key, amount.as_str()])
            .await?;
        unsigned(&reply)
    }

    pub async fn peek(&mut self, key: &str) -> LedgerResult<Snapshot> {
        let (available, version) = pair(&self.call(&["STOCK.PEEK", key]).await?)?;
        Ok(Snapshot { available, version })
    }

    pub async fn low_stock(&mut self, threshold: u64) -> LedgerResult<Vec<StockLevel>> {
        let threshold = threshold.to_string();
        let reply = self
            .call(&["STOCK.LOWSTOCK", threshold.as_str()])
            .await?;
        let items = array(&reply)?;
        if items.len() % 2 != 0 {
            return Err(LedgerError::Protocol("odd-length low stock reply".into()));
        }
        items
            .chunks(2)
            .map(|kv| -> LedgerResult<StockLevel> {
                Ok(StockLevel {
                    key: string(&kv[0])?,
                    available: unsigned(&kv[1])?,
                })
            })
            .collect()
    }

    pub async fn low_stock_keys(&mut self, threshold: u64) -> LedgerResult<Vec<String>> {
        Ok(self
            .low_stock(threshold)
            .await?
            .into_iter()
            .map(|l| l.key)
            .collect())
    }

    pub async fn remove(&mut self, key: &str) -> LedgerResult<()> {
        self.call(&["STOCK.REMOVE", key]).await.map(drop)
    }

    pub async fn keys(&mut self, pattern: &str) -> LedgerResult<Vec<String>> {
        let reply = self.call(&["STOCK.KEYS", pattern]).await?;
        array(&reply)?.iter().map(string).collect()
    }

    /// Send one command and wait for its reply. Error replies become the
    /// matching `LedgerError`.
    pub async fn call(&mut self, parts: &[&str]) -> LedgerResult<RespValue> {
        self.stream
            .write_all(&RespValue::command(parts).serialize())
            .await?;

        loop {
            match RespParser::parse(&mut self.buf) {
                Ok(Some(RespValue::Error(msg))) => return Err(LedgerError::from_resp_error(&msg)),
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(e) => return Err(LedgerError::Protocol(e.to_string())),
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err(LedgerError::Unavailable("connection closed by server".into()));
            }
        }
    }
}

fn unsigned(value: &RespValue) -> LedgerResult<u64> {
    value
        .as_integer()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| LedgerError::Protocol(format!("expected non-negative integer, got {value:?}")))
}

fn array(value: &RespValue) -> LedgerResult<&[RespValue]> {
    match value {
        RespValue::Array(Some(items)) => Ok(items),
        other => Err(LedgerError::Protocol(format!("expected array, got {other:?}"))),
    }
}

fn pair(value: &RespValue) -> LedgerResult<(u64, u64)> {
    match array(value)? {
        [a, b] => Ok((unsigned(a)?, unsigned(b)?)),
        other => Err(LedgerError::Protocol(format!(
            "expected 2 elements, got {}",
            other.len()
        ))),
    }
}

fn string(value: &RespValue) -> LedgerResult<String> {
    value
        .to_string_lossy()
        .ok_or_else(|| LedgerError::Protocol(format!("expected string, got {value:?}")))
}
