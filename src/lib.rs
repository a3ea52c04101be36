//! # stockd
//!
//! A stock reservation ledger: per-key available quantities where a
//! reservation either takes the full amount or changes nothing, so
//! concurrent buyers can never oversubscribe a key.
//!
//! The [`ledger`] module is usable on its own in-process. The server speaks
//! RESP2, so any Redis client (or [`client::RemoteLedger`]) can drive the same
//! operations across process boundaries with one round trip per call.

pub mod client;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod glob;
pub mod ledger;
pub mod logging;
pub mod resp;
pub mod server;

pub use error::{LedgerError, LedgerResult};
pub use ledger::{Ledger, Reservation, Snapshot, StockLevel};
