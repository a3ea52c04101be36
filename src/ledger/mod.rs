pub mod entry;

pub use entry::{LedgerEntry, Snapshot};

use crate::error::{LedgerError, LedgerResult};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

pub const DEFAULT_SHARDS: usize = 16;

/// One partition of the key table. Entry mutexes are taken under the read
/// lock, so only initialize/remove contend on the shard itself.
type Shard = RwLock<HashMap<String, Mutex<LedgerEntry>>>;

/// Outcome of a single reservation attempt. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub key: String,
    pub requested: u64,
    pub granted: bool,
    /// Stock left after the attempt (unchanged when not granted).
    pub remaining: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    pub key: String,
    pub available: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub reservations_granted: u64,
    pub reservations_rejected: u64,
    pub units_reserved: u64,
    pub restocks: u64,
}

#[derive(Debug, Default)]
struct Counters {
    granted: AtomicU64,
    rejected: AtomicU64,
    units: AtomicU64,
    restocks: AtomicU64,
}

/// Per-key available quantities with all-or-nothing reservations.
///
/// The check and the decrement of a reservation run under the key's own
/// mutex, so no two mutations of one key interleave while different keys
/// proceed in parallel. Share it between callers as an `Arc<Ledger>`.
#[derive(Debug)]
pub struct Ledger {
    shards: Box<[Shard]>,
    counters: Counters,
}

pub type SharedLedger = Arc<Ledger>;

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(shards: usize) -> Self {
        Ledger {
            shards: (0..shards.max(1)).map(|_| RwLock::new(HashMap::new())).collect(),
            counters: Counters::default(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard(&self, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() % self.shards.len() as u64) as usize]
    }

    /// Create an entry holding `quantity` units at version 0.
    pub fn initialize(&self, key: &str, quantity: u64) -> LedgerResult<()> {
        let mut shard = write(self.shard(key));
        if shard.contains_key(key) {
            return Err(LedgerError::AlreadyExists(key.to_string()));
        }
        shard.insert(
            key.to_string(),
            Mutex::new(LedgerEntry::new(key.to_string(), quantity)),
        );
        debug!(key, quantity, "initialized entry");
        Ok(())
    }

    /// Bulk load. Existing keys are skipped rather than overwritten.
    /// Returns how many entries were created.
    pub fn initialize_many<I, K>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = (K, u64)>,
        K: AsRef<str>,
    {
        items
            .into_iter()
            .filter(|(key, quantity)| self.initialize(key.as_ref(), *quantity).is_ok())
            .count()
    }

    pub fn reserve(&self, key: &str, amount: u64) -> LedgerResult<Reservation> {
        let amount = positive(amount)?;
        let (granted, remaining) = self.with_entry(key, |entry| {
            let granted = entry.try_take(amount);
            (granted, entry.available)
        })?;

        if granted {
            self.counters.granted.fetch_add(1, Ordering::Relaxed);
            self.counters.units.fetch_add(amount, Ordering::Relaxed);
        } else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        }
        debug!(key, amount, granted, remaining, "reservation");

        Ok(Reservation {
            key: key.to_string(),
            requested: amount,
            granted,
            remaining,
        })
    }

    /// Add `amount` units back. Returns the new available quantity.
    pub fn restock(&self, key: &str, amount: u64) -> LedgerResult<u64> {
        self.restock_bounded(key, amount, u64::MAX)
    }

    /// Like `restock`, but fails with `InvalidAmount` when the new quantity
    /// would exceed `ceiling`.
    pub fn restock_bounded(&self, key: &str, amount: u64, ceiling: u64) -> LedgerResult<u64> {
        let amount = positive(amount)?;
        let (added, available) = self.with_entry(key, |entry| {
            let added = entry.put_back(amount, ceiling);
            (added, entry.available)
        })?;
        if !added {
            return Err(LedgerError::InvalidAmount(
                i64::try_from(amount).unwrap_or(i64::MAX),
            ));
        }
        self.counters.restocks.fetch_add(1, Ordering::Relaxed);
        debug!(key, amount, available, "restocked");
        Ok(available)
    }

    /// Current quantity and version. Stale as soon as it returns under
    /// concurrent access; only `reserve` decides outcomes.
    pub fn peek(&self, key: &str) -> LedgerResult<Snapshot> {
        self.with_entry(key, |entry| entry.snapshot())
    }

    /// Full copy of an entry, timestamps included.
    pub fn entry(&self, key: &str) -> LedgerResult<LedgerEntry> {
        self.with_entry(key, |entry| entry.clone())
    }

    /// Keys with `available < threshold`, lowest stock first.
    pub fn low_stock(&self, threshold: u64) -> Vec<StockLevel> {
        let mut levels: Vec<StockLevel> = self
            .shards
            .iter()
            .flat_map(|shard| {
                read(shard)
                    .values()
                    .filter_map(|entry| {
                        let entry = lock(entry);
                        (entry.available < threshold).then(|| StockLevel {
                            key: entry.key.clone(),
                            available: entry.available,
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        levels.sort_by(|a, b| a.available.cmp(&b.available).then_with(|| a.key.cmp(&b.key)));
        levels
    }

    pub fn low_stock_keys(&self, threshold: u64) -> Vec<String> {
        self.low_stock(threshold).into_iter().map(|l| l.key).collect()
    }

    /// Destroy an entry, returning its final state.
    pub fn remove(&self, key: &str) -> LedgerResult<LedgerEntry> {
        let entry = write(self.shard(key))
            .remove(key)
            .ok_or_else(|| LedgerError::NotFound(key.to_string()))?;
        debug!(key, "removed entry");
        Ok(entry.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| read(shard).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .shards
            .iter()
            .flat_map(|shard| read(shard).keys().cloned().collect::<Vec<_>>())
            .collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            reservations_granted: self.counters.granted.load(Ordering::Relaxed),
            reservations_rejected: self.counters.rejected.load(Ordering::Relaxed),
            units_reserved: self.counters.units.load(Ordering::Relaxed),
            restocks: self.counters.restocks.load(Ordering::Relaxed),
        }
    }

    fn with_entry<T>(&self, key: &str, f: impl FnOnce(&mut LedgerEntry) -> T) -> LedgerResult<T> {
        let shard = read(self.shard(key));
        let entry = shard
            .get(key)
            .ok_or_else(|| LedgerError::NotFound(key.to_string()))?;
        let mut entry = lock(entry);
        Ok(f(&mut entry))
    }
}

fn positive(amount: u64) -> LedgerResult<u64> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount(0));
    }
    Ok(amount)
}

// Critical sections never panic between the check and the write, so a
// poisoned lock still guards consistent state.
fn read(shard: &Shard) -> RwLockReadGuard<'_, HashMap<String, Mutex<LedgerEntry>>> {
    shard.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(shard: &Shard) -> RwLockWriteGuard<'_, HashMap<String, Mutex<LedgerEntry>>> {
    shard.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock(entry: &Mutex<LedgerEntry>) -> MutexGuard<'_, LedgerEntry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}
