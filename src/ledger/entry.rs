use std::time::{SystemTime, UNIX_EPOCH};

/// Stock held for a single resource key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub key: String,
    pub available: u64,
    /// Bumped by exactly one on every successful reserve or restock.
    pub version: u64,
    /// Milliseconds since UNIX epoch.
    pub created_at: u64,
    pub updated_at: u64,
}

impl LedgerEntry {
    pub fn new(key: String, available: u64) -> Self {
        let now = now_millis();
        LedgerEntry {
            key,
            available,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Deduct `amount` if enough stock is held. Returns whether it was deducted.
    pub fn try_take(&mut self, amount: u64) -> bool {
        if self.available < amount {
            return false;
        }
        self.available -= amount;
        self.bump();
        true
    }

    /// Add `amount` to the stock. Returns false, leaving the entry untouched,
    /// if the result would pass `ceiling`.
    pub fn put_back(&mut self, amount: u64, ceiling: u64) -> bool {
        match self.available.checked_add(amount).filter(|n| *n <= ceiling) {
            Some(n) => {
                self.available = n;
                self.bump();
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            available: self.available,
            version: self.version,
        }
    }

    fn bump(&mut self) {
        self.version += 1;
        self.updated_at = now_millis();
    }
}

/// Point-in-time view of an entry, as returned by `peek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub available: u64,
    pub version: u64,
}

/// Get current time in milliseconds since UNIX epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_take_insufficient_leaves_entry() {
        let mut entry = LedgerEntry::new("sku".into(), 2);
        let before = entry.clone();
        assert!(!entry.try_take(3));
        assert_eq!(entry, before);
    }

    #[test]
    fn test_put_back_overflow_leaves_entry() {
        let mut entry = LedgerEntry::new("sku".into(), u64::MAX - 1);
        assert!(!entry.put_back(2, u64::MAX));
        assert_eq!(entry.available, u64::MAX - 1);
        assert_eq!(entry.version, 0);
        assert!(entry.put_back(1, u64::MAX));
        assert_eq!(entry.version, 1);
    }

    #[test]
    fn test_put_back_respects_ceiling() {
        let mut entry = LedgerEntry::new("sku".into(), 8);
        assert!(!entry.put_back(3, 10));
        assert_eq!(entry.available, 8);
        assert!(entry.put_back(2, 10));
        assert_eq!(entry.available, 10);
    }
}
