//! Requests that may still be reversed, keyed by RRN.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::model::TransactionRequest;

#[derive(Debug, Clone)]
struct PendingEntry {
    request: TransactionRequest,
    inserted_at: Instant,
}

/// Concurrent RRN → original request map. Each operation locks one shard;
/// the last write for a key wins.
#[derive(Debug, Default)]
pub struct PendingReversals {
    entries: DashMap<String, PendingEntry>,
}

impl PendingReversals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, rrn: impl Into<String>, request: TransactionRequest) {
        self.entries.insert(
            rrn.into(),
            PendingEntry {
                request,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, rrn: &str) -> Option<TransactionRequest> {
        self.entries.get(rrn).map(|entry| entry.request.clone())
    }

    pub fn remove(&self, rrn: &str) -> Option<TransactionRequest> {
        self.entries.remove(rrn).map(|(_, entry)| entry.request)
    }

    pub fn contains(&self, rrn: &str) -> bool {
        self.entries.contains_key(rrn)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take the entry for `rrn` out of the map while a reversal is in flight.
    ///
    /// The returned claim puts the entry back, original timestamp included,
    /// when dropped without [`ReversalClaim::consume`]. That covers a
    /// declined reversal, a failed send and a cancelled future alike.
    pub fn claim(&self, rrn: &str) -> Option<ReversalClaim<'_>> {
        let (rrn, entry) = self.entries.remove(rrn)?;
        Some(ReversalClaim {
            pending: self,
            rrn,
            entry,
            consumed: false,
        })
    }

    /// Drop entries inserted more than `max_age` ago, returning how many went.
    pub fn purge_older_than(&self, max_age: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() <= max_age);
        before.saturating_sub(self.entries.len())
    }
}

/// Exclusive hold on a pending entry. See [`PendingReversals::claim`].
#[derive(Debug)]
pub struct ReversalClaim<'a> {
    pending: &'a PendingReversals,
    rrn: String,
    entry: PendingEntry,
    consumed: bool,
}

impl ReversalClaim<'_> {
    pub fn request(&self) -> &TransactionRequest {
        &self.entry.request
    }

    /// The reversal went through: the entry is gone for good.
    pub fn consume(mut self) {
        self.consumed = true;
    }
}

impl Drop for ReversalClaim<'_> {
    fn drop(&mut self) {
        if self.consumed {
            return;
        }
        // a newer transaction under the same RRN wins
        self.pending
            .entries
            .entry(std::mem::take(&mut self.rrn))
            .or_insert_with(|| self.entry.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;
    use crate::model::TransactionType;
    use std::sync::Arc;

    fn debit(card: &str) -> TransactionRequest {
        TransactionRequest::new(
            TransactionType::Debit,
            card,
            Some(Amount::from_minor_units(1000)),
            "USD",
        )
    }

    #[test]
    fn insert_get_remove() {
        let pending = PendingReversals::new();
        pending.insert("000000000001", debit("4111111111111111"));

        assert!(pending.contains("000000000001"));
        assert_eq!(
            pending.get("000000000001").unwrap().card_number,
            "4111111111111111"
        );
        assert!(pending.remove("000000000001").is_some());
        assert!(pending.remove("000000000001").is_none());
        assert!(pending.is_empty());
    }

    #[test]
    fn last_write_wins() {
        let pending = PendingReversals::new();
        pending.insert("rrn", debit("4000000000000001"));
        pending.insert("rrn", debit("4000000000000002"));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.get("rrn").unwrap().card_number, "4000000000000002");
    }

    #[test]
    fn purge_keeps_fresh_entries() {
        let pending = PendingReversals::new();
        pending.insert("a", debit("4000000000000001"));
        assert_eq!(pending.purge_older_than(Duration::from_secs(60)), 0);
        assert_eq!(pending.len(), 1);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(pending.purge_older_than(Duration::from_millis(5)), 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn claim_hides_entry_until_dropped() {
        let pending = PendingReversals::new();
        pending.insert("rrn", debit("4000000000000001"));

        let claim = pending.claim("rrn").unwrap();
        assert_eq!(claim.request().card_number, "4000000000000001");
        assert!(!pending.contains("rrn"));
        assert!(pending.claim("rrn").is_none());

        drop(claim);
        assert!(pending.contains("rrn"));
    }

    #[test]
    fn consumed_claim_is_not_restored() {
        let pending = PendingReversals::new();
        pending.insert("rrn", debit("4000000000000001"));
        pending.claim("rrn").unwrap().consume();
        assert!(pending.is_empty());
    }

    #[test]
    fn restored_claim_keeps_its_age() {
        let pending = PendingReversals::new();
        pending.insert("rrn", debit("4000000000000001"));
        std::thread::sleep(Duration::from_millis(20));

        drop(pending.claim("rrn"));
        assert_eq!(pending.purge_older_than(Duration::from_millis(5)), 1);
    }

    #[test]
    fn restored_claim_does_not_overwrite_newer_entry() {
        let pending = PendingReversals::new();
        pending.insert("rrn", debit("4000000000000001"));
        let claim = pending.claim("rrn").unwrap();
        pending.insert("rrn", debit("4000000000000002"));

        drop(claim);
        assert_eq!(pending.get("rrn").unwrap().card_number, "4000000000000002");
    }

    #[test]
    fn concurrent_writers() {
        let pending = Arc::new(PendingReversals::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let pending = Arc::clone(&pending);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        pending.insert(format!("{t}-{i}"), debit("4000000000000001"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pending.len(), 800);
    }
}
