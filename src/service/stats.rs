//! Process-wide counters, shared by reference rather than through a global.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total_mailboxes: u64,
    pub total_messages: u64,
    pub total_spam: u64,
    pub deleted_mailboxes: u64,
    pub last_cleanup: Option<DateTime<Utc>>,
}

/// Increments take the write lock briefly; [`Stats::snapshot`] takes the read lock.
#[derive(Debug, Default)]
pub struct Stats {
    inner: RwLock<StatsSnapshot>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut StatsSnapshot)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *guard);
    }

    pub fn record_mailbox_created(&self) {
        self.update(|s| s.total_mailboxes += 1);
    }

    pub fn record_message(&self, is_spam: bool) {
        self.update(|s| {
            s.total_messages += 1;
            if is_spam {
                s.total_spam += 1;
            }
        });
    }

    pub fn record_mailbox_deleted(&self) {
        self.update(|s| s.deleted_mailboxes += 1);
    }

    /// Count mailboxes removed by a sweep and stamp the sweep time.
    pub fn record_sweep(&self, deleted: u64) {
        self.update(|s| {
            s.deleted_mailboxes += deleted;
            s.last_cleanup = Some(Utc::now());
        });
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counters_accumulate() {
        let stats = Stats::new();
        stats.record_mailbox_created();
        stats.record_message(false);
        stats.record_message(true);
        stats.record_mailbox_deleted();
        stats.record_sweep(3);

        let snap = stats.snapshot();
        assert_eq!(snap.total_mailboxes, 1);
        assert_eq!(snap.total_messages, 2);
        assert_eq!(snap.total_spam, 1);
        assert_eq!(snap.deleted_mailboxes, 4);
        assert!(snap.last_cleanup.is_some());
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let stats = Arc::new(Stats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_message(false);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.snapshot().total_messages, 8000);
    }
}
