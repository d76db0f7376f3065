//! Periodic reclamation of expired mailboxes and orphaned messages.
//!
//! Expiry is already enforced at read time; this only frees storage.

use super::{MailboxService, MessageService, ServiceError, Stats};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub mailboxes: u64,
    pub orphaned_messages: u64,
}

/// Run one sweep and record it in `stats`.
pub async fn sweep_once(
    mailboxes: &MailboxService,
    messages: &MessageService,
    stats: &Stats,
) -> Result<SweepReport, ServiceError> {
    let removed = mailboxes.sweep_expired().await?;
    stats.record_sweep(removed);
    let orphaned_messages = messages.purge_orphans().await?;
    Ok(SweepReport {
        mailboxes: removed,
        orphaned_messages,
    })
}

/// Sweep every `interval` until the task is dropped.
pub async fn run_sweeper(
    mailboxes: Arc<MailboxService>,
    messages: Arc<MessageService>,
    stats: Arc<Stats>,
    interval: Duration,
) {
    info!("sweeper started interval={:?}", interval);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match sweep_once(&mailboxes, &messages, &stats).await {
            Ok(r) if r.mailboxes > 0 || r.orphaned_messages > 0 => info!(
                "sweep removed mailboxes={} orphaned_messages={}",
                r.mailboxes, r.orphaned_messages
            ),
            Ok(_) => {}
            Err(e) => error!("sweep failed: {e}"),
        }
    }
}
