//! Mailbox row.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A disposable address with a bounded lifetime. Immutable once created.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Mailbox {
    pub id: Uuid,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Written on insert; expiry is decided by [`Mailbox::is_expired_at`], not by this flag.
    pub is_active: bool,
}

impl Mailbox {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expiry_is_strictly_after_expires_at() {
        let now = Utc::now();
        let mb = Mailbox {
            id: Uuid::new_v4(),
            address: "a@tempmail.dev".into(),
            created_at: now - Duration::hours(1),
            expires_at: now,
            is_active: true,
        };
        assert!(!mb.is_expired_at(now));
        assert!(mb.is_expired_at(now + Duration::milliseconds(1)));
    }
}
