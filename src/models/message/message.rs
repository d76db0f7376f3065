//! Message row and the insert payload produced by ingestion.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub mailbox_id: Uuid,
    pub from_address: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    pub is_spam: bool,
}

/// A message about to be stored. `id` and `received_at` are assigned when unset.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub id: Option<Uuid>,
    pub mailbox_id: Uuid,
    pub from_address: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
    pub received_at: Option<DateTime<Utc>>,
    pub is_spam: bool,
}

impl NewMessage {
    /// Size counted against the per-message limit.
    pub fn size(&self) -> usize {
        self.body_text.len() + self.body_html.len()
    }

    pub(crate) fn into_message(self) -> Message {
        Message {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            mailbox_id: self.mailbox_id,
            from_address: self.from_address,
            subject: self.subject,
            body_text: self.body_text,
            body_html: self.body_html,
            received_at: self.received_at.unwrap_or_else(Utc::now),
            is_read: false,
            is_spam: self.is_spam,
        }
    }
}
