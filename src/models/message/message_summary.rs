//! List view of a message, without bodies.

use super::message::Message;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct MessageSummary {
    pub id: Uuid,
    pub from_address: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    pub is_spam: bool,
}

impl From<Message> for MessageSummary {
    fn from(m: Message) -> Self {
        MessageSummary {
            id: m.id,
            from_address: m.from_address,
            subject: m.subject,
            received_at: m.received_at,
            is_read: m.is_read,
            is_spam: m.is_spam,
        }
    }
}
