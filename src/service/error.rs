use chrono::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("mailbox not found")]
    MailboxNotFound,

    #[error("mailbox expired")]
    MailboxExpired,

    #[error("message not found")]
    MessageNotFound,

    #[error("ttl exceeds the maximum of {max}")]
    InvalidTtl { max: Duration },

    #[error("mailbox is full (max {max} messages)")]
    MailboxFull { max: i64 },

    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("no free address after {attempts} attempts")]
    AddressUnavailable { attempts: usize },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}
