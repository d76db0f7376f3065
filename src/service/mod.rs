//! Mailbox lifecycle, the message store gate, counters and the expiry sweep.

pub mod error;
pub mod mailbox_service;
pub mod message_service;
pub mod stats;
pub mod sweeper;

pub use error::ServiceError;
pub use mailbox_service::MailboxService;
pub use message_service::MessageService;
pub use stats::{Stats, StatsSnapshot};
