pub mod message;
pub mod message_summary;

pub use message::{Message, NewMessage};
pub use message_summary::MessageSummary;
