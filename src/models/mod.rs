//! Typed records shared by storage, services and the HTTP layer.

pub mod attachment;
pub mod mailbox;
pub mod message;
pub mod response;
