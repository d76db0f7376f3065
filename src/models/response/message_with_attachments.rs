//! Response type combining message and attachments.

use crate::models::{attachment::Attachment, message::Message};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MessageWithAttachments {
    pub message: Message,
    pub attachments: Vec<Attachment>,
}
