//! Errors reported to the sending peer, each with its SMTP reply code.

use crate::service::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("5.1.2 We do not accept mail for {0}")]
    WrongDomain(String),

    #[error("5.1.1 Mailbox {0} does not exist")]
    NoSuchMailbox(String),

    #[error("5.5.1 Bad sequence of commands: {0}")]
    BadSequence(&'static str),

    #[error("4.5.3 Too many recipients (max {0})")]
    TooManyRecipients(usize),

    #[error("5.6.0 Message could not be parsed")]
    MalformedMessage(#[source] mailparse::MailParseError),

    #[error("4.3.0 Mailbox lookup failed, try again later")]
    Unavailable(#[source] ServiceError),
}

impl SessionError {
    pub fn code(&self) -> u16 {
        match self {
            SessionError::WrongDomain(_) | SessionError::NoSuchMailbox(_) => 550,
            SessionError::BadSequence(_) => 503,
            SessionError::TooManyRecipients(_) => 452,
            SessionError::MalformedMessage(_) => 554,
            SessionError::Unavailable(_) => 451,
        }
    }

    /// Full reply line without the trailing CRLF.
    pub fn reply(&self) -> String {
        format!("{} {}", self.code(), self)
    }
}
