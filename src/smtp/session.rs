//! Per-connection mail transaction state.
//!
//! `Idle -> SenderSet -> RecipientsAccepted -> BodyReceived`, back to `Idle`
//! on reset. Recipients are checked against live mailboxes as they arrive, so
//! a rejected address never gets a body.

use super::error::SessionError;
use crate::{
    mime::{BodyDecoder, DecodedBody, decode_subject},
    models::message::NewMessage,
    service::{MailboxService, MessageService, ServiceError},
    util::extract_address,
};
use mailparse::{MailHeaderMap, parse_mail};
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    SenderSet,
    RecipientsAccepted,
    BodyReceived,
}

/// Outcome of fanning one body out to the accepted recipients.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct Session {
    mailboxes: Arc<MailboxService>,
    messages: Arc<MessageService>,
    decoder: BodyDecoder,
    state: SessionState,
    from: Option<String>,
    recipients: Vec<String>,
}

impl Session {
    pub fn new(mailboxes: Arc<MailboxService>, messages: Arc<MessageService>) -> Self {
        Self {
            mailboxes,
            messages,
            decoder: BodyDecoder::default(),
            state: SessionState::Idle,
            from: None,
            recipients: Vec::new(),
        }
    }

    pub fn with_decoder(mut self, decoder: BodyDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref()
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Any credentials are accepted. Admission is decided per recipient.
    pub fn auth_plain(&mut self, username: &str, _password: &str) -> Result<(), SessionError> {
        debug!("AUTH PLAIN accepted for {:?}", username);
        Ok(())
    }

    /// Record the envelope sender verbatim and start a new transaction.
    pub fn set_sender(&mut self, from: &str) {
        debug!("MAIL FROM: {}", from);
        self.from = Some(from.to_string());
        self.recipients.clear();
        self.state = SessionState::SenderSet;
    }

    /// Accept `to` if it is on our domain and names a live mailbox.
    pub async fn add_recipient(&mut self, to: &str) -> Result<(), SessionError> {
        if !matches!(
            self.state,
            SessionState::SenderSet | SessionState::RecipientsAccepted
        ) {
            return Err(SessionError::BadSequence("MAIL FROM required first"));
        }
        debug!("RCPT TO: {}", to);

        let address = extract_address(to).to_ascii_lowercase();
        let on_our_domain = address
            .rsplit_once('@')
            .is_some_and(|(_, domain)| domain.eq_ignore_ascii_case(self.mailboxes.domain()));
        if !on_our_domain {
            return Err(SessionError::WrongDomain(address));
        }

        match self.mailboxes.get_by_address(&address).await {
            Ok(Some(_)) => {}
            Ok(None) => return Err(SessionError::NoSuchMailbox(address)),
            Err(e) => {
                error!("recipient lookup for {} failed: {e}", address);
                return Err(SessionError::Unavailable(e));
            }
        }

        self.recipients.push(address);
        self.state = SessionState::RecipientsAccepted;
        Ok(())
    }

    /// Fails unless at least one recipient has been accepted.
    pub fn ready_for_body(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::RecipientsAccepted => Ok(()),
            SessionState::Idle | SessionState::BodyReceived => {
                Err(SessionError::BadSequence("MAIL FROM required first"))
            }
            SessionState::SenderSet => Err(SessionError::BadSequence("RCPT TO required first")),
        }
    }

    /// Parse a complete message and store one copy per accepted recipient.
    ///
    /// A failure for one recipient is logged and does not affect the others,
    /// nor the result reported to the peer.
    pub async fn receive_body(&mut self, raw: &[u8]) -> Result<DeliveryReport, SessionError> {
        self.ready_for_body()?;

        let parsed = parse_mail(raw).map_err(SessionError::MalformedMessage)?;
        let subject = parsed
            .headers
            .get_first_header("Subject")
            .map(|h| decode_subject(&String::from_utf8_lossy(h.get_value_raw())))
            .unwrap_or_default();
        let from = parsed
            .headers
            .get_first_value("From")
            .filter(|f| !f.trim().is_empty())
            .or_else(|| self.from.clone())
            .unwrap_or_default();
        let from = extract_address(&from);
        let body = self.decoder.decode(&parsed);

        info!("message from {} subject {:?} to {} recipient(s)", from, subject, self.recipients.len());

        let mut report = DeliveryReport::default();
        for to in &self.recipients {
            match self.deliver(to, &from, &subject, &body).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    error!("could not store message for {}: {e}", to);
                    report.failed += 1;
                }
            }
        }

        self.state = SessionState::BodyReceived;
        Ok(report)
    }

    async fn deliver(
        &self,
        to: &str,
        from: &str,
        subject: &str,
        body: &DecodedBody,
    ) -> Result<(), ServiceError> {
        let mailbox = self
            .mailboxes
            .get_by_address(to)
            .await?
            .ok_or(ServiceError::MailboxNotFound)?;
        self.messages
            .create(NewMessage {
                mailbox_id: mailbox.id,
                from_address: from.to_string(),
                subject: subject.to_string(),
                body_text: body.text.clone(),
                body_html: body.html.clone(),
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    /// Drop sender and recipients; the connection stays open.
    pub fn reset(&mut self) {
        self.from = None;
        self.recipients.clear();
        self.state = SessionState::Idle;
    }

    pub fn logout(&mut self) {
        self.reset();
        debug!("smtp session finished");
    }
}
