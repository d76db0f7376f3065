//! Message store gate: existence, expiry, capacity and size checks around
//! persistence.

use super::{MailboxService, ServiceError, Stats};
use crate::{
    config::LimitsConfig,
    db::MessageRepo,
    models::{
        attachment::Attachment,
        message::{Message, NewMessage},
    },
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct MessageService {
    repo: MessageRepo,
    mailboxes: Arc<MailboxService>,
    limits: LimitsConfig,
    stats: Arc<Stats>,
}

impl MessageService {
    pub fn new(
        repo: MessageRepo,
        mailboxes: Arc<MailboxService>,
        limits: LimitsConfig,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            repo,
            mailboxes,
            limits,
            stats,
        }
    }

    /// Store a message after checking, in order: the mailbox exists and is
    /// live, it is below capacity, and the message fits the size limit.
    /// A full mailbox rejects new mail; nothing is evicted.
    pub async fn create(&self, msg: NewMessage) -> Result<Message, ServiceError> {
        self.mailboxes.get_by_id(msg.mailbox_id).await?;

        let max = self.limits.max_messages_per_mailbox;
        if self.repo.count_by_mailbox(msg.mailbox_id).await? >= max {
            return Err(ServiceError::MailboxFull { max });
        }

        let size = msg.size();
        if size > self.limits.max_message_size {
            return Err(ServiceError::MessageTooLarge {
                size,
                max: self.limits.max_message_size,
            });
        }

        let message = msg.into_message();
        // The count above is advisory; this insert re-checks it atomically.
        if !self.repo.insert_below_capacity(&message, max).await? {
            return Err(ServiceError::MailboxFull { max });
        }
        self.stats.record_message(message.is_spam);
        debug!("message {} stored in mailbox {}", message.id, message.mailbox_id);
        Ok(message)
    }

    /// All messages of a mailbox, newest first. Expiry is not checked here.
    pub async fn list_by_mailbox(&self, mailbox_id: Uuid) -> Result<Vec<Message>, ServiceError> {
        if !self.mailboxes.exists(mailbox_id).await? {
            return Err(ServiceError::MailboxNotFound);
        }
        Ok(self.repo.list_by_mailbox(mailbox_id).await?)
    }

    /// Fetch a message and mark it read. Failing to persist the read flag
    /// does not fail the fetch.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Message, ServiceError> {
        let message = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or(ServiceError::MessageNotFound)?;
        Ok(self.mark_read(message).await)
    }

    /// Like [`MessageService::get_by_id`], but a message owned by another
    /// mailbox is reported as not found and left unread.
    pub async fn get_in_mailbox(&self, mailbox_id: Uuid, id: Uuid) -> Result<Message, ServiceError> {
        let message = self
            .repo
            .get_by_id(id)
            .await?
            .filter(|m| m.mailbox_id == mailbox_id)
            .ok_or(ServiceError::MessageNotFound)?;
        Ok(self.mark_read(message).await)
    }

    async fn mark_read(&self, mut message: Message) -> Message {
        if message.is_read {
            return message;
        }
        match self.repo.mark_read(message.id).await {
            Ok(()) => message.is_read = true,
            Err(e) => warn!("could not mark message {} read: {e}", message.id),
        }
        message
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        if !self.repo.delete(id).await? {
            return Err(ServiceError::MessageNotFound);
        }
        Ok(())
    }

    /// Delete a message only if it belongs to `mailbox_id`.
    pub async fn delete_in_mailbox(&self, mailbox_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        match self.repo.get_by_id(id).await? {
            Some(m) if m.mailbox_id == mailbox_id => self.delete(id).await,
            _ => Err(ServiceError::MessageNotFound),
        }
    }

    pub async fn attachments(&self, message_id: Uuid) -> Result<Vec<Attachment>, ServiceError> {
        Ok(self.repo.list_attachments(message_id).await?)
    }

    /// Drop messages left behind by deleted mailboxes.
    pub async fn purge_orphans(&self) -> Result<u64, ServiceError> {
        Ok(self.repo.delete_orphans().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::MailConfig, db, db::MailboxRepo};
    use chrono::{Duration, Utc};

    struct Fixture {
        mailboxes: Arc<MailboxService>,
        messages: MessageService,
        repo: MessageRepo,
        mailbox_repo: MailboxRepo,
        stats: Arc<Stats>,
    }

    async fn fixture(max_messages: i64, max_size: usize) -> Fixture {
        let pool = db::connect("sqlite://:memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let stats = Arc::new(Stats::new());
        let mailbox_repo = MailboxRepo::new(pool.clone());
        let mailboxes = Arc::new(MailboxService::new(
            mailbox_repo.clone(),
            MailConfig {
                domain: "tempmail.dev".into(),
                default_ttl: Duration::hours(1),
                max_ttl: Duration::hours(24),
            },
            stats.clone(),
        ));
        let repo = MessageRepo::new(pool);
        let messages = MessageService::new(
            repo.clone(),
            mailboxes.clone(),
            LimitsConfig {
                max_message_size: max_size,
                max_messages_per_mailbox: max_messages,
            },
            stats.clone(),
        );
        Fixture {
            mailboxes,
            messages,
            repo,
            mailbox_repo,
            stats,
        }
    }

    fn new_message(mailbox_id: Uuid, text: &str) -> NewMessage {
        NewMessage {
            mailbox_id,
            from_address: "sender@example.com".into(),
            subject: "hi".into(),
            body_text: text.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn stores_message_and_assigns_id_and_time() {
        let f = fixture(10, 1024).await;
        let mb = f.mailboxes.create("", Duration::hours(1)).await.unwrap();
        let before = Utc::now();
        let msg = f.messages.create(new_message(mb.id, "hello")).await.unwrap();
        assert!(msg.received_at >= before);
        assert!(!msg.is_read);
        assert_eq!(f.repo.count_by_mailbox(mb.id).await.unwrap(), 1);
        assert_eq!(f.stats.snapshot().total_messages, 1);
    }

    #[tokio::test]
    async fn unknown_and_expired_mailboxes_are_rejected() {
        let f = fixture(10, 1024).await;
        assert!(matches!(
            f.messages.create(new_message(Uuid::new_v4(), "x")).await,
            Err(ServiceError::MailboxNotFound)
        ));

        let past = Utc::now() - Duration::hours(2);
        let old = f
            .mailbox_repo
            .insert_if_available("old@tempmail.dev", past, past + Duration::hours(1))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            f.messages.create(new_message(old.id, "x")).await,
            Err(ServiceError::MailboxExpired)
        ));
    }

    #[tokio::test]
    async fn full_mailbox_rejects_and_keeps_count() {
        let f = fixture(2, 1024).await;
        let mb = f.mailboxes.create("", Duration::hours(1)).await.unwrap();
        f.messages.create(new_message(mb.id, "one")).await.unwrap();
        f.messages.create(new_message(mb.id, "two")).await.unwrap();

        let err = f.messages.create(new_message(mb.id, "three")).await.unwrap_err();
        assert!(matches!(err, ServiceError::MailboxFull { max: 2 }));
        assert_eq!(f.repo.count_by_mailbox(mb.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn oversized_message_is_not_stored() {
        let f = fixture(10, 8).await;
        let mb = f.mailboxes.create("", Duration::hours(1)).await.unwrap();
        let mut msg = new_message(mb.id, "12345");
        msg.body_html = "6789".into();

        let err = f.messages.create(msg).await.unwrap_err();
        assert!(matches!(err, ServiceError::MessageTooLarge { size: 9, max: 8 }));
        assert_eq!(f.repo.count_by_mailbox(mb.id).await.unwrap(), 0);

        // Exactly at the limit is fine.
        f.messages.create(new_message(mb.id, "12345678")).await.unwrap();
    }

    #[tokio::test]
    async fn list_is_newest_first_and_ignores_expiry() {
        let f = fixture(10, 1024).await;
        let mb = f.mailboxes.create("", Duration::hours(1)).await.unwrap();
        let t0 = Utc::now() - Duration::minutes(10);
        for (i, subject) in ["older", "newer"].iter().enumerate() {
            let mut m = new_message(mb.id, "x");
            m.subject = subject.to_string();
            m.received_at = Some(t0 + Duration::minutes(i as i64));
            f.messages.create(m).await.unwrap();
        }
        let list = f.messages.list_by_mailbox(mb.id).await.unwrap();
        let subjects: Vec<_> = list.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, ["newer", "older"]);

        assert!(matches!(
            f.messages.list_by_mailbox(Uuid::new_v4()).await,
            Err(ServiceError::MailboxNotFound)
        ));
    }

    #[tokio::test]
    async fn get_marks_read_idempotently() {
        let f = fixture(10, 1024).await;
        let mb = f.mailboxes.create("", Duration::hours(1)).await.unwrap();
        let msg = f.messages.create(new_message(mb.id, "x")).await.unwrap();

        assert!(!f.repo.get_by_id(msg.id).await.unwrap().unwrap().is_read);
        for _ in 0..2 {
            let got = f.messages.get_by_id(msg.id).await.unwrap();
            assert!(got.is_read);
            assert!(f.repo.get_by_id(msg.id).await.unwrap().unwrap().is_read);
        }
        assert!(matches!(
            f.messages.get_by_id(Uuid::new_v4()).await,
            Err(ServiceError::MessageNotFound)
        ));
    }

    #[tokio::test]
    async fn scoped_lookup_hides_foreign_messages() {
        let f = fixture(10, 1024).await;
        let a = f.mailboxes.create("", Duration::hours(1)).await.unwrap();
        let b = f.mailboxes.create("", Duration::hours(1)).await.unwrap();
        let msg = f.messages.create(new_message(a.id, "x")).await.unwrap();

        assert!(matches!(
            f.messages.get_in_mailbox(b.id, msg.id).await,
            Err(ServiceError::MessageNotFound)
        ));
        assert!(!f.repo.get_by_id(msg.id).await.unwrap().unwrap().is_read);
        assert!(matches!(
            f.messages.delete_in_mailbox(b.id, msg.id).await,
            Err(ServiceError::MessageNotFound)
        ));
        f.messages.delete_in_mailbox(a.id, msg.id).await.unwrap();
        assert!(matches!(
            f.messages.delete(msg.id).await,
            Err(ServiceError::MessageNotFound)
        ));
    }

    #[tokio::test]
    async fn mailbox_delete_leaves_orphans_until_purged() {
        let f = fixture(10, 1024).await;
        let mb = f.mailboxes.create("", Duration::hours(1)).await.unwrap();
        f.messages.create(new_message(mb.id, "x")).await.unwrap();
        f.mailboxes.delete(mb.id).await.unwrap();

        assert_eq!(f.repo.count_by_mailbox(mb.id).await.unwrap(), 1);
        assert_eq!(f.messages.purge_orphans().await.unwrap(), 1);
        assert_eq!(f.repo.count_by_mailbox(mb.id).await.unwrap(), 0);
    }
}
