//! Message storage.

use crate::models::{attachment::Attachment, message::Message};
use sqlx::SqlitePool;
use uuid::Uuid;

const COLUMNS: &str =
    "id, mailbox_id, from_address, subject, body_text, body_html, received_at, is_read, is_spam";

#[derive(Clone)]
pub struct MessageRepo {
    pool: SqlitePool,
}

impl MessageRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert `msg` only while its mailbox holds fewer than `max` messages.
    /// Count and insert run as one statement. Returns `false` when full.
    pub async fn insert_below_capacity(&self, msg: &Message, max: i64) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            r#"INSERT INTO messages (id, mailbox_id, from_address, subject, body_text, body_html, received_at, is_read, is_spam)
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?
            WHERE (SELECT COUNT(*) FROM messages WHERE mailbox_id = ?) < ?"#,
        )
        .bind(msg.id)
        .bind(msg.mailbox_id)
        .bind(&msg.from_address)
        .bind(&msg.subject)
        .bind(&msg.body_text)
        .bind(&msg.body_html)
        .bind(msg.received_at)
        .bind(msg.is_read)
        .bind(msg.is_spam)
        .bind(msg.mailbox_id)
        .bind(max)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Newest first.
    pub async fn list_by_mailbox(&self, mailbox_id: Uuid) -> Result<Vec<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(&format!(
            "SELECT {COLUMNS} FROM messages WHERE mailbox_id = ? ORDER BY received_at DESC, rowid DESC"
        ))
        .bind(mailbox_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(&format!("SELECT {COLUMNS} FROM messages WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn mark_read(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE messages SET is_read = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let res = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn count_by_mailbox(&self, mailbox_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE mailbox_id = ?")
            .bind(mailbox_id)
            .fetch_one(&self.pool)
            .await
    }

    /// Remove messages whose mailbox row is gone.
    pub async fn delete_orphans(&self) -> Result<u64, sqlx::Error> {
        let res = sqlx::query(
            "DELETE FROM messages WHERE NOT EXISTS (SELECT 1 FROM mailboxes WHERE mailboxes.id = messages.mailbox_id)",
        )
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    pub async fn list_attachments(&self, message_id: Uuid) -> Result<Vec<Attachment>, sqlx::Error> {
        sqlx::query_as::<_, Attachment>(
            "SELECT id, message_id, filename, content_type, size_bytes, storage_path FROM attachments WHERE message_id = ? ORDER BY id",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await
    }
}
