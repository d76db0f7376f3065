//! Mailbox storage.

use crate::models::mailbox::Mailbox;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

const COLUMNS: &str = "id, address, created_at, expires_at, is_active";

#[derive(Clone)]
pub struct MailboxRepo {
    pool: SqlitePool,
}

impl MailboxRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a mailbox unless `address` already names an active mailbox that
    /// is unexpired at `created_at`. The check and the insert are one statement.
    ///
    /// Returns `None` when the address is taken.
    pub async fn insert_if_available(
        &self,
        address: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Mailbox>, sqlx::Error> {
        let id = Uuid::new_v4();
        let res = sqlx::query(
            r#"INSERT INTO mailboxes (id, address, created_at, expires_at, is_active)
            SELECT ?, ?, ?, ?, 1
            WHERE NOT EXISTS (
                SELECT 1 FROM mailboxes WHERE address = ? AND is_active = 1 AND expires_at > ?
            )"#,
        )
        .bind(id)
        .bind(address)
        .bind(created_at)
        .bind(expires_at)
        .bind(address)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(Mailbox {
            id,
            address: address.to_string(),
            created_at,
            expires_at,
            is_active: true,
        }))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Mailbox>, sqlx::Error> {
        sqlx::query_as::<_, Mailbox>(&format!("SELECT {COLUMNS} FROM mailboxes WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Active row for `address`, preferring the one that lives longest when
    /// expired rows share the address. Expiry is left to the caller.
    pub async fn get_by_address(&self, address: &str) -> Result<Option<Mailbox>, sqlx::Error> {
        sqlx::query_as::<_, Mailbox>(&format!(
            "SELECT {COLUMNS} FROM mailboxes WHERE address = ? AND is_active = 1 ORDER BY expires_at DESC LIMIT 1"
        ))
        .bind(address)
        .fetch_optional(&self.pool)
        .await
    }

    /// Returns whether a row was removed.
    pub async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let res = sqlx::query("DELETE FROM mailboxes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let res = sqlx::query("DELETE FROM mailboxes WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM mailboxes")
            .fetch_one(&self.pool)
            .await
    }
}
