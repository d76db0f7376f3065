//! Mailbox lifecycle: allocation, lazy expiry, deletion and sweeping.

use super::{ServiceError, Stats};
use crate::{config::MailConfig, db::MailboxRepo, models::mailbox::Mailbox};
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

/// Characters used for generated local parts.
pub const LOCAL_PART_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
pub const LOCAL_PART_LEN: usize = 10;
const MAX_ALLOCATION_ATTEMPTS: usize = 8;

/// Draw a random local part from `rng`.
pub fn random_local_part<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..LOCAL_PART_LEN)
        .map(|_| LOCAL_PART_ALPHABET[rng.gen_range(0..LOCAL_PART_ALPHABET.len())] as char)
        .collect()
}

pub struct MailboxService {
    repo: MailboxRepo,
    config: MailConfig,
    stats: Arc<Stats>,
    rng: Mutex<StdRng>,
}

impl MailboxService {
    pub fn new(repo: MailboxRepo, config: MailConfig, stats: Arc<Stats>) -> Self {
        Self::with_rng(repo, config, stats, StdRng::from_entropy())
    }

    /// Use a caller-supplied generator, e.g. a seeded one in tests.
    pub fn with_rng(repo: MailboxRepo, config: MailConfig, stats: Arc<Stats>, rng: StdRng) -> Self {
        Self {
            repo,
            config,
            stats,
            rng: Mutex::new(rng),
        }
    }

    pub fn domain(&self) -> &str {
        &self.config.domain
    }

    fn generate_address(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        format!("{}@{}", random_local_part(&mut *rng), self.config.domain)
    }

    /// Allocate a mailbox.
    ///
    /// An empty `desired_local_part` yields a random address. A `ttl` of zero
    /// or less means the configured default; above the maximum is an error and
    /// nothing is written. If the requested address is held by a live mailbox,
    /// a random address is used instead without reporting it.
    pub async fn create(&self, desired_local_part: &str, ttl: Duration) -> Result<Mailbox, ServiceError> {
        let ttl = if ttl <= Duration::zero() {
            self.config.default_ttl
        } else {
            ttl
        };
        if ttl > self.config.max_ttl {
            return Err(ServiceError::InvalidTtl {
                max: self.config.max_ttl,
            });
        }

        let desired = desired_local_part.trim();
        let mut address = if desired.is_empty() {
            self.generate_address()
        } else {
            format!("{}@{}", desired.to_ascii_lowercase(), self.config.domain)
        };

        let created_at = Utc::now();
        let expires_at = created_at + ttl;
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            if let Some(mailbox) = self
                .repo
                .insert_if_available(&address, created_at, expires_at)
                .await?
            {
                self.stats.record_mailbox_created();
                info!("mailbox created: {} expires {}", mailbox.address, mailbox.expires_at);
                return Ok(mailbox);
            }
            debug!("address {} is taken (attempt {})", address, attempt);
            address = self.generate_address();
        }
        Err(ServiceError::AddressUnavailable {
            attempts: MAX_ALLOCATION_ATTEMPTS,
        })
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Mailbox, ServiceError> {
        let mailbox = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or(ServiceError::MailboxNotFound)?;
        if mailbox.is_expired() {
            return Err(ServiceError::MailboxExpired);
        }
        Ok(mailbox)
    }

    /// Live mailbox for `address`. Expired and unknown addresses both give `None`.
    pub async fn get_by_address(&self, address: &str) -> Result<Option<Mailbox>, ServiceError> {
        let address = address.trim().to_ascii_lowercase();
        Ok(self
            .repo
            .get_by_address(&address)
            .await?
            .filter(|mb| !mb.is_expired()))
    }

    /// Whether a row exists for `id`, expired or not.
    pub async fn exists(&self, id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.repo.get_by_id(id).await?.is_some())
    }

    /// Delete a live mailbox. Its messages are left in place.
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let mailbox = match self.get_by_id(id).await {
            Ok(mb) => mb,
            Err(ServiceError::MailboxExpired) => return Err(ServiceError::MailboxNotFound),
            Err(e) => return Err(e),
        };
        if !self.repo.delete(mailbox.id).await? {
            return Err(ServiceError::MailboxNotFound);
        }
        self.stats.record_mailbox_deleted();
        info!("mailbox deleted: {}", mailbox.address);
        Ok(())
    }

    /// Remove every mailbox past its expiry. Returns how many were removed.
    pub async fn sweep_expired(&self) -> Result<u64, ServiceError> {
        Ok(self.repo.delete_expired(Utc::now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn mail_config() -> MailConfig {
        MailConfig {
            domain: "tempmail.dev".into(),
            default_ttl: Duration::hours(1),
            max_ttl: Duration::hours(24),
        }
    }

    async fn service_with_rng(rng: StdRng) -> (MailboxService, MailboxRepo) {
        let pool = db::connect("sqlite://:memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let repo = MailboxRepo::new(pool);
        let svc = MailboxService::with_rng(repo.clone(), mail_config(), Arc::new(Stats::new()), rng);
        (svc, repo)
    }

    async fn service() -> (MailboxService, MailboxRepo) {
        service_with_rng(StdRng::from_entropy()).await
    }

    fn is_generated(address: &str) -> bool {
        let Some((local, domain)) = address.split_once('@') else {
            return false;
        };
        domain == "tempmail.dev"
            && local.len() == LOCAL_PART_LEN
            && local.bytes().all(|b| LOCAL_PART_ALPHABET.contains(&b))
    }

    #[tokio::test]
    async fn expiry_is_creation_plus_ttl() {
        let (svc, _) = service().await;
        for ttl in [Duration::seconds(1), Duration::minutes(30), Duration::hours(24)] {
            let mb = svc.create("", ttl).await.unwrap();
            assert_eq!(mb.expires_at - mb.created_at, ttl);
        }
    }

    #[tokio::test]
    async fn non_positive_ttl_uses_default() {
        let (svc, _) = service().await;
        let mb = svc.create("", Duration::zero()).await.unwrap();
        assert_eq!(mb.expires_at - mb.created_at, Duration::hours(1));
        let mb = svc.create("", Duration::minutes(-3)).await.unwrap();
        assert_eq!(mb.expires_at - mb.created_at, Duration::hours(1));
    }

    #[tokio::test]
    async fn ttl_above_max_fails_without_writing() {
        let (svc, repo) = service().await;
        let err = svc.create("wanted", Duration::hours(25)).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTtl { .. }));
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn random_addresses_use_alphabet_and_domain() {
        let (svc, _) = service().await;
        let a = svc.create("", Duration::hours(1)).await.unwrap();
        let b = svc.create("", Duration::hours(1)).await.unwrap();
        assert!(is_generated(&a.address), "{}", a.address);
        assert!(is_generated(&b.address), "{}", b.address);
        assert_ne!(a.address, b.address);
    }

    #[tokio::test]
    async fn requested_address_is_honoured_when_free() {
        let (svc, _) = service().await;
        let mb = svc.create("Alice", Duration::hours(2)).await.unwrap();
        assert_eq!(mb.address, "alice@tempmail.dev");
    }

    #[tokio::test]
    async fn taken_address_falls_back_to_seeded_random() {
        let (svc, _) = service_with_rng(StdRng::seed_from_u64(7)).await;
        let expected = format!(
            "{}@tempmail.dev",
            random_local_part(&mut StdRng::seed_from_u64(7))
        );

        let first = svc.create("taken", Duration::hours(1)).await.unwrap();
        assert_eq!(first.address, "taken@tempmail.dev");

        let second = svc.create("taken", Duration::minutes(10)).await.unwrap();
        assert_eq!(second.address, expected);
        assert_eq!(second.expires_at - second.created_at, Duration::minutes(10));
    }

    #[tokio::test]
    async fn expired_address_can_be_reused() {
        let (svc, repo) = service().await;
        let past = Utc::now() - Duration::hours(2);
        repo.insert_if_available("reuse@tempmail.dev", past, past + Duration::hours(1))
            .await
            .unwrap()
            .unwrap();

        let mb = svc.create("reuse", Duration::hours(1)).await.unwrap();
        assert_eq!(mb.address, "reuse@tempmail.dev");
        let found = svc.get_by_address("reuse@tempmail.dev").await.unwrap().unwrap();
        assert_eq!(found.id, mb.id);
    }

    #[tokio::test]
    async fn expired_mailbox_is_expired_by_id_and_absent_by_address() {
        let (svc, repo) = service().await;
        let past = Utc::now() - Duration::hours(2);
        let mb = repo
            .insert_if_available("old@tempmail.dev", past, past + Duration::hours(1))
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(svc.get_by_id(mb.id).await, Err(ServiceError::MailboxExpired)));
        assert!(svc.get_by_address("old@tempmail.dev").await.unwrap().is_none());
        assert!(matches!(svc.delete(mb.id).await, Err(ServiceError::MailboxNotFound)));
        assert!(svc.exists(mb.id).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let (svc, _) = service().await;
        assert!(matches!(
            svc.get_by_id(Uuid::new_v4()).await,
            Err(ServiceError::MailboxNotFound)
        ));
        assert!(matches!(
            svc.delete(Uuid::new_v4()).await,
            Err(ServiceError::MailboxNotFound)
        ));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let (svc, _) = service().await;
        let mb = svc.create("", Duration::hours(1)).await.unwrap();
        svc.delete(mb.id).await.unwrap();
        assert!(matches!(svc.get_by_id(mb.id).await, Err(ServiceError::MailboxNotFound)));
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let (svc, repo) = service().await;
        let past = Utc::now() - Duration::hours(3);
        for name in ["a", "b"] {
            repo.insert_if_available(&format!("{name}@tempmail.dev"), past, past + Duration::hours(1))
                .await
                .unwrap()
                .unwrap();
        }
        let live = svc.create("", Duration::hours(1)).await.unwrap();

        assert_eq!(svc.sweep_expired().await.unwrap(), 2);
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(svc.get_by_id(live.id).await.is_ok());
    }
}
