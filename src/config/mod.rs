//! Configuration loaded from environment variables (and an optional `.env`).

use crate::{mime::PartPrecedence, util::parse_duration};
use chrono::Duration;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Mailbox lifecycle settings.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Domain appended to every local part, e.g. `tempmail.dev`.
    pub domain: String,
    pub default_ttl: Duration,
    pub max_ttl: Duration,
}

/// Per-message and per-mailbox limits enforced when storing mail.
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Upper bound on `text.len() + html.len()`, in bytes.
    pub max_message_size: usize,
    pub max_messages_per_mailbox: i64,
}

/// SMTP listener settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub addr: SocketAddr,
    /// Applied to every read and every write on a connection.
    pub timeout: std::time::Duration,
    pub max_recipients: usize,
    /// Size cap for the raw DATA payload.
    pub max_message_bytes: usize,
    /// Tie-break between repeated text parts of one type.
    pub part_precedence: PartPrecedence,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub http_addr: SocketAddr,
    pub sweep_interval: std::time::Duration,
    pub mail: MailConfig,
    pub limits: LimitsConfig,
    pub smtp: SmtpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://tempmail.db".to_string(),
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            sweep_interval: std::time::Duration::from_secs(300),
            mail: MailConfig {
                domain: "tempmail.dev".to_string(),
                default_ttl: Duration::hours(1),
                max_ttl: Duration::hours(24),
            },
            limits: LimitsConfig {
                max_message_size: 10 * 1024 * 1024,
                max_messages_per_mailbox: 100,
            },
            smtp: SmtpConfig {
                addr: SocketAddr::from(([127, 0, 0, 1], 2525)),
                timeout: std::time::Duration::from_secs(30),
                max_recipients: 10,
                max_message_bytes: 10 * 1024 * 1024,
                part_precedence: PartPrecedence::LastWins,
            },
        }
    }
}

impl Config {
    /// Read `TEMPMAIL_*` variables, falling back to [`Config::default`].
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Config::default();
        let cfg = Config {
            database_url: lookup("TEMPMAIL_DATABASE").unwrap_or(d.database_url),
            http_addr: parsed(&lookup, "TEMPMAIL_HTTP_ADDR")?.unwrap_or(d.http_addr),
            sweep_interval: std_duration(&lookup, "TEMPMAIL_SWEEP_INTERVAL")?
                .unwrap_or(d.sweep_interval),
            mail: MailConfig {
                domain: lookup("TEMPMAIL_DOMAIN")
                    .map(|s| s.trim().to_ascii_lowercase())
                    .unwrap_or(d.mail.domain),
                default_ttl: duration(&lookup, "TEMPMAIL_DEFAULT_TTL")?
                    .unwrap_or(d.mail.default_ttl),
                max_ttl: duration(&lookup, "TEMPMAIL_MAX_TTL")?.unwrap_or(d.mail.max_ttl),
            },
            limits: LimitsConfig {
                max_message_size: parsed(&lookup, "TEMPMAIL_MAX_MESSAGE_SIZE")?
                    .unwrap_or(d.limits.max_message_size),
                max_messages_per_mailbox: parsed(&lookup, "TEMPMAIL_MAX_MESSAGES_PER_MAILBOX")?
                    .unwrap_or(d.limits.max_messages_per_mailbox),
            },
            smtp: SmtpConfig {
                addr: parsed(&lookup, "TEMPMAIL_SMTP_ADDR")?.unwrap_or(d.smtp.addr),
                timeout: std_duration(&lookup, "TEMPMAIL_SMTP_TIMEOUT")?.unwrap_or(d.smtp.timeout),
                max_recipients: parsed(&lookup, "TEMPMAIL_SMTP_MAX_RECIPIENTS")?
                    .unwrap_or(d.smtp.max_recipients),
                max_message_bytes: parsed(&lookup, "TEMPMAIL_SMTP_MAX_MESSAGE_BYTES")?
                    .unwrap_or(d.smtp.max_message_bytes),
                part_precedence: parsed(&lookup, "TEMPMAIL_PART_PRECEDENCE")?
                    .unwrap_or(d.smtp.part_precedence),
            },
        };

        if cfg.mail.domain.is_empty() {
            return Err(ConfigError::Invalid {
                var: "TEMPMAIL_DOMAIN",
                reason: "must not be empty".into(),
            });
        }
        if cfg.mail.default_ttl > cfg.mail.max_ttl {
            return Err(ConfigError::Invalid {
                var: "TEMPMAIL_DEFAULT_TTL",
                reason: "exceeds TEMPMAIL_MAX_TTL".into(),
            });
        }
        Ok(cfg)
    }
}

fn parsed<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(var)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                var,
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn duration<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|raw| match parse_duration(&raw) {
            Ok(d) if d > Duration::zero() => Ok(d),
            Ok(_) => Err(ConfigError::Invalid {
                var,
                reason: "must be positive".into(),
            }),
            Err(e) => Err(ConfigError::Invalid {
                var,
                reason: e.to_string(),
            }),
        })
        .transpose()
}

fn std_duration<F>(
    lookup: &F,
    var: &'static str,
) -> Result<Option<std::time::Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(duration(lookup, var)?.and_then(|d| d.to_std().ok()))
}
