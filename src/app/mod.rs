//! Application setup and runtime.

use crate::{
  config::Config,
  db::{self, MailboxRepo, MessageRepo},
  http,
  service::{MailboxService, MessageService, Stats, sweeper},
  smtp,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
  pub config: Arc<Config>,
  pub stats: Arc<Stats>,
  pub mailboxes: Arc<MailboxService>,
  pub messages: Arc<MessageService>,
}

impl AppState {
  /// Wire repositories and services over an open, migrated pool.
  pub fn new(db: SqlitePool, config: Config) -> Self {
    let stats = Arc::new(Stats::new());
    let mailboxes = Arc::new(MailboxService::new(
      MailboxRepo::new(db.clone()),
      config.mail.clone(),
      stats.clone(),
    ));
    let messages = Arc::new(MessageService::new(
      MessageRepo::new(db),
      mailboxes.clone(),
      config.limits.clone(),
      stats.clone(),
    ));
    Self {
      config: Arc::new(config),
      stats,
      mailboxes,
      messages,
    }
  }
}

/// Start HTTP and SMTP servers and the expiry sweeper.
pub async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
  crate::util::init_tracing();

  let config = Config::from_env()?;
  let pool = db::connect(&config.database_url).await?;
  db::run_migrations(&pool).await?;

  let state = AppState::new(pool, config);
  let app = http::build_router(state.clone());
  let addr = state.config.http_addr;

  info!("mail domain:          {}", state.config.mail.domain);
  info!("REST API:             http://{}/api/v1", addr);
  info!("SMTP:                 {}", state.config.smtp.addr);

  // Start SMTP listener in background
  let smtp_state = state.clone();
  tokio::spawn(async move {
    if let Err(e) = smtp::start_smtp(smtp_state).await {
      error!("smtp listener error: {e}");
    }
  });

  tokio::spawn(sweeper::run_sweeper(
    state.mailboxes.clone(),
    state.messages.clone(),
    state.stats.clone(),
    state.config.sweep_interval,
  ));

  // Start HTTP server
  let listener = tokio::net::TcpListener::bind(addr).await?;
  axum::serve(listener, app).await?;
  Ok(())
}
