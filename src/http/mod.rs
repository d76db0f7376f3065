//! HTTP router and handlers.

use crate::app::AppState;
use axum::{
  Router,
  routing::{get, post},
};

pub mod error;
pub mod mailbox;
pub mod messages;
pub mod system;

/// Assemble the HTTP router with all routes.
pub fn build_router(state: AppState) -> Router {
  Router::new()
    .route("/health", get(system::health))
    .route("/stats", get(system::stats))
    .route("/api/v1/mailbox", post(mailbox::create_mailbox))
    .route(
      "/api/v1/mailbox/:id",
      get(mailbox::get_mailbox).delete(mailbox::delete_mailbox),
    )
    .route("/api/v1/mailbox/:id/messages", get(messages::list_messages))
    .route(
      "/api/v1/mailbox/:id/messages/:mid",
      get(messages::get_message).delete(messages::delete_message),
    )
    .with_state(state)
}
