//! Mailbox JSON APIs.

use super::error::ApiError;
use crate::{app::AppState, models::mailbox::Mailbox, util::parse_duration};
use axum::{
  Json,
  body::Bytes,
  extract::{Path as AxumPath, State},
  http::StatusCode,
};
use chrono::Duration;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct CreateMailboxRequest {
  /// Desired local part; random when absent or empty.
  pub address: Option<String>,
  /// Lifetime such as `30m` or `2h`; the configured default when absent.
  pub ttl: Option<String>,
}

/// An empty body is the same as `{}`.
pub async fn create_mailbox(
  State(state): State<AppState>,
  body: Bytes,
) -> Result<(StatusCode, Json<Mailbox>), ApiError> {
  let req: CreateMailboxRequest = if body.iter().all(u8::is_ascii_whitespace) {
    CreateMailboxRequest::default()
  } else {
    serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("invalid body: {e}")))?
  };

  let ttl = match req.ttl.as_deref().map(str::trim) {
    None | Some("") => Duration::zero(),
    Some(raw) => parse_duration(raw).map_err(|e| ApiError::BadRequest(e.to_string()))?,
  };
  let local_part = req.address.as_deref().unwrap_or_default();
  let mailbox = state.mailboxes.create(local_part, ttl).await?;
  Ok((StatusCode::CREATED, Json(mailbox)))
}

pub async fn get_mailbox(
  State(state): State<AppState>,
  AxumPath(id): AxumPath<Uuid>,
) -> Result<Json<Mailbox>, ApiError> {
  Ok(Json(state.mailboxes.get_by_id(id).await?))
}

pub async fn delete_mailbox(
  State(state): State<AppState>,
  AxumPath(id): AxumPath<Uuid>,
) -> Result<StatusCode, ApiError> {
  state.mailboxes.delete(id).await?;
  Ok(StatusCode::NO_CONTENT)
}
