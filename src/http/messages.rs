//! Message JSON APIs, scoped to a mailbox.

use super::error::ApiError;
use crate::{
  app::AppState,
  models::{
    message::MessageSummary, response::message_with_attachments::MessageWithAttachments,
  },
};
use axum::{
  Json,
  extract::{Path as AxumPath, State},
  http::StatusCode,
};
use uuid::Uuid;

pub async fn list_messages(
  State(state): State<AppState>,
  AxumPath(mailbox_id): AxumPath<Uuid>,
) -> Result<Json<Vec<MessageSummary>>, ApiError> {
  let messages = state.messages.list_by_mailbox(mailbox_id).await?;
  Ok(Json(messages.into_iter().map(MessageSummary::from).collect()))
}

/// Returns the full message and marks it read.
pub async fn get_message(
  State(state): State<AppState>,
  AxumPath((mailbox_id, id)): AxumPath<(Uuid, Uuid)>,
) -> Result<Json<MessageWithAttachments>, ApiError> {
  let message = state.messages.get_in_mailbox(mailbox_id, id).await?;
  let attachments = state.messages.attachments(message.id).await?;
  Ok(Json(MessageWithAttachments {
    message,
    attachments,
  }))
}

pub async fn delete_message(
  State(state): State<AppState>,
  AxumPath((mailbox_id, id)): AxumPath<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
  state.messages.delete_in_mailbox(mailbox_id, id).await?;
  Ok(StatusCode::NO_CONTENT)
}
