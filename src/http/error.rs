//! JSON error bodies and the status mapping for service errors.

use crate::service::ServiceError;
use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
  BadRequest(String),
  Service(ServiceError),
}

impl From<ServiceError> for ApiError {
  fn from(e: ServiceError) -> Self {
    ApiError::Service(e)
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match self {
      ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
      ApiError::Service(e) => match e {
        ServiceError::MailboxNotFound | ServiceError::MessageNotFound => {
          (StatusCode::NOT_FOUND, e.to_string())
        }
        ServiceError::MailboxExpired => (StatusCode::GONE, e.to_string()),
        ServiceError::InvalidTtl { .. } => (StatusCode::BAD_REQUEST, e.to_string()),
        other => {
          error!("request failed: {other}");
          (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
          )
        }
      },
    };
    (status, Json(ErrorResponse { error: message })).into_response()
  }
}
