//! Liveness and counters.

use crate::{app::AppState, service::StatsSnapshot};
use axum::{Json, extract::State};
use serde_json::{Value, json};

pub async fn health() -> Json<Value> {
  Json(json!({ "status": "ok" }))
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
  Json(state.stats.snapshot())
}
