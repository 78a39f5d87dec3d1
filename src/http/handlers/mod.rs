//! Route handlers behind the admission pipeline.

pub mod accounts;
pub mod captcha;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::http::server::AppState;

/// Worker hello, useful to see which process served a request.
pub async fn hello(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": format!("Hello World from {}", std::process::id()),
        "worker": state.worker_id,
    }))
}
