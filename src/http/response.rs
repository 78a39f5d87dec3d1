//! Response envelope and handler errors.
//!
//! Every JSON response carries `success`; failures add a `message`. Handler
//! errors use the same shape as admission rejections.

use axum::body::Bytes;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::auth::{PasswordError, RegisterError, TokenError};
use crate::security::sanitize::{parse_pairs, BodyKind};
use crate::store::StoreError;

/// Failure inside a route handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Service temporarily unavailable")]
    Store(#[from] StoreError),
    #[error("Internal server error")]
    Internal(String),
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HandlerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            HandlerError::Conflict(_) => StatusCode::CONFLICT,
            HandlerError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TokenError> for HandlerError {
    fn from(err: TokenError) -> Self {
        HandlerError::Internal(err.to_string())
    }
}

impl From<PasswordError> for HandlerError {
    fn from(err: PasswordError) -> Self {
        HandlerError::Internal(err.to_string())
    }
}

impl From<RegisterError> for HandlerError {
    fn from(err: RegisterError) -> Self {
        match err {
            RegisterError::EmailTaken => HandlerError::Conflict("User already registered".to_string()),
            RegisterError::Store(err) => HandlerError::Store(err),
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match &self {
            HandlerError::Store(e) => tracing::error!(error = %e, "Store failure in handler"),
            HandlerError::Internal(reason) => tracing::error!(reason, "Handler failed"),
            _ => {}
        }
        failure(self.status(), &self.to_string())
    }
}

/// `{"success": false, "message": ...}`
pub fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"success": false, "message": message}))).into_response()
}

/// `{"success": true, ...fields}`
pub fn success(status: StatusCode, fields: Value) -> Response {
    let mut body = Map::new();
    body.insert("success".to_string(), Value::Bool(true));
    if let Value::Object(fields) = fields {
        body.extend(fields);
    }
    (status, Json(Value::Object(body))).into_response()
}

/// Fallback for unknown routes.
pub async fn not_found() -> Response {
    failure(StatusCode::NOT_FOUND, "Page does not exist")
}

/// Decode a JSON or form body into `T`.
pub fn parse_body<T: DeserializeOwned>(headers: &HeaderMap, body: &Bytes) -> Result<T, HandlerError> {
    let kind = BodyKind::from_content_type(
        headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
    );
    let value = match kind {
        BodyKind::Form => Value::Object(
            parse_pairs(&String::from_utf8_lossy(body))
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        ),
        _ if body.is_empty() => Value::Object(Map::new()),
        _ => serde_json::from_slice(body)
            .map_err(|e| HandlerError::BadRequest(format!("Invalid request body: {e}")))?,
    };
    serde_json::from_value(value).map_err(|e| HandlerError::BadRequest(format!("Invalid request body: {e}")))
}
