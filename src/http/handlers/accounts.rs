//! Account routes for each role channel.
//!
//! Registration and login issue the role's credential cookie. Their status
//! codes drive lockout: a 401 here counts as a failed credential check.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{Identity, IdentityRecord, Role};
use crate::http::cookies::SetCookie;
use crate::http::response::{parse_body, success, HandlerError};
use crate::http::server::AppState;
use crate::session::SessionHandle;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

fn credential_cookie(state: &AppState, role: Role, identity: &Identity) -> Result<HeaderMap, HandlerError> {
    let channel = state.roles.channel(role);
    let token = state.roles.issue(role, &identity.id)?;
    let mut headers = HeaderMap::new();
    SetCookie::new(channel.cookie_name, token)
        .max_age(channel.expires_in())
        .secure(state.secure_cookies)
        .append_to(&mut headers);
    Ok(headers)
}

pub async fn register(
    State(state): State<AppState>,
    role: Role,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HandlerError> {
    let request: RegisterRequest = parse_body(&headers, &body)?;
    if request.name.trim().is_empty() || request.email.trim().is_empty() || request.password.is_empty() {
        return Err(HandlerError::BadRequest("Please fill full form".to_string()));
    }

    let identity = Identity {
        id: Uuid::new_v4().to_string(),
        role,
        name: request.name.trim().to_string(),
        email: request.email.trim().to_lowercase(),
    };
    let password_hash = state.passwords.hash_blocking(request.password).await?;
    let identity = state
        .identities
        .register(IdentityRecord::new(identity, password_hash))
        .await?;

    let cookies = credential_cookie(&state, role, &identity)?;
    tracing::info!(subject = %identity.id, %role, "Account registered");
    Ok((
        cookies,
        success(
            StatusCode::CREATED,
            json!({"message": format!("{role} registered successfully"), "user": identity}),
        ),
    )
        .into_response())
}

pub async fn login(
    State(state): State<AppState>,
    role: Role,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HandlerError> {
    let request: LoginRequest = parse_body(&headers, &body)?;
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(HandlerError::BadRequest("Please provide email and password".to_string()));
    }

    let invalid = || HandlerError::Unauthorized("Invalid email or password".to_string());
    let record = state
        .identities
        .find_by_email(&request.email)
        .await?
        .ok_or_else(invalid)?;
    let matches = state
        .passwords
        .verify_blocking(request.password, record.password_hash().to_string())
        .await?;
    if !matches {
        return Err(invalid());
    }
    if record.identity.role != role {
        tracing::warn!(subject = %record.identity.id, held = %record.identity.role, %role, "Login on wrong role channel");
        return Err(HandlerError::Unauthorized(format!("{role} with this email not found")));
    }

    let identity = record.identity;
    let cookies = credential_cookie(&state, role, &identity)?;
    tracing::info!(subject = %identity.id, %role, "Logged in");
    Ok((
        cookies,
        success(
            StatusCode::OK,
            json!({"message": format!("{role} logged in successfully"), "user": identity}),
        ),
    )
        .into_response())
}

pub async fn logout(
    State(state): State<AppState>,
    role: Role,
    Extension(identity): Extension<Identity>,
    Extension(session): Extension<SessionHandle>,
) -> Result<Response, HandlerError> {
    state.sessions.destroy(&session.id).await?;

    let mut headers = HeaderMap::new();
    SetCookie::expired(state.roles.channel(role).cookie_name)
        .secure(state.secure_cookies)
        .append_to(&mut headers);
    state.sessions.clear_cookie().append_to(&mut headers);

    tracing::info!(subject = %identity.id, %role, "Logged out");
    Ok((
        headers,
        success(
            StatusCode::OK,
            json!({"message": format!("{role} logged out successfully")}),
        ),
    )
        .into_response())
}

pub async fn profile(Extension(identity): Extension<Identity>) -> Response {
    success(StatusCode::OK, json!({"user": identity}))
}
