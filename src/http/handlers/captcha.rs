//! Session-bound captcha challenges.
//!
//! The expected answer lives in the visitor's session, so any worker can
//! check it. Each challenge allows one attempt.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;

use crate::http::response::{failure, parse_body, success, HandlerError};
use crate::http::server::AppState;
use crate::session::SessionHandle;

pub const CHALLENGE_LENGTH: usize = 5;

/// Glyphs that are hard to confuse with each other.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub answer: String,
}

pub fn new_challenge() -> String {
    let mut rng = rand::thread_rng();
    (0..CHALLENGE_LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

fn render_svg(text: &str) -> String {
    let glyphs: String = text
        .chars()
        .enumerate()
        .map(|(i, c)| format!(r#"<text x="{}" y="60" font-size="48" font-family="monospace">{c}</text>"#, 20 + i * 40))
        .collect();
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="240" height="90" viewBox="0 0 240 90">{glyphs}</svg>"#
    )
}

pub async fn challenge(
    State(state): State<AppState>,
    Extension(mut session): Extension<SessionHandle>,
) -> Result<Response, HandlerError> {
    let text = new_challenge();
    session.record.captcha = Some(text.clone());
    state.sessions.save(&session).await?;
    tracing::debug!(session = %session.id, "Captcha issued");

    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], render_svg(&text)).into_response())
}

pub async fn verify(
    State(state): State<AppState>,
    Extension(mut session): Extension<SessionHandle>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HandlerError> {
    let request: VerifyRequest = parse_body(&headers, &body)?;
    let Some(expected) = session.record.captcha.take() else {
        return Ok(failure(StatusCode::BAD_REQUEST, "No captcha challenge outstanding"));
    };
    state.sessions.save(&session).await?;

    if request.answer.trim().eq_ignore_ascii_case(&expected) {
        Ok(success(StatusCode::OK, json!({"message": "Captcha verified"})))
    } else {
        Ok(failure(StatusCode::BAD_REQUEST, "Captcha verification failed"))
    }
}
