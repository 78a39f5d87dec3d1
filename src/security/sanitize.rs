//! Input sanitization for bodies and query strings.
//!
//! Two independent scrubs:
//! - operator injection: object keys that start with `$` or contain `.` are
//!   dropped, so client data cannot smuggle query operators or dotted paths
//!   into a document store
//! - markup injection: `<script>` blocks are removed from string values and
//!   any remaining `<` / `>` are HTML-escaped

use axum::body::Bytes;
use serde_json::{Map, Value};

const SCRIPT_OPEN: &str = "<script";
const SCRIPT_CLOSE: &str = "</script>";

#[derive(Debug, thiserror::Error)]
pub enum SanitizeError {
    #[error("malformed JSON body: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

/// Body encodings the sanitizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Form,
    Other,
}

impl BodyKind {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return BodyKind::Other;
        };
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if mime == "application/json" || mime.ends_with("+json") {
            BodyKind::Json
        } else if mime == "application/x-www-form-urlencoded" {
            BodyKind::Form
        } else {
            BodyKind::Other
        }
    }
}

/// Whether a key could be read as a query operator or a dotted path.
pub fn is_forbidden_key(key: &str) -> bool {
    key.starts_with('$') || key.contains('.')
}

/// Remove `<script>` blocks and escape angle brackets.
pub fn clean_text(input: &str) -> String {
    let stripped = strip_scripts(input);
    let mut out = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

fn strip_scripts(input: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `input`.
    let lower = input.to_ascii_lowercase();
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;

    while let Some(start) = lower[cursor..].find(SCRIPT_OPEN).map(|i| cursor + i) {
        out.push_str(&input[cursor..start]);
        match lower[start..].find(SCRIPT_CLOSE) {
            Some(end) => cursor = start + end + SCRIPT_CLOSE.len(),
            // Unterminated block: drop the rest.
            None => return out,
        }
    }
    out.push_str(&input[cursor..]);
    out
}

/// Scrub a JSON value in place. Returns whether anything changed.
pub fn sanitize_value(value: &mut Value) -> bool {
    match value {
        Value::Object(map) => sanitize_object(map),
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |changed, item| sanitize_value(item) || changed),
        Value::String(text) => {
            let cleaned = clean_text(text);
            let changed = cleaned != *text;
            *text = cleaned;
            changed
        }
        _ => false,
    }
}

fn sanitize_object(map: &mut Map<String, Value>) -> bool {
    let before = map.len();
    map.retain(|key, _| !is_forbidden_key(key));
    let mut changed = map.len() != before;
    for value in map.values_mut() {
        changed |= sanitize_value(value);
    }
    changed
}

/// Scrub decoded `key=value` pairs from a query string or form body.
pub fn sanitize_pairs(pairs: Vec<(String, String)>) -> (Vec<(String, String)>, bool) {
    let before = pairs.len();
    let mut changed = false;
    let pairs: Vec<_> = pairs
        .into_iter()
        .filter(|(key, _)| !is_forbidden_key(key))
        .map(|(key, value)| {
            let cleaned = clean_text(&value);
            changed |= cleaned != value;
            (key, cleaned)
        })
        .collect();
    let changed = changed || pairs.len() != before;
    (pairs, changed)
}

pub fn parse_pairs(encoded: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(encoded.as_bytes())
        .into_owned()
        .collect()
}

pub fn encode_pairs(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Scrub a buffered body. Returns `None` when the body is left as is.
pub fn sanitize_body(kind: BodyKind, body: &Bytes) -> Result<Option<Bytes>, SanitizeError> {
    if body.is_empty() {
        return Ok(None);
    }
    match kind {
        BodyKind::Json => {
            let mut value: Value = serde_json::from_slice(body)?;
            if sanitize_value(&mut value) {
                Ok(Some(Bytes::from(serde_json::to_vec(&value)?)))
            } else {
                Ok(None)
            }
        }
        BodyKind::Form => {
            let (pairs, changed) = sanitize_pairs(parse_pairs(&String::from_utf8_lossy(body)));
            Ok(changed.then(|| Bytes::from(encode_pairs(&pairs))))
        }
        BodyKind::Other => Ok(None),
    }
}
