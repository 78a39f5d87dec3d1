//! Cookie parsing and `Set-Cookie` formatting.

use std::borrow::Cow;
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue};

/// Cookies sent by the client, in header order.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    pairs: Vec<(String, String)>,
}

impl CookieJar {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let pairs = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().trim_matches('"').to_string()))
            })
            .collect();
        Self { pairs }
    }

    /// First non-empty value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, v)| n == name && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }
}

/// A `Set-Cookie` header value. Always `HttpOnly`, `SameSite=Strict`, `Path=/`.
#[derive(Debug, Clone)]
pub struct SetCookie<'a> {
    name: &'a str,
    value: Cow<'a, str>,
    max_age: Option<Duration>,
    secure: bool,
}

impl<'a> SetCookie<'a> {
    pub fn new(name: &'a str, value: impl Into<Cow<'a, str>>) -> Self {
        Self {
            name,
            value: value.into(),
            max_age: None,
            secure: true,
        }
    }

    /// A cookie that tells the browser to drop `name` immediately.
    pub fn expired(name: &'a str) -> Self {
        Self::new(name, "").max_age(Duration::ZERO)
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn to_header_value(&self) -> Option<HeaderValue> {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Strict",
            self.name, self.value
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        if let Some(max_age) = self.max_age {
            cookie.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        HeaderValue::from_str(&cookie).ok()
    }

    /// Append this cookie to a response's headers.
    pub fn append_to(&self, headers: &mut HeaderMap) {
        match self.to_header_value() {
            Some(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            None => tracing::error!(cookie = self.name, "Cookie value is not a valid header"),
        }
    }
}
