//! Route matching logic.
//!
//! # Responsibilities
//! - Match the request method (exact)
//! - Match the path against a template with `{param}` segments
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - A trailing slash is ignored, so `/a/` matches `/a`
//! - No regex to guarantee O(n) matching

use axum::http::Method;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request line matches this condition.
    fn matches(&self, method: &Method, path: &str) -> bool;
}

/// Matches the request method.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    method: Method,
}

impl MethodMatcher {
    pub fn new(method: Method) -> Self {
        Self { method }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, method: &Method, _path: &str) -> bool {
        *method == self.method
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

/// Matches a path template such as `/api/v1/user/logoutUser/{id}`.
#[derive(Debug, Clone)]
pub struct PathPatternMatcher {
    segments: Vec<Segment>,
}

impl PathPatternMatcher {
    pub fn new(template: &str) -> Self {
        let segments = split(template)
            .map(|s| {
                if s.starts_with('{') && s.ends_with('}') {
                    Segment::Param
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        Self { segments }
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl Matcher for PathPatternMatcher {
    fn matches(&self, _method: &Method, path: &str) -> bool {
        let mut parts = split(path);
        for segment in &self.segments {
            match (segment, parts.next()) {
                (Segment::Literal(expected), Some(actual)) if expected == actual => {}
                (Segment::Param, Some(_)) => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, method: &Method, path: &str) -> bool {
        self.matchers.iter().all(|m| m.matches(method, path))
    }
}
