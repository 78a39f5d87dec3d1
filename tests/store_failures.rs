//! Admission when the shared store misbehaves: every stage that needs it
//! fails closed, and counters stay exact when calls interleave.

mod common;

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use serde_json::json;

use common::{
    account_path, body_json, register, server_with_store, test_config, TestRequest, TestStore,
};
use storefront_gate::auth::Role;

async fn assert_unavailable(response: axum::http::Response<axum::body::Body>) {
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Service temporarily unavailable");
}

#[tokio::test]
async fn test_rate_limit_store_failure_rejects() {
    let store = TestStore::new();
    let router = server_with_store(test_config(), store.clone()).router();
    store.fail("rl:");

    assert_unavailable(TestRequest::get("/").send(&router).await).await;

    store.heal();
    assert_eq!(TestRequest::get("/").send(&router).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_override_tier_failure_rejects_login() {
    let store = TestStore::new();
    let router = server_with_store(test_config(), store.clone()).router();
    store.fail("rl:POST:");

    let response = TestRequest::post(&account_path(Role::User, "login"))
        .json(json!({"email": "a@example.com", "password": "pw"}))
        .send(&router)
        .await;
    assert_unavailable(response).await;
}

#[tokio::test]
async fn test_session_store_failure_rejects() {
    let store = TestStore::new();
    let router = server_with_store(test_config(), store.clone()).router();
    store.fail("sess:");

    let response = TestRequest::get("/").send(&router).await;
    assert!(common::cookie(&response, "sid").is_none());
    assert_unavailable(response).await;
}

#[tokio::test]
async fn test_lockout_store_failure_keeps_handler_out() {
    let mut config = test_config();
    config.rate_limit.overrides.clear();
    let store = TestStore::new();
    let router = server_with_store(config, store.clone()).router();
    let credential = register(&router, Role::User, "shopper@example.com", "pw").await;
    store.fail("lockout:");

    let response = TestRequest::post(&account_path(Role::User, "login"))
        .json(json!({"email": "shopper@example.com", "password": "pw"}))
        .send(&router)
        .await;
    assert!(common::cookie(&response, Role::User.cookie_name()).is_none());
    assert_unavailable(response).await;

    // Routes without lockout are unaffected.
    let profile = TestRequest::get(&account_path(Role::User, "profile"))
        .cookies(&[credential])
        .send(&router)
        .await;
    assert_eq!(profile.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_identity_store_failure_rejects_gated_route() {
    let store = TestStore::new();
    let router = server_with_store(test_config(), store.clone()).router();
    let credential = register(&router, Role::Doctor, "doc@example.com", "pw").await;
    store.fail("identity:");

    let response = TestRequest::get(&account_path(Role::Doctor, "profile"))
        .cookies(&[credential])
        .send(&router)
        .await;
    assert_unavailable(response).await;
}

#[tokio::test]
async fn test_stalled_store_times_out_closed() {
    let mut config = test_config();
    config.store.timeout_ms = 50;
    let store = TestStore::new();
    let router = server_with_store(config, store.clone()).router();
    store.stall("rl:");

    let started = Instant::now();
    let response = TestRequest::get("/").send(&router).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_unavailable(response).await;
}

#[tokio::test]
async fn test_stalled_identity_lookup_fails_login() {
    let mut config = test_config();
    config.store.timeout_ms = 50;
    config.rate_limit.overrides.clear();
    let store = TestStore::new();
    let router = server_with_store(config, store.clone()).router();
    register(&router, Role::User, "slow@example.com", "pw").await;
    store.stall("identity-email:");

    let response = TestRequest::post(&account_path(Role::User, "login"))
        .json(json!({"email": "slow@example.com", "password": "pw"}))
        .send(&router)
        .await;
    assert_unavailable(response).await;
}

#[tokio::test]
async fn test_failed_registration_can_be_retried() {
    let store = TestStore::new();
    let router = server_with_store(test_config(), store.clone()).router();
    store.fail("identity:");

    let attempt = || {
        TestRequest::post(&account_path(Role::Instructor, "register"))
            .json(json!({"name": "Teach", "email": "teach@example.com", "password": "pw"}))
    };
    assert_unavailable(attempt().send(&router).await).await;

    store.heal();
    assert_eq!(attempt().send(&router).await.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_concurrent_failures_cannot_exceed_lockout() {
    let mut config = test_config();
    config.rate_limit.overrides.clear();
    let max_failures = config.lockout.max_failures as usize;
    let store = TestStore::new();
    let router = server_with_store(config, store.clone()).router();
    register(&router, Role::User, "target@example.com", "correct").await;

    let attempts = (0..40).map(|_| {
        TestRequest::post(&account_path(Role::User, "login"))
            .json(json!({"email": "target@example.com", "password": "wrong"}))
            .send(&router)
    });
    let statuses: Vec<StatusCode> = futures_util::future::join_all(attempts)
        .await
        .into_iter()
        .map(|response| response.status())
        .collect();

    let failed = statuses.iter().filter(|s| **s == StatusCode::UNAUTHORIZED).count();
    let locked = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();
    assert_eq!(failed, max_failures);
    assert_eq!(locked, 40 - max_failures);

    let correct = TestRequest::post(&account_path(Role::User, "login"))
        .json(json!({"email": "target@example.com", "password": "correct"}))
        .send(&router)
        .await;
    assert_eq!(correct.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_budget_across_yields() {
    let mut config = test_config();
    config.rate_limit.max_requests = 3;
    let store = TestStore::new();
    let router = server_with_store(config, store.clone()).router();

    let requests = (0..20).map(|_| TestRequest::get("/").send(&router));
    let statuses: Vec<StatusCode> = futures_util::future::join_all(requests)
        .await
        .into_iter()
        .map(|response| response.status())
        .collect();

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 3);
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
            .count(),
        17
    );
}
