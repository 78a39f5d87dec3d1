//! Admission pipeline driven through the full router.

mod common;

use std::time::Duration;

use axum::http::{header, StatusCode};
use serde_json::json;

use common::{
    account_path, body_bytes, body_json, cookie, register, server, set_cookies, test_config,
    TestRequest,
};
use storefront_gate::auth::{Role, RoleTable};

#[tokio::test]
async fn test_hello_sets_headers_and_session_cookie() {
    let gate = server(test_config());
    let router = gate.router();

    let response = TestRequest::get("/").send(&router).await;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["referrer-policy"], "no-referrer");
    assert!(headers["strict-transport-security"]
        .to_str()
        .unwrap()
        .starts_with("max-age=15552000"));
    assert!(cookie(&response, "sid").is_some());

    let body = body_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Hello World from"));
}

#[tokio::test]
async fn test_session_cookie_is_issued_once() {
    let router = server(test_config()).router();

    let first = TestRequest::get("/").send(&router).await;
    let sid = cookie(&first, "sid").unwrap();

    let second = TestRequest::get("/").cookies(&[sid]).send(&router).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert!(cookie(&second, "sid").is_none());
}

#[tokio::test]
async fn test_forged_session_cookie_is_replaced() {
    let router = server(test_config()).router();

    let forged = format!("sid={}.deadbeef", uuid::Uuid::new_v4());
    let response = TestRequest::get("/").cookies(&[forged.clone()]).send(&router).await;
    let issued = cookie(&response, "sid").unwrap();
    assert_ne!(issued, forged);
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let router = server(test_config()).router();
    let response = TestRequest::get("/nowhere").send(&router).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Page does not exist");
}

#[tokio::test]
async fn test_overloaded_worker_sheds_before_counting() {
    let gate = server(test_config());
    let router = gate.router();
    assert!(gate.overload().observe(Duration::from_secs(1)));

    let response = TestRequest::get("/").send(&router).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(cookie(&response, "sid").is_none());
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Server too busy");

    let used = gate.pipeline().limiter().default_usage("127.0.0.1").await.unwrap();
    assert_eq!(used, 0);
}

#[tokio::test]
async fn test_login_override_then_default_budget() {
    let mut config = test_config();
    config.rate_limit.overrides[0].window_ms = 2_000;
    let gate = server(config);
    let router = gate.router();
    register(&router, Role::User, "burst@example.com", "hunter22").await;

    let login = || {
        TestRequest::post(&account_path(Role::User, "login"))
            .json(json!({"email": "burst@example.com", "password": "hunter22"}))
    };

    for attempt in 1..=5 {
        let response = login().send(&router).await;
        assert_eq!(response.status(), StatusCode::OK, "attempt {attempt}");
    }

    let denied = login().send(&router).await;
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(denied.headers().contains_key(header::RETRY_AFTER));
    let body = body_json(denied).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("We have received too many requests from this Address."));

    let used = gate.pipeline().limiter().default_usage("127.0.0.1").await.unwrap();
    assert_eq!(used, 5);

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert_eq!(login().send(&router).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_default_budget_applies_to_every_route() {
    let mut config = test_config();
    config.rate_limit.max_requests = 2;
    let router = server(config).router();

    assert_eq!(TestRequest::get("/").send(&router).await.status(), StatusCode::OK);
    assert_eq!(
        TestRequest::get("/nowhere").send(&router).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        TestRequest::get("/").send(&router).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(
        TestRequest::get("/")
            .from_client([10, 0, 0, 2])
            .send(&router)
            .await
            .status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_lockout_after_repeated_failures() {
    let mut config = test_config();
    config.rate_limit.overrides.clear();
    let gate = server(config);
    let router = gate.router();
    register(&router, Role::User, "victim@example.com", "correct-horse").await;

    let attempt = |password: &str| {
        TestRequest::post(&account_path(Role::User, "login"))
            .json(json!({"email": "victim@example.com", "password": password}))
    };

    for _ in 0..5 {
        let response = attempt("wrong").send(&router).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    assert!(gate.pipeline().lockout().is_locked("127.0.0.1").await.unwrap());

    let locked = attempt("correct-horse").send(&router).await;
    assert_eq!(locked.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(locked).await;
    assert_eq!(body["message"], "Too many failed attempts. Please try again later.");

    let elsewhere = attempt("correct-horse")
        .from_client([10, 0, 0, 3])
        .send(&router)
        .await;
    assert_eq!(elsewhere.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_successful_login_clears_failures() {
    let mut config = test_config();
    config.rate_limit.overrides.clear();
    let router = server(config).router();
    register(&router, Role::User, "forgetful@example.com", "right").await;

    let attempt = |password: &str| {
        TestRequest::post(&account_path(Role::User, "login"))
            .json(json!({"email": "forgetful@example.com", "password": password}))
    };

    for _ in 0..4 {
        assert_eq!(attempt("wrong").send(&router).await.status(), StatusCode::UNAUTHORIZED);
    }
    assert_eq!(attempt("right").send(&router).await.status(), StatusCode::OK);
    for _ in 0..4 {
        assert_eq!(attempt("wrong").send(&router).await.status(), StatusCode::UNAUTHORIZED);
    }
    assert_eq!(attempt("right").send(&router).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rejected_submissions_do_not_count_as_failures() {
    let mut config = test_config();
    config.rate_limit.overrides.clear();
    let gate = server(config);
    let router = gate.router();
    register(&router, Role::User, "careful@example.com", "right").await;

    for _ in 0..10 {
        let incomplete = TestRequest::post(&account_path(Role::User, "login"))
            .json(json!({"email": "careful@example.com"}))
            .send(&router)
            .await;
        assert_eq!(incomplete.status(), StatusCode::BAD_REQUEST);
    }
    assert!(!gate.pipeline().lockout().is_locked("127.0.0.1").await.unwrap());

    let login = TestRequest::post(&account_path(Role::User, "login"))
        .json(json!({"email": "careful@example.com", "password": "right"}))
        .send(&router)
        .await;
    assert_eq!(login.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_account_flow() {
    let router = server(test_config()).router();
    let credential = register(&router, Role::Doctor, "doc@example.com", "stethoscope").await;

    let anonymous = TestRequest::get(&account_path(Role::Doctor, "profile"))
        .send(&router)
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let profile = TestRequest::get(&account_path(Role::Doctor, "profile"))
        .cookies(&[credential.clone()])
        .send(&router)
        .await;
    assert_eq!(profile.status(), StatusCode::OK);
    let body = body_json(profile).await;
    assert_eq!(body["user"]["email"], "doc@example.com");
    assert_eq!(body["user"]["role"], "Doctor");

    let logout = TestRequest::get(&account_path(Role::Doctor, "logout"))
        .cookies(&[credential])
        .send(&router)
        .await;
    assert_eq!(logout.status(), StatusCode::OK);
    let cleared = set_cookies(&logout);
    assert!(cleared.contains(&"tokend=".to_string()));
    assert!(cleared.contains(&"sid=".to_string()));
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let router = server(test_config()).router();
    register(&router, Role::Admin, "root@example.com", "pw").await;

    let again = TestRequest::post(&account_path(Role::Admin, "register"))
        .json(json!({"name": "Again", "email": "root@example.com", "password": "pw"}))
        .send(&router)
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_incomplete_registration_rejected() {
    let router = server(test_config()).router();
    let response = TestRequest::post(&account_path(Role::User, "register"))
        .json(json!({"email": "half@example.com"}))
        .send(&router)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Please fill full form");
}

#[tokio::test]
async fn test_role_channels_are_separate() {
    let config = test_config();
    let roles = RoleTable::from_config(&config.auth);
    let router = server(config).router();
    let user_cookie = register(&router, Role::User, "plain@example.com", "pw").await;

    // A user credential presented where the admin credential is expected.
    let (_, token) = user_cookie.split_once('=').unwrap();
    let wrong_slot = TestRequest::get(&account_path(Role::Admin, "profile"))
        .cookies(&[format!("tokena={token}")])
        .send(&router)
        .await;
    assert_eq!(wrong_slot.status(), StatusCode::UNAUTHORIZED);

    // An admin-signed credential whose subject is a user.
    let profile = TestRequest::get(&account_path(Role::User, "profile"))
        .cookies(&[user_cookie])
        .send(&router)
        .await;
    let user_id = body_json(profile).await["user"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let forged = roles.issue(Role::Admin, &user_id).unwrap();
    let denied = TestRequest::get(&account_path(Role::Admin, "profile"))
        .cookies(&[format!("tokena={forged}")])
        .send(&router)
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let router = server(test_config()).router();
    let padding = "x".repeat(6 * 1024);
    let response = TestRequest::post(&account_path(Role::User, "register"))
        .json(json!({"name": padding, "email": "big@example.com", "password": "pw"}))
        .send(&router)
        .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let router = server(test_config()).router();
    let response = TestRequest::post(&account_path(Role::User, "login"))
        .raw("application/json", "{\"email\": ")
        .send(&router)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["success"], false);
}

#[tokio::test]
async fn test_script_blocks_stripped_before_handlers() {
    let router = server(test_config()).router();
    let response = TestRequest::post(&account_path(Role::Instructor, "register"))
        .json(json!({
            "name": "<script>alert(1)</script>Ada",
            "email": "ada@example.com",
            "password": "pw",
            "$where": "1 == 1"
        }))
        .send(&router)
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["user"]["name"], "Ada");
}

#[tokio::test]
async fn test_form_bodies_are_accepted() {
    let router = server(test_config()).router();
    let response = TestRequest::post(&account_path(Role::User, "register"))
        .raw(
            "application/x-www-form-urlencoded",
            "name=Form+User&email=form%40example.com&password=pw",
        )
        .send(&router)
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["user"]["email"], "form@example.com");
}

#[tokio::test]
async fn test_captcha_round_trip() {
    let router = server(test_config()).router();

    let challenge = TestRequest::get("/captcha").send(&router).await;
    assert_eq!(challenge.status(), StatusCode::OK);
    assert_eq!(challenge.headers()[header::CONTENT_TYPE], "image/svg+xml");
    let sid = cookie(&challenge, "sid").unwrap();

    let svg = String::from_utf8(body_bytes(challenge).await).unwrap();
    let answer: String = svg
        .split("</text>")
        .filter_map(|chunk| chunk.rsplit('>').next())
        .filter_map(|glyph| glyph.chars().next())
        .collect();
    assert_eq!(answer.len(), 5);

    let verify = |answer: String| {
        TestRequest::post("/captcha/verify")
            .cookies(&[sid.clone()])
            .json(json!({"answer": answer.to_lowercase()}))
    };
    assert_eq!(verify(answer.clone()).send(&router).await.status(), StatusCode::OK);
    // One attempt per challenge.
    assert_eq!(verify(answer).send(&router).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_budget() {
    let mut config = test_config();
    config.rate_limit.max_requests = 1;
    let router = server(config).router();

    let requests = (0..12).map(|_| TestRequest::get("/").send(&router));
    let statuses: Vec<StatusCode> = futures_util::future::join_all(requests)
        .await
        .into_iter()
        .map(|response| response.status())
        .collect();

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
            .count(),
        11
    );
}
