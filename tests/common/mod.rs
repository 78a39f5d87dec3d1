//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use storefront_gate::auth::Role;
use storefront_gate::store::{Counter, MemoryStore, SharedStore, StoreError};
use storefront_gate::{GatewayConfig, HttpServer};

pub const CLIENT: [u8; 4] = [127, 0, 0, 1];

/// Defaults plus the secrets a real deployment injects from the environment.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    for role in Role::ALL {
        config.auth.for_role_mut(role).secret = format!("{}-test-secret", role.as_str());
    }
    config.session.secret = "session-test-secret".to_string();
    config.cookies.secure = false;
    // Argon2id at the smallest valid cost keeps timing-sensitive tests stable.
    config.auth.password.memory_kib = 64;
    config.auth.password.iterations = 1;
    config.auth.password.parallelism = 1;
    config
}

pub fn server(config: GatewayConfig) -> HttpServer {
    server_with_store(config, Arc::new(MemoryStore::new()))
}

pub fn server_with_store(config: GatewayConfig, store: Arc<dyn SharedStore>) -> HttpServer {
    HttpServer::new(config, store, 0).unwrap()
}

/// Memory store that yields before every call, so concurrent requests
/// interleave at each store round trip the way they would against a
/// networked backend. Keys under a failing prefix return a backend error;
/// keys under a stalled prefix never answer.
#[derive(Default)]
pub struct TestStore {
    inner: MemoryStore,
    failing: Mutex<Vec<String>>,
    stalled: Mutex<Vec<String>>,
}

impl TestStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, prefix: &str) {
        self.failing.lock().unwrap().push(prefix.to_string());
    }

    pub fn stall(&self, prefix: &str) {
        self.stalled.lock().unwrap().push(prefix.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
        self.stalled.lock().unwrap().clear();
    }

    async fn enter(&self, key: &str) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let matches = |prefixes: &Mutex<Vec<String>>| {
            prefixes.lock().unwrap().iter().any(|p| key.starts_with(p.as_str()))
        };
        if matches(&self.stalled) {
            std::future::pending::<()>().await;
        }
        if matches(&self.failing) {
            return Err(StoreError::Backend(format!("{key} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl SharedStore for TestStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<Counter, StoreError> {
        self.enter(key).await?;
        self.inner.increment(key, window).await
    }

    async fn release(&self, key: &str) -> Result<(), StoreError> {
        self.enter(key).await?;
        self.inner.release(key).await
    }

    async fn counter(&self, key: &str) -> Result<u64, StoreError> {
        self.enter(key).await?;
        self.inner.counter(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.enter(key).await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.enter(key).await?;
        self.inner.set(key, value, ttl).await
    }

    async fn insert_new(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        self.enter(key).await?;
        self.inner.insert_new(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.enter(key).await?;
        self.inner.delete(key).await
    }

    fn backend(&self) -> &'static str {
        "test"
    }
}

/// Request builder with the peer address axum would attach for a real socket.
pub struct TestRequest {
    builder: axum::http::request::Builder,
    client: [u8; 4],
    body: Body,
}

impl TestRequest {
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            builder: Request::builder().method(method).uri(uri),
            client: CLIENT,
            body: Body::empty(),
        }
    }

    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    pub fn from_client(mut self, client: [u8; 4]) -> Self {
        self.client = client;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Send `name=value` pairs in a `Cookie` header.
    pub fn cookies(self, cookies: &[String]) -> Self {
        if cookies.is_empty() {
            return self;
        }
        let joined = cookies.join("; ");
        self.header(header::COOKIE.as_str(), &joined)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.builder = self.builder.header(header::CONTENT_TYPE, "application/json");
        self.body = Body::from(body.to_string());
        self
    }

    pub fn raw(mut self, content_type: &str, body: impl Into<Body>) -> Self {
        self.builder = self.builder.header(header::CONTENT_TYPE, content_type);
        self.body = body.into();
        self
    }

    pub fn build(self) -> Request<Body> {
        let mut request = self.builder.body(self.body).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((self.client, 40_000))));
        request
    }

    pub async fn send(self, router: &Router) -> Response<Body> {
        router.clone().oneshot(self.build()).await.unwrap()
    }
}

/// `name=value` of every cookie the response sets.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(|pair| pair.trim().to_string())
        .collect()
}

pub fn cookie(response: &Response<Body>, name: &str) -> Option<String> {
    set_cookies(response)
        .into_iter()
        .find(|pair| pair.split_once('=').is_some_and(|(n, _)| n == name))
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn account_path(role: Role, action: &str) -> String {
    let name = role.as_str();
    let route = match action {
        "register" => format!("register{name}"),
        "login" => format!("login{name}"),
        "logout" => format!("logout{name}"),
        "profile" => format!("get{name}Profile"),
        other => panic!("unknown account action {other}"),
    };
    format!("/api/v1/{}/{route}", role.route_slug())
}

/// Register an account from a separate client so its request does not
/// count against [`CLIENT`]'s budgets. Returns the credential cookie.
pub async fn register(router: &Router, role: Role, email: &str, password: &str) -> String {
    let response = TestRequest::post(&account_path(role, "register"))
        .from_client([10, 9, 9, 9])
        .json(serde_json::json!({"name": "Test Account", "email": email, "password": password}))
        .send(router)
        .await;
    assert_eq!(response.status(), 201);
    cookie(&response, role.cookie_name()).unwrap()
}
