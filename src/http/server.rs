//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID, timeout, CORS, security
//!   headers, admission pipeline, compression)
//! - Start the overload sampler and store sweeper
//! - Serve until shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderValue, Method, Request};
use axum::middleware;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::compression::predicate::{DefaultPredicate, Predicate, SizeAbove};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tower_http::CompressionLevel;

use crate::auth::{IdentityStore, PasswordError, PasswordPolicy, RoleTable, RoleVerifier, StoredIdentities};
use crate::config::GatewayConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::http::response::not_found;
use crate::http::routes::{self, Route};
use crate::lifecycle::Shutdown;
use crate::pipeline::{admission_middleware, Pipeline, PipelineParts};
use crate::routing::{RouteSpec, RouteTable};
use crate::security::headers::with_security_headers;
use crate::security::rate_limit::override_table;
use crate::security::{LockoutTracker, OverloadMonitor, RateLimiter};
use crate::session::{SessionError, SessionManager};
use crate::store::SharedStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub roles: Arc<RoleTable>,
    pub identities: Arc<dyn IdentityStore>,
    pub sessions: Arc<SessionManager>,
    pub passwords: PasswordPolicy,
    pub secure_cookies: bool,
    pub worker_id: usize,
}

/// Startup failures that keep a worker from serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// HTTP server for one worker.
pub struct HttpServer {
    router: Router,
    config: Arc<GatewayConfig>,
    store: Arc<dyn SharedStore>,
    overload: OverloadMonitor,
    pipeline: Pipeline,
    worker_id: usize,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn SharedStore>,
        worker_id: usize,
    ) -> Result<Self, ServerError> {
        let config = Arc::new(config);
        let deadline = Duration::from_millis(config.store.timeout_ms);

        let roles = Arc::new(RoleTable::from_config(&config.auth));
        let identities: Arc<dyn IdentityStore> =
            Arc::new(StoredIdentities::new(store.clone(), deadline));
        let sessions = Arc::new(SessionManager::new(
            &config.session,
            &config.cookies,
            store.clone(),
            deadline,
        )?);
        let passwords = PasswordPolicy::from_config(&config.auth.password)?;
        let overload = OverloadMonitor::new(&config.overload);

        let declared = routes::declare();
        let specs: Vec<RouteSpec> = declared.iter().map(|r| r.spec.clone()).collect();
        let route_table = Arc::new(RouteTable::new(&specs, &override_table(&config.rate_limit)));

        let pipeline = Pipeline::new(
            &config,
            PipelineParts {
                overload: overload.clone(),
                limiter: RateLimiter::new(&config.rate_limit, store.clone(), deadline),
                lockout: LockoutTracker::new(&config.lockout, store.clone(), deadline),
                verifier: RoleVerifier::new(roles.clone(), identities.clone(), deadline),
                sessions: sessions.clone(),
                routes: route_table,
            },
        );

        let state = AppState {
            config: config.clone(),
            roles,
            identities,
            sessions,
            passwords,
            secure_cookies: config.cookies.secure,
            worker_id,
        };

        let router = Self::build_router(&config, state, pipeline.clone(), declared);
        Ok(Self {
            router,
            config,
            store,
            overload,
            pipeline,
            worker_id,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers run outside-in in the reverse order they are added: the request
    /// id is assigned first and compression sits closest to the handlers.
    #[allow(deprecated)]
    fn build_router(
        config: &GatewayConfig,
        state: AppState,
        pipeline: Pipeline,
        declared: Vec<Route>,
    ) -> Router {
        let mut router = declared
            .into_iter()
            .fold(Router::new(), |router, route| {
                router.route(&route.spec.path, route.handler)
            })
            .fallback(not_found)
            .with_state(state);

        if config.compression.enabled {
            let predicate =
                DefaultPredicate::new().and(SizeAbove::new(config.compression.min_size_bytes));
            router = router.layer(
                CompressionLayer::new()
                    .quality(CompressionLevel::Precise(config.compression.level))
                    .compress_when(predicate),
            );
        }

        let router = router.layer(middleware::from_fn_with_state(pipeline, admission_middleware));

        with_security_headers(router)
            .layer(cors_layer(config))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.listener.request_timeout_secs,
            )))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = request.headers().request_id(),
                )
            }))
            .layer(set_request_id_layer())
    }

    /// The fully layered router, for serving or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn overload(&self) -> &OverloadMonitor {
        &self.overload
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            worker_id = self.worker_id,
            store = self.store.backend(),
            "HTTP server starting"
        );

        let sampler = self.overload.spawn(shutdown.subscribe());
        let sweeper = spawn_sweeper(
            self.store.clone(),
            Duration::from_secs(self.config.store.sweep_interval_secs),
            shutdown.subscribe(),
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Draining connections");
            })
            .await?;

        for task in [sampler, Some(sweeper)].into_iter().flatten() {
            let _ = task.await;
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Periodically drop expired entries from stores without native expiry.
fn spawn_sweeper(
    store: Arc<dyn SharedStore>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => match store.sweep().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Swept expired store entries"),
                    Err(e) => tracing::warn!(error = %e, "Store sweep failed"),
                },
                _ = shutdown.recv() => break,
            }
        }
    })
}
