//! `HubServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use pomosync_core::SessionId;
use pomosync_core::protocol::SESSION_NOT_FOUND;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::identity::{IdentityLookup, NoIdentity};
use crate::registry::{SessionOptions, SessionRegistry};
use crate::session::SessionSummary;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::ConnectionLimiter;
use crate::websocket::handler::{create_handler, join_handler};

/// Default bound on a display-name lookup.
const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live sessions.
    pub registry: Arc<SessionRegistry>,
    /// Display-name resolver.
    pub identity: Arc<dyn IdentityLookup>,
    /// Bound on one display-name lookup.
    pub identity_timeout: Duration,
    /// Connection ceiling.
    pub limiter: Arc<ConnectionLimiter>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
}

/// The session hub server.
pub struct HubServer {
    state: AppState,
}

impl HubServer {
    /// Create a server with the given identity backend and metrics handle.
    pub fn new(
        config: ServerConfig,
        identity: Arc<dyn IdentityLookup>,
        metrics: PrometheusHandle,
    ) -> Self {
        let registry = SessionRegistry::new(SessionOptions {
            queue_capacity: config.session_queue_capacity,
        });
        let state = AppState {
            registry: Arc::new(registry),
            identity,
            identity_timeout: DEFAULT_IDENTITY_TIMEOUT,
            limiter: ConnectionLimiter::new(config.max_connections),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            config: Arc::new(config),
            start_time: Instant::now(),
            metrics,
        };
        Self { state }
    }

    /// Anonymous server with a detached metrics recorder.
    pub fn with_defaults(config: ServerConfig) -> Self {
        Self::new(config, Arc::new(NoIdentity), crate::metrics::detached_handle())
    }

    /// Override the display-name lookup timeout.
    #[must_use]
    pub fn with_identity_timeout(mut self, timeout: Duration) -> Self {
        self.state.identity_timeout = timeout;
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Bind and serve in the background until shutdown is requested.
    ///
    /// Returns the bound address and the serving task. When the task
    /// finishes every session has been stopped.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.state.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "pomosync hub listening");

        let router = self.router();
        let token = self.state.shutdown.token();
        let registry = Arc::clone(&self.state.registry);
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(err) = served {
                error!(error = %err, "server stopped with error");
            }
            registry.shutdown_all().await;
            info!("server stopped");
        });
        Ok((addr, handle))
    }

    /// Session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.state.registry
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// Assemble routes and middleware over `state`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/create", get(create_handler))
        .route("/ws/join", get(join_handler))
        .route("/getSessions", get(list_sessions_handler))
        .route("/sessions/{id}/users", get(session_users_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /getSessions
async fn list_sessions_handler(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.registry.list_public().await)
}

/// GET /sessions/{id}/users
async fn session_users_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.registry.users(&SessionId::from_raw(id)).await {
        Ok(users) => Json(users).into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": SESSION_NOT_FOUND })),
        )
            .into_response(),
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let sessions = state.registry.len().await;
    Json(health::health_check(
        state.start_time,
        state.limiter.active(),
        sessions,
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}
