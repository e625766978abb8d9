//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, relay status reporting, and Prometheus
//! metrics. Used by container orchestrators and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (ready while relaying)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{DirectionSnapshot, ProxyStatus};
use crate::domain::relay::SupervisorState;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Proxy version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Supervisor lifecycle state.
    pub state: SupervisorState,
    /// Bound endpoint addresses.
    pub endpoints: EndpointsStatus,
    /// Relay counters per direction.
    pub relay: RelayStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Relaying in both directions.
    Healthy,
    /// Starting up or draining.
    Degraded,
    /// Stopped.
    Unhealthy,
}

/// Bound endpoint addresses.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointsStatus {
    /// Publisher-facing address.
    pub upstream: Option<String>,
    /// Subscriber-facing address.
    pub downstream: Option<String>,
}

/// Relay counters.
#[derive(Debug, Clone, Serialize)]
pub struct RelayStatus {
    /// Publisher data.
    pub upstream_to_downstream: DirectionSnapshot,
    /// Subscription control.
    pub downstream_to_upstream: DirectionSnapshot,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    status: Arc<ProxyStatus>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub const fn new(version: String, status: Arc<ProxyStatus>) -> Self {
        Self { version, status }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError::ServerFailed` if the HTTP server fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HealthServerError> {
        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.status.state() == SupervisorState::Running {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let snapshot = state.status.snapshot();

    HealthResponse {
        status: determine_health_status(snapshot.state),
        version: state.version.clone(),
        uptime_secs: state.status.uptime_secs(),
        current_time: Utc::now(),
        state: snapshot.state,
        endpoints: EndpointsStatus {
            upstream: snapshot.upstream_address,
            downstream: snapshot.downstream_address,
        },
        relay: RelayStatus {
            upstream_to_downstream: snapshot.upstream_to_downstream,
            downstream_to_upstream: snapshot.downstream_to_upstream,
        },
    }
}

const fn determine_health_status(state: SupervisorState) -> HealthStatus {
    match state {
        SupervisorState::Running => HealthStatus::Healthy,
        SupervisorState::Starting | SupervisorState::Draining => HealthStatus::Degraded,
        SupervisorState::Stopped => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;
    use crate::domain::relay::{Direction, EndpointRole};

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_supervisor_state() {
        assert_eq!(
            determine_health_status(SupervisorState::Running),
            HealthStatus::Healthy
        );
        assert_eq!(
            determine_health_status(SupervisorState::Starting),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(SupervisorState::Draining),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(SupervisorState::Stopped),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn response_carries_counters_and_addresses() {
        let status = Arc::new(ProxyStatus::new());
        status.set_bound_address(EndpointRole::Downstream, "tcp://0.0.0.0:5558".to_string());
        status.transition(SupervisorState::Running);
        status.record_relay(Direction::UpstreamToDownstream, 3, 42);

        let state = HealthServerState::new("test".to_string(), status);
        let response = build_health_response(&state);

        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(
            response.endpoints.downstream.as_deref(),
            Some("tcp://0.0.0.0:5558")
        );
        assert_eq!(response.relay.upstream_to_downstream.frames, 3);
        assert_eq!(response.relay.downstream_to_upstream.messages, 0);
    }

    #[tokio::test]
    async fn readiness_tracks_running_state() {
        let status = Arc::new(ProxyStatus::new());
        let state = Arc::new(HealthServerState::new("test".to_string(), Arc::clone(&status)));
        let cancel = CancellationToken::new();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HealthServer::new(0, state, cancel.clone());
        let handle = tokio::spawn(server.serve(listener));

        assert!(get(addr, "/readyz").await.contains("503"));
        status.transition(SupervisorState::Running);
        assert!(get(addr, "/readyz").await.starts_with("HTTP/1.1 200"));
        assert!(get(addr, "/healthz").await.contains("200 OK"));
        assert!(get(addr, "/health").await.contains("\"state\":\"running\""));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
