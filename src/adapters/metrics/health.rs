//! Health Check Server - Liveness and Readiness Checks
//!
//! Exposes /live and /ready endpoints via axum 0.7 for Docker
//! health checks and monitoring. Readiness depends on the active
//! source's connection being open.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::domain::events::FeedStatus;
use crate::domain::quote::Source;
use crate::usecases::supervisor::FailoverHealth;

/// Body returned by /ready.
#[derive(Debug, Serialize)]
struct ReadinessReport {
    ready: bool,
    /// At least one feed is open.
    healthy: bool,
    active: Source,
    primary: FeedStatus,
    secondary: FeedStatus,
}

impl ReadinessReport {
    fn from_health(health: &FailoverHealth) -> Self {
        Self {
            ready: health.is_ready(),
            healthy: health.is_healthy(),
            active: health.active_source(),
            primary: health.feed_status(Source::Primary),
            secondary: health.feed_status(Source::Secondary),
        }
    }
}

/// Axum-based health check HTTP server.
///
/// Serves liveness (/live) and readiness (/ready) endpoints for
/// Docker health checks and orchestrator checks.
pub struct HealthServer {
    health: FailoverHealth,
    /// Bind port (default 8080 from config).
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    pub fn new(health: FailoverHealth, port: u16) -> Self {
        Self { health, port }
    }

    /// Build the health check router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(self.health.clone())
    }

    /// Start the health check server in the background.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = self.router();

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness check: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness check: 200 only while the active source is connected.
    async fn readiness(State(health): State<FailoverHealth>) -> impl IntoResponse {
        let report = ReadinessReport::from_health(&health);
        let status = if report.ready {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status, Json(report))
    }
}
