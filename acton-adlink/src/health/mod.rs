//! Health check endpoints and handlers
//!
//! - Liveness probe: is the process running?
//! - Readiness probe: can it reach the state store and the account database?
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use acton_adlink::health::{health_check, liveness, readiness};
//! use acton_adlink::state::AppState;
//!
//! let app: Router<AppState> = Router::new()
//!     .route("/health", get(health_check))
//!     .route("/health/live", get(liveness))
//!     .route("/health/ready", get(readiness));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant, SystemTime};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Probes slower than this report the component as degraded
const SLOW_PROBE: Duration = Duration::from_secs(1);

/// Health check status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Service is healthy and ready
    Healthy,
    /// Service is degraded but operational
    Degraded,
    /// Service is unhealthy
    Unhealthy,
}

/// Individual component health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component status
    pub status: HealthStatus,
    /// Optional message with details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl ComponentHealth {
    /// Create a healthy component
    #[must_use]
    pub const fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            response_time_ms: None,
        }
    }

    /// Create a degraded component
    #[must_use]
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            response_time_ms: None,
        }
    }

    /// Create an unhealthy component
    #[must_use]
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            response_time_ms: None,
        }
    }

    /// Add response time
    #[must_use]
    pub const fn with_response_time(mut self, ms: u64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }
}

/// Overall health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Overall status
    pub status: HealthStatus,
    /// Application version
    pub version: String,
    /// Timestamp of health check (Unix epoch)
    pub timestamp: u64,
    /// Individual component healths
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthCheckResponse {
    /// Create new health check response
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            version: version.into(),
            timestamp: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map_or(0, |d| d.as_secs()),
            components: HashMap::new(),
        }
    }

    /// Add component health
    pub fn add_component(&mut self, name: impl Into<String>, health: ComponentHealth) {
        self.components.insert(name.into(), health);
        self.recalculate_status();
    }

    fn recalculate_status(&mut self) {
        let worst = |status| self.components.values().any(|c| c.status == status);
        self.status = if worst(HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if worst(HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
    }

    /// Get HTTP status code based on health
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self.status {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for HealthCheckResponse {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

/// Time a probe and classify its outcome
async fn probe<E, F>(check: F) -> ComponentHealth
where
    E: std::fmt::Display,
    F: Future<Output = Result<(), E>>,
{
    let started = Instant::now();
    let result = check.await;
    let elapsed = started.elapsed();
    let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

    let health = match result {
        Ok(()) if elapsed > SLOW_PROBE => ComponentHealth::degraded("slow response"),
        Ok(()) => ComponentHealth::healthy(),
        Err(e) => {
            tracing::warn!(error = %e, "Health probe failed");
            ComponentHealth::unhealthy(e.to_string())
        }
    };
    health.with_response_time(ms)
}

/// Check every backend the service depends on
pub async fn check_components(state: &AppState) -> HealthCheckResponse {
    let (store, accounts) = tokio::join!(
        probe(state.state_store().ping()),
        probe(state.accounts().ping()),
    );

    let mut response = HealthCheckResponse::new(env!("CARGO_PKG_VERSION"));
    response.add_component("state_store", store);
    response.add_component("accounts", accounts);
    response
}

/// Liveness probe handler
///
/// Returns 200 OK while the process is running.
#[allow(clippy::unused_async)]
pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness probe handler
///
/// Returns 503 when the state store or the account database is unreachable.
pub async fn readiness(State(state): State<AppState>) -> HealthCheckResponse {
    check_components(&state).await
}

/// Detailed health report
pub async fn health_check(State(state): State<AppState>) -> HealthCheckResponse {
    check_components(&state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::repository::MockLinkedAccountRepository;
    use crate::accounts::RepositoryError;
    use crate::config::AdlinkConfig;
    use crate::oauth::MemoryStateStore;
    use crate::testing::TestContext;
    use crate::workspace::MemoryWorkspaceAccess;
    use std::sync::Arc;

    #[test]
    fn test_overall_status_is_worst_component() {
        let mut response = HealthCheckResponse::new("test");
        response.add_component("a", ComponentHealth::healthy());
        assert_eq!(response.status_code(), StatusCode::OK);

        response.add_component("b", ComponentHealth::degraded("slow"));
        assert_eq!(response.status, HealthStatus::Degraded);
        assert_eq!(response.status_code(), StatusCode::OK);

        response.add_component("c", ComponentHealth::unhealthy("down"));
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_liveness() {
        let ctx = TestContext::new();
        let response = ctx.server().get("/health/live").await;
        response.assert_status_ok();
        response.assert_text("OK");
    }

    #[tokio::test]
    async fn test_readiness_with_memory_backends() {
        let ctx = TestContext::new();
        let response = ctx.server().get("/health/ready").await;

        response.assert_status_ok();
        let body: HealthCheckResponse = response.json();
        assert_eq!(body.status, HealthStatus::Healthy);
        assert!(body.components.contains_key("state_store"));
        assert!(body.components.contains_key("accounts"));
    }

    #[tokio::test]
    async fn test_database_outage_is_unhealthy() {
        let mut accounts = MockLinkedAccountRepository::new();
        accounts
            .expect_ping()
            .returning(|| Err(RepositoryError::Unavailable("connection refused".to_string())));

        let state = AppState::new(
            AdlinkConfig::default(),
            Arc::new(MemoryStateStore::new()),
            Arc::new(accounts),
            Arc::new(MemoryWorkspaceAccess::new()),
        )
        .unwrap();

        let report = check_components(&state).await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.components["accounts"].status, HealthStatus::Unhealthy);
        assert_eq!(report.components["state_store"].status, HealthStatus::Healthy);
    }
}
