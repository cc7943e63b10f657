//! HTTP routes
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | GET | `/api/v1/workspaces/{workspace_id}/ad-accounts` | [`list_accounts`] |
//! | GET | `/api/v1/workspaces/{workspace_id}/ad-accounts/{account_id}` | [`get_account`] |
//! | GET | `/api/v1/workspaces/{workspace_id}/ad-accounts/{provider}/start` | [`start_link`] |
//! | POST | `/api/v1/workspaces/{workspace_id}/ad-accounts/{account_id}/disconnect` | [`disconnect_account`] |
//! | GET | `/api/v1/ad-accounts/oauth/{provider}/callback` | [`oauth_callback`] |
//! | GET | `/health`, `/health/live`, `/health/ready` | [`crate::health`] |

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::accounts::handlers::{disconnect_account, get_account, list_accounts};
use crate::health::{health_check, liveness, readiness};
use crate::oauth::handlers::{oauth_callback, start_link};
use crate::state::AppState;

/// Build the application router
///
/// The request timeout leaves one HTTP timeout of headroom over the link
/// deadline so a slow callback still ends in its redirect.
pub fn router(state: AppState) -> Router {
    let request_timeout = state.orchestrator().link_timeout() + state.config().http.timeout();

    let api = Router::new()
        .route("/workspaces/{workspace_id}/ad-accounts", get(list_accounts))
        // One parameter name per segment: `{target}` is a provider for
        // `start` and an account ID otherwise
        .route("/workspaces/{workspace_id}/ad-accounts/{target}", get(get_account))
        .route(
            "/workspaces/{workspace_id}/ad-accounts/{target}/start",
            get(start_link),
        )
        .route(
            "/workspaces/{workspace_id}/ad-accounts/{target}/disconnect",
            post(disconnect_account),
        )
        .route("/ad-accounts/oauth/{provider}/callback", get(oauth_callback));

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
