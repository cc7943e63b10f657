//! OAuth HTTP handlers
//!
//! - `start_link`: returns the provider authorization URL for a workspace
//! - `oauth_callback`: completes the link and redirects back into the product

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;

use super::orchestrator::CallbackOutcome;
use super::types::{CallbackParams, Provider};
use crate::error::LinkError;
use crate::state::AppState;
use crate::workspace::{authorize, AccessLevel, Principal, PRINCIPAL_HEADER};

/// Response body of `start_link`
#[derive(Debug, Serialize)]
pub struct StartLinkResponse {
    /// Provider URL the browser should visit
    pub authorization_url: String,
}

/// Callback query string, rejected as a JSON `bad_request` when malformed
#[derive(Debug, Clone, Default)]
pub struct CallbackQuery(pub CallbackParams);

impl<S> FromRequestParts<S> for CallbackQuery
where
    S: Send + Sync,
{
    type Rejection = LinkError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<CallbackParams>::from_request_parts(parts, state)
            .await
            .map_err(|err| LinkError::BadRequest(err.body_text()))?;
        Ok(Self(params))
    }
}

impl IntoResponse for CallbackOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Redirect { location, .. } => Redirect::to(&location).into_response(),
            Self::Failed(error) => error.into_response(),
        }
    }
}

/// Start linking a provider to a workspace
///
/// # Errors
///
/// - 401/403 when the caller may not act on the workspace
/// - 404 for an unknown provider
/// - 500 when the provider is not configured or the state store fails
/// - 502 when an OAuth1 request-token call fails
pub async fn start_link(
    State(state): State<AppState>,
    Path((workspace_id, provider_name)): Path<(String, String)>,
    principal: Principal,
) -> Result<Json<StartLinkResponse>, LinkError> {
    authorize(
        state.workspaces(),
        &principal,
        &workspace_id,
        AccessLevel::Read,
    )
    .await?;

    let provider: Provider = provider_name.parse()?;
    let started = state.orchestrator().start(provider, &workspace_id).await?;

    tracing::debug!(
        provider = %provider,
        workspace_id = %workspace_id,
        user_id = %principal.user_id(),
        "Authorization URL issued"
    );

    Ok(Json(StartLinkResponse {
        authorization_url: started.authorization_url,
    }))
}

/// Handle the provider redirect
///
/// Answers with a 303 to the workspace's return URL (carrying `error`,
/// `error_description` and `provider` on failure), or a JSON error when no
/// return URL can be recovered.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider_name): Path<String>,
    CallbackQuery(params): CallbackQuery,
    headers: HeaderMap,
) -> Response {
    let provider: Provider = match provider_name.parse() {
        Ok(provider) => provider,
        Err(e) => return LinkError::from(e).into_response(),
    };

    let created_by = headers
        .get(PRINCIPAL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    state
        .orchestrator()
        .callback(provider, &params, created_by)
        .await
        .into_response()
}

#[cfg(test)]
mod tests {
    use crate::testing::{AsUser, TestContext};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_start_requires_principal() {
        let ctx = TestContext::new();
        let server = ctx.server();

        let response = server
            .get("/api/v1/workspaces/ws1/ad-accounts/meta/start")
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        response.assert_json_contains(&serde_json::json!({ "error": "unauthenticated" }));
    }

    #[tokio::test]
    async fn test_start_rejects_non_member() {
        let ctx = TestContext::new();
        let server = ctx.server();

        let response = server
            .get("/api/v1/workspaces/other/ad-accounts/meta/start")
            .as_user("owner-1")
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_start_unknown_provider_is_not_found() {
        let ctx = TestContext::new();
        let server = ctx.server();

        for provider in ["myspace", "tiktok"] {
            let response = server
                .get(&format!("/api/v1/workspaces/ws1/ad-accounts/{provider}/start"))
                .as_user("owner-1")
                .await;
            response.assert_status(StatusCode::NOT_FOUND);
            response.assert_json_contains(&serde_json::json!({ "error": "unknown_provider" }));
        }
    }

    #[tokio::test]
    async fn test_start_unconfigured_provider_fails_fast() {
        let ctx = TestContext::new();
        let server = ctx.server();

        let response = server
            .get("/api/v1/workspaces/ws1/ad-accounts/youtube/start")
            .as_user("viewer-1")
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_json(&serde_json::json!({
            "error": "configuration_missing",
            "message": "youtube is not configured",
        }));
        assert!(ctx.store.is_empty());
    }

    #[tokio::test]
    async fn test_callback_without_parameters_is_bad_request() {
        let ctx = TestContext::new();
        let server = ctx.server();

        let response = server.get("/api/v1/ad-accounts/oauth/meta/callback").await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json_contains(&serde_json::json!({ "error": "missing_oauth_params" }));
    }

    #[tokio::test]
    async fn test_callback_unknown_state_is_bad_request() {
        let ctx = TestContext::new();
        let server = ctx.server();

        let response = server
            .get("/api/v1/ad-accounts/oauth/snapchat/callback")
            .add_query_param("code", "abc")
            .add_query_param("state", "never-issued")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json_contains(&serde_json::json!({ "error": "unknown_or_expired_state" }));
    }

    #[tokio::test]
    async fn test_callback_repeated_parameter_is_json_bad_request() {
        let ctx = TestContext::new();
        let server = ctx.server();

        let response = server
            .get("/api/v1/ad-accounts/oauth/snapchat/callback?code=abc&state=one&state=two")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json_contains(&serde_json::json!({ "error": "bad_request" }));
    }
}
