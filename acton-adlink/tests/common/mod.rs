//! Shared harness for integration tests
//!
//! Runs the real router over in-memory stores, with one provider's endpoints
//! pointed at a wiremock server.

#![allow(dead_code)]

use std::sync::Arc;

use acton_adlink::oauth::state_store::state_key;
use acton_adlink::prelude::*;
use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};
use wiremock::MockServer;

/// Frontend base URL used by every test app
pub const FRONTEND: &str = "https://app";

/// Running application plus handles on its backends
pub struct TestApp {
    /// HTTP surface
    pub server: TestServer,
    /// Pending requests
    pub store: Arc<MemoryStateStore>,
    /// Linked accounts
    pub accounts: Arc<MemoryAccountRepository>,
    /// Mocked provider API
    pub provider_api: MockServer,
}

/// Provider settings pointing every endpoint at `base`
pub fn provider_config(provider: Provider, base: &str) -> ProviderConfig {
    ProviderConfig {
        client_id: format!("{provider}-client"),
        client_secret: format!("{provider}-secret"),
        redirect_uri: format!(
            "https://api.example.com/api/v1/ad-accounts/oauth/{provider}/callback"
        ),
        auth_url: Some(format!("{base}/authorize")),
        token_url: Some(format!("{base}/token")),
        request_token_url: Some(format!("{base}/request_token")),
        identity_url: Some(format!("{base}/identity")),
        ..ProviderConfig::default()
    }
}

/// Start an app with `provider` configured against a fresh mock server
///
/// Workspace `ws1` has `owner-1` (owner), `member-1` (member) and `viewer-1` (viewer).
pub async fn spawn_app(provider: Provider) -> TestApp {
    let provider_api = MockServer::start().await;

    let mut config = AdlinkConfig::default();
    config.frontend_url = FRONTEND.to_string();
    config.oauth = config
        .oauth
        .with_provider(provider, provider_config(provider, &provider_api.uri()));

    let store = Arc::new(MemoryStateStore::new());
    let accounts = Arc::new(MemoryAccountRepository::new());
    let workspaces = Arc::new(
        MemoryWorkspaceAccess::new()
            .with_member("ws1", "owner-1", WorkspaceRole::Owner)
            .with_member("ws1", "member-1", WorkspaceRole::Member)
            .with_member("ws1", "viewer-1", WorkspaceRole::Viewer),
    );

    let state = AppState::new(config, store.clone(), accounts.clone(), workspaces)
        .expect("Failed to create state");
    let server =
        TestServer::new(acton_adlink::routes::router(state)).expect("Failed to start server");

    TestApp {
        server,
        store,
        accounts,
        provider_api,
    }
}

impl TestApp {
    /// Start a link as `owner-1` and return the authorization URL
    pub async fn start(&self, workspace_id: &str, provider: Provider) -> url::Url {
        let response = as_user(
            self.server
                .get(&format!("/api/v1/workspaces/{workspace_id}/ad-accounts/{provider}/start")),
            "owner-1",
        )
        .await;
        response.assert_status_ok();

        let body: serde_json::Value = response.json();
        let raw = body["authorization_url"]
            .as_str()
            .expect("authorization_url in response");
        url::Url::parse(raw).expect("valid authorization URL")
    }

    /// Pending request stored for `token`
    pub async fn pending(&self, provider: Provider, token: &str) -> Option<PendingOAuthRequest> {
        self.store
            .get(&state_key(provider, token))
            .await
            .expect("state store read")
    }

    /// Deliver a provider callback
    pub fn callback(&self, provider: Provider) -> TestRequest {
        self.server
            .get(&format!("/api/v1/ad-accounts/oauth/{provider}/callback"))
    }
}

/// Read a query parameter from a URL
pub fn query_param(url: &url::Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Send `request` as `user_id`
pub fn as_user(request: TestRequest, user_id: &str) -> TestRequest {
    request.add_header(
        HeaderName::from_static("x-user-id"),
        HeaderValue::from_str(user_id).expect("valid header value"),
    )
}

/// `Location` header of a redirect response, parsed
pub fn location(response: &axum_test::TestResponse) -> url::Url {
    let raw = response.header("location");
    url::Url::parse(raw.to_str().expect("ASCII location")).expect("absolute location")
}
