//! Test fixtures
//!
//! [`TestContext`] wires the router to in-memory backends with a fixed
//! membership table:
//!
//! | user | workspace | role |
//! |---|---|---|
//! | `owner-1` | `ws1` | owner |
//! | `member-1` | `ws1` | member |
//! | `viewer-1` | `ws1` | viewer |
//!
//! Meta and Snapchat are configured against an unroutable address; every
//! other provider is left unconfigured.

#[cfg(feature = "postgres")]
mod database;

#[cfg(feature = "postgres")]
pub use database::TestDatabase;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};

use crate::accounts::MemoryAccountRepository;
use crate::config::AdlinkConfig;
use crate::oauth::{MemoryStateStore, Provider, ProviderConfig};
use crate::state::AppState;
use crate::workspace::{MemoryWorkspaceAccess, WorkspaceRole, PRINCIPAL_HEADER};

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

/// Router plus handles on its in-memory backends
pub struct TestContext {
    /// Application state served by [`TestContext::server`]
    pub state: AppState,
    /// Pending requests
    pub store: Arc<MemoryStateStore>,
    /// Linked accounts
    pub accounts: Arc<MemoryAccountRepository>,
    /// Membership table
    pub workspaces: Arc<MemoryWorkspaceAccess>,
}

impl TestContext {
    /// Context with Meta and Snapchat configured
    pub fn new() -> Self {
        let mut config = AdlinkConfig::default();
        config.frontend_url = "https://app.example.com".to_string();
        config.oauth = config
            .oauth
            .with_provider(Provider::Meta, provider_config(Provider::Meta, "http://127.0.0.1:9"))
            .with_provider(
                Provider::Snapchat,
                provider_config(Provider::Snapchat, "http://127.0.0.1:9"),
            );
        Self::with_config(config)
    }

    /// Context over `config`
    pub fn with_config(config: AdlinkConfig) -> Self {
        let store = Arc::new(MemoryStateStore::new());
        let accounts = Arc::new(MemoryAccountRepository::new());
        let workspaces = Arc::new(
            MemoryWorkspaceAccess::new()
                .with_member("ws1", "owner-1", WorkspaceRole::Owner)
                .with_member("ws1", "member-1", WorkspaceRole::Member)
                .with_member("ws1", "viewer-1", WorkspaceRole::Viewer),
        );

        let state = AppState::new(config, store.clone(), accounts.clone(), workspaces.clone())
            .expect("Failed to create state");

        Self {
            state,
            store,
            accounts,
            workspaces,
        }
    }

    /// Test server over the full router
    pub fn server(&self) -> TestServer {
        TestServer::new(crate::routes::router(self.state.clone())).expect("Failed to start server")
    }
}

/// Attach the authenticated user header to a request
pub trait AsUser {
    /// Send the request as `user_id`
    #[must_use]
    fn as_user(self, user_id: &str) -> Self;
}

impl AsUser for TestRequest {
    fn as_user(self, user_id: &str) -> Self {
        self.add_header(
            HeaderName::from_static(PRINCIPAL_HEADER),
            HeaderValue::from_str(user_id).expect("valid header value"),
        )
    }
}
