//! OAuth account linking
//!
//! This module links advertising accounts through each platform's OAuth flow:
//! - Twitter / X Ads (OAuth 1.0a, HMAC-SHA1 signed requests)
//! - Snapchat Marketing API (OAuth 2.0)
//! - Meta Marketing API (OAuth 2.0, upgraded to a long-lived token)
//! - LinkedIn Marketing API (OAuth 2.0)
//! - YouTube / Google (OAuth 2.0, offline access)
//!
//! # Flow
//!
//! 1. `start` builds an authorization URL and parks a [`PendingOAuthRequest`]
//!    in the shared [`StateStore`] under the correlation token
//! 2. The provider redirects the browser to the callback endpoint
//! 3. The [`resolver`] consumes the pending request exactly once
//! 4. The provider adapter exchanges the grant and resolves the advertising identity
//! 5. The account is upserted and the browser is sent back to the workspace
//!
//! # Routes
//!
//! ```rust,no_run
//! use acton_adlink::oauth::handlers::{oauth_callback, start_link};
//! use acton_adlink::state::AppState;
//! use axum::{routing::get, Router};
//!
//! let app: Router<AppState> = Router::new()
//!     .route("/workspaces/{workspace_id}/ad-accounts/{provider}/start", get(start_link))
//!     .route("/ad-accounts/oauth/{provider}/callback", get(oauth_callback));
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [oauth.snapchat]
//! client_id = "your-client-id"
//! client_secret = "your-client-secret"
//! redirect_uri = "https://api.example.com/api/v1/ad-accounts/oauth/snapchat/callback"
//! scopes = ["snapchat-marketing-api"]
//! ```

pub mod handlers;
pub mod http;
pub mod orchestrator;
pub mod providers;
pub mod resolver;
pub mod state_store;
pub mod types;

pub use orchestrator::{CallbackOutcome, LinkOrchestrator, StartedAuthorization};
pub use providers::{AdapterRegistry, ProviderAdapter};
pub use resolver::{CallbackError, CallbackResolver};
#[cfg(feature = "redis")]
pub use state_store::RedisStateStore;
pub use state_store::{MemoryStateStore, StateStore, StateStoreError};
pub use types::{
    CallbackParams, OAuthConfig, PendingOAuthRequest, Provider, ProviderConfig, ProviderError,
    UnknownProvider,
};
