//! acton-adlink: OAuth account linking for advertising platforms
//!
//! Links Twitter, Snapchat, Meta, LinkedIn and YouTube advertising accounts to a
//! workspace. Each provider's OAuth handshake (OAuth 1.0a for Twitter, OAuth 2.0
//! authorization-code for the rest) is started by one request and completed by a
//! browser redirect that may land on any process behind the load balancer.
//!
//! # Architecture
//!
//! - [`oauth::state_store`]: shared, TTL-bound store holding in-flight requests
//! - [`oauth::providers`]: one [`ProviderAdapter`](oauth::ProviderAdapter) per provider
//! - [`oauth::resolver`]: matches a callback to its pending request, consuming it once
//! - [`accounts`]: idempotent create-or-update of linked account records
//! - [`oauth::orchestrator`]: sequences the above and maps failures to outcomes
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use acton_adlink::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     acton_adlink::observability::init()?;
//!
//!     let config = AdlinkConfig::load_for_service("acton-adlink")?;
//!     let state = AppState::connect(config.clone()).await?;
//!     let app = acton_adlink::routes::router(state);
//!
//!     let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `postgres` - `PostgreSQL` account repository and workspace directory (default)
//! - `redis` - Redis-backed state store shared by every process (default)

pub mod accounts;
pub mod config;
pub mod error;
pub mod health;
pub mod oauth;
pub mod observability;
pub mod routes;
pub mod state;
pub mod workspace;

#[cfg(test)]
pub mod testing;

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! ```rust
    //! use acton_adlink::prelude::*;
    //! ```

    pub use crate::accounts::{
        AccountFields, AccountLinker, AccountStatus, LinkedAccount, LinkedAccountRepository,
        MemoryAccountRepository,
    };
    pub use crate::config::AdlinkConfig;
    pub use crate::error::LinkError;
    pub use crate::oauth::{
        AdapterRegistry, CallbackOutcome, CallbackParams, LinkOrchestrator, MemoryStateStore,
        OAuthConfig, PendingOAuthRequest, Provider, ProviderAdapter, ProviderConfig,
        ProviderError, StateStore,
    };
    pub use crate::state::AppState;
    pub use crate::workspace::{MemoryWorkspaceAccess, Principal, WorkspaceAccess, WorkspaceRole};

    pub use axum;
    pub use serde_json::json;
}
