//! Application state
//!
//! Holds the configuration, the link orchestrator and the collaborator
//! backends shared by every handler.

use std::sync::Arc;

use crate::accounts::{AccountLinker, LinkedAccountRepository};
use crate::config::AdlinkConfig;
use crate::oauth::orchestrator::MAX_SEQUENTIAL_PROVIDER_CALLS;
use crate::oauth::{AdapterRegistry, LinkOrchestrator, ProviderError, StateStore};
use crate::workspace::WorkspaceAccess;

/// Application state for acton-adlink
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use acton_adlink::prelude::*;
///
/// # fn example() -> Result<(), ProviderError> {
/// let state = AppState::new(
///     AdlinkConfig::default(),
///     Arc::new(MemoryStateStore::new()),
///     Arc::new(MemoryAccountRepository::new()),
///     Arc::new(MemoryWorkspaceAccess::new()),
/// )?;
///
/// let app: axum::Router = acton_adlink::routes::router(state);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AppState {
    config: Arc<AdlinkConfig>,
    orchestrator: Arc<LinkOrchestrator>,
    accounts: Arc<dyn LinkedAccountRepository>,
    workspaces: Arc<dyn WorkspaceAccess>,
    state_store: Arc<dyn StateStore>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create state, building provider adapters from `config.oauth`
    ///
    /// # Errors
    ///
    /// Returns error if the outbound HTTP client cannot be built
    pub fn new(
        config: AdlinkConfig,
        state_store: Arc<dyn StateStore>,
        accounts: Arc<dyn LinkedAccountRepository>,
        workspaces: Arc<dyn WorkspaceAccess>,
    ) -> Result<Self, ProviderError> {
        let registry = AdapterRegistry::from_config(&config.oauth, config.http.timeout())?;
        Ok(Self::with_registry(
            config,
            registry,
            state_store,
            accounts,
            workspaces,
        ))
    }

    /// Create state around an existing adapter registry
    #[must_use]
    pub fn with_registry(
        config: AdlinkConfig,
        registry: AdapterRegistry,
        state_store: Arc<dyn StateStore>,
        accounts: Arc<dyn LinkedAccountRepository>,
        workspaces: Arc<dyn WorkspaceAccess>,
    ) -> Self {
        let orchestrator = LinkOrchestrator::new(
            registry,
            Arc::clone(&state_store),
            AccountLinker::new(Arc::clone(&accounts)),
            config.frontend_url.clone(),
            config.state_store.ttl(),
        )
        .with_link_timeout(config.http.timeout() * MAX_SEQUENTIAL_PROVIDER_CALLS);

        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            accounts,
            workspaces,
            state_store,
        }
    }

    /// Connect the configured backends
    ///
    /// With the `postgres` feature, accounts and workspace membership live in
    /// `PostgreSQL` (migrations run when `database.run_migrations` is set). With
    /// the `redis` feature, pending requests live in Redis. Disabled backends
    /// fall back to in-process stores.
    ///
    /// # Errors
    ///
    /// Returns error if a backend cannot be reached or migrations fail
    pub async fn connect(config: AdlinkConfig) -> anyhow::Result<Self> {
        let (accounts, workspaces) = Self::connect_database(&config).await?;
        let state_store = Self::connect_state_store(&config)?;
        Ok(Self::new(config, state_store, accounts, workspaces)?)
    }

    #[cfg(feature = "postgres")]
    async fn connect_database(
        config: &AdlinkConfig,
    ) -> anyhow::Result<(Arc<dyn LinkedAccountRepository>, Arc<dyn WorkspaceAccess>)> {
        use crate::accounts::PgAccountRepository;
        use crate::workspace::PgWorkspaceAccess;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.url)
            .await?;

        let repository = PgAccountRepository::new(pool.clone());
        if config.database.run_migrations {
            repository.migrate().await?;
            tracing::info!("Database migrations applied");
        }

        tracing::info!(
            max_connections = config.database.max_connections,
            "Connected to PostgreSQL"
        );
        Ok((Arc::new(repository), Arc::new(PgWorkspaceAccess::new(pool))))
    }

    #[cfg(not(feature = "postgres"))]
    #[allow(clippy::unused_async)]
    async fn connect_database(
        _config: &AdlinkConfig,
    ) -> anyhow::Result<(Arc<dyn LinkedAccountRepository>, Arc<dyn WorkspaceAccess>)> {
        tracing::warn!("postgres feature disabled, accounts are kept in memory");
        Ok((
            Arc::new(crate::accounts::MemoryAccountRepository::new()),
            Arc::new(crate::workspace::MemoryWorkspaceAccess::new()),
        ))
    }

    #[cfg(feature = "redis")]
    fn connect_state_store(config: &AdlinkConfig) -> anyhow::Result<Arc<dyn StateStore>> {
        let store = crate::oauth::RedisStateStore::connect(&config.state_store.redis_url)?;
        tracing::info!("Using Redis state store");
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "redis"))]
    #[allow(clippy::unnecessary_wraps)]
    fn connect_state_store(_config: &AdlinkConfig) -> anyhow::Result<Arc<dyn StateStore>> {
        tracing::warn!(
            "redis feature disabled, callbacks must reach the process that started them"
        );
        Ok(Arc::new(crate::oauth::MemoryStateStore::new()))
    }

    /// Get configuration reference
    #[must_use]
    pub fn config(&self) -> &AdlinkConfig {
        &self.config
    }

    /// Link orchestrator
    #[must_use]
    pub fn orchestrator(&self) -> &LinkOrchestrator {
        &self.orchestrator
    }

    /// Linked account storage
    #[must_use]
    pub fn accounts(&self) -> &dyn LinkedAccountRepository {
        self.accounts.as_ref()
    }

    /// Workspace membership lookup
    #[must_use]
    pub fn workspaces(&self) -> &dyn WorkspaceAccess {
        self.workspaces.as_ref()
    }

    /// Pending-request store
    #[must_use]
    pub fn state_store(&self) -> &dyn StateStore {
        self.state_store.as_ref()
    }
}
