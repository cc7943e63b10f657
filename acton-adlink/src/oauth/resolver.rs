//! Callback resolution
//!
//! Maps an incoming callback to the pending request created at start. The
//! pending entry is consumed with an atomic take, so a replayed or concurrent
//! callback for the same state finds nothing and fails with
//! [`CallbackError::UnknownOrExpiredState`].

use std::sync::Arc;

use super::state_store::{state_key, StateStore, StateStoreError};
use super::types::{CallbackGrant, CallbackParams, Provider};

/// Callback resolution errors
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    /// Neither a grant nor a denial could be read from the query
    #[error("missing OAuth callback parameters")]
    MissingParameters,

    /// No live pending request matches the callback's state
    #[error("authorization request is unknown or has expired")]
    UnknownOrExpiredState,

    /// The user or provider declined the authorization
    #[error("provider denied authorization: {error}")]
    ProviderDenied {
        /// Return URL recovered from the pending request, if any
        return_url: Option<String>,
        /// Provider error code
        error: String,
        /// Provider error text
        description: Option<String>,
    },

    /// State store failed
    #[error(transparent)]
    StateStore(#[from] StateStoreError),
}

impl CallbackError {
    /// Stable machine-readable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingParameters => "missing_oauth_params",
            Self::UnknownOrExpiredState => "unknown_or_expired_state",
            Self::ProviderDenied { .. } => "provider_denied",
            Self::StateStore(_) => "state_store_unavailable",
        }
    }
}

/// Everything needed to complete a link, recovered from the pending request
#[derive(Debug, Clone)]
pub struct ResolvedCallback {
    /// Provider being linked
    pub provider: Provider,
    /// Correlation token
    pub state_key: String,
    /// Workspace that initiated the link
    pub workspace_id: String,
    /// Where the browser returns to
    pub return_url: String,
    /// Grant to exchange
    pub grant: CallbackGrant,
    /// OAuth1 request-token secret
    pub request_secret: Option<String>,
}

/// Resolves callbacks against the shared state store
#[derive(Clone)]
pub struct CallbackResolver {
    store: Arc<dyn StateStore>,
}

impl std::fmt::Debug for CallbackResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackResolver").finish_non_exhaustive()
    }
}

impl CallbackResolver {
    /// Create a resolver over `store`
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Resolve a callback, consuming its pending request
    ///
    /// A provider denial consumes the pending request too (best effort) so the
    /// caller can redirect to its return URL.
    ///
    /// # Errors
    ///
    /// See [`CallbackError`]
    pub async fn resolve(
        &self,
        provider: Provider,
        params: &CallbackParams,
    ) -> Result<ResolvedCallback, CallbackError> {
        let protocol = provider.protocol();

        if let Some(denial) = params.denial(protocol) {
            let return_url = match denial.state_key.as_deref() {
                Some(token) => self.take_quietly(provider, token).await.map(|p| p.return_url),
                None => None,
            };
            tracing::info!(
                provider = %provider,
                error = %denial.error,
                has_return_url = return_url.is_some(),
                "Provider denied authorization"
            );
            return Err(CallbackError::ProviderDenied {
                return_url,
                error: denial.error,
                description: denial.description,
            });
        }

        let (token, grant) = params
            .grant(protocol)
            .ok_or(CallbackError::MissingParameters)?;

        let pending = self
            .store
            .take(&state_key(provider, &token))
            .await?
            .ok_or(CallbackError::UnknownOrExpiredState)?;

        Ok(ResolvedCallback {
            provider,
            state_key: token,
            workspace_id: pending.workspace_id,
            return_url: pending.return_url,
            grant,
            request_secret: pending.secret,
        })
    }

    /// Take a pending request, treating store failures as absent
    async fn take_quietly(
        &self,
        provider: Provider,
        token: &str,
    ) -> Option<super::types::PendingOAuthRequest> {
        match self.store.take(&state_key(provider, token)).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(
                    provider = %provider,
                    error = %e,
                    "Could not clear denied request state"
                );
                None
            }
        }
    }
}
