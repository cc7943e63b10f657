//! Link orchestration
//!
//! [`LinkOrchestrator`] drives both halves of a link:
//!
//! - `start` asks the provider adapter for an authorization URL and parks a
//!   [`PendingOAuthRequest`] in the state store under the correlation token.
//! - `callback` resolves the pending request, exchanges the grant, resolves the
//!   advertising identity and upserts the account.
//!
//! Once a return URL is known every failure becomes a redirect back to it with
//! `error`, `error_description` and `provider` query parameters. Only failures
//! that happen before that point surface as [`LinkError`] JSON responses.
//!
//! The exchange and the account write share one deadline
//! ([`LinkOrchestrator::link_timeout`]). Running out of time after the pending
//! request was consumed is reported through the same redirect.

use std::sync::Arc;
use std::time::Duration;

use super::providers::{AdapterRegistry, ProviderAdapter};
use super::resolver::{CallbackError, CallbackResolver, ResolvedCallback};
use super::state_store::{clamp_ttl, state_key, StateStore};
use super::types::{CallbackParams, LinkedIdentity, PendingOAuthRequest, Provider, ProviderError};
use crate::accounts::{AccountFields, AccountLinker, LinkedAccount, RepositoryError};
use crate::error::LinkError;

/// Authorization URL handed back to the caller of `start`
#[derive(Debug, Clone)]
pub struct StartedAuthorization {
    /// URL the browser should visit
    pub authorization_url: String,
    /// Correlation token the provider will echo back
    pub state_key: String,
}

/// What the callback endpoint should do with the browser
#[derive(Debug)]
pub enum CallbackOutcome {
    /// Send the browser back into the product
    Redirect {
        /// Return URL, with error parameters appended on failure
        location: String,
        /// Account written by a successful link
        account: Option<LinkedAccount>,
    },
    /// No return URL could be recovered; answer with a JSON error
    Failed(LinkError),
}

impl CallbackOutcome {
    /// Linked account, if the callback completed a link
    #[must_use]
    pub const fn account(&self) -> Option<&LinkedAccount> {
        match self {
            Self::Redirect { account, .. } => account.as_ref(),
            Self::Failed(_) => None,
        }
    }
}

/// Provider calls a single callback may make in sequence
pub const MAX_SEQUENTIAL_PROVIDER_CALLS: u32 = 4;

/// Link deadline used until [`LinkOrchestrator::with_link_timeout`] overrides it
const DEFAULT_LINK_TIMEOUT: Duration = Duration::from_secs(60);

/// Shorten a correlation token for logging
fn log_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

/// Coordinates adapters, the state store and the account linker
#[derive(Clone)]
pub struct LinkOrchestrator {
    registry: AdapterRegistry,
    store: Arc<dyn StateStore>,
    resolver: CallbackResolver,
    linker: AccountLinker,
    frontend_url: String,
    state_ttl: Duration,
    link_timeout: Duration,
}

impl std::fmt::Debug for LinkOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkOrchestrator")
            .field("registry", &self.registry)
            .field("frontend_url", &self.frontend_url)
            .field("state_ttl", &self.state_ttl)
            .field("link_timeout", &self.link_timeout)
            .finish_non_exhaustive()
    }
}

impl LinkOrchestrator {
    /// Create an orchestrator
    ///
    /// `state_ttl` is clamped to the pending-request maximum.
    #[must_use]
    pub fn new(
        registry: AdapterRegistry,
        store: Arc<dyn StateStore>,
        linker: AccountLinker,
        frontend_url: impl Into<String>,
        state_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            resolver: CallbackResolver::new(Arc::clone(&store)),
            store,
            linker,
            frontend_url: frontend_url.into(),
            state_ttl: clamp_ttl(state_ttl),
            link_timeout: DEFAULT_LINK_TIMEOUT,
        }
    }

    /// Bound the exchange and account write of a callback by `timeout`
    #[must_use]
    pub const fn with_link_timeout(mut self, timeout: Duration) -> Self {
        self.link_timeout = timeout;
        self
    }

    /// Time a callback may spend between consuming its pending request and
    /// answering
    #[must_use]
    pub const fn link_timeout(&self) -> Duration {
        self.link_timeout
    }

    /// Provider adapters
    #[must_use]
    pub const fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Where the browser lands after linking into `workspace_id`
    #[must_use]
    pub fn return_url(&self, workspace_id: &str) -> String {
        format!(
            "{}/ad-accounts/{}",
            self.frontend_url.trim_end_matches('/'),
            urlencoding::encode(workspace_id)
        )
    }

    fn adapter(&self, provider: Provider) -> Result<Arc<dyn ProviderAdapter>, LinkError> {
        match self.registry.get(provider) {
            Some(Ok(adapter)) => Ok(adapter),
            Some(Err(e)) => Err(e.into()),
            None => Err(LinkError::UnknownProvider(provider.to_string())),
        }
    }

    /// Begin linking `provider` into `workspace_id`
    ///
    /// # Errors
    ///
    /// - [`LinkError::UnknownProvider`] when the provider has no adapter
    /// - [`LinkError::Provider`] when it is not configured or the request-token call fails
    /// - [`LinkError::StateStore`] when the pending request cannot be stored
    pub async fn start(
        &self,
        provider: Provider,
        workspace_id: &str,
    ) -> Result<StartedAuthorization, LinkError> {
        let adapter = self.adapter(provider)?;

        let workspace_id = workspace_id.trim();
        if workspace_id.is_empty() {
            return Err(LinkError::BadRequest("workspace_id is required".to_string()));
        }

        let request = adapter.build_authorization_url().await?;
        let pending = PendingOAuthRequest {
            workspace_id: workspace_id.to_string(),
            return_url: self.return_url(workspace_id),
            secret: request.request_secret,
        };

        self.store
            .put(&state_key(provider, &request.state_key), &pending, self.state_ttl)
            .await?;

        tracing::info!(
            provider = %provider,
            workspace_id = %workspace_id,
            state = %log_prefix(&request.state_key),
            ttl_secs = self.state_ttl.as_secs(),
            "Authorization started"
        );

        Ok(StartedAuthorization {
            authorization_url: request.authorization_url,
            state_key: request.state_key,
        })
    }

    /// Complete a link from the provider's callback parameters
    ///
    /// `created_by` is recorded on newly created accounts.
    pub async fn callback(
        &self,
        provider: Provider,
        params: &CallbackParams,
        created_by: Option<&str>,
    ) -> CallbackOutcome {
        let adapter = match self.adapter(provider) {
            Ok(adapter) => adapter,
            Err(e) => return CallbackOutcome::Failed(e),
        };

        let resolved = match self.resolver.resolve(provider, params).await {
            Ok(resolved) => resolved,
            Err(CallbackError::ProviderDenied {
                return_url: Some(return_url),
                error,
                description,
            }) => {
                return redirect_with_error(
                    &return_url,
                    provider,
                    &error,
                    description.as_deref().unwrap_or("authorization was declined"),
                )
                .unwrap_or_else(|| {
                    CallbackOutcome::Failed(
                        CallbackError::ProviderDenied {
                            return_url: None,
                            error,
                            description,
                        }
                        .into(),
                    )
                });
            }
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "Callback rejected");
                return CallbackOutcome::Failed(e.into());
            }
        };

        let ResolvedCallback {
            state_key,
            workspace_id,
            return_url,
            grant,
            request_secret,
            ..
        } = resolved;

        let deadline = tokio::time::Instant::now() + self.link_timeout;

        let exchange = adapter.exchange_and_identify(grant, request_secret);
        let exchanged = tokio::time::timeout_at(deadline, exchange)
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::UpstreamTransport("provider did not answer in time".to_string()))
            });
        let identity = match exchanged {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(
                    provider = %provider,
                    workspace_id = %workspace_id,
                    state = %log_prefix(&state_key),
                    error = %e,
                    "Link failed at provider"
                );
                return redirect_with_error(&return_url, provider, e.code(), &e.to_string())
                    .unwrap_or_else(|| CallbackOutcome::Failed(e.into()));
            }
        };

        let external_account_id = identity.external_account_id.clone();
        let upsert = self.linker.upsert(
            &workspace_id,
            provider,
            external_account_id.as_deref(),
            account_fields(identity, created_by),
        );
        let saved = tokio::time::timeout_at(deadline, upsert)
            .await
            .unwrap_or_else(|_| {
                Err(RepositoryError::Unavailable("account write timed out".to_string()))
            });
        let account = match saved {
            Ok(account) => account,
            Err(e) => {
                tracing::warn!(
                    provider = %provider,
                    workspace_id = %workspace_id,
                    error = %e,
                    "Link failed while saving account"
                );
                return redirect_with_error(
                    &return_url,
                    provider,
                    "link_failed",
                    "the account could not be saved",
                )
                .unwrap_or_else(|| CallbackOutcome::Failed(e.into()));
            }
        };

        tracing::info!(
            provider = %provider,
            workspace_id = %workspace_id,
            account_id = %account.id,
            "Account linked"
        );

        CallbackOutcome::Redirect {
            location: return_url,
            account: Some(account),
        }
    }
}

fn account_fields(identity: LinkedIdentity, created_by: Option<&str>) -> AccountFields {
    let LinkedIdentity {
        account_name,
        credentials,
        metadata,
        ..
    } = identity;

    AccountFields {
        account_name,
        access_token: Some(credentials.access_token),
        access_token_secret: credentials.access_token_secret,
        refresh_token: credentials.refresh_token,
        scopes: credentials.scopes,
        metadata: Some(metadata),
        created_by: created_by.map(str::to_string),
    }
}

/// Append error parameters to `return_url`
///
/// Returns `None` when the stored return URL does not parse.
fn redirect_with_error(
    return_url: &str,
    provider: Provider,
    error: &str,
    description: &str,
) -> Option<CallbackOutcome> {
    let mut location = url::Url::parse(return_url).ok()?;
    location
        .query_pairs_mut()
        .append_pair("error", error)
        .append_pair("error_description", description)
        .append_pair("provider", provider.as_str());

    Some(CallbackOutcome::Redirect {
        location: location.into(),
        account: None,
    })
}
