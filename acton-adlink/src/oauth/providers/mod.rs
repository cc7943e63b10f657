//! Provider adapters
//!
//! One adapter per advertising platform:
//! - Twitter / X Ads (OAuth 1.0a, see [`oauth1`])
//! - Snapchat, Meta, LinkedIn and YouTube (OAuth 2.0 via [`BaseOAuthProvider`])
//!
//! [`AdapterRegistry`] builds the adapters from [`OAuthConfig`] once at startup.
//! A provider whose configuration is incomplete stays in the registry as an
//! error so that requests for it fail with `ConfigurationMissing` instead of
//! `UnknownProvider`.

pub mod base;
pub mod linkedin;
pub mod meta;
pub mod oauth1;
pub mod snapchat;
pub mod twitter;
pub mod youtube;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use base::BaseOAuthProvider;
pub use linkedin::LinkedInProvider;
pub use meta::MetaProvider;
pub use snapchat::SnapchatProvider;
pub use twitter::TwitterProvider;
pub use youtube::YouTubeProvider;

use super::http::ProviderHttp;
use super::types::{
    AuthorizationRequest, CallbackGrant, LinkedIdentity, OAuthConfig, Provider, ProviderConfig,
    ProviderError,
};

/// Capability set every provider offers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider served by this adapter
    fn provider(&self) -> Provider;

    /// Build an authorization URL and the correlation token the callback will carry
    ///
    /// For OAuth1 this performs the request-token call and returns its secret.
    async fn build_authorization_url(&self) -> Result<AuthorizationRequest, ProviderError>;

    /// Exchange the callback grant for tokens and resolve the advertising identity
    ///
    /// `request_secret` is the OAuth1 request-token secret saved at start.
    async fn exchange_and_identify(
        &self,
        grant: CallbackGrant,
        request_secret: Option<String>,
    ) -> Result<LinkedIdentity, ProviderError>;
}

type AdapterSlot = Result<Arc<dyn ProviderAdapter>, ProviderError>;

/// Provider adapters keyed by provider
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Provider, AdapterSlot>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut configured: Vec<_> = self
            .adapters
            .iter()
            .filter(|(_, slot)| slot.is_ok())
            .map(|(p, _)| p.as_str())
            .collect();
        configured.sort_unstable();
        f.debug_struct("AdapterRegistry")
            .field("configured", &configured)
            .finish()
    }
}

impl AdapterRegistry {
    /// Build adapters for every linkable provider
    ///
    /// # Errors
    ///
    /// Returns error if the shared HTTP client cannot be created
    pub fn from_config(config: &OAuthConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let http = ProviderHttp::new(timeout)?;
        let mut registry = Self::default();

        for provider in Provider::LINKABLE {
            let slot = config.provider_config(provider).map_or_else(
                || {
                    Err(ProviderError::ConfigurationMissing {
                        provider,
                        missing: ProviderConfig::default().missing_fields(),
                    })
                },
                |provider_config| build_adapter(provider, provider_config, http.clone()),
            );

            match &slot {
                Ok(_) => tracing::debug!(provider = %provider, "Provider adapter ready"),
                Err(e) => {
                    tracing::debug!(
                        provider = %provider,
                        error = %e,
                        "Provider adapter unavailable"
                    );
                }
            }
            registry.adapters.insert(provider, slot);
        }

        Ok(registry)
    }

    /// Register an adapter, replacing any existing one for its provider
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.provider(), Ok(adapter));
        self
    }

    /// Look up the adapter for `provider`
    ///
    /// Returns `None` for providers without an adapter (e.g. TikTok).
    #[must_use]
    pub fn get(
        &self,
        provider: Provider,
    ) -> Option<Result<Arc<dyn ProviderAdapter>, ProviderError>> {
        self.adapters.get(&provider).map(|slot| match slot {
            Ok(adapter) => Ok(Arc::clone(adapter)),
            Err(e) => Err(e.clone()),
        })
    }

    /// Whether `provider` has a usable adapter
    #[must_use]
    pub fn is_configured(&self, provider: Provider) -> bool {
        matches!(self.adapters.get(&provider), Some(Ok(_)))
    }
}

fn build_adapter(
    provider: Provider,
    config: &ProviderConfig,
    http: ProviderHttp,
) -> AdapterSlot {
    let adapter: Arc<dyn ProviderAdapter> = match provider {
        Provider::Twitter => Arc::new(TwitterProvider::new(config, http)?),
        Provider::Snapchat => Arc::new(SnapchatProvider::new(config, http)?),
        Provider::Meta => Arc::new(MetaProvider::new(config, http)?),
        Provider::LinkedIn => Arc::new(LinkedInProvider::new(config, http)?),
        Provider::YouTube => Arc::new(YouTubeProvider::new(config, http)?),
        Provider::TikTok => {
            return Err(ProviderError::ConfigurationMissing {
                provider,
                missing: Vec::new(),
            })
        }
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(provider: Provider) -> OAuthConfig {
        OAuthConfig::default().with_provider(
            provider,
            ProviderConfig {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                redirect_uri: "https://api.example/cb".to_string(),
                ..ProviderConfig::default()
            },
        )
    }

    #[test]
    fn test_unconfigured_providers_report_missing_configuration() {
        let registry =
            AdapterRegistry::from_config(&OAuthConfig::default(), Duration::from_secs(5)).unwrap();

        for provider in Provider::LINKABLE {
            let Some(Err(err)) = registry.get(provider) else {
                panic!("{provider} should be registered as unavailable");
            };
            assert!(matches!(err, ProviderError::ConfigurationMissing { .. }));
        }
    }

    #[test]
    fn test_tiktok_has_no_adapter() {
        let registry =
            AdapterRegistry::from_config(&configured(Provider::Meta), Duration::from_secs(5))
                .unwrap();
        assert!(registry.get(Provider::TikTok).is_none());
    }

    #[test]
    fn test_configured_provider_is_available() {
        let registry =
            AdapterRegistry::from_config(&configured(Provider::Meta), Duration::from_secs(5))
                .unwrap();

        assert!(registry.is_configured(Provider::Meta));
        assert!(!registry.is_configured(Provider::Snapchat));
        let adapter = registry.get(Provider::Meta).unwrap().unwrap();
        assert_eq!(adapter.provider(), Provider::Meta);
    }

    #[test]
    fn test_with_adapter_overrides_slot() {
        let mut mock = MockProviderAdapter::new();
        mock.expect_provider().return_const(Provider::YouTube);

        let registry = AdapterRegistry::default().with_adapter(Arc::new(mock));
        assert!(registry.is_configured(Provider::YouTube));
    }
}
