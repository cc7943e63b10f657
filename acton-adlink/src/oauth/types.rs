//! Core account-linking types and provider configuration
//!
//! This module defines the provider identifiers, per-provider configuration,
//! the pending-request record kept between start and callback, and the
//! credential/identity values produced by a completed handshake.

use oauth2::basic::BasicClient;
use oauth2::{EndpointNotSet, EndpointSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OAuth2 client used only to build authorization URLs
///
/// Token exchange is performed by [`ProviderHttp`](super::http::ProviderHttp) because
/// several providers return token payloads that do not follow RFC 6749 strictly.
pub type AuthorizeClient = BasicClient<
    EndpointSet,    // HasAuthUrl
    EndpointNotSet, // HasDeviceAuthUrl
    EndpointNotSet, // HasIntrospectionUrl
    EndpointNotSet, // HasRevocationUrl
    EndpointNotSet, // HasTokenUrl
>;

/// Advertising platform identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Twitter / X Ads (OAuth 1.0a)
    Twitter,
    /// Snapchat Marketing API
    Snapchat,
    /// Meta (Facebook) Marketing API
    Meta,
    /// TikTok for Business (reserved, no adapter)
    TikTok,
    /// LinkedIn Marketing API
    LinkedIn,
    /// YouTube Data API
    YouTube,
}

impl Provider {
    /// Providers that have a linking adapter
    pub const LINKABLE: [Self; 5] = [
        Self::Twitter,
        Self::Snapchat,
        Self::Meta,
        Self::LinkedIn,
        Self::YouTube,
    ];

    /// Get the provider as a string (lowercase)
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Snapchat => "snapchat",
            Self::Meta => "meta",
            Self::TikTok => "tiktok",
            Self::LinkedIn => "linkedin",
            Self::YouTube => "youtube",
        }
    }

    /// Handshake protocol spoken by this provider
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        match self {
            Self::Twitter => Protocol::OAuth1,
            _ => Protocol::OAuth2,
        }
    }

    /// Key prefix used for this provider's pending requests in the state store
    #[must_use]
    pub const fn state_prefix(&self) -> &'static str {
        match self {
            Self::Twitter => "twreq",
            Self::Snapchat => "snapreq",
            Self::Meta => "metareq",
            Self::TikTok => "ttreq",
            Self::LinkedIn => "lireq",
            Self::YouTube => "ytreq",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a provider name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "twitter" | "x" => Ok(Self::Twitter),
            "snapchat" => Ok(Self::Snapchat),
            "meta" | "facebook" => Ok(Self::Meta),
            "tiktok" => Ok(Self::TikTok),
            "linkedin" => Ok(Self::LinkedIn),
            "youtube" => Ok(Self::YouTube),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = UnknownProvider;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// OAuth protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Three-legged OAuth 1.0a with HMAC-SHA1 signatures
    OAuth1,
    /// OAuth 2.0 authorization-code grant
    OAuth2,
}

/// Configuration for one provider
///
/// Endpoint fields are optional overrides of the provider's production URLs.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Client ID (consumer key for OAuth1)
    pub client_id: String,
    /// Client secret (consumer secret for OAuth1)
    pub client_secret: String,
    /// Callback URL registered with the provider
    pub redirect_uri: String,
    /// Scopes to request; empty uses the provider's defaults
    pub scopes: Vec<String>,
    /// Authorization endpoint override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    /// Token endpoint override (access-token endpoint for OAuth1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    /// OAuth1 request-token endpoint override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_token_url: Option<String>,
    /// Advertising-account lookup endpoint override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_url: Option<String>,
    /// API version sent to providers that version their REST surface
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("request_token_url", &self.request_token_url)
            .field("identity_url", &self.identity_url)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl ProviderConfig {
    /// Names of the required fields that are blank
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", &self.redirect_uri),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Fail with [`ProviderError::ConfigurationMissing`] unless credentials are present
    ///
    /// # Errors
    ///
    /// Returns error naming each blank required field
    pub fn require_credentials(&self, provider: Provider) -> Result<(), ProviderError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::ConfigurationMissing { provider, missing })
        }
    }

    /// Configured scopes, or `defaults` when none are configured
    #[must_use]
    pub fn scopes_or(&self, defaults: &[&str]) -> Vec<String> {
        let configured: Vec<String> = self
            .scopes
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if configured.is_empty() {
            defaults.iter().map(|s| (*s).to_string()).collect()
        } else {
            configured
        }
    }
}

/// Pick an endpoint override or fall back to the provider default
pub(crate) fn endpoint_or(configured: Option<&String>, default: &str) -> String {
    configured
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Configuration for all providers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Twitter / X Ads configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter: Option<ProviderConfig>,
    /// Snapchat configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapchat: Option<ProviderConfig>,
    /// Meta configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ProviderConfig>,
    /// LinkedIn configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<ProviderConfig>,
    /// YouTube configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube: Option<ProviderConfig>,
}

impl OAuthConfig {
    /// Get a reference to the provider configuration option
    #[must_use]
    pub const fn provider_config(&self, provider: Provider) -> Option<&ProviderConfig> {
        match provider {
            Provider::Twitter => self.twitter.as_ref(),
            Provider::Snapchat => self.snapchat.as_ref(),
            Provider::Meta => self.meta.as_ref(),
            Provider::LinkedIn => self.linkedin.as_ref(),
            Provider::YouTube => self.youtube.as_ref(),
            Provider::TikTok => None,
        }
    }

    /// Set configuration for a provider
    #[must_use]
    pub fn with_provider(mut self, provider: Provider, config: ProviderConfig) -> Self {
        let slot = match provider {
            Provider::Twitter => &mut self.twitter,
            Provider::Snapchat => &mut self.snapchat,
            Provider::Meta => &mut self.meta,
            Provider::LinkedIn => &mut self.linkedin,
            Provider::YouTube => &mut self.youtube,
            Provider::TikTok => return self,
        };
        *slot = Some(config);
        self
    }

    /// Check if a provider has complete credentials
    #[must_use]
    pub fn is_provider_configured(&self, provider: Provider) -> bool {
        self.provider_config(provider)
            .is_some_and(|c| c.missing_fields().is_empty())
    }
}

/// In-flight authorization request, stored between start and callback
///
/// Serialized as JSON under `"{provider prefix}:{state key}"`. For OAuth1 the
/// state key is the request token and `secret` holds the request-token secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOAuthRequest {
    /// Workspace that initiated the link
    pub workspace_id: String,
    /// Where the browser is sent once the callback completes
    pub return_url: String,
    /// OAuth1 request-token secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Result of building an authorization URL
#[derive(Clone)]
pub struct AuthorizationRequest {
    /// URL the user agent should visit
    pub authorization_url: String,
    /// Correlation token the provider echoes back (state or request token)
    pub state_key: String,
    /// OAuth1 request-token secret
    pub request_secret: Option<String>,
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("authorization_url", &self.authorization_url)
            .field("state_key", &self.state_key)
            .field("request_secret", &self.request_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Query parameters a provider may send to the callback
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// OAuth1 request token
    pub oauth_token: Option<String>,
    /// OAuth1 verifier
    pub oauth_verifier: Option<String>,
    /// OAuth1 denial (carries the request token)
    pub denied: Option<String>,
    /// OAuth2 authorization code
    pub code: Option<String>,
    /// OAuth2 state
    pub state: Option<String>,
    /// OAuth2 error code
    pub error: Option<String>,
    /// OAuth2 error description
    pub error_description: Option<String>,
    /// Meta's additional error reason
    pub error_reason: Option<String>,
}

/// Non-blank parameter value
pub(crate) fn present(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Provider-reported denial carried by a callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDenial {
    /// Correlation token, if the provider sent one
    pub state_key: Option<String>,
    /// Provider error code
    pub error: String,
    /// Provider error text
    pub description: Option<String>,
}

impl CallbackParams {
    /// Extract a provider denial, if the callback carries one
    #[must_use]
    pub fn denial(&self, protocol: Protocol) -> Option<ProviderDenial> {
        match protocol {
            Protocol::OAuth1 => present(self.denied.as_ref()).map(|token| ProviderDenial {
                state_key: Some(token.to_string()),
                error: "access_denied".to_string(),
                description: None,
            }),
            Protocol::OAuth2 => present(self.error.as_ref()).map(|error| ProviderDenial {
                state_key: present(self.state.as_ref()).map(str::to_string),
                error: error.to_string(),
                description: present(self.error_description.as_ref())
                    .or_else(|| present(self.error_reason.as_ref()))
                    .map(str::to_string),
            }),
        }
    }

    /// Extract the correlation token and grant for a successful callback
    #[must_use]
    pub fn grant(&self, protocol: Protocol) -> Option<(String, CallbackGrant)> {
        match protocol {
            Protocol::OAuth1 => {
                let token = present(self.oauth_token.as_ref())?;
                let verifier = present(self.oauth_verifier.as_ref())?;
                Some((
                    token.to_string(),
                    CallbackGrant::OAuth1 {
                        token: token.to_string(),
                        verifier: verifier.to_string(),
                    },
                ))
            }
            Protocol::OAuth2 => {
                let state = present(self.state.as_ref())?;
                let code = present(self.code.as_ref())?;
                Some((
                    state.to_string(),
                    CallbackGrant::OAuth2 {
                        code: code.to_string(),
                    },
                ))
            }
        }
    }
}

/// Grant material carried by a successful callback
#[derive(Clone, PartialEq, Eq)]
pub enum CallbackGrant {
    /// OAuth1 request token plus verifier
    OAuth1 {
        /// Request token
        token: String,
        /// Verifier
        verifier: String,
    },
    /// OAuth2 authorization code
    OAuth2 {
        /// Authorization code
        code: String,
    },
}

impl fmt::Debug for CallbackGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OAuth1 { .. } => f.write_str("CallbackGrant::OAuth1 { .. }"),
            Self::OAuth2 { .. } => f.write_str("CallbackGrant::OAuth2 { .. }"),
        }
    }
}

impl CallbackGrant {
    /// Authorization code of an OAuth2 grant
    ///
    /// # Errors
    ///
    /// Returns error for an OAuth1 grant
    pub fn authorization_code(&self) -> Result<&str, ProviderError> {
        match self {
            Self::OAuth2 { code } => Ok(code),
            Self::OAuth1 { .. } => Err(ProviderError::TokenExchangeFailed(
                "callback carried an OAuth1 grant".to_string(),
            )),
        }
    }
}

/// Credentials obtained from a provider
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    /// Access token
    pub access_token: String,
    /// OAuth1 token secret
    pub access_token_secret: Option<String>,
    /// Refresh token
    pub refresh_token: Option<String>,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Access token lifetime in seconds
    pub expires_in: Option<u64>,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("access_token", &"<redacted>")
            .field("has_secret", &self.access_token_secret.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scopes", &self.scopes)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Advertising identity resolved after the token exchange
#[derive(Debug, Clone)]
pub struct LinkedIdentity {
    /// Provider-side advertising account ID (absent on degraded OAuth1 links)
    pub external_account_id: Option<String>,
    /// Display name
    pub account_name: Option<String>,
    /// Tokens to persist
    pub credentials: ProviderCredentials,
    /// Provider-specific details stored alongside the account
    pub metadata: serde_json::Value,
}

/// Errors raised by provider adapters
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Required provider settings are absent
    #[error("{provider} is not configured (missing: {})", .missing.join(", "))]
    ConfigurationMissing {
        /// Provider lacking configuration
        provider: Provider,
        /// Blank required fields
        missing: Vec<&'static str>,
    },

    /// Configured endpoint could not be parsed
    #[error("invalid provider endpoint: {0}")]
    InvalidEndpoint(String),

    /// Token endpoint rejected the request
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// Advertising-account lookup failed
    #[error("identity lookup failed: {0}")]
    IdentityFetchFailed(String),

    /// The authorizing user has no advertising account
    #[error("no linkable {0} advertising account was returned")]
    NoLinkableAccount(Provider),

    /// Provider could not be reached in time
    #[error("provider unreachable: {0}")]
    UpstreamTransport(String),
}

impl ProviderError {
    /// Stable machine-readable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing { .. } => "configuration_missing",
            Self::InvalidEndpoint(_) => "invalid_endpoint",
            Self::TokenExchangeFailed(_) => "token_exchange_failed",
            Self::IdentityFetchFailed(_) => "identity_fetch_failed",
            Self::NoLinkableAccount(_) => "no_linkable_account",
            Self::UpstreamTransport(_) => "upstream_unavailable",
        }
    }
}

/// Generate a new random state token (32 random bytes, hex encoded)
#[must_use]
pub fn generate_state_token() -> String {
    use rand::Rng;

    let random_bytes: [u8; 32] = rand::rng().random();
    hex::encode(random_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trips_through_str() {
        for provider in Provider::LINKABLE {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
        }
        assert_eq!("TikTok".parse::<Provider>().unwrap(), Provider::TikTok);
        assert!("myspace".parse::<Provider>().is_err());
    }

    #[test]
    fn test_state_prefixes_are_distinct() {
        let mut prefixes: Vec<_> = Provider::LINKABLE.iter().map(Provider::state_prefix).collect();
        prefixes.sort_unstable();
        prefixes.dedup();
        assert_eq!(prefixes.len(), Provider::LINKABLE.len());
    }

    #[test]
    fn test_only_twitter_speaks_oauth1() {
        assert_eq!(Provider::Twitter.protocol(), Protocol::OAuth1);
        assert_eq!(Provider::Meta.protocol(), Protocol::OAuth2);
    }

    #[test]
    fn test_missing_fields_lists_blank_credentials() {
        let config = ProviderConfig {
            client_id: "id".to_string(),
            client_secret: "  ".to_string(),
            ..ProviderConfig::default()
        };

        assert_eq!(config.missing_fields(), vec!["client_secret", "redirect_uri"]);
        let err = config.require_credentials(Provider::Meta).unwrap_err();
        assert!(err.to_string().contains("client_secret, redirect_uri"));
    }

    #[test]
    fn test_debug_redacts_client_secret() {
        let config = ProviderConfig {
            client_secret: "hunter2".to_string(),
            ..ProviderConfig::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_scopes_fall_back_to_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.scopes_or(&["a", "b"]), vec!["a", "b"]);

        let config = ProviderConfig {
            scopes: vec!["custom".to_string()],
            ..ProviderConfig::default()
        };
        assert_eq!(config.scopes_or(&["a"]), vec!["custom"]);
    }

    #[test]
    fn test_pending_request_omits_absent_secret() {
        let pending = PendingOAuthRequest {
            workspace_id: "ws1".to_string(),
            return_url: "https://app/ad-accounts/ws1".to_string(),
            secret: None,
        };
        let json = serde_json::to_value(&pending).unwrap();
        assert!(json.get("secret").is_none());
    }

    #[test]
    fn test_oauth2_callback_grant_requires_code_and_state() {
        let params = CallbackParams {
            code: Some("abc".to_string()),
            ..CallbackParams::default()
        };
        assert!(params.grant(Protocol::OAuth2).is_none());

        let params = CallbackParams {
            code: Some("abc".to_string()),
            state: Some("xyz".to_string()),
            ..CallbackParams::default()
        };
        let (key, grant) = params.grant(Protocol::OAuth2).unwrap();
        assert_eq!(key, "xyz");
        assert_eq!(grant.authorization_code().unwrap(), "abc");
    }

    #[test]
    fn test_oauth1_denial_uses_denied_token() {
        let params = CallbackParams {
            denied: Some("reqtok".to_string()),
            ..CallbackParams::default()
        };
        let denial = params.denial(Protocol::OAuth1).unwrap();
        assert_eq!(denial.state_key.as_deref(), Some("reqtok"));
        assert_eq!(denial.error, "access_denied");
    }

    #[test]
    fn test_oauth2_denial_prefers_description_over_reason() {
        let params = CallbackParams {
            error: Some("access_denied".to_string()),
            error_reason: Some("user_denied".to_string()),
            state: Some("s1".to_string()),
            ..CallbackParams::default()
        };
        let denial = params.denial(Protocol::OAuth2).unwrap();
        assert_eq!(denial.description.as_deref(), Some("user_denied"));
        assert_eq!(denial.state_key.as_deref(), Some("s1"));
    }

    #[test]
    fn test_generated_state_tokens_are_unique_hex() {
        let a = generate_state_token();
        let b = generate_state_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
