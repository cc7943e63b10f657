//! Base OAuth2 provider implementation with shared logic
//!
//! This module provides `BaseOAuthProvider` which contains the authorization-URL
//! construction, code exchange and bearer-authenticated JSON lookups shared by
//! the Snapchat, Meta, LinkedIn and YouTube adapters.

use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};
use reqwest::header::ACCEPT;
use serde_json::Value;

use crate::oauth::http::{ProviderHttp, Stage};
use crate::oauth::types::{
    endpoint_or, generate_state_token, AuthorizationRequest, AuthorizeClient, Provider,
    ProviderConfig, ProviderCredentials, ProviderError,
};

/// Production endpoints of an OAuth2 provider
#[derive(Debug, Clone, Copy)]
pub struct Endpoints<'a> {
    /// Authorization endpoint
    pub auth_url: &'a str,
    /// Token endpoint
    pub token_url: &'a str,
    /// Default scopes
    pub scopes: &'a [&'a str],
}

/// Base OAuth2 provider containing shared logic for all OAuth2 adapters
pub struct BaseOAuthProvider {
    provider: Provider,
    client: AuthorizeClient,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    token_url: String,
    scopes: Vec<String>,
    http: ProviderHttp,
}

impl std::fmt::Debug for BaseOAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseOAuthProvider")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl BaseOAuthProvider {
    /// Create a new base OAuth2 provider
    ///
    /// # Errors
    ///
    /// Returns error if credentials are missing or any URL is invalid
    pub fn new(
        provider: Provider,
        config: &ProviderConfig,
        endpoints: Endpoints<'_>,
        http: ProviderHttp,
    ) -> Result<Self, ProviderError> {
        config.require_credentials(provider)?;

        let auth_url = endpoint_or(config.auth_url.as_ref(), endpoints.auth_url);
        let token_url = endpoint_or(config.token_url.as_ref(), endpoints.token_url);
        url::Url::parse(&token_url)
            .map_err(|e| ProviderError::InvalidEndpoint(format!("token URL: {e}")))?;

        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_auth_uri(
                AuthUrl::new(auth_url)
                    .map_err(|e| ProviderError::InvalidEndpoint(format!("auth URL: {e}")))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_uri.clone())
                    .map_err(|e| ProviderError::InvalidEndpoint(format!("redirect URI: {e}")))?,
            );

        Ok(Self {
            provider,
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            token_url,
            scopes: config.scopes_or(endpoints.scopes),
            http,
        })
    }

    /// Provider this base serves
    #[must_use]
    pub const fn provider(&self) -> Provider {
        self.provider
    }

    /// Shared HTTP client
    #[must_use]
    pub const fn http(&self) -> &ProviderHttp {
        &self.http
    }

    /// Client ID
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Client secret
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Token endpoint
    #[must_use]
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Requested scopes
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Generate an authorization URL with a fresh random state
    ///
    /// `extra` is appended as additional query parameters.
    #[must_use]
    pub fn authorization_url(
        &self,
        extra: &[(&'static str, &'static str)],
    ) -> AuthorizationRequest {
        let state = generate_state_token();

        let mut builder = self
            .client
            .authorize_url(|| CsrfToken::new(state.clone()))
            .add_scopes(self.scopes.iter().cloned().map(Scope::new));

        for (name, value) in extra {
            builder = builder.add_extra_param(*name, *value);
        }

        let (url, _) = builder.url();

        AuthorizationRequest {
            authorization_url: url.to_string(),
            state_key: state,
            request_secret: None,
        }
    }

    /// Exchange an authorization code for tokens
    ///
    /// Client credentials are sent in the form body.
    ///
    /// # Errors
    ///
    /// Returns error if the token endpoint fails or omits `access_token`
    pub async fn exchange_code(&self, code: &str) -> Result<ProviderCredentials, ProviderError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let request = self
            .http
            .client()
            .post(&self.token_url)
            .header(ACCEPT, "application/json")
            .form(&form);
        let response = self.http.send(request, Stage::Token).await?;
        let payload = ProviderHttp::read_json(response, Stage::Token).await?;

        credentials_from_token(&payload, &self.scopes)
    }

    /// Fetch JSON from a bearer-authenticated endpoint with optional headers
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP request fails or returns non-success status
    pub async fn fetch_json_with_headers(
        &self,
        url: &str,
        access_token: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<Value, ProviderError> {
        let mut request = self
            .http
            .client()
            .get(url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json");

        if !query.is_empty() {
            request = request.query(query);
        }
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = self.http.send(request, Stage::Identity).await?;
        ProviderHttp::read_json(response, Stage::Identity).await
    }
}

/// Read an OAuth2 token response leniently
///
/// Only `access_token` is required; `token_type` is ignored because some
/// providers omit it. A missing `scope` falls back to the requested scopes.
///
/// # Errors
///
/// Returns error if `access_token` is absent or blank
pub fn credentials_from_token(
    payload: &Value,
    requested_scopes: &[String],
) -> Result<ProviderCredentials, ProviderError> {
    let access_token = json_string(payload, "access_token")
        .ok_or_else(|| ProviderError::TokenExchangeFailed("response lacks access_token".into()))?;

    let scopes = json_string(payload, "scope").map_or_else(
        || requested_scopes.to_vec(),
        |raw| {
            raw.split(|c: char| c == ' ' || c == ',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        },
    );

    Ok(ProviderCredentials {
        access_token,
        access_token_secret: None,
        refresh_token: json_string(payload, "refresh_token"),
        scopes,
        expires_in: json_u64(payload, "expires_in"),
    })
}

/// Non-blank string field, accepting JSON numbers as well
#[must_use]
pub fn json_string(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Unsigned integer field, accepting numeric strings
#[must_use]
pub fn json_u64(value: &Value, key: &str) -> Option<u64> {
    match value.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
