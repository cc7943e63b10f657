//! Shared HTTP client for provider calls
//!
//! Every outbound request (request tokens, token exchanges, advertising-account
//! lookups) goes through [`ProviderHttp`] so that redirects are never followed,
//! each call is bounded by the configured timeout, and failures map onto
//! [`ProviderError`] the same way for every provider.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::redirect::Policy;
use serde_json::Value;

use super::types::ProviderError;

/// Longest response excerpt carried in an error message
const BODY_EXCERPT: usize = 240;

/// Which leg of the handshake a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Request-token, token-exchange or long-lived-token call
    Token,
    /// Advertising-account lookup
    Identity,
}

impl Stage {
    fn failure(self, message: String) -> ProviderError {
        match self {
            Self::Token => ProviderError::TokenExchangeFailed(message),
            Self::Identity => ProviderError::IdentityFetchFailed(message),
        }
    }
}

/// HTTP client shared by all provider adapters
#[derive(Debug, Clone)]
pub struct ProviderHttp {
    client: reqwest::Client,
}

impl ProviderHttp {
    /// Build a client with redirects disabled and a per-request timeout
    ///
    /// # Errors
    ///
    /// Returns error if the TLS backend cannot be initialised
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .user_agent(concat!("acton-adlink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::UpstreamTransport(format!("HTTP client setup: {e}")))?;

        Ok(Self { client })
    }

    /// Underlying reqwest client
    #[must_use]
    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Send a request, mapping transport failures
    ///
    /// Timeouts and connection failures become [`ProviderError::UpstreamTransport`];
    /// anything else is attributed to `stage`.
    ///
    /// # Errors
    ///
    /// Returns error if the request could not be completed
    pub async fn send(
        &self,
        request: reqwest::RequestBuilder,
        stage: Stage,
    ) -> Result<reqwest::Response, ProviderError> {
        request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ProviderError::UpstreamTransport(e.without_url().to_string())
            } else {
                stage.failure(e.without_url().to_string())
            }
        })
    }

    /// Read a successful JSON response body
    ///
    /// # Errors
    ///
    /// Returns error for non-2xx statuses or unparseable bodies
    pub async fn read_json(
        response: reqwest::Response,
        stage: Stage,
    ) -> Result<Value, ProviderError> {
        let body = Self::read_success_body(response, stage).await?;
        serde_json::from_str(&body)
            .map_err(|e| stage.failure(format!("invalid JSON response: {e}")))
    }

    /// Read a successful `application/x-www-form-urlencoded` response body
    ///
    /// # Errors
    ///
    /// Returns error for non-2xx statuses
    pub async fn read_form(
        response: reqwest::Response,
        stage: Stage,
    ) -> Result<HashMap<String, String>, ProviderError> {
        let body = Self::read_success_body(response, stage).await?;
        Ok(url::form_urlencoded::parse(body.trim().as_bytes())
            .into_owned()
            .collect())
    }

    async fn read_success_body(
        response: reqwest::Response,
        stage: Stage,
    ) -> Result<String, ProviderError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::UpstreamTransport(e.without_url().to_string()))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(stage.failure(format!("HTTP {}: {}", status.as_u16(), excerpt(&body))))
        }
    }
}

/// Trim a response body for inclusion in an error message
fn excerpt(body: &str) -> &str {
    let body = body.trim();
    match body.char_indices().nth(BODY_EXCERPT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
