//! LinkedIn Marketing API provider

use async_trait::async_trait;
use serde_json::{json, Value};

use super::base::{json_string, BaseOAuthProvider, Endpoints};
use super::ProviderAdapter;
use crate::oauth::http::ProviderHttp;
use crate::oauth::types::{
    endpoint_or, AuthorizationRequest, CallbackGrant, LinkedIdentity, Provider, ProviderConfig,
    ProviderError,
};

const ENDPOINTS: Endpoints<'static> = Endpoints {
    auth_url: "https://www.linkedin.com/oauth/v2/authorization",
    token_url: "https://www.linkedin.com/oauth/v2/accessToken",
    scopes: &["r_ads", "rw_ads", "r_ads_reporting"],
};

const AD_ACCOUNTS_URL: &str = "https://api.linkedin.com/rest/adAccounts";
const DEFAULT_VERSION: &str = "202401";

/// LinkedIn provider
#[derive(Debug)]
pub struct LinkedInProvider {
    base: BaseOAuthProvider,
    ad_accounts_url: String,
    api_version: String,
}

impl LinkedInProvider {
    /// Create a new LinkedIn provider
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: &ProviderConfig, http: ProviderHttp) -> Result<Self, ProviderError> {
        Ok(Self {
            base: BaseOAuthProvider::new(Provider::LinkedIn, config, ENDPOINTS, http)?,
            ad_accounts_url: endpoint_or(config.identity_url.as_ref(), AD_ACCOUNTS_URL),
            api_version: endpoint_or(config.api_version.as_ref(), DEFAULT_VERSION),
        })
    }
}

#[async_trait]
impl ProviderAdapter for LinkedInProvider {
    fn provider(&self) -> Provider {
        Provider::LinkedIn
    }

    async fn build_authorization_url(&self) -> Result<AuthorizationRequest, ProviderError> {
        Ok(self.base.authorization_url(&[]))
    }

    async fn exchange_and_identify(
        &self,
        grant: CallbackGrant,
        _request_secret: Option<String>,
    ) -> Result<LinkedIdentity, ProviderError> {
        let credentials = self.base.exchange_code(grant.authorization_code()?).await?;

        let body = self
            .base
            .fetch_json_with_headers(
                &self.ad_accounts_url,
                &credentials.access_token,
                &[("q", "search")],
                &[
                    ("LinkedIn-Version", self.api_version.as_str()),
                    ("X-Restli-Protocol-Version", "2.0.0"),
                ],
            )
            .await?;

        let elements = body
            .get("elements")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let Some(first) = elements.first() else {
            return Err(ProviderError::NoLinkableAccount(Provider::LinkedIn));
        };

        let external_account_id = json_string(first, "id")
            .ok_or_else(|| ProviderError::IdentityFetchFailed("ad account without id".into()))?;

        Ok(LinkedIdentity {
            external_account_id: Some(external_account_id),
            account_name: json_string(first, "name"),
            metadata: json!({
                "ad_account": first,
                "ad_account_count": elements.len(),
                "expires_in": credentials.expires_in,
            }),
            credentials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> LinkedInProvider {
        let config = ProviderConfig {
            client_id: "li-id".to_string(),
            client_secret: "li-secret".to_string(),
            redirect_uri: "https://api.example/cb/linkedin".to_string(),
            token_url: Some(format!("{}/oauth/v2/accessToken", server.uri())),
            identity_url: Some(format!("{}/rest/adAccounts", server.uri())),
            ..ProviderConfig::default()
        };
        LinkedInProvider::new(&config, ProviderHttp::new(Duration::from_secs(5)).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_numeric_account_id_is_stringified() {
        let server = MockServer::start().await;
        // LinkedIn omits token_type
        Mock::given(method("POST"))
            .and(path("/oauth/v2/accessToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "li-at", "expires_in": 5_184_000, "scope": "r_ads,rw_ads"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/adAccounts"))
            .and(query_param("q", "search"))
            .and(header("LinkedIn-Version", "202401"))
            .and(header("X-Restli-Protocol-Version", "2.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "elements": [{"id": 508_000_111, "name": "Acme Sponsored"}]
            })))
            .mount(&server)
            .await;

        let identity = provider(&server)
            .exchange_and_identify(CallbackGrant::OAuth2 { code: "c".to_string() }, None)
            .await
            .unwrap();

        assert_eq!(identity.external_account_id.as_deref(), Some("508000111"));
        assert_eq!(identity.account_name.as_deref(), Some("Acme Sponsored"));
        assert_eq!(identity.credentials.scopes, vec!["r_ads", "rw_ads"]);
    }

    #[tokio::test]
    async fn test_empty_elements_is_not_linkable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/accessToken"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "li-at"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/adAccounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"elements": []})))
            .mount(&server)
            .await;

        let err = provider(&server)
            .exchange_and_identify(CallbackGrant::OAuth2 { code: "c".to_string() }, None)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::NoLinkableAccount(Provider::LinkedIn));
    }

    #[tokio::test]
    async fn test_oauth1_grant_is_rejected() {
        let server = MockServer::start().await;
        let err = provider(&server)
            .exchange_and_identify(
                CallbackGrant::OAuth1 {
                    token: "t".to_string(),
                    verifier: "v".to_string(),
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::TokenExchangeFailed(_)));
    }
}
