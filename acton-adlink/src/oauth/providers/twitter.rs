//! Twitter / X Ads provider (OAuth 1.0a)
//!
//! Three-legged flow: a signed request-token call, user authorization, then a
//! signed access-token call with the verifier. The ads account is resolved from
//! the Ads API; when that lookup fails or returns nothing the link still
//! succeeds, keyed by workspace, with `ads_access: false` in its metadata.

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use super::base::json_string;
use super::oauth1::{OAuth1Signer, TokenPair};
use super::ProviderAdapter;
use crate::oauth::http::{ProviderHttp, Stage};
use crate::oauth::types::{
    endpoint_or, AuthorizationRequest, CallbackGrant, LinkedIdentity, Provider, ProviderConfig,
    ProviderCredentials, ProviderError,
};

const REQUEST_TOKEN_URL: &str = "https://api.twitter.com/oauth/request_token";
const AUTHORIZE_URL: &str = "https://api.twitter.com/oauth/authorize";
const ACCESS_TOKEN_URL: &str = "https://api.twitter.com/oauth/access_token";
const ACCOUNTS_URL: &str = "https://ads-api.twitter.com/12/accounts";

/// Twitter / X Ads provider
#[derive(Debug)]
pub struct TwitterProvider {
    signer: OAuth1Signer,
    callback_url: String,
    request_token_url: Url,
    authorize_url: Url,
    access_token_url: Url,
    accounts_url: Url,
    http: ProviderHttp,
}

fn parse_endpoint(configured: Option<&String>, default: &str) -> Result<Url, ProviderError> {
    let raw = endpoint_or(configured, default);
    Url::parse(&raw).map_err(|e| ProviderError::InvalidEndpoint(format!("{raw}: {e}")))
}

impl TwitterProvider {
    /// Create a new Twitter provider
    ///
    /// # Errors
    ///
    /// Returns error if credentials are missing or any URL is invalid
    pub fn new(config: &ProviderConfig, http: ProviderHttp) -> Result<Self, ProviderError> {
        config.require_credentials(Provider::Twitter)?;

        let mut request_token_url =
            parse_endpoint(config.request_token_url.as_ref(), REQUEST_TOKEN_URL)?;
        request_token_url
            .query_pairs_mut()
            .append_pair("x_auth_access_type", "write");

        Ok(Self {
            signer: OAuth1Signer::new(config.client_id.clone(), config.client_secret.clone()),
            callback_url: config.redirect_uri.clone(),
            request_token_url,
            authorize_url: parse_endpoint(config.auth_url.as_ref(), AUTHORIZE_URL)?,
            access_token_url: parse_endpoint(config.token_url.as_ref(), ACCESS_TOKEN_URL)?,
            accounts_url: parse_endpoint(config.identity_url.as_ref(), ACCOUNTS_URL)?,
            http,
        })
    }

    async fn signed_post(
        &self,
        url: &Url,
        token: Option<TokenPair<'_>>,
        extra_oauth: &[(&str, &str)],
    ) -> Result<std::collections::HashMap<String, String>, ProviderError> {
        let header = self
            .signer
            .authorization_header("POST", url, token, extra_oauth, &[]);
        let request = self
            .http
            .client()
            .post(url.as_str())
            .header(reqwest::header::AUTHORIZATION, header);

        let response = self.http.send(request, Stage::Token).await?;
        ProviderHttp::read_form(response, Stage::Token).await
    }

    /// Look up the user's ads accounts, returning `Err` with a reason on any failure
    async fn fetch_ads_accounts(&self, token: TokenPair<'_>) -> Result<Vec<Value>, String> {
        let header = self
            .signer
            .authorization_header("GET", &self.accounts_url, Some(token), &[], &[]);
        let request = self
            .http
            .client()
            .get(self.accounts_url.as_str())
            .header(reqwest::header::AUTHORIZATION, header);

        let response = self
            .http
            .send(request, Stage::Identity)
            .await
            .map_err(|e| e.to_string())?;
        let body = ProviderHttp::read_json(response, Stage::Identity)
            .await
            .map_err(|e| e.to_string())?;

        Ok(body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ProviderAdapter for TwitterProvider {
    fn provider(&self) -> Provider {
        Provider::Twitter
    }

    async fn build_authorization_url(&self) -> Result<AuthorizationRequest, ProviderError> {
        let response = self
            .signed_post(
                &self.request_token_url,
                None,
                &[("oauth_callback", self.callback_url.as_str())],
            )
            .await?;

        let token = response
            .get("oauth_token")
            .filter(|t| !t.is_empty())
            .cloned()
            .ok_or_else(|| ProviderError::TokenExchangeFailed("request token missing".into()))?;
        let secret = response
            .get("oauth_token_secret")
            .cloned()
            .unwrap_or_default();

        let mut authorization_url = self.authorize_url.clone();
        authorization_url
            .query_pairs_mut()
            .append_pair("oauth_token", &token);

        Ok(AuthorizationRequest {
            authorization_url: authorization_url.into(),
            state_key: token,
            request_secret: Some(secret),
        })
    }

    async fn exchange_and_identify(
        &self,
        grant: CallbackGrant,
        request_secret: Option<String>,
    ) -> Result<LinkedIdentity, ProviderError> {
        let CallbackGrant::OAuth1 { token, verifier } = grant else {
            return Err(ProviderError::TokenExchangeFailed(
                "callback carried an OAuth2 grant".into(),
            ));
        };

        let response = self
            .signed_post(
                &self.access_token_url,
                Some(TokenPair {
                    token: &token,
                    secret: request_secret.as_deref().unwrap_or_default(),
                }),
                &[("oauth_verifier", verifier.as_str())],
            )
            .await?;

        let access_token = response
            .get("oauth_token")
            .filter(|t| !t.is_empty())
            .cloned()
            .ok_or_else(|| ProviderError::TokenExchangeFailed("access token missing".into()))?;
        let access_secret = response
            .get("oauth_token_secret")
            .cloned()
            .unwrap_or_default();
        let screen_name = response.get("screen_name").cloned();
        let user_id = response.get("user_id").cloned();

        let credentials = ProviderCredentials {
            access_token: access_token.clone(),
            access_token_secret: Some(access_secret.clone()),
            ..ProviderCredentials::default()
        };

        let lookup = self
            .fetch_ads_accounts(TokenPair {
                token: &access_token,
                secret: &access_secret,
            })
            .await;

        let identity = match lookup {
            Ok(accounts) if !accounts.is_empty() => {
                let first = &accounts[0];
                let summaries: Vec<Value> = accounts
                    .iter()
                    .map(|a| json!({ "id": json_string(a, "id"), "name": json_string(a, "name") }))
                    .collect();
                LinkedIdentity {
                    external_account_id: json_string(first, "id"),
                    account_name: json_string(first, "name").or_else(|| screen_name.clone()),
                    credentials,
                    metadata: json!({
                        "screen_name": screen_name,
                        "user_id": user_id,
                        "ads_access": true,
                        "ads_accounts": summaries,
                    }),
                }
            }
            outcome => {
                let reason = outcome
                    .err()
                    .unwrap_or_else(|| "no ads accounts returned".to_string());
                tracing::warn!(
                    provider = "twitter",
                    reason = %reason,
                    "Ads account lookup failed, linking without ads access"
                );
                LinkedIdentity {
                    external_account_id: None,
                    account_name: screen_name.clone(),
                    credentials,
                    metadata: json!({
                        "screen_name": screen_name,
                        "user_id": user_id,
                        "ads_access": false,
                        "ads_error": reason,
                    }),
                }
            }
        };

        Ok(identity)
    }
}
