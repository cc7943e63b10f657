//! Meta (Facebook) Marketing API provider
//!
//! The short-lived user token from the code exchange is immediately upgraded to
//! a long-lived token with a `fb_exchange_token` grant before the ad-account
//! lookup runs.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::base::{credentials_from_token, json_string, BaseOAuthProvider, Endpoints};
use super::ProviderAdapter;
use crate::oauth::http::{ProviderHttp, Stage};
use crate::oauth::types::{
    endpoint_or, AuthorizationRequest, CallbackGrant, LinkedIdentity, Provider, ProviderConfig,
    ProviderCredentials, ProviderError,
};

const DEFAULT_VERSION: &str = "v19.0";

/// Meta provider
#[derive(Debug)]
pub struct MetaProvider {
    base: BaseOAuthProvider,
    ad_accounts_url: String,
}

impl MetaProvider {
    /// Create a new Meta provider
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: &ProviderConfig, http: ProviderHttp) -> Result<Self, ProviderError> {
        let version = config
            .api_version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VERSION);

        let auth_url = format!("https://www.facebook.com/{version}/dialog/oauth");
        let token_url = format!("https://graph.facebook.com/{version}/oauth/access_token");
        let ad_accounts_url = format!("https://graph.facebook.com/{version}/me/adaccounts");

        let endpoints = Endpoints {
            auth_url: &auth_url,
            token_url: &token_url,
            scopes: &["ads_management", "ads_read", "business_management"],
        };

        Ok(Self {
            base: BaseOAuthProvider::new(Provider::Meta, config, endpoints, http)?,
            ad_accounts_url: endpoint_or(config.identity_url.as_ref(), &ad_accounts_url),
        })
    }

    /// Swap a short-lived user token for a long-lived one
    async fn long_lived(
        &self,
        short_lived: ProviderCredentials,
    ) -> Result<ProviderCredentials, ProviderError> {
        let query = [
            ("grant_type", "fb_exchange_token"),
            ("client_id", self.base.client_id()),
            ("client_secret", self.base.client_secret()),
            ("fb_exchange_token", short_lived.access_token.as_str()),
        ];
        let request = self.base.http().client().get(self.base.token_url()).query(&query);

        let response = self.base.http().send(request, Stage::Token).await?;
        let payload = ProviderHttp::read_json(response, Stage::Token).await?;
        let long_lived = credentials_from_token(&payload, &short_lived.scopes)?;

        Ok(ProviderCredentials {
            refresh_token: long_lived.refresh_token.or(short_lived.refresh_token),
            ..long_lived
        })
    }
}

#[async_trait]
impl ProviderAdapter for MetaProvider {
    fn provider(&self) -> Provider {
        Provider::Meta
    }

    async fn build_authorization_url(&self) -> Result<AuthorizationRequest, ProviderError> {
        Ok(self.base.authorization_url(&[]))
    }

    async fn exchange_and_identify(
        &self,
        grant: CallbackGrant,
        _request_secret: Option<String>,
    ) -> Result<LinkedIdentity, ProviderError> {
        let short_lived = self.base.exchange_code(grant.authorization_code()?).await?;
        let credentials = self.long_lived(short_lived).await?;

        let body = self
            .base
            .fetch_json_with_headers(
                &self.ad_accounts_url,
                &credentials.access_token,
                &[("fields", "account_id,name,account_status,currency")],
                &[],
            )
            .await?;

        let accounts = body
            .get("data")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let Some(first) = accounts.first() else {
            return Err(ProviderError::NoLinkableAccount(Provider::Meta));
        };

        let external_account_id = json_string(first, "account_id")
            .or_else(|| {
                json_string(first, "id").map(|id| id.trim_start_matches("act_").to_string())
            })
            .ok_or_else(|| ProviderError::IdentityFetchFailed("ad account without id".into()))?;

        Ok(LinkedIdentity {
            external_account_id: Some(external_account_id),
            account_name: json_string(first, "name"),
            metadata: json!({
                "ad_account": first,
                "ad_account_count": accounts.len(),
                "expires_in": credentials.expires_in,
            }),
            credentials,
        })
    }
}
