//! Snapchat Marketing API provider
//!
//! Ad accounts hang off organizations; the first ad account in organization
//! order is linked.

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
    auth_url: "https://accounts.snapchat.com/login/oauth2/authorize",
    token_url: "https://accounts.snapchat.com/login/oauth2/access_token",
    scopes: &["snapchat-marketing-api"],
};

const ORGANIZATIONS_URL: &str = "https://adsapi.snapchat.com/v1/me/organizations";

/// Snapchat provider
#[derive(Debug)]
pub struct SnapchatProvider {
    base: BaseOAuthProvider,
    organizations_url: String,
}

impl SnapchatProvider {
    /// Create a new Snapchat provider
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: &ProviderConfig, http: ProviderHttp) -> Result<Self, ProviderError> {
        Ok(Self {
            base: BaseOAuthProvider::new(Provider::Snapchat, config, ENDPOINTS, http)?,
            organizations_url: endpoint_or(config.identity_url.as_ref(), ORGANIZATIONS_URL),
        })
    }
}

/// Flatten `organizations[].organization.ad_accounts[]`, keeping organization order
fn ad_accounts(body: &Value) -> Vec<(&Value, &Value)> {
    body.get("organizations")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("organization"))
        .flat_map(|org| {
            org.get("ad_accounts")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .map(move |account| (org, account))
        })
        .collect()
}

#[async_trait]
impl ProviderAdapter for SnapchatProvider {
    fn provider(&self) -> Provider {
        Provider::Snapchat
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
                &self.organizations_url,
                &credentials.access_token,
                &[("with_ad_accounts", "true")],
                &[],
            )
            .await?;

        let accounts = ad_accounts(&body);
        let Some((org, account)) = accounts.first().copied() else {
            return Err(ProviderError::NoLinkableAccount(Provider::Snapchat));
        };

        let external_account_id = json_string(account, "id")
            .ok_or_else(|| ProviderError::IdentityFetchFailed("ad account without id".into()))?;

        Ok(LinkedIdentity {
            external_account_id: Some(external_account_id),
            account_name: json_string(account, "name"),
            metadata: json!({
                "organization_id": json_string(org, "id"),
                "organization_name": json_string(org, "name"),
                "ad_account_count": accounts.len(),
                "expires_in": credentials.expires_in,
            }),
            credentials,
        })
    }
}
