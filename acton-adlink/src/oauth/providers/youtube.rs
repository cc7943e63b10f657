//! YouTube provider (Google OAuth2)
//!
//! Requests offline access with a forced consent prompt so that Google issues
//! a refresh token on every link.

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
    auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
    token_url: "https://oauth2.googleapis.com/token",
    scopes: &[
        "https://www.googleapis.com/auth/youtube.readonly",
        "https://www.googleapis.com/auth/youtube.upload",
    ],
};

const CHANNELS_URL: &str = "https://www.googleapis.com/youtube/v3/channels";

/// YouTube provider
#[derive(Debug)]
pub struct YouTubeProvider {
    base: BaseOAuthProvider,
    channels_url: String,
}

impl YouTubeProvider {
    /// Create a new YouTube provider
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: &ProviderConfig, http: ProviderHttp) -> Result<Self, ProviderError> {
        Ok(Self {
            base: BaseOAuthProvider::new(Provider::YouTube, config, ENDPOINTS, http)?,
            channels_url: endpoint_or(config.identity_url.as_ref(), CHANNELS_URL),
        })
    }
}

#[async_trait]
impl ProviderAdapter for YouTubeProvider {
    fn provider(&self) -> Provider {
        Provider::YouTube
    }

    async fn build_authorization_url(&self) -> Result<AuthorizationRequest, ProviderError> {
        Ok(self.base.authorization_url(&[
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("include_granted_scopes", "true"),
        ]))
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
                &self.channels_url,
                &credentials.access_token,
                &[("part", "snippet"), ("mine", "true")],
                &[],
            )
            .await?;

        let items = body
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let Some(channel) = items.first() else {
            return Err(ProviderError::NoLinkableAccount(Provider::YouTube));
        };

        let external_account_id = json_string(channel, "id")
            .ok_or_else(|| ProviderError::IdentityFetchFailed("channel without id".into()))?;
        let snippet = channel.get("snippet").cloned().unwrap_or(Value::Null);

        Ok(LinkedIdentity {
            external_account_id: Some(external_account_id),
            account_name: json_string(&snippet, "title"),
            metadata: json!({
                "channel": {
                    "title": snippet.get("title"),
                    "custom_url": snippet.get("customUrl"),
                    "thumbnails": snippet.get("thumbnails"),
                },
                "channel_count": items.len(),
                "expires_in": credentials.expires_in,
            }),
            credentials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server_uri: &str) -> ProviderConfig {
        ProviderConfig {
            client_id: "yt-id".to_string(),
            client_secret: "yt-secret".to_string(),
            redirect_uri: "https://api.example/cb/youtube".to_string(),
            token_url: Some(format!("{server_uri}/token")),
            identity_url: Some(format!("{server_uri}/youtube/v3/channels")),
            ..ProviderConfig::default()
        }
    }

    #[tokio::test]
    async fn test_authorization_url_requests_offline_consent() {
        let provider = YouTubeProvider::new(
            &config("https://unused.example"),
            ProviderHttp::new(Duration::from_secs(5)).unwrap(),
        )
        .unwrap();

        let request = provider.build_authorization_url().await.unwrap();
        let url = url::Url::parse(&request.authorization_url).unwrap();
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(query["access_type"], "offline");
        assert_eq!(query["prompt"], "consent");
        assert!(query["scope"].contains("youtube.readonly"));
    }

    #[tokio::test]
    async fn test_channel_becomes_identity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "yt-at", "refresh_token": "yt-rt", "expires_in": 3599,
                "token_type": "Bearer", "scope": "https://www.googleapis.com/auth/youtube.readonly"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/channels"))
            .and(query_param("mine", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": "UC123", "snippet": {"title": "Acme TV", "customUrl": "@acme"}}]
            })))
            .mount(&server)
            .await;

        let provider = YouTubeProvider::new(
            &config(&server.uri()),
            ProviderHttp::new(Duration::from_secs(5)).unwrap(),
        )
        .unwrap();
        let identity = provider
            .exchange_and_identify(CallbackGrant::OAuth2 { code: "c".to_string() }, None)
            .await
            .unwrap();

        assert_eq!(identity.external_account_id.as_deref(), Some("UC123"));
        assert_eq!(identity.account_name.as_deref(), Some("Acme TV"));
        assert_eq!(identity.credentials.refresh_token.as_deref(), Some("yt-rt"));
        assert_eq!(identity.metadata["channel"]["custom_url"], "@acme");
    }

    #[tokio::test]
    async fn test_no_channel_is_not_linkable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "yt-at"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/channels"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"pageInfo": {"totalResults": 0}})),
            )
            .mount(&server)
            .await;

        let provider = YouTubeProvider::new(
            &config(&server.uri()),
            ProviderHttp::new(Duration::from_secs(5)).unwrap(),
        )
        .unwrap();
        let err = provider
            .exchange_and_identify(CallbackGrant::OAuth2 { code: "c".to_string() }, None)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::NoLinkableAccount(Provider::YouTube));
    }
}
