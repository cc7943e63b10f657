//! OAuth 1.0a request signing (HMAC-SHA1)

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::distr::Alphanumeric;
use rand::Rng;
use sha1::Sha1;
use url::{Position, Url};

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 percent-encoding as required by OAuth 1.0a
fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Signs requests with a consumer key/secret and an optional token
#[derive(Clone)]
pub struct OAuth1Signer {
    consumer_key: String,
    consumer_secret: String,
}

impl std::fmt::Debug for OAuth1Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth1Signer")
            .field("consumer_key", &self.consumer_key)
            .finish_non_exhaustive()
    }
}

/// Token credentials used when signing
#[derive(Debug, Clone, Copy)]
pub struct TokenPair<'a> {
    /// `oauth_token`
    pub token: &'a str,
    /// Token secret (second half of the signing key)
    pub secret: &'a str,
}

impl OAuth1Signer {
    /// Create a signer for a consumer
    #[must_use]
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
        }
    }

    /// Build an `Authorization: OAuth ...` header value
    ///
    /// `extra_oauth` carries protocol parameters such as `oauth_callback` or
    /// `oauth_verifier`. Query parameters of `url` and `form` body parameters are
    /// included in the signature base string.
    #[must_use]
    pub fn authorization_header(
        &self,
        method: &str,
        url: &Url,
        token: Option<TokenPair<'_>>,
        extra_oauth: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> String {
        let nonce: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let timestamp = chrono::Utc::now().timestamp().to_string();

        self.authorization_header_with(method, url, token, extra_oauth, form, &nonce, &timestamp)
    }

    #[allow(clippy::too_many_arguments)]
    fn authorization_header_with(
        &self,
        method: &str,
        url: &Url,
        token: Option<TokenPair<'_>>,
        extra_oauth: &[(&str, &str)],
        form: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> String {
        let mut oauth: Vec<(String, String)> = vec![
            ("oauth_consumer_key".into(), self.consumer_key.clone()),
            ("oauth_nonce".into(), nonce.to_string()),
            ("oauth_signature_method".into(), "HMAC-SHA1".into()),
            ("oauth_timestamp".into(), timestamp.to_string()),
            ("oauth_version".into(), "1.0".into()),
        ];
        if let Some(pair) = token {
            oauth.push(("oauth_token".into(), pair.token.to_string()));
        }
        oauth.extend(
            extra_oauth
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
        );

        let mut signed: Vec<(String, String)> = oauth.clone();
        signed.extend(url.query_pairs().into_owned());
        signed.extend(form.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())));

        let signature = self.signature(method, url, &signed, token.map(|t| t.secret));
        oauth.push(("oauth_signature".into(), signature));
        oauth.sort();

        let fields: Vec<String> = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect();
        format!("OAuth {}", fields.join(", "))
    }

    /// Compute the base64 HMAC-SHA1 signature over the signature base string
    #[must_use]
    pub fn signature(
        &self,
        method: &str,
        url: &Url,
        params: &[(String, String)],
        token_secret: Option<&str>,
    ) -> String {
        let mut encoded: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (encode(k), encode(v)))
            .collect();
        encoded.sort();

        let normalized = encoded
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let base_url = &url[..Position::AfterPath];
        let base_string = format!(
            "{}&{}&{}",
            method.to_uppercase(),
            encode(base_url),
            encode(&normalized)
        );

        let key = format!(
            "{}&{}",
            encode(&self.consumer_secret),
            encode(token_secret.unwrap_or_default())
        );

        // HMAC accepts keys of any length
        let Ok(mut mac) = HmacSha1::new_from_slice(key.as_bytes()) else {
            return String::new();
        };
        mac.update(base_string.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }
}
