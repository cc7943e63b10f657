//! Error types and error handling
//!
//! [`LinkError`] is the error every HTTP handler returns. It renders as
//! `{"error": <code>, "message": <text>}` with a status derived from the
//! underlying failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::accounts::RepositoryError;
use crate::oauth::{CallbackError, ProviderError, StateStoreError, UnknownProvider};
use crate::workspace::AccessError;

/// Account-linking error
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Provider name is not recognised or has no adapter
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// Malformed request
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Provider adapter failure
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Callback could not be matched or was denied
    #[error(transparent)]
    Callback(#[from] CallbackError),

    /// State store failure
    #[error(transparent)]
    StateStore(#[from] StateStoreError),

    /// Account persistence failure
    #[error("account storage failed: {0}")]
    Repository(#[from] RepositoryError),

    /// Workspace access denied
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Account does not exist in the workspace
    #[error("account not found")]
    AccountNotFound,
}

impl From<UnknownProvider> for LinkError {
    fn from(err: UnknownProvider) -> Self {
        Self::UnknownProvider(err.0)
    }
}

impl LinkError {
    /// Stable machine-readable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownProvider(_) => "unknown_provider",
            Self::BadRequest(_) => "bad_request",
            Self::Provider(e) => e.code(),
            Self::Callback(e) => e.code(),
            Self::StateStore(_) => "state_store_unavailable",
            Self::Repository(_) => "link_failed",
            Self::Access(AccessError::Unauthenticated) => "unauthenticated",
            Self::Access(AccessError::Backend(_)) => "access_check_failed",
            Self::Access(_) => "forbidden",
            Self::AccountNotFound => "not_found",
        }
    }

    /// HTTP status for this error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::UnknownProvider(_) | Self::AccountNotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Provider(e) => match e {
                ProviderError::ConfigurationMissing { .. } | ProviderError::InvalidEndpoint(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                ProviderError::NoLinkableAccount(_) => StatusCode::BAD_REQUEST,
                ProviderError::TokenExchangeFailed(_)
                | ProviderError::IdentityFetchFailed(_)
                | ProviderError::UpstreamTransport(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Callback(e) => match e {
                CallbackError::StateStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CallbackError::MissingParameters
                | CallbackError::UnknownOrExpiredState
                | CallbackError::ProviderDenied { .. } => StatusCode::BAD_REQUEST,
            },
            Self::StateStore(_) | Self::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Access(e) => match e {
                AccessError::Unauthenticated => StatusCode::UNAUTHORIZED,
                AccessError::NotMember | AccessError::InsufficientRole => StatusCode::FORBIDDEN,
                AccessError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for LinkError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "Request rejected");
        }

        // Server-side failures keep their detail in the logs only
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            match &self {
                Self::Provider(ProviderError::ConfigurationMissing { provider, .. }) => {
                    format!("{provider} is not configured")
                }
                _ => "internal error".to_string(),
            }
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": self.code(), "message": message }))).into_response()
    }
}
