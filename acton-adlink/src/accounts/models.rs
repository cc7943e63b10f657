//! Linked advertising account model
//!
//! This module provides the `LinkedAccount` record persisted per workspace and
//! provider, and the `AccountFields` carried into an upsert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::oauth::Provider;

/// Connection status of a linked account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Tokens are valid as far as we know
    Connected,
    /// Disconnected by a workspace member
    Disconnected,
    /// Provider calls with the stored tokens are failing
    Error,
}

impl AccountStatus {
    /// Get the status as stored in the database
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

/// Error returned when a stored status is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown account status: {0}")]
pub struct UnknownStatus(pub String);

impl TryFrom<String> for AccountStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, UnknownStatus> {
        match value.as_str() {
            "connected" => Ok(Self::Connected),
            "disconnected" => Ok(Self::Disconnected),
            "error" => Ok(Self::Error),
            _ => Err(UnknownStatus(value)),
        }
    }
}

/// Advertising account linked to a workspace
///
/// Token fields are never serialized; API responses expose only identity,
/// status and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LinkedAccount {
    /// Primary key
    pub id: Uuid,
    /// Owning workspace
    pub workspace_id: String,
    /// Advertising platform
    #[sqlx(try_from = "String")]
    pub provider: Provider,
    /// Display name
    pub account_name: Option<String>,
    /// Provider-side advertising account ID
    pub external_account_id: Option<String>,
    /// Access token
    #[serde(skip_serializing, default)]
    pub access_token: Option<String>,
    /// OAuth1 token secret
    #[serde(skip_serializing, default)]
    pub access_token_secret: Option<String>,
    /// Refresh token
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    /// Granted scopes
    #[sqlx(json)]
    pub scopes: Vec<String>,
    /// Provider-specific details
    pub metadata: serde_json::Value,
    /// Connection status
    #[sqlx(try_from = "String")]
    pub status: AccountStatus,
    /// User who first linked the account
    pub created_by: Option<String>,
    /// When the account was first linked
    pub created_at: DateTime<Utc>,
    /// When the account was last linked or changed
    pub updated_at: DateTime<Utc>,
}

/// Values carried into an upsert
///
/// Blank values mean "no change" when updating an existing account.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountFields {
    /// Display name (only fills a blank stored name)
    pub account_name: Option<String>,
    /// Access token
    pub access_token: Option<String>,
    /// OAuth1 token secret
    pub access_token_secret: Option<String>,
    /// Refresh token
    pub refresh_token: Option<String>,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Provider-specific details (an empty object counts as blank)
    pub metadata: Option<serde_json::Value>,
    /// Linking user, recorded on insert only
    pub created_by: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn is_blank_json(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

impl AccountFields {
    /// Collapse blank strings, empty scope lists and empty metadata to `None`
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            account_name: non_blank(self.account_name),
            access_token: non_blank(self.access_token),
            access_token_secret: non_blank(self.access_token_secret),
            refresh_token: non_blank(self.refresh_token),
            scopes: self
                .scopes
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            metadata: self.metadata.filter(|m| !is_blank_json(m)),
            created_by: non_blank(self.created_by),
        }
    }
}

impl LinkedAccount {
    /// Build a new connected account from normalized fields
    #[must_use]
    pub fn new(
        workspace_id: &str,
        provider: Provider,
        external_account_id: Option<&str>,
        fields: AccountFields,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workspace_id: workspace_id.to_string(),
            provider,
            account_name: fields.account_name,
            external_account_id: external_account_id.map(str::to_string),
            access_token: fields.access_token,
            access_token_secret: fields.access_token_secret,
            refresh_token: fields.refresh_token,
            scopes: fields.scopes,
            metadata: fields
                .metadata
                .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
            status: AccountStatus::Connected,
            created_by: fields.created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge normalized fields into an existing account
    ///
    /// Supplied values overwrite stored ones; absent values leave them alone.
    /// The stored name is only replaced when blank. Status becomes connected.
    pub fn apply(&mut self, fields: AccountFields) {
        if self.account_name.as_deref().is_none_or(|n| n.trim().is_empty()) {
            if let Some(name) = fields.account_name {
                self.account_name = Some(name);
            }
        }
        if let Some(token) = fields.access_token {
            self.access_token = Some(token);
        }
        if let Some(secret) = fields.access_token_secret {
            self.access_token_secret = Some(secret);
        }
        if let Some(refresh) = fields.refresh_token {
            self.refresh_token = Some(refresh);
        }
        if !fields.scopes.is_empty() {
            self.scopes = fields.scopes;
        }
        if let Some(metadata) = fields.metadata {
            self.metadata = metadata;
        }
        self.status = AccountStatus::Connected;
        self.updated_at = Utc::now();
    }
}
