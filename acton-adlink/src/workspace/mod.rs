//! Workspace access checks
//!
//! The authenticated user arrives in the `x-user-id` header, set by the
//! upstream authentication layer. [`WorkspaceAccess`] reports that user's role
//! in a workspace; [`authorize`] turns the role into an allow/deny decision.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Header carrying the authenticated user ID
pub const PRINCIPAL_HEADER: &str = "x-user-id";

/// Role of a user within a workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceRole {
    /// Full control
    Owner,
    /// May link and disconnect accounts
    Member,
    /// Read-only
    Viewer,
}

impl WorkspaceRole {
    /// Whether the role may change linked accounts
    #[must_use]
    pub const fn can_write(self) -> bool {
        matches!(self, Self::Owner | Self::Member)
    }
}

impl TryFrom<String> for WorkspaceRole {
    type Error = AccessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "owner" => Ok(Self::Owner),
            "member" => Ok(Self::Member),
            "viewer" => Ok(Self::Viewer),
            other => Err(AccessError::Backend(format!("unknown role: {other}"))),
        }
    }
}

/// Kind of access being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    /// View accounts, start a link
    Read,
    /// Change accounts
    Write,
}

/// Access check errors
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// No authenticated user on the request
    #[error("authentication required")]
    Unauthenticated,

    /// User is not a member of the workspace
    #[error("not a member of this workspace")]
    NotMember,

    /// Member lacks the role for this action
    #[error("insufficient workspace role")]
    InsufficientRole,

    /// Membership lookup failed
    #[error("workspace lookup failed: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for AccessError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Authenticated user making the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub String);

impl Principal {
    /// User ID
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = crate::error::LinkError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(PRINCIPAL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Self(value.to_string()))
            .ok_or_else(|| AccessError::Unauthenticated.into())
    }
}

/// Workspace membership lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkspaceAccess: Send + Sync {
    /// Role of `user_id` in `workspace_id`, if a member
    async fn role_of(
        &self,
        user_id: &str,
        workspace_id: &str,
    ) -> Result<Option<WorkspaceRole>, AccessError>;
}

/// Check that `principal` may act on `workspace_id` at `level`
///
/// # Errors
///
/// Returns [`AccessError::NotMember`] or [`AccessError::InsufficientRole`] when denied
pub async fn authorize(
    access: &dyn WorkspaceAccess,
    principal: &Principal,
    workspace_id: &str,
    level: AccessLevel,
) -> Result<WorkspaceRole, AccessError> {
    let role = access
        .role_of(principal.user_id(), workspace_id)
        .await?
        .ok_or(AccessError::NotMember)?;

    if level == AccessLevel::Write && !role.can_write() {
        tracing::debug!(
            user_id = %principal.user_id(),
            workspace_id = %workspace_id,
            role = ?role,
            "Write access denied"
        );
        return Err(AccessError::InsufficientRole);
    }

    Ok(role)
}

/// In-process membership table
#[derive(Debug, Default)]
pub struct MemoryWorkspaceAccess {
    members: RwLock<HashMap<(String, String), WorkspaceRole>>,
}

impl MemoryWorkspaceAccess {
    /// Create an empty membership table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `role` in `workspace_id` to `user_id`
    #[must_use]
    pub fn with_member(self, workspace_id: &str, user_id: &str, role: WorkspaceRole) -> Self {
        self.grant(workspace_id, user_id, role);
        self
    }

    /// Grant `role` in `workspace_id` to `user_id`
    pub fn grant(&self, workspace_id: &str, user_id: &str, role: WorkspaceRole) {
        self.members
            .write()
            .insert((workspace_id.to_string(), user_id.to_string()), role);
    }
}

#[async_trait]
impl WorkspaceAccess for MemoryWorkspaceAccess {
    async fn role_of(
        &self,
        user_id: &str,
        workspace_id: &str,
    ) -> Result<Option<WorkspaceRole>, AccessError> {
        Ok(self
            .members
            .read()
            .get(&(workspace_id.to_string(), user_id.to_string()))
            .copied())
    }
}

/// Membership table in `PostgreSQL`
#[cfg(feature = "postgres")]
#[derive(Debug, Clone)]
pub struct PgWorkspaceAccess {
    pool: sqlx::PgPool,
}

#[cfg(feature = "postgres")]
impl PgWorkspaceAccess {
    /// Create a lookup over `pool`
    #[must_use]
    pub const fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl WorkspaceAccess for PgWorkspaceAccess {
    async fn role_of(
        &self,
        user_id: &str,
        workspace_id: &str,
    ) -> Result<Option<WorkspaceRole>, AccessError> {
        let role: Option<String> = sqlx::query_scalar(
            r"
            SELECT role FROM workspace_members
            WHERE workspace_id = $1 AND user_id = $2
            ",
        )
        .bind(workspace_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        role.map(WorkspaceRole::try_from).transpose()
    }
}
