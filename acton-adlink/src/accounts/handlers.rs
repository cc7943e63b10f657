//! Account HTTP handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use super::models::{AccountStatus, LinkedAccount};
use crate::error::LinkError;
use crate::state::AppState;
use crate::workspace::{authorize, AccessLevel, Principal};

/// List a workspace's linked accounts, most recently updated first
///
/// Credentials are never part of the response.
///
/// # Errors
///
/// Returns 401/403 when the caller may not read the workspace, 500 on storage failure
pub async fn list_accounts(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
    principal: Principal,
) -> Result<Json<Vec<LinkedAccount>>, LinkError> {
    authorize(state.workspaces(), &principal, &workspace_id, AccessLevel::Read).await?;

    let accounts = state.accounts().list_for_workspace(&workspace_id).await?;
    Ok(Json(accounts))
}

/// Fetch one linked account of a workspace
///
/// # Errors
///
/// Returns 401/403 when the caller may not read the workspace, 404 when the
/// account is not in it
pub async fn get_account(
    State(state): State<AppState>,
    Path((workspace_id, account_id)): Path<(String, String)>,
    principal: Principal,
) -> Result<Json<LinkedAccount>, LinkError> {
    authorize(state.workspaces(), &principal, &workspace_id, AccessLevel::Read).await?;

    let account_id: Uuid = account_id.parse().map_err(|_| LinkError::AccountNotFound)?;
    let account = state
        .accounts()
        .find(&workspace_id, account_id)
        .await?
        .ok_or(LinkError::AccountNotFound)?;
    Ok(Json(account))
}

/// Mark an account disconnected
///
/// The record and its history stay in place; only the status changes.
///
/// # Errors
///
/// Returns 401/403 when the caller may not change the workspace, 404 when the
/// account is not in it
pub async fn disconnect_account(
    State(state): State<AppState>,
    Path((workspace_id, account_id)): Path<(String, String)>,
    principal: Principal,
) -> Result<Json<Value>, LinkError> {
    authorize(state.workspaces(), &principal, &workspace_id, AccessLevel::Write).await?;

    let account_id: Uuid = account_id.parse().map_err(|_| LinkError::AccountNotFound)?;
    let account = state
        .accounts()
        .set_status(&workspace_id, account_id, AccountStatus::Disconnected)
        .await?
        .ok_or(LinkError::AccountNotFound)?;

    tracing::info!(
        workspace_id = %workspace_id,
        account_id = %account.id,
        provider = %account.provider,
        user_id = %principal.user_id(),
        "Account disconnected"
    );

    Ok(Json(json!({ "status": "disconnected" })))
}
