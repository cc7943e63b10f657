//! Workspace authorization on the account endpoints

mod common;

use acton_adlink::prelude::*;
use axum::http::StatusCode;
use common::{as_user, spawn_app};

#[tokio::test]
async fn test_start_requires_membership() {
    let app = spawn_app(Provider::LinkedIn).await;
    let start = "/api/v1/workspaces/ws1/ad-accounts/linkedin/start";

    app.server
        .get(start)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    as_user(app.server.get(start), "stranger")
        .await
        .assert_status(StatusCode::FORBIDDEN);
    as_user(app.server.get(start), "viewer-1")
        .await
        .assert_status_ok();
    assert_eq!(app.store.len(), 1);
}

#[tokio::test]
async fn test_linkedin_start_url() {
    let app = spawn_app(Provider::LinkedIn).await;

    let url = app.start("ws1", Provider::LinkedIn).await;

    assert_eq!(url.path(), "/authorize");
    assert_eq!(common::query_param(&url, "response_type").as_deref(), Some("code"));
    assert_eq!(
        common::query_param(&url, "client_id").as_deref(),
        Some("linkedin-client")
    );
    let state = common::query_param(&url, "state").unwrap();
    assert!(app.pending(Provider::LinkedIn, &state).await.is_some());
    assert!(app.pending(Provider::Meta, &state).await.is_none());
}

#[tokio::test]
async fn test_unconfigured_and_unknown_providers() {
    let app = spawn_app(Provider::LinkedIn).await;

    let response = as_user(
        app.server.get("/api/v1/workspaces/ws1/ad-accounts/snapchat/start"),
        "owner-1",
    )
    .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    response.assert_json(&json!({
        "error": "configuration_missing",
        "message": "snapchat is not configured",
    }));

    let response = as_user(
        app.server.get("/api/v1/workspaces/ws1/ad-accounts/tiktok/start"),
        "owner-1",
    )
    .await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = app
        .server
        .get("/api/v1/ad-accounts/oauth/tiktok/callback")
        .add_query_param("code", "abc")
        .add_query_param("state", "s")
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    response.assert_json_contains(&json!({ "error": "unknown_provider" }));
}

#[tokio::test]
async fn test_list_and_disconnect() {
    let app = spawn_app(Provider::Meta).await;
    let linker = AccountLinker::new(app.accounts.clone());
    let account = linker
        .upsert(
            "ws1",
            Provider::Meta,
            Some("42"),
            AccountFields {
                account_name: Some("Acme".to_string()),
                access_token: Some("T".to_string()),
                ..AccountFields::default()
            },
        )
        .await
        .unwrap();
    linker
        .upsert(
            "ws2",
            Provider::Meta,
            Some("43"),
            AccountFields {
                access_token: Some("U".to_string()),
                ..AccountFields::default()
            },
        )
        .await
        .unwrap();

    let response = as_user(app.server.get("/api/v1/workspaces/ws1/ad-accounts"), "viewer-1").await;
    response.assert_status_ok();
    let listed: Vec<serde_json::Value> = response.json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["external_account_id"], json!("42"));
    assert_eq!(listed[0]["status"], json!("connected"));
    assert!(listed[0].get("access_token").is_none());

    let disconnect = format!("/api/v1/workspaces/ws1/ad-accounts/{}/disconnect", account.id);
    as_user(app.server.post(&disconnect), "viewer-1")
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let response = as_user(app.server.post(&disconnect), "owner-1").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "status": "disconnected" }));

    let stored = app.accounts.all();
    assert_eq!(stored.len(), 2);
    let ws1 = stored.iter().find(|a| a.workspace_id == "ws1").unwrap();
    assert_eq!(ws1.status, AccountStatus::Disconnected);
    assert_eq!(ws1.access_token.as_deref(), Some("T"));
}
