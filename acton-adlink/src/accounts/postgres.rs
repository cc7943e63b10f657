//! `PostgreSQL` account repository
//!
//! The keyed upsert is a single `INSERT .. ON CONFLICT` against the partial
//! unique index on `(workspace_id, provider, external_account_id)`. The unkeyed
//! upsert takes a transaction-scoped advisory lock on `(workspace_id, provider)`
//! and then merges into the most recent row for that pair.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{AccountFields, AccountStatus, LinkedAccount};
use super::repository::{LinkedAccountRepository, RepositoryError};
use crate::oauth::Provider;

const COLUMNS: &str = "id, workspace_id, provider, account_name, external_account_id, \
    access_token, access_token_secret, refresh_token, scopes, metadata, status, \
    created_by, created_at, updated_at";

/// Account repository backed by `PostgreSQL`
#[derive(Debug, Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    /// Create a repository over `pool`
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending migrations
    ///
    /// # Errors
    ///
    /// Returns error if a migration fails
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn scopes_param(scopes: &[String]) -> Option<Json<Vec<String>>> {
    (!scopes.is_empty()).then(|| Json(scopes.to_vec()))
}

#[async_trait]
impl LinkedAccountRepository for PgAccountRepository {
    async fn upsert_by_external_id(
        &self,
        workspace_id: &str,
        provider: Provider,
        external_account_id: &str,
        fields: AccountFields,
    ) -> Result<LinkedAccount, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO ad_accounts (id, workspace_id, provider, external_account_id, account_name,
                                     access_token, access_token_secret, refresh_token, scopes,
                                     metadata, status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8,
                    COALESCE($9, '[]'::jsonb), COALESCE($10, '{{}}'::jsonb), 'connected', $11)
            ON CONFLICT (workspace_id, provider, external_account_id)
                WHERE external_account_id IS NOT NULL
            DO UPDATE SET
                account_name = COALESCE(NULLIF(ad_accounts.account_name, ''), $5),
                access_token = COALESCE($6, ad_accounts.access_token),
                access_token_secret = COALESCE($7, ad_accounts.access_token_secret),
                refresh_token = COALESCE($8, ad_accounts.refresh_token),
                scopes = COALESCE($9, ad_accounts.scopes),
                metadata = COALESCE($10, ad_accounts.metadata),
                status = 'connected',
                updated_at = NOW()
            RETURNING {COLUMNS}
            "
        );

        let account = sqlx::query_as::<_, LinkedAccount>(&sql)
            .bind(Uuid::new_v4())
            .bind(workspace_id)
            .bind(provider.as_str())
            .bind(external_account_id)
            .bind(&fields.account_name)
            .bind(&fields.access_token)
            .bind(&fields.access_token_secret)
            .bind(&fields.refresh_token)
            .bind(scopes_param(&fields.scopes))
            .bind(&fields.metadata)
            .bind(&fields.created_by)
            .fetch_one(&self.pool)
            .await?;

        Ok(account)
    }

    async fn upsert_latest(
        &self,
        workspace_id: &str,
        provider: Provider,
        fields: AccountFields,
    ) -> Result<LinkedAccount, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Serializes unkeyed links per (workspace, provider), including the
        // first one when there is no row for FOR UPDATE to lock yet
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1 || ':' || $2))")
            .bind(workspace_id)
            .bind(provider.as_str())
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query_as::<_, LinkedAccount>(&format!(
            r"
            SELECT {COLUMNS}
            FROM ad_accounts
            WHERE workspace_id = $1 AND provider = $2
            ORDER BY updated_at DESC
            LIMIT 1
            FOR UPDATE
            "
        ))
        .bind(workspace_id)
        .bind(provider.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let account = if let Some(mut account) = existing {
            account.apply(fields);
            sqlx::query_as::<_, LinkedAccount>(&format!(
                r"
                UPDATE ad_accounts
                SET account_name = $2, access_token = $3, access_token_secret = $4,
                    refresh_token = $5, scopes = $6, metadata = $7, status = $8,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING {COLUMNS}
                "
            ))
            .bind(account.id)
            .bind(&account.account_name)
            .bind(&account.access_token)
            .bind(&account.access_token_secret)
            .bind(&account.refresh_token)
            .bind(Json(&account.scopes))
            .bind(&account.metadata)
            .bind(account.status.as_str())
            .fetch_one(&mut *tx)
            .await?
        } else {
            let account = LinkedAccount::new(workspace_id, provider, None, fields);
            sqlx::query_as::<_, LinkedAccount>(&format!(
                r"
                INSERT INTO ad_accounts (id, workspace_id, provider, external_account_id,
                                         account_name, access_token, access_token_secret,
                                         refresh_token, scopes, metadata, status, created_by)
                VALUES ($1, $2, $3, NULL, $4, $5, $6, $7, $8, $9, $10, $11)
                RETURNING {COLUMNS}
                "
            ))
            .bind(account.id)
            .bind(&account.workspace_id)
            .bind(provider.as_str())
            .bind(&account.account_name)
            .bind(&account.access_token)
            .bind(&account.access_token_secret)
            .bind(&account.refresh_token)
            .bind(Json(&account.scopes))
            .bind(&account.metadata)
            .bind(account.status.as_str())
            .bind(&account.created_by)
            .fetch_one(&mut *tx)
            .await?
        };

        tx.commit().await?;
        Ok(account)
    }

    async fn list_for_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<LinkedAccount>, RepositoryError> {
        let accounts = sqlx::query_as::<_, LinkedAccount>(&format!(
            r"
            SELECT {COLUMNS}
            FROM ad_accounts
            WHERE workspace_id = $1
            ORDER BY updated_at DESC
            "
        ))
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    async fn find(
        &self,
        workspace_id: &str,
        id: Uuid,
    ) -> Result<Option<LinkedAccount>, RepositoryError> {
        let account = sqlx::query_as::<_, LinkedAccount>(&format!(
            r"
            SELECT {COLUMNS}
            FROM ad_accounts
            WHERE workspace_id = $1 AND id = $2
            "
        ))
        .bind(workspace_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn set_status(
        &self,
        workspace_id: &str,
        id: Uuid,
        status: AccountStatus,
    ) -> Result<Option<LinkedAccount>, RepositoryError> {
        let account = sqlx::query_as::<_, LinkedAccount>(&format!(
            r"
            UPDATE ad_accounts
            SET status = $3, updated_at = NOW()
            WHERE workspace_id = $1 AND id = $2
            RETURNING {COLUMNS}
            "
        ))
        .bind(workspace_id)
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::TestDatabase;

    fn fields(name: Option<&str>, token: &str, refresh: Option<&str>) -> AccountFields {
        AccountFields {
            account_name: name.map(str::to_string),
            access_token: Some(token.to_string()),
            refresh_token: refresh.map(str::to_string),
            ..AccountFields::default()
        }
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL database"]
    async fn test_keyed_relink_keeps_name_and_refresh_token() {
        let db = TestDatabase::new().await.unwrap();
        let repo = PgAccountRepository::new(db.pool().clone());

        let first = repo
            .upsert_by_external_id("ws1", Provider::Meta, "42", fields(None, "t1", Some("r1")))
            .await
            .unwrap();
        let named = repo
            .upsert_by_external_id("ws1", Provider::Meta, "42", fields(Some("Acme"), "t2", None))
            .await
            .unwrap();
        let renamed = repo
            .upsert_by_external_id("ws1", Provider::Meta, "42", fields(Some("Other"), "t3", None))
            .await
            .unwrap();

        assert_eq!(first.id, renamed.id);
        // An empty name is filled once, then kept
        assert_eq!(named.account_name.as_deref(), Some("Acme"));
        assert_eq!(renamed.account_name.as_deref(), Some("Acme"));
        assert_eq!(renamed.access_token.as_deref(), Some("t3"));
        assert_eq!(renamed.refresh_token.as_deref(), Some("r1"));
        assert_eq!(renamed.status, AccountStatus::Connected);
        assert!(renamed.updated_at >= first.updated_at);
        assert_eq!(repo.list_for_workspace("ws1").await.unwrap().len(), 1);

        db.cleanup().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL database"]
    async fn test_keyed_relink_reconnects_disconnected_account() {
        let db = TestDatabase::new().await.unwrap();
        let repo = PgAccountRepository::new(db.pool().clone());

        let account = repo
            .upsert_by_external_id("ws1", Provider::LinkedIn, "9", fields(None, "t1", None))
            .await
            .unwrap();
        repo.set_status("ws1", account.id, AccountStatus::Disconnected)
            .await
            .unwrap();
        let relinked = repo
            .upsert_by_external_id("ws1", Provider::LinkedIn, "9", fields(None, "t2", None))
            .await
            .unwrap();

        assert_eq!(relinked.id, account.id);
        assert_eq!(relinked.status, AccountStatus::Connected);

        db.cleanup().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "Requires PostgreSQL database"]
    async fn test_concurrent_unkeyed_links_share_one_row() {
        let db = TestDatabase::new().await.unwrap();
        let repo = Arc::new(PgAccountRepository::new(db.pool().clone()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move {
                    let token = format!("t{i}");
                    repo.upsert_latest("ws1", Provider::Twitter, fields(None, &token, None))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let accounts = repo.list_for_workspace("ws1").await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert!(accounts[0].external_account_id.is_none());

        db.cleanup().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL database"]
    async fn test_lookups_are_scoped_to_workspace() {
        let db = TestDatabase::new().await.unwrap();
        let repo = PgAccountRepository::new(db.pool().clone());

        let account = repo
            .upsert_by_external_id("ws1", Provider::Snapchat, "s1", fields(None, "t1", None))
            .await
            .unwrap();

        assert!(repo.find("ws2", account.id).await.unwrap().is_none());
        assert!(repo
            .set_status("ws2", account.id, AccountStatus::Disconnected)
            .await
            .unwrap()
            .is_none());

        let found = repo.find("ws1", account.id).await.unwrap().unwrap();
        assert_eq!(found.provider, Provider::Snapchat);
        assert_eq!(found.access_token.as_deref(), Some("t1"));
        assert!(found.scopes.is_empty());

        let disconnected = repo
            .set_status("ws1", account.id, AccountStatus::Disconnected)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(disconnected.status, AccountStatus::Disconnected);
        repo.ping().await.unwrap();

        db.cleanup().await.unwrap();
    }
}
