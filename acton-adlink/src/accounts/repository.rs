//! Account persistence and the upsert engine
//!
//! [`LinkedAccountRepository`] is the storage seam. Both upserts must be atomic
//! with respect to concurrent links of the same account: the `PostgreSQL`
//! implementation relies on a partial unique index and an advisory lock per
//! `(workspace, provider)`, the in-memory one on a single mutex.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::models::{AccountFields, AccountStatus, LinkedAccount};
use crate::oauth::Provider;

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Database failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Non-database backend failure
    #[error("account storage unavailable: {0}")]
    Unavailable(String),
}

/// Storage for linked accounts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkedAccountRepository: Send + Sync {
    /// Create or update the account keyed by `(workspace, provider, external id)`
    async fn upsert_by_external_id(
        &self,
        workspace_id: &str,
        provider: Provider,
        external_account_id: &str,
        fields: AccountFields,
    ) -> Result<LinkedAccount, RepositoryError>;

    /// Create or update the most recently updated account for `(workspace, provider)`
    async fn upsert_latest(
        &self,
        workspace_id: &str,
        provider: Provider,
        fields: AccountFields,
    ) -> Result<LinkedAccount, RepositoryError>;

    /// All accounts of a workspace, most recently updated first
    async fn list_for_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<LinkedAccount>, RepositoryError>;

    /// One account of a workspace
    async fn find(
        &self,
        workspace_id: &str,
        id: Uuid,
    ) -> Result<Option<LinkedAccount>, RepositoryError>;

    /// Change an account's status, returning the updated account
    async fn set_status(
        &self,
        workspace_id: &str,
        id: Uuid,
        status: AccountStatus,
    ) -> Result<Option<LinkedAccount>, RepositoryError>;

    /// Check backend connectivity
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Idempotent create-or-update of linked accounts
///
/// With an external account ID the record is matched on
/// `(workspace, provider, external id)`; without one, the most recent record
/// for `(workspace, provider)` is reused.
#[derive(Clone)]
pub struct AccountLinker {
    repository: Arc<dyn LinkedAccountRepository>,
}

impl std::fmt::Debug for AccountLinker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountLinker").finish_non_exhaustive()
    }
}

impl AccountLinker {
    /// Create a linker over `repository`
    #[must_use]
    pub fn new(repository: Arc<dyn LinkedAccountRepository>) -> Self {
        Self { repository }
    }

    /// Create or update a linked account
    ///
    /// # Errors
    ///
    /// Returns error if the repository fails
    pub async fn upsert(
        &self,
        workspace_id: &str,
        provider: Provider,
        external_account_id: Option<&str>,
        fields: AccountFields,
    ) -> Result<LinkedAccount, RepositoryError> {
        let fields = fields.normalized();
        let external_account_id = external_account_id
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let account = match external_account_id {
            Some(external_id) => {
                self.repository
                    .upsert_by_external_id(workspace_id, provider, external_id, fields)
                    .await?
            }
            None => {
                self.repository
                    .upsert_latest(workspace_id, provider, fields)
                    .await?
            }
        };

        tracing::info!(
            workspace_id = %workspace_id,
            provider = %provider,
            account_id = %account.id,
            keyed = external_account_id.is_some(),
            "Linked account upserted"
        );
        Ok(account)
    }
}

/// In-process account repository
#[derive(Debug, Default)]
pub struct MemoryAccountRepository {
    accounts: Mutex<Vec<LinkedAccount>>,
}

impl MemoryAccountRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored account
    #[must_use]
    pub fn all(&self) -> Vec<LinkedAccount> {
        self.accounts.lock().clone()
    }

    fn upsert_where(
        &self,
        workspace_id: &str,
        provider: Provider,
        external_account_id: Option<&str>,
        fields: AccountFields,
        matches: impl Fn(&LinkedAccount) -> bool,
    ) -> LinkedAccount {
        let mut accounts = self.accounts.lock();

        let existing = accounts
            .iter_mut()
            .filter(|a| a.workspace_id == workspace_id && a.provider == provider && matches(a))
            .max_by_key(|a| a.updated_at);

        if let Some(account) = existing {
            account.apply(fields);
            return account.clone();
        }

        let account = LinkedAccount::new(workspace_id, provider, external_account_id, fields);
        accounts.push(account.clone());
        account
    }
}

#[async_trait]
impl LinkedAccountRepository for MemoryAccountRepository {
    async fn upsert_by_external_id(
        &self,
        workspace_id: &str,
        provider: Provider,
        external_account_id: &str,
        fields: AccountFields,
    ) -> Result<LinkedAccount, RepositoryError> {
        Ok(self.upsert_where(
            workspace_id,
            provider,
            Some(external_account_id),
            fields,
            |a| a.external_account_id.as_deref() == Some(external_account_id),
        ))
    }

    async fn upsert_latest(
        &self,
        workspace_id: &str,
        provider: Provider,
        fields: AccountFields,
    ) -> Result<LinkedAccount, RepositoryError> {
        Ok(self.upsert_where(workspace_id, provider, None, fields, |_| true))
    }

    async fn list_for_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<LinkedAccount>, RepositoryError> {
        let mut accounts: Vec<_> = self
            .accounts
            .lock()
            .iter()
            .filter(|a| a.workspace_id == workspace_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(accounts)
    }

    async fn find(
        &self,
        workspace_id: &str,
        id: Uuid,
    ) -> Result<Option<LinkedAccount>, RepositoryError> {
        Ok(self
            .accounts
            .lock()
            .iter()
            .find(|a| a.id == id && a.workspace_id == workspace_id)
            .cloned())
    }

    async fn set_status(
        &self,
        workspace_id: &str,
        id: Uuid,
        status: AccountStatus,
    ) -> Result<Option<LinkedAccount>, RepositoryError> {
        let mut accounts = self.accounts.lock();
        let updated = accounts
            .iter_mut()
            .find(|a| a.id == id && a.workspace_id == workspace_id)
            .map(|account| {
                account.status = status;
                account.updated_at = chrono::Utc::now();
                account.clone()
            });
        drop(accounts);
        Ok(updated)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
