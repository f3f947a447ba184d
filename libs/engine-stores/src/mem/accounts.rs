use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use engine_errors::EngineError;
use std::collections::HashMap;

use crate::model::Account;
use crate::traits::AccountStore;

/// In-memory account store backed by `DashMap`.
pub struct InMemoryAccountStore {
    accounts: DashMap<String, Account>,
}

impl InMemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn create(&self, account: Account) -> Result<Account, EngineError> {
        if self.accounts.contains_key(&account.id) {
            return Err(EngineError::Conflict(format!(
                "account '{}' already exists",
                account.id
            )));
        }
        self.accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    async fn get(&self, id: &str) -> Result<Account, EngineError> {
        self.accounts
            .get(id)
            .filter(|a| !a.deleted)
            .map(|a| a.clone())
            .ok_or(EngineError::NotFound)
    }

    async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<Account>, EngineError> {
        Ok(self
            .accounts
            .iter()
            .filter(|e| e.tenant_id == tenant_id && !e.deleted)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn ensure_account(&self, id: &str, tenant_id: &str) -> Result<Account, EngineError> {
        if let Some(existing) = self.accounts.get(id).filter(|a| !a.deleted) {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let account = Account {
            id: id.to_owned(),
            owner: id.to_owned(),
            tenant_id: tenant_id.to_owned(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            deleted: false,
        };
        self.accounts.insert(id.to_owned(), account.clone());
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(id: &str, tenant: &str) -> Account {
        let now = Utc::now();
        Account {
            id: id.to_owned(),
            owner: id.to_owned(),
            tenant_id: tenant.to_owned(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            deleted: false,
        }
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let store = InMemoryAccountStore::new();
        store.create(new_account("a1", "t1")).await.unwrap();
        let fetched = store.get("a1").await.unwrap();
        assert_eq!(fetched.tenant_id, "t1");
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let store = InMemoryAccountStore::new();
        store.create(new_account("a1", "t1")).await.unwrap();
        let err = store.create(new_account("a1", "t1")).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn ensure_account_is_idempotent() {
        let store = InMemoryAccountStore::new();
        let first = store.ensure_account("a1", "t1").await.unwrap();
        let second = store.ensure_account("a1", "t1").await.unwrap();
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn list_by_tenant_excludes_other_tenants_and_deleted() {
        let store = InMemoryAccountStore::new();
        store.create(new_account("a1", "t1")).await.unwrap();
        store.create(new_account("a2", "t2")).await.unwrap();
        let listed = store.list_by_tenant("t1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "a1");
    }

    #[tokio::test]
    async fn get_missing_account_not_found() {
        let store = InMemoryAccountStore::new();
        assert!(matches!(
            store.get("missing").await.unwrap_err(),
            EngineError::NotFound
        ));
    }
}
