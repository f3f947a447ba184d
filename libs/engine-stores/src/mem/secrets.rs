use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use engine_errors::EngineError;

use crate::model::{SecretPolicy, SecretRecord};
use crate::traits::SecretStore;

type SecretKey = (String, String);

/// In-memory secret store. Holds only ciphertext; callers in the
/// accounts module perform envelope encryption/decryption before and
/// after calling this trait.
pub struct InMemorySecretStore {
    secrets: DashMap<SecretKey, SecretRecord>,
    policies: DashMap<SecretKey, SecretPolicy>,
}

impl InMemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            secrets: DashMap::new(),
            policies: DashMap::new(),
        }
    }
}

impl Default for InMemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn upsert(
        &self,
        account_id: &str,
        name: &str,
        ciphertext: String,
    ) -> Result<SecretRecord, EngineError> {
        let key = (account_id.to_owned(), name.to_owned());
        let now = Utc::now();
        let record = self
            .secrets
            .entry(key)
            .and_modify(|existing| {
                existing.ciphertext.clone_from(&ciphertext);
                existing.version += 1;
                existing.updated_at = now;
            })
            .or_insert_with(|| SecretRecord {
                account_id: account_id.to_owned(),
                name: name.to_owned(),
                ciphertext,
                version: 1,
                created_at: now,
                updated_at: now,
            });
        Ok(record.clone())
    }

    async fn get(&self, account_id: &str, name: &str) -> Result<SecretRecord, EngineError> {
        self.secrets
            .get(&(account_id.to_owned(), name.to_owned()))
            .map(|r| r.clone())
            .ok_or(EngineError::NotFound)
    }

    async fn delete(&self, account_id: &str, name: &str) -> Result<(), EngineError> {
        let key = (account_id.to_owned(), name.to_owned());
        self.secrets.remove(&key).ok_or(EngineError::NotFound)?;
        self.policies.remove(&key);
        Ok(())
    }

    async fn list(&self, account_id: &str) -> Result<Vec<SecretRecord>, EngineError> {
        Ok(self
            .secrets
            .iter()
            .filter(|e| e.key().0 == account_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn set_policy(
        &self,
        account_id: &str,
        secret_name: &str,
        allowed_service_ids: Vec<String>,
    ) -> Result<SecretPolicy, EngineError> {
        let policy = SecretPolicy {
            account_id: account_id.to_owned(),
            secret_name: secret_name.to_owned(),
            allowed_service_ids,
        };
        self.policies
            .insert((account_id.to_owned(), secret_name.to_owned()), policy.clone());
        Ok(policy)
    }

    async fn get_policy(
        &self,
        account_id: &str,
        secret_name: &str,
    ) -> Result<Option<SecretPolicy>, EngineError> {
        Ok(self
            .policies
            .get(&(account_id.to_owned(), secret_name.to_owned()))
            .map(|p| p.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_starts_at_version_one_and_increments() {
        let store = InMemorySecretStore::new();
        let r1 = store.upsert("a1", "k", "v1:c1".to_owned()).await.unwrap();
        assert_eq!(r1.version, 1);
        let r2 = store.upsert("a1", "k", "v1:c2".to_owned()).await.unwrap();
        assert_eq!(r2.version, 2);
        assert_eq!(r2.ciphertext, "v1:c2");
    }

    #[tokio::test]
    async fn get_missing_secret_not_found() {
        let store = InMemorySecretStore::new();
        assert!(matches!(
            store.get("a1", "missing").await.unwrap_err(),
            EngineError::NotFound
        ));
    }

    #[tokio::test]
    async fn delete_also_clears_policy() {
        let store = InMemorySecretStore::new();
        store.upsert("a1", "k", "v1:c".to_owned()).await.unwrap();
        store
            .set_policy("a1", "k", vec!["svc1".to_owned()])
            .await
            .unwrap();
        store.delete("a1", "k").await.unwrap();
        assert!(store.get_policy("a1", "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn policy_defaults_to_absent_meaning_owner_only() {
        let store = InMemorySecretStore::new();
        store.upsert("a1", "k", "v1:c".to_owned()).await.unwrap();
        assert!(store.get_policy("a1", "k").await.unwrap().is_none());
    }
}
