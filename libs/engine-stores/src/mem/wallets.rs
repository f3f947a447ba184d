use async_trait::async_trait;
use dashmap::DashMap;
use engine_errors::EngineError;

use crate::model::WalletBinding;
use crate::traits::WalletStore;

/// In-memory wallet binding store, keyed by `(account_id, binding_id)`.
pub struct InMemoryWalletStore {
    bindings: DashMap<(String, String), WalletBinding>,
}

impl InMemoryWalletStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
        }
    }
}

impl Default for InMemoryWalletStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn create_binding(&self, binding: WalletBinding) -> Result<WalletBinding, EngineError> {
        let key = (binding.account_id.clone(), binding.id.clone());
        if binding.is_primary {
            for mut existing in self.bindings.iter_mut() {
                if existing.account_id == binding.account_id {
                    existing.is_primary = false;
                }
            }
        }
        self.bindings.insert(key, binding.clone());
        Ok(binding)
    }

    async fn get_binding(&self, account_id: &str, id: &str) -> Result<WalletBinding, EngineError> {
        self.bindings
            .get(&(account_id.to_owned(), id.to_owned()))
            .map(|b| b.clone())
            .ok_or(EngineError::NotFound)
    }

    async fn list_bindings(&self, account_id: &str) -> Result<Vec<WalletBinding>, EngineError> {
        Ok(self
            .bindings
            .iter()
            .filter(|e| e.key().0 == account_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn mark_verified(
        &self,
        account_id: &str,
        id: &str,
        signature: String,
    ) -> Result<WalletBinding, EngineError> {
        let mut entry = self
            .bindings
            .get_mut(&(account_id.to_owned(), id.to_owned()))
            .ok_or(EngineError::NotFound)?;
        entry.verified = true;
        entry.verification_signature = Some(signature);
        entry.pending_nonce = None;
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn binding(account_id: &str, id: &str, primary: bool) -> WalletBinding {
        WalletBinding {
            id: id.to_owned(),
            account_id: account_id.to_owned(),
            address: "0xabc".to_owned(),
            label: "main".to_owned(),
            verified: false,
            is_primary: primary,
            verification_signature: None,
            pending_nonce: Some("nonce-1".to_owned()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn only_one_primary_per_account() {
        let store = InMemoryWalletStore::new();
        store.create_binding(binding("a1", "w1", true)).await.unwrap();
        store.create_binding(binding("a1", "w2", true)).await.unwrap();

        let w1 = store.get_binding("a1", "w1").await.unwrap();
        let w2 = store.get_binding("a1", "w2").await.unwrap();
        assert!(!w1.is_primary);
        assert!(w2.is_primary);
    }

    #[tokio::test]
    async fn mark_verified_clears_nonce() {
        let store = InMemoryWalletStore::new();
        store.create_binding(binding("a1", "w1", true)).await.unwrap();
        let verified = store
            .mark_verified("a1", "w1", "sig".to_owned())
            .await
            .unwrap();
        assert!(verified.verified);
        assert!(verified.pending_nonce.is_none());
        assert_eq!(verified.verification_signature.as_deref(), Some("sig"));
    }
}
