//! Account & secret fabric domain service (C2, §4.2).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use engine_crypto::MasterKey;
use engine_errors::EngineError;
use engine_stores::model::{
    Account, GasBankAccount, ReservationOutcome, SecretPolicy, SecretRecord, WalletBinding,
};
use engine_stores::traits::{AccountStore, GasBankStore, SecretStore, WalletStore};
use uuid::Uuid;

pub struct AccountsService {
    accounts: Arc<dyn AccountStore>,
    secrets: Arc<dyn SecretStore>,
    wallets: Arc<dyn WalletStore>,
    gasbank: Arc<dyn GasBankStore>,
    master_key: MasterKey,
}

impl AccountsService {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        secrets: Arc<dyn SecretStore>,
        wallets: Arc<dyn WalletStore>,
        gasbank: Arc<dyn GasBankStore>,
        master_key: MasterKey,
    ) -> Self {
        Self {
            accounts,
            secrets,
            wallets,
            gasbank,
            master_key,
        }
    }

    /// # Errors
    /// Propagates the account store's failure.
    pub async fn create_account(
        &self,
        owner: &str,
        tenant_id: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Account, EngineError> {
        let now = Utc::now();
        self.accounts
            .create(Account {
                id: Uuid::new_v4().to_string(),
                owner: owner.to_owned(),
                tenant_id: tenant_id.to_owned(),
                metadata,
                created_at: now,
                updated_at: now,
                deleted: false,
            })
            .await
    }

    /// # Errors
    /// Returns [`EngineError::NotFound`] on a cross-tenant read (§4: "may
    /// only be read/mutated by callers whose authenticated tenant
    /// matches").
    pub async fn get_account(&self, tenant_id: &str, id: &str) -> Result<Account, EngineError> {
        let account = self.accounts.get(id).await?;
        require_tenant(&account.tenant_id, tenant_id)?;
        Ok(account)
    }

    /// # Errors
    /// Propagates the account store's failure.
    pub async fn list_accounts(&self, tenant_id: &str) -> Result<Vec<Account>, EngineError> {
        self.accounts.list_by_tenant(tenant_id).await
    }

    /// Envelope-encrypt `plaintext` and upsert it (§4.2).
    ///
    /// # Errors
    /// Returns [`EngineError::NotFound`] on a cross-tenant account, or
    /// [`EngineError::Internal`] if encryption fails.
    pub async fn upsert_secret(
        &self,
        tenant_id: &str,
        account_id: &str,
        name: &str,
        plaintext: &str,
    ) -> Result<SecretRecord, EngineError> {
        self.get_account(tenant_id, account_id).await?;
        let ciphertext = engine_crypto::encrypt(&self.master_key, account_id.as_bytes(), name, plaintext.as_bytes())
            .map_err(EngineError::internal)?;
        self.secrets.upsert(account_id, name, ciphertext).await
    }

    /// Read and decrypt a secret, enforcing the owner-or-policy access
    /// rule (§4.2). Never distinguishes "secret does not exist" from
    /// "caller is not permitted" in the error it returns.
    ///
    /// # Errors
    /// Returns [`EngineError::NotFound`] on a cross-tenant account,
    /// [`EngineError::PermissionDenied`] if `caller_service_id` is
    /// neither the owner nor policy-listed, or [`EngineError::Internal`]
    /// if the stored ciphertext fails to decrypt (tamper detection).
    pub async fn get_secret(
        &self,
        tenant_id: &str,
        account_id: &str,
        name: &str,
        caller_service_id: &str,
    ) -> Result<String, EngineError> {
        let account = self.get_account(tenant_id, account_id).await?;
        if caller_service_id != account.owner {
            let policy = self.secrets.get_policy(account_id, name).await?;
            let allowed = policy
                .as_ref()
                .is_some_and(|p| p.allowed_service_ids.iter().any(|s| s == caller_service_id));
            if !allowed {
                return Err(EngineError::PermissionDenied);
            }
        }

        let record = self.secrets.get(account_id, name).await?;
        let plaintext =
            engine_crypto::decrypt(&self.master_key, account_id.as_bytes(), name, &record.ciphertext)
                .map_err(EngineError::internal)?;
        String::from_utf8(plaintext.to_vec()).map_err(EngineError::internal)
    }

    /// # Errors
    /// Propagates the secret store's failure.
    pub async fn delete_secret(&self, tenant_id: &str, account_id: &str, name: &str) -> Result<(), EngineError> {
        self.get_account(tenant_id, account_id).await?;
        self.secrets.delete(account_id, name).await
    }

    /// Lists secret metadata only — never ciphertext or plaintext.
    ///
    /// # Errors
    /// Propagates the secret store's failure.
    pub async fn list_secrets(&self, tenant_id: &str, account_id: &str) -> Result<Vec<SecretRecord>, EngineError> {
        self.get_account(tenant_id, account_id).await?;
        self.secrets.list(account_id).await
    }

    /// # Errors
    /// Propagates the secret store's failure.
    pub async fn set_secret_policy(
        &self,
        tenant_id: &str,
        account_id: &str,
        name: &str,
        allowed_service_ids: Vec<String>,
    ) -> Result<SecretPolicy, EngineError> {
        self.get_account(tenant_id, account_id).await?;
        self.secrets.set_policy(account_id, name, allowed_service_ids).await
    }

    /// Issue a verification nonce for a new wallet binding (§3: "a nonce
    /// is issued, the caller signs with the wallet key").
    ///
    /// # Errors
    /// Propagates the wallet store's failure.
    pub async fn issue_wallet_nonce(
        &self,
        tenant_id: &str,
        account_id: &str,
        address: &str,
        label: &str,
    ) -> Result<WalletBinding, EngineError> {
        self.get_account(tenant_id, account_id).await?;
        self.wallets
            .create_binding(WalletBinding {
                id: Uuid::new_v4().to_string(),
                account_id: account_id.to_owned(),
                address: address.to_owned(),
                label: label.to_owned(),
                verified: false,
                is_primary: false,
                verification_signature: None,
                pending_nonce: Some(Uuid::new_v4().to_string()),
                created_at: Utc::now(),
            })
            .await
    }

    /// Record `signature` over the issued nonce and mark the binding
    /// verified. Signature verification against the wallet's actual
    /// cryptographic key is a chain-specific concern handed to an
    /// external collaborator (see spec.md §1 Non-goals: "concrete
    /// smart-contract bytecode and chain RPC clients"); this service
    /// only checks that a signature was supplied against an outstanding
    /// nonce.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidArgument`] if no nonce is pending,
    /// otherwise propagates the wallet store's failure.
    pub async fn verify_wallet(
        &self,
        tenant_id: &str,
        account_id: &str,
        binding_id: &str,
        signature: String,
    ) -> Result<WalletBinding, EngineError> {
        self.get_account(tenant_id, account_id).await?;
        let binding = self.wallets.get_binding(account_id, binding_id).await?;
        if binding.pending_nonce.is_none() {
            return Err(EngineError::InvalidArgument(
                "no verification nonce is outstanding for this binding".to_owned(),
            ));
        }
        self.wallets.mark_verified(account_id, binding_id, signature).await
    }

    /// # Errors
    /// Propagates the wallet store's failure.
    pub async fn list_wallets(&self, tenant_id: &str, account_id: &str) -> Result<Vec<WalletBinding>, EngineError> {
        self.get_account(tenant_id, account_id).await?;
        self.wallets.list_bindings(account_id).await
    }

    /// # Errors
    /// Propagates the gasbank store's failure.
    pub async fn get_gasbank_account(&self, tenant_id: &str, account_id: &str) -> Result<GasBankAccount, EngineError> {
        self.get_account(tenant_id, account_id).await?;
        self.gasbank.get_account(account_id).await
    }

    /// # Errors
    /// Propagates the gasbank store's failure.
    pub async fn gasbank_deposit(
        &self,
        tenant_id: &str,
        account_id: &str,
        amount: i64,
    ) -> Result<GasBankAccount, EngineError> {
        self.get_account(tenant_id, account_id).await?;
        if amount <= 0 {
            return Err(EngineError::InvalidArgument("deposit amount must be positive".to_owned()));
        }
        self.gasbank.deposit(account_id, amount).await
    }

    /// # Errors
    /// Returns [`EngineError::InsufficientFunds`] if `available < amount`.
    pub async fn gasbank_reserve(
        &self,
        tenant_id: &str,
        account_id: &str,
        amount: i64,
    ) -> Result<(GasBankAccount, engine_stores::model::Reservation), EngineError> {
        self.get_account(tenant_id, account_id).await?;
        if amount <= 0 {
            return Err(EngineError::InvalidArgument("reserve amount must be positive".to_owned()));
        }
        self.gasbank.reserve(account_id, amount).await
    }

    /// # Errors
    /// Propagates the gasbank store's failure.
    pub async fn gasbank_settle(
        &self,
        reservation_id: &str,
        outcome: ReservationOutcome,
    ) -> Result<GasBankAccount, EngineError> {
        self.gasbank.settle(reservation_id, outcome).await
    }
}

fn require_tenant(account_tenant_id: &str, caller_tenant_id: &str) -> Result<(), EngineError> {
    if account_tenant_id == caller_tenant_id {
        Ok(())
    } else {
        Err(EngineError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_stores::mem::{InMemoryAccountStore, InMemoryGasBankStore, InMemorySecretStore, InMemoryWalletStore};
    use engine_stores::model::ReservationOutcome;

    fn service() -> AccountsService {
        AccountsService::new(
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(InMemorySecretStore::new()),
            Arc::new(InMemoryWalletStore::new()),
            Arc::new(InMemoryGasBankStore::new()),
            MasterKey::new([7u8; 32]),
        )
    }

    #[tokio::test]
    async fn cross_tenant_get_account_is_not_found() {
        let svc = service();
        let a = svc.create_account("alice", "tenant-a", HashMap::new()).await.unwrap();
        let err = svc.get_account("tenant-b", &a.id).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound));
    }

    #[tokio::test]
    async fn secret_round_trips_for_owner() {
        let svc = service();
        let a = svc.create_account("alice", "tenant-a", HashMap::new()).await.unwrap();
        svc.upsert_secret("tenant-a", &a.id, "k", "v").await.unwrap();
        let plaintext = svc.get_secret("tenant-a", &a.id, "k", "alice").await.unwrap();
        assert_eq!(plaintext, "v");
    }

    #[tokio::test]
    async fn secret_access_policy_scenario() {
        let svc = service();
        let a = svc.create_account("alice", "tenant-a", HashMap::new()).await.unwrap();
        svc.upsert_secret("tenant-a", &a.id, "k", "v").await.unwrap();

        let err = svc.get_secret("tenant-a", &a.id, "k", "svc1").await.unwrap_err();
        assert!(matches!(err, EngineError::PermissionDenied));

        svc.set_secret_policy("tenant-a", &a.id, "k", vec!["svc1".to_owned()])
            .await
            .unwrap();
        let plaintext = svc.get_secret("tenant-a", &a.id, "k", "svc1").await.unwrap();
        assert_eq!(plaintext, "v");

        let err = svc.get_secret("tenant-a", &a.id, "k", "svc2").await.unwrap_err();
        assert!(matches!(err, EngineError::PermissionDenied));
    }

    #[tokio::test]
    async fn tampered_ciphertext_fails_to_decrypt() {
        let svc = service();
        let a = svc.create_account("alice", "tenant-a", HashMap::new()).await.unwrap();
        svc.upsert_secret("tenant-a", &a.id, "k", "v").await.unwrap();

        let mut record = svc.secrets.get(&a.id, "k").await.unwrap();
        let mut bytes = record.ciphertext.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        record.ciphertext = String::from_utf8(bytes).unwrap();
        svc.secrets.upsert(&a.id, "k", record.ciphertext).await.unwrap();

        let err = svc.get_secret("tenant-a", &a.id, "k", "alice").await.unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
    }

    #[tokio::test]
    async fn secret_upsert_is_idempotent_on_value_and_bumps_version() {
        let svc = service();
        let a = svc.create_account("alice", "tenant-a", HashMap::new()).await.unwrap();
        let first = svc.upsert_secret("tenant-a", &a.id, "k", "v").await.unwrap();
        let second = svc.upsert_secret("tenant-a", &a.id, "k", "v").await.unwrap();
        assert_eq!(second.version, first.version + 1);
        assert_eq!(svc.get_secret("tenant-a", &a.id, "k", "alice").await.unwrap(), "v");
    }

    #[tokio::test]
    async fn gasbank_reserve_then_release_returns_to_prior_balance() {
        let svc = service();
        let a = svc.create_account("alice", "tenant-a", HashMap::new()).await.unwrap();
        svc.gasbank_deposit("tenant-a", &a.id, 100).await.unwrap();
        let (after_reserve, reservation) = svc.gasbank_reserve("tenant-a", &a.id, 40).await.unwrap();
        assert_eq!(after_reserve.balance, 100);
        assert_eq!(after_reserve.reserved, 40);

        let after_release = svc
            .gasbank_settle(&reservation.id, ReservationOutcome::Release)
            .await
            .unwrap();
        assert_eq!(after_release.balance, 100);
        assert_eq!(after_release.reserved, 0);
    }

    #[tokio::test]
    async fn gasbank_reserve_beyond_available_is_insufficient_funds() {
        let svc = service();
        let a = svc.create_account("alice", "tenant-a", HashMap::new()).await.unwrap();
        svc.gasbank_deposit("tenant-a", &a.id, 10).await.unwrap();
        let err = svc.gasbank_reserve("tenant-a", &a.id, 20).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds));
    }

    #[tokio::test]
    async fn wallet_verification_requires_outstanding_nonce() {
        let svc = service();
        let a = svc.create_account("alice", "tenant-a", HashMap::new()).await.unwrap();
        let binding = svc
            .issue_wallet_nonce("tenant-a", &a.id, "0xabc", "main")
            .await
            .unwrap();
        let verified = svc
            .verify_wallet("tenant-a", &a.id, &binding.id, "sig".to_owned())
            .await
            .unwrap();
        assert!(verified.verified);
    }
}
