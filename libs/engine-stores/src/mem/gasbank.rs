use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use engine_errors::EngineError;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::model::{GasBankAccount, Reservation, ReservationOutcome};
use crate::traits::GasBankStore;

/// Everything for one account's gasbank row, guarded by a single lock so
/// `Reserve`/`Settle` serialize per-account (§5: "Gasbank transitions
/// serialize per-account via a store-level row lock").
struct AccountState {
    account: GasBankAccount,
    deposits: Vec<i64>,
    reservations: Vec<Reservation>,
}

pub struct InMemoryGasBankStore {
    accounts: DashMap<String, Mutex<AccountState>>,
    /// reservation id -> account id, for settlement lookup without an
    /// account-id argument.
    reservation_index: DashMap<String, String>,
}

impl InMemoryGasBankStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            reservation_index: DashMap::new(),
        }
    }

    fn ensure(&self, account_id: &str) {
        self.accounts.entry(account_id.to_owned()).or_insert_with(|| {
            Mutex::new(AccountState {
                account: GasBankAccount {
                    id: Uuid::new_v4().to_string(),
                    account_id: account_id.to_owned(),
                    balance: 0,
                    reserved: 0,
                    updated_at: Utc::now(),
                },
                deposits: Vec::new(),
                reservations: Vec::new(),
            })
        });
    }
}

impl Default for InMemoryGasBankStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GasBankStore for InMemoryGasBankStore {
    async fn get_account(&self, account_id: &str) -> Result<GasBankAccount, EngineError> {
        self.ensure(account_id);
        let entry = self.accounts.get(account_id).ok_or(EngineError::NotFound)?;
        Ok(entry.lock().account.clone())
    }

    async fn deposit(&self, account_id: &str, amount: i64) -> Result<GasBankAccount, EngineError> {
        if amount <= 0 {
            return Err(EngineError::InvalidArgument(
                "deposit amount must be positive".to_owned(),
            ));
        }
        self.ensure(account_id);
        let entry = self.accounts.get(account_id).ok_or(EngineError::NotFound)?;
        let mut state = entry.lock();
        state.account.balance += amount;
        state.account.updated_at = Utc::now();
        state.deposits.push(amount);
        Ok(state.account.clone())
    }

    async fn reserve(
        &self,
        account_id: &str,
        amount: i64,
    ) -> Result<(GasBankAccount, Reservation), EngineError> {
        if amount <= 0 {
            return Err(EngineError::InvalidArgument(
                "reserve amount must be positive".to_owned(),
            ));
        }
        self.ensure(account_id);
        let entry = self.accounts.get(account_id).ok_or(EngineError::NotFound)?;
        let mut state = entry.lock();
        if state.account.available() < amount {
            return Err(EngineError::InsufficientFunds);
        }
        state.account.reserved += amount;
        state.account.updated_at = Utc::now();

        let reservation = Reservation {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_owned(),
            amount,
            settled: false,
            created_at: Utc::now(),
        };
        state.reservations.push(reservation.clone());
        self.reservation_index
            .insert(reservation.id.clone(), account_id.to_owned());

        Ok((state.account.clone(), reservation))
    }

    async fn settle(
        &self,
        reservation_id: &str,
        outcome: ReservationOutcome,
    ) -> Result<GasBankAccount, EngineError> {
        let account_id = self
            .reservation_index
            .get(reservation_id)
            .map(|r| r.clone())
            .ok_or(EngineError::NotFound)?;
        let entry = self.accounts.get(&account_id).ok_or(EngineError::NotFound)?;
        let mut state = entry.lock();

        let reservation = state
            .reservations
            .iter_mut()
            .find(|r| r.id == reservation_id)
            .ok_or(EngineError::NotFound)?;
        if reservation.settled {
            return Err(EngineError::Conflict(format!(
                "reservation '{reservation_id}' already settled"
            )));
        }
        let amount = reservation.amount;
        reservation.settled = true;

        match outcome {
            ReservationOutcome::Consume => {
                state.account.balance -= amount;
                state.account.reserved -= amount;
            }
            ReservationOutcome::Release => {
                state.account.reserved -= amount;
            }
        }
        state.account.updated_at = Utc::now();
        Ok(state.account.clone())
    }

    async fn list_deposits(&self, account_id: &str) -> Result<Vec<i64>, EngineError> {
        let entry = self.accounts.get(account_id).ok_or(EngineError::NotFound)?;
        Ok(entry.lock().deposits.clone())
    }

    async fn list_transactions(&self, account_id: &str) -> Result<Vec<Reservation>, EngineError> {
        let entry = self.accounts.get(account_id).ok_or(EngineError::NotFound)?;
        Ok(entry.lock().reservations.clone())
    }

    async fn list_open_reservations(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, EngineError> {
        let mut open = Vec::new();
        for entry in &self.accounts {
            let state = entry.value().lock();
            open.extend(
                state
                    .reservations
                    .iter()
                    .filter(|r| !r.settled && r.created_at < older_than)
                    .cloned(),
            );
        }
        Ok(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deposit_then_reserve_then_consume_keeps_invariant() {
        let store = InMemoryGasBankStore::new();
        store.deposit("a1", 100).await.unwrap();
        let (acct, res) = store.reserve("a1", 40).await.unwrap();
        assert_eq!(acct.balance, 100);
        assert_eq!(acct.reserved, 40);
        assert!(acct.balance >= acct.reserved);

        let settled = store.settle(&res.id, ReservationOutcome::Consume).await.unwrap();
        assert_eq!(settled.balance, 60);
        assert_eq!(settled.reserved, 0);
    }

    #[tokio::test]
    async fn reserve_then_release_returns_to_prior_state() {
        let store = InMemoryGasBankStore::new();
        store.deposit("a1", 100).await.unwrap();
        let before = store.get_account("a1").await.unwrap();

        let (_, res) = store.reserve("a1", 30).await.unwrap();
        store.settle(&res.id, ReservationOutcome::Release).await.unwrap();

        let after = store.get_account("a1").await.unwrap();
        assert_eq!(before.balance, after.balance);
        assert_eq!(before.reserved, after.reserved);
    }

    #[tokio::test]
    async fn reserve_beyond_available_fails() {
        let store = InMemoryGasBankStore::new();
        store.deposit("a1", 10).await.unwrap();
        let err = store.reserve("a1", 11).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds));
    }

    #[tokio::test]
    async fn double_settle_conflicts() {
        let store = InMemoryGasBankStore::new();
        store.deposit("a1", 100).await.unwrap();
        let (_, res) = store.reserve("a1", 10).await.unwrap();
        store.settle(&res.id, ReservationOutcome::Release).await.unwrap();
        let err = store
            .settle(&res.id, ReservationOutcome::Release)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn list_open_reservations_finds_unsettled_past_cutoff() {
        let store = InMemoryGasBankStore::new();
        store.deposit("a1", 100).await.unwrap();
        store.reserve("a1", 10).await.unwrap();

        let far_future = Utc::now() + chrono::Duration::hours(1);
        let open = store.list_open_reservations(far_future).await.unwrap();
        assert_eq!(open.len(), 1);
    }
}
