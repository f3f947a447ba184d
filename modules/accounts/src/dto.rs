//! REST wire shapes for the accounts module (§6 HTTP surface).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use engine_stores::model::{Account, GasBankAccount, Reservation, SecretRecord, WalletBinding};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAccountRequest {
    pub owner: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccountResponse {
    pub id: String,
    pub owner: String,
    pub tenant_id: String,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(a: Account) -> Self {
        Self {
            id: a.id,
            owner: a.owner,
            tenant_id: a.tenant_id,
            metadata: a.metadata,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertSecretRequest {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SecretMetadataResponse {
    pub name: String,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl From<SecretRecord> for SecretMetadataResponse {
    fn from(r: SecretRecord) -> Self {
        Self {
            name: r.name,
            version: r.version,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SecretValueResponse {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetSecretPolicyRequest {
    pub allowed_service_ids: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepositRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GasBankResponse {
    pub account_id: String,
    pub balance: i64,
    pub reserved: i64,
    pub available: i64,
}

impl From<GasBankAccount> for GasBankResponse {
    fn from(g: GasBankAccount) -> Self {
        Self {
            account_id: g.account_id.clone(),
            balance: g.balance,
            reserved: g.reserved,
            available: g.available(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReserveRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReservationResponse {
    pub reservation_id: String,
    pub gasbank: GasBankResponse,
}

impl From<(GasBankAccount, Reservation)> for ReservationResponse {
    fn from((account, reservation): (GasBankAccount, Reservation)) -> Self {
        Self {
            reservation_id: reservation.id,
            gasbank: account.into(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IssueWalletNonceRequest {
    pub address: String,
    pub label: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyWalletRequest {
    pub signature: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletBindingResponse {
    pub id: String,
    pub address: String,
    pub label: String,
    pub verified: bool,
    pub is_primary: bool,
    pub pending_nonce: Option<String>,
}

impl From<WalletBinding> for WalletBindingResponse {
    fn from(w: WalletBinding) -> Self {
        Self {
            id: w.id,
            address: w.address,
            label: w.label,
            verified: w.verified,
            is_primary: w.is_primary,
            pending_nonce: w.pending_nonce,
        }
    }
}
