//! Oracle domain service (C4/C5, §4.3/§4.4): account-scoped CRUD over
//! data sources and dispatch requests, layered on top of the generic
//! [`crate::dispatcher::Dispatcher`] state machine. Tenant checks follow
//! the same `require_tenant`-returns-`NotFound` convention as
//! `modules/accounts` (spec.md §4.6: a cross-tenant read must not be
//! distinguishable from a missing resource).

use std::sync::Arc;

use chrono::Utc;
use engine_errors::EngineError;
use engine_stores::model::{DataSource, Request, RequestStatus};
use engine_stores::traits::{AccountStore, DataSourceStore, RequestFilter, RequestStore, TransitionFields};
use uuid::Uuid;

use crate::dto::{CreateDataSourceRequest, CreateRequestRequest, OverrideRequestRequest};

pub struct OracleService {
    accounts: Arc<dyn AccountStore>,
    sources: Arc<dyn DataSourceStore>,
    requests: Arc<dyn RequestStore>,
}

impl OracleService {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        sources: Arc<dyn DataSourceStore>,
        requests: Arc<dyn RequestStore>,
    ) -> Self {
        Self {
            accounts,
            sources,
            requests,
        }
    }

    async fn require_account(&self, tenant_id: &str, account_id: &str) -> Result<(), EngineError> {
        let account = self.accounts.get(account_id).await?;
        require_tenant(&account.tenant_id, tenant_id)
    }

    /// # Errors
    /// Returns [`EngineError::NotFound`] on a cross-tenant account.
    pub async fn create_source(
        &self,
        tenant_id: &str,
        account_id: &str,
        req: CreateDataSourceRequest,
    ) -> Result<DataSource, EngineError> {
        self.require_account(tenant_id, account_id).await?;
        self.sources
            .create(DataSource {
                id: Uuid::new_v4().to_string(),
                account_id: account_id.to_owned(),
                name: req.name,
                url: req.url,
                method: req.method,
                headers: req.headers,
                body_template: req.body_template,
                aggregation: req.aggregation,
                alternate_source_ids: req.alternate_source_ids,
            })
            .await
    }

    /// # Errors
    /// Returns [`EngineError::NotFound`] on a cross-tenant account.
    pub async fn list_sources(&self, tenant_id: &str, account_id: &str) -> Result<Vec<DataSource>, EngineError> {
        self.require_account(tenant_id, account_id).await?;
        self.sources.list(account_id).await
    }

    /// Enqueues a request in `pending`, due immediately (§4.3: "a fresh
    /// request is due as soon as it is created").
    ///
    /// # Errors
    /// Returns [`EngineError::NotFound`] on a cross-tenant account or an
    /// unknown data source.
    pub async fn create_request(
        &self,
        tenant_id: &str,
        account_id: &str,
        req: CreateRequestRequest,
    ) -> Result<Request, EngineError> {
        self.require_account(tenant_id, account_id).await?;
        self.sources.get(account_id, &req.data_source_id).await?;

        let now = Utc::now();
        self.requests
            .create(Request {
                id: Uuid::new_v4().to_string(),
                account_id: account_id.to_owned(),
                data_source_id: req.data_source_id,
                payload: req.payload,
                status: RequestStatus::Pending,
                attempts: 0,
                result: None,
                error: None,
                retry_after: now,
                created_at: now,
                updated_at: now,
            })
            .await
    }

    /// # Errors
    /// Returns [`EngineError::NotFound`] on a cross-tenant account.
    pub async fn list_requests(
        &self,
        tenant_id: &str,
        account_id: &str,
        status: Option<RequestStatus>,
    ) -> Result<Vec<Request>, EngineError> {
        self.require_account(tenant_id, account_id).await?;
        self.requests
            .list(&RequestFilter {
                account_id: Some(account_id.to_owned()),
                status,
            })
            .await
    }

    /// Operator override: force a request into `running`, `failed`, or
    /// back into `pending` for an explicit retry (§6). Goes through the
    /// same `atomic_transition` CAS every other mutation uses, so a
    /// racing dispatcher tick or sweep still cannot double-apply an
    /// outcome; a lost race surfaces as [`EngineError::Conflict`].
    ///
    /// # Errors
    /// Returns [`EngineError::NotFound`] on a cross-tenant account or
    /// unknown request, or [`EngineError::Conflict`] if the request's
    /// status changed between the read and the transition.
    pub async fn override_request(
        &self,
        tenant_id: &str,
        account_id: &str,
        request_id: &str,
        action: OverrideRequestRequest,
    ) -> Result<Request, EngineError> {
        self.require_account(tenant_id, account_id).await?;
        let current = self.requests.get(request_id).await?;
        if current.account_id != account_id {
            return Err(EngineError::NotFound);
        }

        let (to_status, fields) = match action {
            OverrideRequestRequest::Running => (RequestStatus::Running, TransitionFields::default()),
            OverrideRequestRequest::Failed { error } => (
                RequestStatus::Failed,
                TransitionFields {
                    error: Some(error),
                    ..Default::default()
                },
            ),
            OverrideRequestRequest::Retry { retry_after_secs } => (
                RequestStatus::Pending,
                TransitionFields {
                    retry_after: Some(Utc::now() + chrono::Duration::seconds(retry_after_secs.unwrap_or(0))),
                    ..Default::default()
                },
            ),
        };

        self.requests
            .atomic_transition(request_id, current.status, to_status, fields)
            .await
    }
}

fn require_tenant(account_tenant_id: &str, caller_tenant_id: &str) -> Result<(), EngineError> {
    if account_tenant_id == caller_tenant_id {
        Ok(())
    } else {
        Err(EngineError::NotFound)
    }
}
