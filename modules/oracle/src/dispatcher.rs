//! The generic request dispatcher (C4, §4.3). Specified once here and
//! reused by every sibling service that advances long-running requests
//! through the same state machine (spec.md: "the Oracle core is
//! specified in full and declared the canonical pattern") — `kind` is
//! only a label for logging/observation, never branched on.

use std::time::Duration;

use chrono::Utc;
use engine_errors::EngineError;
use engine_kit::DispatcherConfig;
use engine_stores::model::{Request, RequestStatus};
use engine_stores::traits::{DataSourceStore, DeadLetterStore, RequestStore, TransitionFields};
use std::sync::Arc;

use crate::resolver::{ResolveOutcome, Resolver};

/// Synchronous observation hooks around each attempt (§4.3: "hooks are
/// synchronous and must be fast; if unset, a no-op is used").
pub trait DispatchHooks: Send + Sync {
    fn on_start(&self, _request: &Request) {}
    fn on_complete(&self, _request: &Request, _error: Option<&str>, _duration: Duration) {}
}

#[derive(Default)]
pub struct NoopHooks;

impl DispatchHooks for NoopHooks {}

pub struct Dispatcher {
    kind: &'static str,
    requests: Arc<dyn RequestStore>,
    sources: Arc<dyn DataSourceStore>,
    dead_letter: Arc<dyn DeadLetterStore>,
    resolver: Arc<dyn Resolver>,
    config: DispatcherConfig,
    hooks: Arc<dyn DispatchHooks>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        kind: &'static str,
        requests: Arc<dyn RequestStore>,
        sources: Arc<dyn DataSourceStore>,
        dead_letter: Arc<dyn DeadLetterStore>,
        resolver: Arc<dyn Resolver>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            kind,
            requests,
            sources,
            dead_letter,
            resolver,
            config,
            hooks: Arc::new(NoopHooks),
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn DispatchHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Picks up due `pending` requests (§4.3 `tick()`) and drives one
    /// attempt each. Returns the number processed.
    ///
    /// # Errors
    /// Propagates a request/data-source store failure that is not a
    /// lost-race conflict.
    pub async fn tick(&self) -> Result<usize, EngineError> {
        let now = Utc::now();
        let due = self.requests.list_due(now, self.config.batch_size).await?;
        let mut processed = 0;
        for request in due {
            if self.process_one(request).await? {
                processed += 1;
            }
        }
        Ok(processed)
    }

    /// Reclaims `running` requests stuck past `attempt_timeout` (§4.3
    /// safety sweep). An explicit `retry` racing ahead of the sweep wins
    /// — the sweep's own CAS then loses with `Conflict`, which is not an
    /// error here (spec.md §9 Open Questions #1).
    ///
    /// # Errors
    /// Propagates a request store failure other than a lost race.
    pub async fn sweep_stalled(&self) -> Result<usize, EngineError> {
        let older_than = Utc::now() - to_chrono(self.config.attempt_timeout);
        let stalled = self.requests.list_stalled(older_than).await?;
        let mut reclaimed = 0;
        for request in stalled {
            match self.reschedule_or_exhaust(&request, self.config.base_delay).await {
                Ok(()) => reclaimed += 1,
                Err(EngineError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(reclaimed)
    }

    /// Returns `true` if this request was actually advanced (`false` if
    /// another dispatcher instance won the race for it first).
    async fn process_one(&self, request: Request) -> Result<bool, EngineError> {
        let attempt = request.attempts + 1;
        let transitioned = match self
            .requests
            .atomic_transition(
                &request.id,
                RequestStatus::Pending,
                RequestStatus::Running,
                TransitionFields {
                    attempts: Some(attempt),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(r) => r,
            Err(EngineError::Conflict(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        if Utc::now().signed_duration_since(transitioned.created_at) > to_chrono(self.config.ttl) {
            self.fail_terminal(&transitioned, "TTLExpired").await?;
            return Ok(true);
        }

        self.hooks.on_start(&transitioned);
        let started = std::time::Instant::now();

        let source = match self.sources.get(&transitioned.account_id, &transitioned.data_source_id).await {
            Ok(s) => s,
            Err(_) => {
                self.fail_terminal(&transitioned, "data source not found").await?;
                return Ok(true);
            }
        };

        let outcome = match tokio::time::timeout(
            self.config.resolver_timeout,
            self.resolver.resolve(&transitioned.account_id, &source, &transitioned.payload),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => ResolveOutcome::Error(anyhow::anyhow!("resolver call timed out")),
        };

        let duration = started.elapsed();
        let error_label = self.apply_outcome(&transitioned, outcome).await?;
        self.hooks.on_complete(&transitioned, error_label.as_deref(), duration);
        Ok(true)
    }

    async fn apply_outcome(&self, request: &Request, outcome: ResolveOutcome) -> Result<Option<String>, EngineError> {
        match outcome {
            ResolveOutcome::Success { result } => {
                self.requests
                    .atomic_transition(
                        &request.id,
                        RequestStatus::Running,
                        RequestStatus::Succeeded,
                        TransitionFields {
                            result: Some(result),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(None)
            }
            ResolveOutcome::Failure { error } => {
                self.fail_terminal(request, &error).await?;
                Ok(Some(error))
            }
            ResolveOutcome::Retry { after } => {
                self.reschedule_or_exhaust(request, after).await?;
                Ok(Some("retry".to_owned()))
            }
            ResolveOutcome::Error(err) => {
                let delay = backoff_delay(request.attempts, &self.config);
                self.reschedule_or_exhaust(request, delay).await?;
                Ok(Some(err.to_string()))
            }
        }
    }

    /// `attempts >= max_attempts` forces `failed` with `AttemptsExhausted`
    /// instead of rescheduling (§4.3).
    async fn reschedule_or_exhaust(&self, request: &Request, delay: Duration) -> Result<(), EngineError> {
        if request.attempts >= self.config.max_attempts {
            self.fail_terminal(request, "AttemptsExhausted").await
        } else {
            let retry_after = Utc::now() + to_chrono(delay);
            self.requests
                .atomic_transition(
                    &request.id,
                    RequestStatus::Running,
                    RequestStatus::Pending,
                    TransitionFields {
                        retry_after: Some(retry_after),
                        ..Default::default()
                    },
                )
                .await?;
            Ok(())
        }
    }

    /// Best-effort dead-letter copy before the terminal status write
    /// (spec.md §9 Open Questions #2: never transactional, never blocks).
    async fn fail_terminal(&self, request: &Request, reason: &str) -> Result<(), EngineError> {
        if self.config.dead_letter_enabled {
            let mut dead = request.clone();
            dead.status = RequestStatus::Failed;
            dead.error = Some(reason.to_owned());
            dead.result = None;
            if let Err(err) = self.dead_letter.append(dead).await {
                tracing::warn!(kind = self.kind, request_id = %request.id, error = %err, "dead-letter append failed");
            }
        }
        self.requests
            .atomic_transition(
                &request.id,
                RequestStatus::Running,
                RequestStatus::Failed,
                TransitionFields {
                    error: Some(reason.to_owned()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
}

/// `delay_n = min(base * 2^(n-1), cap) + jitter(±20%)` (§4.3).
fn backoff_delay(attempts: u32, config: &DispatcherConfig) -> Duration {
    let n = attempts.max(1);
    let exponent = i32::try_from(n - 1).unwrap_or(i32::MAX);
    let base = config.base_delay.as_secs_f64();
    let cap = config.cap_delay.as_secs_f64();
    let raw = (base * 2f64.powi(exponent)).min(cap);
    let jitter = rand::random::<f64>().mul_add(0.4, -0.2);
    Duration::from_secs_f64((raw * (1.0 + jitter)).max(0.0))
}
