//! Environment-driven configuration (§6 Environment).
//!
//! No figment/layered-file loading: the core reads a fixed set of
//! environment variables once at startup, matching the teacher's
//! env-first `ConfigProvider` convention but without the YAML layer
//! this crate has no use for.

use std::collections::HashSet;
use std::env;
use std::time::Duration;

use engine_crypto::MasterKey;
use engine_errors::EngineError;

/// Dispatcher defaults from §4.3.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub base_delay: Duration,
    pub cap_delay: Duration,
    pub max_attempts: u32,
    pub ttl: Duration,
    pub batch_size: usize,
    pub resolver_timeout: Duration,
    pub attempt_timeout: Duration,
    pub dead_letter_enabled: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        let resolver_timeout = Duration::from_secs(15);
        Self {
            base_delay: Duration::from_secs(1),
            cap_delay: Duration::from_secs(60),
            max_attempts: 5,
            ttl: Duration::from_secs(600),
            batch_size: 64,
            resolver_timeout,
            attempt_timeout: resolver_timeout * 2,
            dead_letter_enabled: true,
        }
    }
}

#[derive(Clone)]
pub struct EngineConfig {
    pub port: u16,
    pub bearer_tokens: HashSet<String>,
    pub jwt_secret: Option<String>,
    pub jwt_audience: Option<String>,
    pub tenant_claim: String,
    pub role_claim: String,
    pub master_key: MasterKey,
    pub dispatcher: DispatcherConfig,
    pub dispatcher_workers: usize,
    pub router_workers: usize,
    pub module_start_timeout: Duration,
    pub shutdown_drain_timeout: Duration,
    pub subscriber_lag_limit: usize,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("port", &self.port)
            .field("bearer_tokens", &self.bearer_tokens)
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_audience", &self.jwt_audience)
            .field("tenant_claim", &self.tenant_claim)
            .field("role_claim", &self.role_claim)
            .field("master_key", &"<redacted>")
            .field("dispatcher", &self.dispatcher)
            .field("dispatcher_workers", &self.dispatcher_workers)
            .field("router_workers", &self.router_workers)
            .field("module_start_timeout", &self.module_start_timeout)
            .field("shutdown_drain_timeout", &self.shutdown_drain_timeout)
            .field("subscriber_lag_limit", &self.subscriber_lag_limit)
            .finish()
    }
}

impl EngineConfig {
    /// Load from environment variables. `dev_mode` permits the
    /// `MASTER_SECRET_KEY`-less fallback (§6: "a development fallback is
    /// permitted only when a `DEV` flag is set and must emit a startup
    /// warning").
    ///
    /// # Errors
    /// Returns [`EngineError::ConfigInvalid`] if a required variable is
    /// missing or malformed.
    pub fn from_env() -> Result<Self, EngineError> {
        let dev_mode = env::var("DEV").is_ok();

        let port = env::var("PORT")
            .ok()
            .map(|p| p.parse::<u16>())
            .transpose()
            .map_err(|e| EngineError::ConfigInvalid(format!("PORT: {e}")))?
            .unwrap_or(8080);

        let bearer_tokens = env::var("BEARER_TOKENS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();

        let jwt_secret = env::var("JWT_SECRET").ok();
        let jwt_audience = env::var("JWT_AUDIENCE").ok();
        let tenant_claim = env::var("TENANT_CLAIM").unwrap_or_else(|_| "tenant_id".to_owned());
        let role_claim = env::var("ROLE_CLAIM").unwrap_or_else(|_| "role".to_owned());

        let master_key = match env::var("MASTER_SECRET_KEY") {
            Ok(raw) => MasterKey::parse(&raw)
                .map_err(|e| EngineError::ConfigInvalid(format!("MASTER_SECRET_KEY: {e}")))?,
            Err(_) if dev_mode => {
                tracing::warn!(
                    "MASTER_SECRET_KEY is unset; using an insecure development fallback key \
                     because DEV is set. Never do this in production."
                );
                MasterKey::new([0u8; 32])
            }
            Err(_) => {
                return Err(EngineError::ConfigInvalid(
                    "MASTER_SECRET_KEY is required outside DEV mode".to_owned(),
                ));
            }
        };

        let dispatcher_workers = env_usize("DISPATCHER_WORKERS", 4)?;
        let router_workers = env_usize("ROUTER_WORKERS", 4)?;

        Ok(Self {
            port,
            bearer_tokens,
            jwt_secret,
            jwt_audience,
            tenant_claim,
            role_claim,
            master_key,
            dispatcher: DispatcherConfig::default(),
            dispatcher_workers,
            router_workers,
            module_start_timeout: Duration::from_secs(30),
            shutdown_drain_timeout: Duration::from_secs(10),
            subscriber_lag_limit: 10_000,
        })
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize, EngineError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<usize>()
            .map_err(|e| EngineError::ConfigInvalid(format!("{key}: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_env::with_vars;

    #[test]
    fn missing_master_key_without_dev_is_config_invalid() {
        with_vars(
            [
                ("DEV", None::<&str>),
                ("MASTER_SECRET_KEY", None),
                ("PORT", None),
            ],
            || {
                let err = EngineConfig::from_env().unwrap_err();
                assert!(matches!(err, EngineError::ConfigInvalid(_)));
            },
        );
    }

    #[test]
    fn dev_mode_falls_back_to_insecure_key() {
        with_vars(
            [("DEV", Some("1")), ("MASTER_SECRET_KEY", None)],
            || {
                let cfg = EngineConfig::from_env().unwrap();
                assert_eq!(cfg.port, 8080);
            },
        );
    }

    #[test]
    fn bearer_tokens_parsed_from_comma_separated_list() {
        with_vars(
            [
                ("DEV", Some("1")),
                ("BEARER_TOKENS", Some("a, b ,c")),
            ],
            || {
                let cfg = EngineConfig::from_env().unwrap();
                assert_eq!(cfg.bearer_tokens.len(), 3);
                assert!(cfg.bearer_tokens.contains("b"));
            },
        );
    }
}
