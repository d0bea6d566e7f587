//! # Application State & Configuration
//!
//! [`AppState`] is cloned into every handler. It wraps the
//! [`ComplianceEngine`] (which owns the rule store, the ledger and all
//! monitoring state), the optional Postgres pool used for write-through
//! persistence, and the optional verification-feed client.
//!
//! [`AppConfig`] is read once from the environment at start-up.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use credmate_core::{Clock, SystemClock};
use credmate_ledger::CredentialLedger;
use credmate_monitor::{ComplianceEngine, EngineConfig, SweepConfig};
use credmate_rules::RuleStore;
use sqlx::PgPool;
use thiserror::Error;
use url::Url;

use crate::verification::VerificationFeedClient;

// -- Configuration ------------------------------------------------------------

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// A configuration variable held a value that could not be used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value for {variable}: {reason}")]
pub struct ConfigError {
    pub variable: &'static str,
    pub reason: String,
}

/// Application configuration.
///
/// Custom `Debug` redacts the auth token and the database URL.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared bearer secret. `None` disables authentication.
    pub auth_token: Option<String>,
    /// Postgres connection string. `None` runs in-memory only.
    pub database_url: Option<String>,
    /// Directory of YAML rulepacks installed at start-up.
    pub rulepack_dir: Option<PathBuf>,
    /// Time between scheduled sweeps.
    pub sweep_interval: Duration,
    /// Sweep tuning.
    pub sweep: SweepConfig,
    /// Engine tuning.
    pub engine: EngineConfig,
    /// Base URL of the license verification feed.
    pub verification_feed_url: Option<Url>,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("rulepack_dir", &self.rulepack_dir)
            .field("sweep_interval", &self.sweep_interval)
            .field("sweep", &self.sweep)
            .field("verification_feed_url", &self.verification_feed_url)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            database_url: None,
            rulepack_dir: None,
            sweep_interval: Duration::from_secs(86_400),
            sweep: SweepConfig::default(),
            engine: EngineConfig::default(),
            verification_feed_url: None,
            log_format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Unset and empty variables take
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(port) = get("PORT") {
            config.port = parse_number("PORT", &port)?;
        }
        config.auth_token = get("AUTH_TOKEN");
        config.database_url = get("DATABASE_URL");
        config.rulepack_dir = get("RULEPACK_DIR").map(PathBuf::from);
        if let Some(secs) = get("SWEEP_INTERVAL_SECS") {
            let secs: u64 = parse_number("SWEEP_INTERVAL_SECS", &secs)?;
            if secs == 0 {
                return Err(ConfigError {
                    variable: "SWEEP_INTERVAL_SECS",
                    reason: "must be greater than zero".into(),
                });
            }
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = get("SWEEP_TIMEOUT_MS") {
            config.sweep.timeout_ms = parse_number("SWEEP_TIMEOUT_MS", &ms)?;
        }
        if let Some(n) = get("SWEEP_CONCURRENCY") {
            let n: usize = parse_number("SWEEP_CONCURRENCY", &n)?;
            config.sweep.concurrency = n.max(1);
        }
        if let Some(url) = get("VERIFICATION_FEED_URL") {
            config.verification_feed_url = Some(Url::parse(&url).map_err(|e| ConfigError {
                variable: "VERIFICATION_FEED_URL",
                reason: e.to_string(),
            })?);
        }
        config.log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("text") | Some("pretty") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError {
                    variable: "LOG_FORMAT",
                    reason: format!("expected 'json' or 'text', got '{other}'"),
                })
            }
        };
        Ok(config)
    }
}

fn parse_number<T>(variable: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError {
        variable,
        reason: e.to_string(),
    })
}

// -- Application State --------------------------------------------------------

/// Shared application state accessible to all route handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Rule store, ledger, evaluator and monitoring state.
    pub engine: Arc<ComplianceEngine>,
    /// PostgreSQL pool for write-through persistence. `None` runs
    /// in-memory only.
    pub db_pool: Option<PgPool>,
    /// Client for the external license verification feed.
    pub verification: Option<VerificationFeedClient>,
    pub config: AppConfig,
}

impl AppState {
    /// In-memory state with default configuration and the system clock.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    /// In-memory state with the given configuration and optional pool.
    pub fn with_config(config: AppConfig, db_pool: Option<PgPool>) -> Self {
        Self::with_clock(config, db_pool, Arc::new(SystemClock))
    }

    /// State whose stores and engine all read time from `clock`.
    pub fn with_clock(config: AppConfig, db_pool: Option<PgPool>, clock: Arc<dyn Clock>) -> Self {
        let rules = Arc::new(RuleStore::with_clock(clock.clone()));
        let ledger = Arc::new(CredentialLedger::with_clock(clock.clone()));
        let engine = Arc::new(ComplianceEngine::new(
            rules,
            ledger,
            clock,
            config.engine.clone(),
        ));
        let verification = config
            .verification_feed_url
            .clone()
            .map(VerificationFeedClient::new);
        Self {
            engine,
            db_pool,
            verification,
            config,
        }
    }

    pub fn rules(&self) -> &RuleStore {
        self.engine.rules()
    }

    pub fn ledger(&self) -> &CredentialLedger {
        self.engine.ledger()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
