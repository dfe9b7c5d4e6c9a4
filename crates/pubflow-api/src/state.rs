//! # Application State
//!
//! Shared state for the Axum application: the lifecycle controller, the
//! optional database pool, and the configuration read at startup.

use std::sync::Arc;
use std::time::Duration;

use pubflow_core::ActorId;
use pubflow_lifecycle::{ContributorPermissions, LifecycleController};
use pubflow_notify::{BackoffPolicy, EffectSink, NotifierConfig, NotifierHandle};
use sqlx::PgPool;
use thiserror::Error;

/// A configuration variable could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value for {variable}: {message}")]
pub struct ConfigError {
    pub variable: &'static str,
    pub message: String,
}

/// Application configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Site moderators. They hold `Admin` on every artifact.
    pub moderators: Vec<ActorId>,
    /// Effect queue and retry settings.
    pub notifier: NotifierConfig,
    /// Postgres connection string. `None` runs in-memory only.
    pub database_url: Option<String>,
    /// How often elapsed embargoes are lifted. Never zero.
    pub embargo_sweep: Duration,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("moderators", &self.moderators.len())
            .field("notifier", &self.notifier)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("embargo_sweep", &self.embargo_sweep)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            moderators: Vec::new(),
            notifier: NotifierConfig::default(),
            database_url: None,
            embargo_sweep: Duration::from_secs(3600),
        }
    }
}

impl AppConfig {
    /// Read the configuration from the process environment.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `PORT` | 8080 |
    /// | `PUBFLOW_MODERATORS` | none (comma-separated actor UUIDs) |
    /// | `NOTIFY_QUEUE_CAPACITY` | 1024 |
    /// | `NOTIFY_MAX_IN_FLIGHT` | 32 |
    /// | `NOTIFY_MAX_ATTEMPTS` | 5 |
    /// | `NOTIFY_BASE_BACKOFF_MS` | 200 |
    /// | `NOTIFY_MAX_BACKOFF_MS` | 30000 |
    /// | `DATABASE_URL` | unset (in-memory only) |
    /// | `EMBARGO_SWEEP_SECS` | 3600 |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let backoff = defaults.notifier.backoff;

        let moderators = match lookup("PUBFLOW_MODERATORS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    ActorId::parse(s).map_err(|e| ConfigError {
                        variable: "PUBFLOW_MODERATORS",
                        message: e.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let embargo_sweep_secs = parse_or(
            &lookup,
            "EMBARGO_SWEEP_SECS",
            defaults.embargo_sweep.as_secs(),
        )?;
        if embargo_sweep_secs == 0 {
            return Err(ConfigError {
                variable: "EMBARGO_SWEEP_SECS",
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            port: parse_or(&lookup, "PORT", defaults.port)?,
            moderators,
            notifier: NotifierConfig {
                queue_capacity: parse_or(
                    &lookup,
                    "NOTIFY_QUEUE_CAPACITY",
                    defaults.notifier.queue_capacity,
                )?,
                max_in_flight: parse_or(
                    &lookup,
                    "NOTIFY_MAX_IN_FLIGHT",
                    defaults.notifier.max_in_flight,
                )?,
                backoff: BackoffPolicy {
                    base: Duration::from_millis(parse_or(
                        &lookup,
                        "NOTIFY_BASE_BACKOFF_MS",
                        backoff.base.as_millis() as u64,
                    )?),
                    max: Duration::from_millis(parse_or(
                        &lookup,
                        "NOTIFY_MAX_BACKOFF_MS",
                        backoff.max.as_millis() as u64,
                    )?),
                    max_attempts: parse_or(&lookup, "NOTIFY_MAX_ATTEMPTS", backoff.max_attempts)?,
                },
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            embargo_sweep: Duration::from_secs(embargo_sweep_secs),
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    variable: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(variable) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError {
            variable,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Shared application state passed to all route handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub controller: Arc<LifecycleController>,
    pub config: AppConfig,
    /// Write-through persistence. `None` in in-memory mode.
    pub db_pool: Option<PgPool>,
    /// Intake side of the running notifier, when there is one.
    pub notifier: Option<NotifierHandle>,
}

impl AppState {
    /// Build state around a fresh controller that hands effects to `sink`.
    pub fn new(config: AppConfig, sink: Arc<dyn EffectSink>) -> Self {
        let permissions = Arc::new(ContributorPermissions::new(config.moderators.iter().copied()));
        Self {
            controller: Arc::new(LifecycleController::new(permissions, sink)),
            config,
            db_pool: None,
            notifier: None,
        }
    }

    /// Build state whose effects go to a running notifier.
    pub fn with_notifier(config: AppConfig, notifier: NotifierHandle) -> Self {
        let mut state = Self::new(config, Arc::new(notifier.clone()));
        state.notifier = Some(notifier);
        state
    }

    pub fn with_pool(mut self, pool: Option<PgPool>) -> Self {
        self.db_pool = pool;
        self
    }
}
