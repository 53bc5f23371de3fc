//! Configuration structures for parcursor.
//!
//! Configuration is plain data: build it in code or load it from a TOML file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CursorConfig {
    /// Claim strategy backing the cursor
    #[serde(default)]
    pub strategy: ClaimStrategyKind,

    /// Worker threads used by the fan-out (default: available parallelism)
    #[serde(default)]
    pub workers: Option<usize>,

    /// Wait behavior for the optimistic strategy
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Queue sizing for the blocking strategy
    #[serde(default)]
    pub handoff: HandoffConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How racing consumers claim records.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStrategyKind {
    /// Shared append-only buffer plus a CAS-advanced claim index (default)
    #[default]
    Optimistic,
    /// Two-stage queue; consumers park until a record is handed over
    Blocking,
}

impl ClaimStrategyKind {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStrategyKind::Optimistic => "optimistic",
            ClaimStrategyKind::Blocking => "blocking",
        }
    }
}

/// Escalating wait used while the buffer has nothing left to claim.
///
/// The first `spin_limit` rounds busy-spin, the next `yield_limit` rounds
/// yield the thread, and every later round sleeps with
/// `min(max_sleep, base_sleep * 2^n)`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BackoffConfig {
    /// Busy-spin rounds before yielding
    #[serde(default = "default_spin_limit")]
    pub spin_limit: u32,

    /// Yield rounds before sleeping
    #[serde(default = "default_yield_limit")]
    pub yield_limit: u32,

    /// First sleep duration in microseconds
    #[serde(default = "default_base_sleep_micros")]
    pub base_sleep_micros: u64,

    /// Sleep cap in microseconds
    #[serde(default = "default_max_sleep_micros")]
    pub max_sleep_micros: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            spin_limit: default_spin_limit(),
            yield_limit: default_yield_limit(),
            base_sleep_micros: default_base_sleep_micros(),
            max_sleep_micros: default_max_sleep_micros(),
        }
    }
}

impl BackoffConfig {
    /// Sleep cap as a duration.
    pub fn max_sleep(&self) -> Duration {
        Duration::from_micros(self.max_sleep_micros)
    }
}

/// Queue sizing for the blocking-handoff strategy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HandoffConfig {
    /// Producer-side queue capacity (`None` = unbounded, producer never waits)
    #[serde(default)]
    pub stage_one_capacity: Option<usize>,

    /// Consumer-side queue capacity (`None` = unbounded)
    #[serde(default = "default_stage_two_capacity")]
    pub stage_two_capacity: Option<usize>,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            stage_one_capacity: None,
            stage_two_capacity: default_stage_two_capacity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default)]
    pub level: LogLevel,

    /// Log format
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_spin_limit() -> u32 {
    6
}
fn default_yield_limit() -> u32 {
    10
}
fn default_base_sleep_micros() -> u64 {
    10
}
fn default_max_sleep_micros() -> u64 {
    1000
}
fn default_stage_two_capacity() -> Option<usize> {
    Some(1024)
}

/// Number of workers used when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl CursorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: CursorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> crate::Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Use the given claim strategy.
    pub fn with_strategy(mut self, strategy: ClaimStrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Use a fixed number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Worker count after applying the default.
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(default_workers)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.workers == Some(0) {
            return Err(crate::Error::Config("At least one worker required".into()));
        }

        if self.handoff.stage_one_capacity == Some(0) || self.handoff.stage_two_capacity == Some(0)
        {
            return Err(crate::Error::Config(
                "Handoff queue capacity must be positive".into(),
            ));
        }

        if self.backoff.base_sleep_micros > self.backoff.max_sleep_micros {
            return Err(crate::Error::Config(format!(
                "Backoff base sleep ({}us) exceeds max sleep ({}us)",
                self.backoff.base_sleep_micros, self.backoff.max_sleep_micros
            )));
        }

        if self.backoff.spin_limit > 16 {
            tracing::warn!(
                spin_limit = self.backoff.spin_limit,
                "Large spin limit burns CPU while the buffer is drained"
            );
        }

        Ok(())
    }
}
