//! Runtime configuration.
//!
//! Supports loading configuration from:
//! 1. Configuration files (YAML)
//! 2. Environment variables (with `QDIST_` prefix)
//!
//! Configuration precedence (highest to lowest):
//! 1. Environment variables
//! 2. Configuration file
//! 3. Default values
//!
//! ```yaml
//! clock:
//!   barrier_timeout_ms: 30000
//! node:
//!   qubit_capacity: 16
//!   pool_capacity: 4
//! timing:
//!   default_duration: 1
//!   nodes:
//!     QPU_1:
//!       TWO_QUBIT:
//!         cx: 3
//! logging:
//!   level: debug
//!   format: json
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use qdist_ir::NodeId;
use qdist_sched::{TimingProfile, TimingTable};

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Clock settings
    #[serde(default)]
    pub clock: ClockConfig,
    /// Computing node settings
    #[serde(default)]
    pub node: NodeConfig,
    /// Controller settings
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Operation timing
    #[serde(default)]
    pub timing: TimingConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Clock settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Longest wait for all nodes to report one tick
    #[serde(default = "default_barrier_timeout")]
    pub barrier_timeout_ms: u64,
}

/// Computing node settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// General-purpose qubits per node
    #[serde(default = "default_qubit_capacity")]
    pub qubit_capacity: usize,
    /// Pre-allocated entanglement qubits per node
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
    /// Polls of a receive before it times out
    #[serde(default = "default_receive_attempts")]
    pub receive_attempts: u32,
    /// Pause between two polls
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
    /// Length of one wait for a control message while idle
    #[serde(default = "default_schedule_timeout")]
    pub schedule_timeout_ms: u64,
}

/// Controller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Wait for all schedule acknowledgments
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_ms: u64,
    /// Wait for all result reports once the clock stopped
    #[serde(default = "default_result_timeout")]
    pub result_timeout_ms: u64,
}

/// Operation timing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Duration of every operation on nodes without their own table
    #[serde(default)]
    pub default_duration: Option<u64>,
    /// Per-node timing tables
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, TimingTable>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Console,
    /// JSON structured logging
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format: "console" or "json"
    #[serde(default)]
    pub format: LogFormat,
}

// Default value functions
fn default_barrier_timeout() -> u64 {
    30_000
}

fn default_qubit_capacity() -> usize {
    16
}

fn default_pool_capacity() -> usize {
    4
}

fn default_receive_attempts() -> u32 {
    10
}

fn default_retry_interval() -> u64 {
    50
}

fn default_schedule_timeout() -> u64 {
    5_000
}

fn default_ack_timeout() -> u64 {
    5_000
}

fn default_result_timeout() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            barrier_timeout_ms: default_barrier_timeout(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            qubit_capacity: default_qubit_capacity(),
            pool_capacity: default_pool_capacity(),
            receive_attempts: default_receive_attempts(),
            retry_interval_ms: default_retry_interval(),
            schedule_timeout_ms: default_schedule_timeout(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: default_ack_timeout(),
            result_timeout_ms: default_result_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Console,
        }
    }
}

impl ClockConfig {
    /// Barrier timeout as a duration.
    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.barrier_timeout_ms)
    }
}

impl NodeConfig {
    /// Pause between receive polls.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Idle wait for a control message.
    pub fn schedule_timeout(&self) -> Duration {
        Duration::from_millis(self.schedule_timeout_ms)
    }
}

impl ControllerConfig {
    /// Acknowledgment deadline.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Result deadline.
    pub fn result_timeout(&self) -> Duration {
        Duration::from_millis(self.result_timeout_ms)
    }
}

impl TimingConfig {
    /// Timing profile for the scheduler.
    pub fn profile(&self) -> TimingProfile {
        TimingProfile {
            fallback: Some(TimingTable::uniform(self.default_duration.unwrap_or(1))),
            nodes: self.nodes.clone(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config = Self::from_yaml(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml_ng::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration: file (if given), then environment overrides.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.merge_env_with(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Merge environment variables into this configuration.
    ///
    /// `lookup` resolves a variable name. Only variables that are set and
    /// parse override the current values.
    #[must_use]
    pub fn merge_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        // Logging
        if let Some(v) = lookup("QDIST_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("QDIST_LOG_FORMAT") {
            self.logging.format = match v.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Console,
            };
        }

        // Clock
        if let Some(v) = parsed(&lookup, "QDIST_BARRIER_TIMEOUT_MS") {
            self.clock.barrier_timeout_ms = v;
        }

        // Nodes
        if let Some(v) = parsed(&lookup, "QDIST_QUBIT_CAPACITY") {
            self.node.qubit_capacity = v;
        }
        if let Some(v) = parsed(&lookup, "QDIST_POOL_CAPACITY") {
            self.node.pool_capacity = v;
        }
        if let Some(v) = parsed(&lookup, "QDIST_RECEIVE_ATTEMPTS") {
            self.node.receive_attempts = v;
        }
        if let Some(v) = parsed(&lookup, "QDIST_RETRY_INTERVAL_MS") {
            self.node.retry_interval_ms = v;
        }

        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.clock.barrier_timeout_ms == 0, "clock.barrier_timeout_ms"),
            (self.node.qubit_capacity == 0, "node.qubit_capacity"),
            (self.node.receive_attempts == 0, "node.receive_attempts"),
            (self.node.schedule_timeout_ms == 0, "node.schedule_timeout_ms"),
            (self.controller.ack_timeout_ms == 0, "controller.ack_timeout_ms"),
            (self.controller.result_timeout_ms == 0, "controller.result_timeout_ms"),
        ];
        if let Some((_, field)) = checks.iter().find(|(zero, _)| *zero) {
            return Err(ConfigError::ValidationError(format!("{field} must be greater than 0")));
        }
        if self.timing.default_duration == Some(0) {
            return Err(ConfigError::ValidationError(
                "timing.default_duration must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
