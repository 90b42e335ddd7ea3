//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use chatflow_framework::{DEFAULT_CAPACITY, DEFAULT_MAX_REROUTE_DEPTH, RegistryConfig};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatflowConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Callback registry settings.
    #[serde(default)]
    pub registry: RegistrySettings,

    /// Dispatch loop settings.
    #[serde(default)]
    pub dispatcher: DispatcherSettings,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the lowercase name used in filter directives.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the matching `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line format of emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Newline-delimited JSON. Needs the `json-log` feature; without it the
    /// full format is used instead.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids in each line.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line in each line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-target overrides, e.g. `chatflow_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            rotation: LogRotation::Never,
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            filters: HashMap::new(),
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Callback registry settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Entries kept before the least recently used one is evicted.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// First counter id handed out.
    #[serde(default)]
    pub counter_start: u32,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            counter_start: 0,
        }
    }
}

impl RegistrySettings {
    /// Converts to the registry's own config.
    pub fn to_registry_config(self) -> RegistryConfig {
        RegistryConfig {
            capacity: self.capacity,
            counter_start: self.counter_start,
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Dispatch loop settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DispatcherSettings {
    /// Number of worker lanes.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the inbound queue and of each lane.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds between conversation expiry sweeps; 0 disables sweeping.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Delay before an update source is polled again after an error.
    #[serde(default = "default_poll_retry_ms")]
    pub poll_retry_ms: u64,

    #[serde(default = "default_max_reroute_depth")]
    pub max_reroute_depth: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            sweep_interval_secs: default_sweep_interval_secs(),
            poll_retry_ms: default_poll_retry_ms(),
            max_reroute_depth: default_max_reroute_depth(),
        }
    }
}

impl DispatcherSettings {
    /// Sweep period, if sweeping is enabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn poll_retry(&self) -> Duration {
        Duration::from_millis(self.poll_retry_ms)
    }
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_poll_retry_ms() -> u64 {
    1000
}

fn default_max_reroute_depth() -> usize {
    DEFAULT_MAX_REROUTE_DEPTH
}
