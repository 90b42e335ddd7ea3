//! Configuration for the chatflow runtime.
//!
//! Settings are layered with figment: built-in defaults, then
//! `chatflow.toml` / `chatflow.yaml`, then `CHATFLOW_*` environment
//! variables, then anything merged programmatically.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ChatflowConfig, DispatcherSettings, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, RegistrySettings, SpanEventConfig,
};
pub use validation::validate_config;
