//! Configuration validation utilities.

use chatflow_core::COUNTER_CEILING;

use super::error::{ConfigError, ConfigResult};
use super::schema::{ChatflowConfig, DispatcherSettings, LogOutput, LoggingConfig, RegistrySettings};

/// Validates the entire configuration.
pub fn validate_config(config: &ChatflowConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;
    validate_registry(&config.registry)?;
    validate_dispatcher(&config.dispatcher)?;
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.filters.keys().any(|target| target.trim().is_empty()) {
        return Err(ConfigError::validation("Log filter targets cannot be empty"));
    }

    Ok(())
}

fn validate_registry(registry: &RegistrySettings) -> ConfigResult<()> {
    if registry.capacity == 0 {
        return Err(ConfigError::validation(
            "Registry capacity must be greater than 0",
        ));
    }

    if registry.counter_start > COUNTER_CEILING {
        return Err(ConfigError::validation(format!(
            "Registry counter_start {} exceeds the counter ceiling {COUNTER_CEILING}",
            registry.counter_start
        )));
    }

    Ok(())
}

fn validate_dispatcher(dispatcher: &DispatcherSettings) -> ConfigResult<()> {
    if dispatcher.workers == 0 {
        return Err(ConfigError::validation(
            "Dispatcher needs at least one worker",
        ));
    }

    if dispatcher.queue_capacity == 0 {
        return Err(ConfigError::validation(
            "Dispatcher queue capacity must be greater than 0",
        ));
    }

    Ok(())
}
