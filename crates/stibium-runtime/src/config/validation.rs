//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, LogLevel, LogOutput, LoggingConfig, StibiumConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &StibiumConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_bot_config(&config.bot)?;

    if config.executor.deadline_secs == 0 {
        return Err(ConfigError::validation(
            "executor.deadline_secs must be greater than 0",
        ));
    }

    if config.dispatcher.channel_capacity == 0 {
        return Err(ConfigError::validation(
            "dispatcher.channel_capacity must be greater than 0",
        ));
    }

    if config.scheduler.idle_tick_ms == 0 {
        return Err(ConfigError::validation(
            "scheduler.idle_tick_ms must be greater than 0",
        ));
    }

    Ok(())
}

/// Validates log levels and file output.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    logging.level.parse::<LogLevel>()?;
    for level in logging.filters.values() {
        level.parse::<LogLevel>()?;
    }

    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    Ok(())
}

/// Validates the bot identity.
fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    if bot.name.trim().is_empty() {
        return Err(ConfigError::missing_field("bot.name"));
    }

    if bot.prefix.is_empty() {
        return Err(ConfigError::validation("bot.prefix cannot be empty"));
    }

    if bot.login.is_some() && bot.password.is_none() {
        return Err(ConfigError::missing_field("bot.password"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&StibiumConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_empty_prefix() {
        let mut config = StibiumConfig::default();
        config.bot.prefix = String::new();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_zero_deadline() {
        let mut config = StibiumConfig::default();
        config.executor.deadline_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_channel_capacity() {
        let mut config = StibiumConfig::default();
        config.dispatcher.channel_capacity = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = StibiumConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));

        let mut config = StibiumConfig::default();
        config
            .logging
            .filters
            .insert("stibium_core".to_string(), "chatty".to_string());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_validate_login_without_password() {
        let mut config = StibiumConfig::default();
        config.bot.login = Some("bot".to_string());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "bot.password"
        ));
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = StibiumConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
    }
}
