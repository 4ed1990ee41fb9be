//! Configuration module for the Stibium runtime.
//!
//! This module provides layered configuration loading (files, environment,
//! programmatic merges) and validation of the resulting settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BotConfig, DispatcherConfig, ExecutorConfig, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, SchedulerConfig, SpanEventConfig, StibiumConfig,
};
pub use validation::validate_config;
