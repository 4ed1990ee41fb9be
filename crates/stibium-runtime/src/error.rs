//! Runtime error types.

use stibium_core::BotError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while running a bot.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The bot failed to log in or listen.
    #[error(transparent)]
    Bot(#[from] BotError),

    /// The bot is not logged in and no credentials are configured.
    #[error("No credentials configured: set bot.login and bot.password")]
    MissingCredentials,

    /// A process signal handler could not be installed.
    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
