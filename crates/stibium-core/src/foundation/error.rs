//! Unified error types for the Stibium core.
//!
//! Handler-authored code reports failures through [`HandlerResult`], which is
//! plain `anyhow`; those failures are captured at the executor boundary and
//! never reach the loops. The enums below describe failures of the core itself.

use thiserror::Error;

/// Result type for handler-authored code.
pub type HandlerResult<T> = anyhow::Result<T>;

// =============================================================================
// Configuration Errors
// =============================================================================

/// A handler could not be registered.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    /// The handler declares no event kind.
    #[error("handler {handler} did not define an event kind")]
    MissingEventKind {
        /// Display name of the handler.
        handler: String,
    },

    /// A timeout handler declares no delay.
    #[error("timeout handler {handler} did not define a timeout")]
    MissingTimeout {
        /// Display name of the handler.
        handler: String,
    },

    /// The handler's `setup` failed.
    #[error("setup of handler {handler} failed: {reason}")]
    Setup {
        /// Display name of the handler.
        handler: String,
        /// Terminal message of the failure.
        reason: String,
    },
}

impl ConfigurationError {
    /// Creates a setup error.
    pub fn setup(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Setup {
            handler: handler.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Platform Errors
// =============================================================================

/// Errors reported by the platform collaborator.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// Logging in failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// No session has been started.
    #[error("platform session is not connected")]
    NotConnected,

    /// A message could not be delivered.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

// =============================================================================
// Cancellation
// =============================================================================

/// An operator interrupt that the call site did not agree to absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("execution cancelled by operator interrupt")]
pub struct Cancelled;

// =============================================================================
// Bot Errors
// =============================================================================

/// Errors surfaced by [`Bot`](crate::Bot) operations.
#[derive(Debug, Error)]
pub enum BotError {
    /// Handler registration failed.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The platform collaborator failed.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// An operator interrupt propagated out of a loop.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// `listen` was called before `login`.
    #[error("the bot is not logged in yet")]
    NotLoggedIn,

    /// `listen` was called twice.
    #[error("the bot is already listening")]
    AlreadyListening,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for handler registration.
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

/// Result type for platform calls.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Result type for bot operations.
pub type BotResult<T> = Result<T, BotError>;
