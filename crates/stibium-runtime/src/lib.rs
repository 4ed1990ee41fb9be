//! Stibium Runtime - process-level setup for Stibium bots.
//!
//! This crate provides:
//! - Layered configuration loading and validation (`config`)
//! - `tracing-subscriber` setup from configuration (`logging`)
//! - [`StibiumRuntime`], which builds a configured [`Bot`](stibium_core::Bot),
//!   logs in and listens until a shutdown signal
//!
//! ```ignore
//! use stibium_runtime::StibiumRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = StibiumRuntime::new();
//!     let bot = runtime.bot(platform);
//!     bot.register(handler).await?;
//!     runtime.run(&bot).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, StibiumConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RuntimeBuilder, StibiumRuntime};

// Re-export tracing for use by bot crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for bot crates.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
