//! # Stibium
//!
//! An event-driven chat bot framework: handlers register for event kinds,
//! every piece of handler code runs isolated behind a deadline, and one-shot
//! timeouts and recurring jobs share a single scheduler.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  events   ┌────────────┐  check / execute  ┌──────────────────┐
//! │ Platform │──────────▶│ Dispatcher │──────────────────▶│ Handler registry │
//! └──────────┘           └────────────┘                   └──────────────────┘
//!      ▲                       │                                   ▲
//!      │ send, typing, read    ▼                                   │ expire
//!      └────────────────  Executor  ◀────────────────────────  Scheduler
//! ```
//!
//! - **stibium-core**: events, the `Handler` trait, registry, executor,
//!   scheduler, dispatcher and the `Bot` handle
//! - **stibium-framework**: ready-made command, reaction, timeout and
//!   recurrent handlers
//! - **stibium-runtime**: configuration, logging and signal handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stibium::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = StibiumRuntime::new();
//!     let bot = runtime.bot(Arc::new(MyPlatform::connect().await?));
//!
//!     bot.register(CommandHandler::new("echo", |cmd: Command, bot: Bot| async move {
//!         bot.reply(&cmd.message, &cmd.args).await?;
//!         Ok(())
//!     }))
//!     .await?;
//!
//!     runtime.run(&bot).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use stibium_core as core;
pub use stibium_framework as framework;
pub use stibium_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use stibium::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use stibium_runtime::{StibiumConfig, StibiumRuntime};

    // Core types for handlers and platforms
    pub use stibium_core::prelude::*;

    // Ready-made handlers
    pub use stibium_framework::{
        Command, CommandHandler, ReactionHandler, RecurrentHandler, TimeoutHandler,
    };
}
