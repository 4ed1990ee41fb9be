//! # Stibium Framework
//!
//! Ready-made handler variants for building bots on top of `stibium-core`.
//!
//! This layer provides:
//! - [`CommandHandler`] for prefix commands such as `%echo hello`
//! - [`ReactionHandler`] for reactions to one message, optionally expiring
//! - [`TimeoutHandler`] for one-shot delayed work
//! - [`RecurrentHandler`] for self-rescheduling periodic work
//!
//! Each variant wraps an async closure; anything more specialised can
//! implement [`Handler`](stibium_core::Handler) directly.

mod action;

pub mod command;
pub mod reaction;
pub mod recurrent;
pub mod timeout;

pub use action::BoxFuture;
pub use command::{Command, CommandHandler};
pub use reaction::ReactionHandler;
pub use recurrent::RecurrentHandler;
pub use timeout::TimeoutHandler;
