//! # Stibium Core
//!
//! The event-dispatch core of the Stibium chat-bot runtime.
//!
//! This crate receives inbound events from a messaging platform, routes them
//! to registered handlers, runs timers alongside, and isolates every piece of
//! handler code so that one handler's failure never takes down the runtime or
//! its siblings.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! Core abstractions and type system:
//! - **Events**: the closed [`EventKind`] tag and the normalized [`Event`]
//! - **Conversations**: [`Thread`], [`Message`], [`Reaction`]
//! - **Errors**: [`ConfigurationError`], [`PlatformError`], [`Cancelled`], [`BotError`]
//!
//! ### Framework Layer
//!
//! Event processing and scheduling:
//! - **Handlers**: the [`Handler`] trait and [`Registered`] handles
//! - **Registry**: per-kind ordered handler sequences ([`HandlerRegistry`])
//! - **Executor**: the supervised call boundary ([`Executor`])
//! - **Scheduler**: timeouts, expiries and recurrences ([`Scheduler`])
//! - **Dispatcher**: the inbound event loop ([`Dispatcher`])
//!
//! ### Integration Layer
//!
//! External system interfaces:
//! - **Platform**: the messaging backend capability surface ([`Platform`])
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────┐     ┌────────────┐     ┌──────────┐     ┌──────────┐
//! │ Platform │────▶│ Dispatcher │────▶│ Registry │────▶│ Executor │──┐
//! └──────────┘     └────────────┘     └──────────┘     └──────────┘  │
//!      ▲                                                    ▲        │
//!      │                               ┌───────────┐        │        │
//!      │                               │ Scheduler │────────┘        │
//!      │                               └───────────┘                 │
//!      └─────────────────── replies, typing, reports ────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use stibium_core::prelude::*;
//!
//! struct Ping;
//!
//! #[async_trait]
//! impl Handler for Ping {
//!     fn event_kind(&self) -> Option<EventKind> {
//!         Some(EventKind::Message)
//!     }
//!
//!     async fn check(&self, event: &Event, _bot: &Bot) -> HandlerResult<bool> {
//!         Ok(event.as_message().and_then(|m| m.text.as_deref()) == Some("ping"))
//!     }
//!
//!     async fn execute(&self, event: &Event, bot: &Bot) -> HandlerResult<()> {
//!         if let Some(message) = event.as_message() {
//!             bot.reply(message, "pong").await?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bot = Bot::new(platform, BotOptions::new("stibium").owner("100"));
//!     bot.register(Ping).await?;
//!     bot.login(&Credentials::new("login", "password")).await?;
//!     bot.listen().await?;
//!     Ok(())
//! }
//! ```

// Architectural layers
pub mod foundation;
pub mod framework;
pub mod integration;

pub mod bot;
pub mod testing;

// Re-export foundation types
pub use foundation::{
    BotError, BotResult, Cancelled, ConfigurationError, ConfigurationResult, Event, EventKind,
    EventPayload, HandlerResult, Mention, Message, MessageId, PlatformError, PlatformResult,
    Reaction, SendOptions, Thread, ThreadKind,
};

// Re-export framework types
pub use framework::{
    BoxedHandler, DEFAULT_DEADLINE, DEFAULT_IDLE_TICK, Dispatcher, Executor, Fault, Handler,
    HandlerId, HandlerRegistry, Notices, Outcome, Registered, RegistryEntry, RunOptions,
    Scheduler,
};

// Re-export integration types
pub use integration::{BoxedPlatform, Credentials, EventSink, Platform, Session, TypingStatus};

pub use bot::{Bot, BotOptions};

// Re-exported so handler implementations need no direct dependency.
pub use async_trait::async_trait;

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::*;
    pub use super::framework::{Handler, Outcome, Registered, RunOptions};
    pub use super::integration::{Credentials, Platform, TypingStatus};
    pub use super::{Bot, BotOptions, async_trait};
}
