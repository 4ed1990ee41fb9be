//! Foundation layer - Core abstractions and type system.
//!
//! This module contains the fundamental building blocks of Stibium:
//! - Event kinds and the normalized event representation
//! - Conversation threads, messages and reactions
//! - Error types shared by every other layer

pub mod error;
pub mod event;
pub mod message;
pub mod thread;

pub use error::{
    BotError, BotResult, Cancelled, ConfigurationError, ConfigurationResult, HandlerResult,
    PlatformError, PlatformResult,
};
pub use event::{Event, EventKind, EventPayload};
pub use message::{Mention, Message, MessageId, Reaction, SendOptions};
pub use thread::{Thread, ThreadKind};
