//! Integration layer - External system interfaces.
//!
//! The platform collaborator is the only external system the core talks to.

pub mod platform;

pub use platform::{BoxedPlatform, Credentials, EventSink, Platform, Session, TypingStatus};
