//! Platform collaborator trait.
//!
//! Everything platform-specific (sessions, wire formats, delivery receipts)
//! lives behind [`Platform`]. The core only consumes this fixed capability
//! surface, so a messaging backend is plugged in by implementing one trait.
//!
//! # Event Forwarding
//!
//! Instead of patching callbacks into a client at runtime, the core asks the
//! platform to forward a kind of event through an explicit subscription:
//!
//! ```rust,ignore
//! #[async_trait]
//! impl Platform for MyClient {
//!     async fn forward_events(&self, kind: EventKind, sink: EventSink) -> PlatformResult<()> {
//!         self.subscriptions.lock().insert(kind, sink);
//!         Ok(())
//!     }
//!     // ...
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::foundation::{
    Event, EventKind, Message, MessageId, PlatformResult, SendOptions, Thread,
};

/// Channel through which the platform delivers events to the dispatcher.
pub type EventSink = mpsc::Sender<Event>;

/// A boxed platform trait object.
pub type BoxedPlatform = Arc<dyn Platform>;

/// Login credentials handed to [`Platform::start_session`].
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Account login.
    pub login: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An established platform session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// User id of the account the bot is logged in as.
    pub user_id: String,
}

/// State of the typing indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingStatus {
    /// The bot appears to be typing.
    Typing,
    /// The indicator is cleared.
    Stopped,
}

/// The capability surface the core consumes from a messaging platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Logs in and starts a session.
    async fn start_session(&self, credentials: &Credentials) -> PlatformResult<Session>;

    /// Starts delivering events of `kind` into `sink`.
    ///
    /// The core calls this at most once per kind.
    async fn forward_events(&self, kind: EventKind, sink: EventSink) -> PlatformResult<()>;

    /// Sends a text message and returns its id.
    async fn send_message(
        &self,
        thread: &Thread,
        text: &str,
        options: &SendOptions,
    ) -> PlatformResult<MessageId>;

    /// Acknowledges delivery of a message.
    async fn mark_delivered(&self, thread: &Thread, message_id: &MessageId)
    -> PlatformResult<()>;

    /// Marks a conversation as read.
    async fn mark_read(&self, thread: &Thread) -> PlatformResult<()>;

    /// Sets or clears the typing indicator.
    async fn set_typing(&self, thread: &Thread, status: TypingStatus) -> PlatformResult<()>;

    /// Looks up a user's display name.
    async fn fetch_user_display_name(&self, user_id: &str) -> PlatformResult<String>;

    /// Fetches a message by id, if it still exists.
    async fn fetch_message_by_id(
        &self,
        thread: &Thread,
        message_id: &MessageId,
    ) -> PlatformResult<Option<Message>>;
}
