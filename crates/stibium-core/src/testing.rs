//! Testing utilities for Stibium.
//!
//! [`MockPlatform`] is an in-memory [`Platform`] that records every call the
//! core makes and lets a test inject events through the forwarded sinks, so
//! handlers and the dispatcher can be exercised without a messaging backend.
//!
//! # Example
//!
//! ```rust,ignore
//! let platform = Arc::new(MockPlatform::new().with_user("U1", "Alice"));
//! let bot = Bot::new(platform.clone(), BotOptions::new("test").prefix("%"));
//! bot.register(echo).await?;
//! bot.login(&Credentials::default()).await?;
//!
//! platform.deliver(Event::message(message)).await;
//! assert_eq!(platform.sent_to(&Thread::group("T1")), ["hello world"]);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::foundation::{
    Event, EventKind, Message, MessageId, PlatformError, PlatformResult, SendOptions, Thread,
};
use crate::integration::{Credentials, EventSink, Platform, Session, TypingStatus};

// ============================================================================
// Recorded Calls
// ============================================================================

/// A call made by the core to the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    /// `start_session`.
    StartSession {
        /// Login used.
        login: String,
    },
    /// `forward_events`.
    ForwardEvents(EventKind),
    /// `send_message`.
    SendMessage {
        /// Target thread.
        thread: Thread,
        /// Message text.
        text: String,
        /// Send options.
        options: SendOptions,
    },
    /// `mark_delivered`.
    MarkDelivered {
        /// Thread of the message.
        thread: Thread,
        /// Delivered message.
        message_id: MessageId,
    },
    /// `mark_read`.
    MarkRead(Thread),
    /// `set_typing`.
    SetTyping(Thread, TypingStatus),
    /// `fetch_user_display_name`.
    FetchUserDisplayName(String),
    /// `fetch_message_by_id`.
    FetchMessageById {
        /// Thread of the message.
        thread: Thread,
        /// Requested message.
        message_id: MessageId,
    },
}

// ============================================================================
// Mock Platform
// ============================================================================

/// A recording in-memory platform.
#[derive(Default)]
pub struct MockPlatform {
    calls: Mutex<Vec<PlatformCall>>,
    sinks: Mutex<HashMap<EventKind, EventSink>>,
    users: HashMap<String, String>,
    messages: HashMap<MessageId, Message>,
    reject_login: bool,
    fail_sends: bool,
    next_message: AtomicU64,
}

impl MockPlatform {
    /// Creates an empty platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user with a display name.
    pub fn with_user(mut self, user_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.users.insert(user_id.into(), name.into());
        self
    }

    /// Adds a message that can be fetched by id.
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.insert(message.id.clone(), message);
        self
    }

    /// Makes `start_session` fail.
    pub fn reject_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    /// Makes every `send_message` fail.
    pub fn fail_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    /// Returns every recorded call, in order.
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().clone()
    }

    /// Returns every sent message as `(thread, text)`.
    pub fn sent_messages(&self) -> Vec<(Thread, String)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PlatformCall::SendMessage { thread, text, .. } => {
                    Some((thread.clone(), text.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Returns the texts sent to `thread`.
    pub fn sent_to(&self, thread: &Thread) -> Vec<String> {
        self.sent_messages()
            .into_iter()
            .filter(|(target, _)| target == thread)
            .map(|(_, text)| text)
            .collect()
    }

    /// Returns the kinds forwarding was requested for, in order.
    pub fn forwarded_kinds(&self) -> Vec<EventKind> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PlatformCall::ForwardEvents(kind) => Some(kind.clone()),
                _ => None,
            })
            .collect()
    }

    /// Delivers an event through the sink forwarded for its kind.
    ///
    /// Returns `false` if forwarding was never requested for the kind.
    pub async fn deliver(&self, event: Event) -> bool {
        let sink = self.sinks.lock().get(event.kind()).cloned();
        match sink {
            Some(sink) => sink.send(event).await.is_ok(),
            None => false,
        }
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn start_session(&self, credentials: &Credentials) -> PlatformResult<Session> {
        self.record(PlatformCall::StartSession {
            login: credentials.login.clone(),
        });
        if self.reject_login {
            return Err(PlatformError::Auth("invalid credentials".to_string()));
        }
        Ok(Session {
            user_id: credentials.login.clone(),
        })
    }

    async fn forward_events(&self, kind: EventKind, sink: EventSink) -> PlatformResult<()> {
        self.record(PlatformCall::ForwardEvents(kind.clone()));
        self.sinks.lock().insert(kind, sink);
        Ok(())
    }

    async fn send_message(
        &self,
        thread: &Thread,
        text: &str,
        options: &SendOptions,
    ) -> PlatformResult<MessageId> {
        self.record(PlatformCall::SendMessage {
            thread: thread.clone(),
            text: text.to_string(),
            options: options.clone(),
        });
        if self.fail_sends {
            return Err(PlatformError::SendFailed("mock send failure".to_string()));
        }
        let n = self.next_message.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mid.{n}"))
    }

    async fn mark_delivered(
        &self,
        thread: &Thread,
        message_id: &MessageId,
    ) -> PlatformResult<()> {
        self.record(PlatformCall::MarkDelivered {
            thread: thread.clone(),
            message_id: message_id.clone(),
        });
        Ok(())
    }

    async fn mark_read(&self, thread: &Thread) -> PlatformResult<()> {
        self.record(PlatformCall::MarkRead(thread.clone()));
        Ok(())
    }

    async fn set_typing(&self, thread: &Thread, status: TypingStatus) -> PlatformResult<()> {
        self.record(PlatformCall::SetTyping(thread.clone(), status));
        Ok(())
    }

    async fn fetch_user_display_name(&self, user_id: &str) -> PlatformResult<String> {
        self.record(PlatformCall::FetchUserDisplayName(user_id.to_string()));
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("user {user_id}")))
    }

    async fn fetch_message_by_id(
        &self,
        thread: &Thread,
        message_id: &MessageId,
    ) -> PlatformResult<Option<Message>> {
        self.record(PlatformCall::FetchMessageById {
            thread: thread.clone(),
            message_id: message_id.clone(),
        });
        Ok(self.messages.get(message_id).cloned())
    }
}

impl std::fmt::Debug for MockPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPlatform")
            .field("calls", &self.calls.lock().len())
            .field("users", &self.users.len())
            .field("messages", &self.messages.len())
            .finish()
    }
}
