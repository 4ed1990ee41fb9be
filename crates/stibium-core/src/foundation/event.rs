//! Event system for the Stibium core.
//!
//! This module provides the shared event representation that flows from the
//! platform collaborator, through the dispatcher, into handlers:
//!
//! - [`EventKind`] - The closed tag classifying an inbound occurrence
//! - [`Event`] - A normalized event with its kind, thread and payload
//! - [`EventPayload`] - The kind-specific data carried by an event
//!
//! Scheduler-driven handlers never see platform events; they receive a
//! [`EventPayload::Tick`] carrying the instant they fired at.

use std::fmt;
use std::str::FromStr;

use tokio::time::Instant;

use super::message::{Message, Reaction};
use super::thread::Thread;

// ============================================================================
// Event Kind
// ============================================================================

/// Classification of events.
///
/// The kind decides which registry bucket holds a handler and whether the
/// handler is dispatch-driven (reactive) or scheduler-driven.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new message was received.
    Message,
    /// A reaction was added to a message.
    ReactionAdded,
    /// One-shot delayed work.
    Timeout,
    /// Self-rescheduling periodic work.
    Recurrent,
    /// Any other platform callback, by name.
    Other(String),
}

impl EventKind {
    /// Returns the canonical name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::ReactionAdded => "reaction_added",
            Self::Timeout => "_timeout",
            Self::Recurrent => "_recurrent",
            Self::Other(name) => name,
        }
    }

    /// Returns `true` for kinds driven by the scheduler instead of inbound events.
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Timeout | Self::Recurrent)
    }

    /// Returns `true` for kinds delivered by the platform collaborator.
    pub fn is_reactive(&self) -> bool {
        !self.is_scheduled()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "message" => Self::Message,
            "reaction_added" => Self::ReactionAdded,
            "_timeout" => Self::Timeout,
            "_recurrent" => Self::Recurrent,
            other => Self::Other(other.to_string()),
        })
    }
}

// ============================================================================
// Event Payload
// ============================================================================

/// Kind-specific data carried by an [`Event`].
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// A received message.
    Message(Message),
    /// A reaction added to a message.
    Reaction(Reaction),
    /// A scheduler firing at the given instant.
    Tick(Instant),
    /// An event the core does not model, passed through untouched.
    Raw(serde_json::Value),
}

// ============================================================================
// Event
// ============================================================================

/// A normalized event as seen by handlers.
#[derive(Debug, Clone)]
pub struct Event {
    kind: EventKind,
    thread: Option<Thread>,
    payload: EventPayload,
}

impl Event {
    /// Creates a new event.
    pub fn new(kind: EventKind, thread: Option<Thread>, payload: EventPayload) -> Self {
        Self {
            kind,
            thread,
            payload,
        }
    }

    /// Creates a `message` event from a received message.
    pub fn message(message: Message) -> Self {
        let thread = Some(message.thread.clone());
        Self::new(EventKind::Message, thread, EventPayload::Message(message))
    }

    /// Creates a `reaction_added` event.
    pub fn reaction(reaction: Reaction) -> Self {
        let thread = Some(reaction.thread.clone());
        Self::new(
            EventKind::ReactionAdded,
            thread,
            EventPayload::Reaction(reaction),
        )
    }

    /// Creates a scheduler tick for the given kind.
    pub fn tick(kind: EventKind, at: Instant) -> Self {
        Self::new(kind, None, EventPayload::Tick(at))
    }

    /// Returns the kind of this event.
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Returns the conversation this event belongs to, if any.
    pub fn thread(&self) -> Option<&Thread> {
        self.thread.as_ref()
    }

    /// Returns the payload.
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub(crate) fn payload_mut(&mut self) -> &mut EventPayload {
        &mut self.payload
    }

    /// Returns the message, if this is a message event.
    pub fn as_message(&self) -> Option<&Message> {
        match &self.payload {
            EventPayload::Message(message) => Some(message),
            _ => None,
        }
    }

    /// Returns the reaction, if this is a reaction event.
    pub fn as_reaction(&self) -> Option<&Reaction> {
        match &self.payload {
            EventPayload::Reaction(reaction) => Some(reaction),
            _ => None,
        }
    }

    /// Returns the firing instant, if this is a scheduler tick.
    pub fn tick_instant(&self) -> Option<Instant> {
        match self.payload {
            EventPayload::Tick(at) => Some(at),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in [
            EventKind::Message,
            EventKind::ReactionAdded,
            EventKind::Timeout,
            EventKind::Recurrent,
            EventKind::Other("person_removed".into()),
        ] {
            let parsed: EventKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_scheduled_kinds() {
        assert!(EventKind::Timeout.is_scheduled());
        assert!(EventKind::Recurrent.is_scheduled());
        assert!(EventKind::Message.is_reactive());
        assert!(EventKind::Other("typing".into()).is_reactive());
    }

    #[test]
    fn test_message_event_carries_thread() {
        let message = Message::new("m1", "U1", Thread::group("T1")).with_text("hi");
        let event = Event::message(message);

        assert_eq!(event.kind(), &EventKind::Message);
        assert_eq!(event.thread(), Some(&Thread::group("T1")));
        assert_eq!(event.as_message().and_then(|m| m.text.as_deref()), Some("hi"));
        assert!(event.as_reaction().is_none());
    }
}
