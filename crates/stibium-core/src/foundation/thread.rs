//! Conversation identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The type of a conversation thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadKind {
    /// A one-to-one conversation with a user.
    #[default]
    User,
    /// A group conversation.
    Group,
}

/// An addressable conversation on the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Thread {
    /// Platform identifier of the thread.
    pub id: String,
    /// Whether this is a user or group thread.
    #[serde(default)]
    pub kind: ThreadKind,
}

impl Thread {
    /// Creates a thread with an explicit kind.
    pub fn new(id: impl Into<String>, kind: ThreadKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Creates the private thread of a user.
    pub fn user(id: impl Into<String>) -> Self {
        Self::new(id, ThreadKind::User)
    }

    /// Creates a group thread.
    pub fn group(id: impl Into<String>) -> Self {
        Self::new(id, ThreadKind::Group)
    }
}

impl fmt::Display for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ThreadKind::User => write!(f, "user:{}", self.id),
            ThreadKind::Group => write!(f, "group:{}", self.id),
        }
    }
}
