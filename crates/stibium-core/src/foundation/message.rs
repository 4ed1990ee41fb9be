//! Message and reaction data carried by events.

use serde::{Deserialize, Serialize};

use super::thread::Thread;

/// Platform identifier of a message.
pub type MessageId = String;

/// A received message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier.
    pub id: MessageId,
    /// Text content; `None` for attachment-only messages.
    pub text: Option<String>,
    /// Author's user id.
    pub author: String,
    /// Conversation the message was posted in.
    pub thread: Thread,
    /// The message this one replies to, if any.
    #[serde(default)]
    pub replied_to: Option<Box<Message>>,
    /// Unix timestamp in milliseconds.
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    /// Creates a message without text.
    pub fn new(id: impl Into<MessageId>, author: impl Into<String>, thread: Thread) -> Self {
        Self {
            id: id.into(),
            text: None,
            author: author.into(),
            thread,
            replied_to: None,
            timestamp: 0,
        }
    }

    /// Sets the text content.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the replied-to message.
    pub fn with_reply_to(mut self, message: Message) -> Self {
        self.replied_to = Some(Box::new(message));
        self
    }
}

/// A reaction added to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    /// Identifier of the reacted-to message.
    pub message_id: MessageId,
    /// The reaction itself (usually an emoji).
    pub reaction: String,
    /// User who reacted.
    pub author: String,
    /// Conversation of the reacted-to message.
    pub thread: Thread,
    /// The reacted-to message, when it could be fetched.
    #[serde(default)]
    pub message: Option<Message>,
}

impl Reaction {
    /// Creates a reaction without the reacted-to message attached.
    pub fn new(
        message_id: impl Into<MessageId>,
        reaction: impl Into<String>,
        author: impl Into<String>,
        thread: Thread,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            reaction: reaction.into(),
            author: author.into(),
            thread,
            message: None,
        }
    }
}

/// A user mention inside outgoing text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    /// Mentioned user id.
    pub user_id: String,
    /// Byte offset of the mention in the text.
    pub offset: usize,
    /// Length of the mention in bytes.
    pub length: usize,
}

impl Mention {
    /// Creates a mention covering `length` bytes at `offset`.
    pub fn new(user_id: impl Into<String>, offset: usize, length: usize) -> Self {
        Self {
            user_id: user_id.into(),
            offset,
            length,
        }
    }
}

/// Options for outgoing messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Users mentioned in the text.
    pub mentions: Vec<Mention>,
    /// Message this one replies to.
    pub reply_to: Option<MessageId>,
}

impl SendOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mention.
    pub fn mention(mut self, mention: Mention) -> Self {
        self.mentions.push(mention);
        self
    }

    /// Links the message as a reply.
    pub fn reply_to(mut self, message_id: impl Into<MessageId>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }
}
