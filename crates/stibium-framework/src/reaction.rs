//! Reactions to a specific message.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use stibium_core::{Bot, Event, EventKind, Handler, HandlerResult, Message, MessageId, Reaction};

use crate::action::{Action, action};

/// Handler for reactions added to one target message.
///
/// With a timeout the handler expires: it is unregistered after the given
/// lifetime and its optional expiry action runs.
///
/// ```rust,ignore
/// let poll = bot.send(&thread, "React to vote!").await?;
/// bot.register(
///     ReactionHandler::new(poll, |reaction: Reaction, bot: Bot| async move {
///         let name = bot.get_user_name(&reaction.author).await?;
///         bot.send(&reaction.thread, &format!("{name} voted {}", reaction.reaction)).await?;
///         Ok(())
///     })
///     .with_timeout(Duration::from_secs(120)),
/// )
/// .await?;
/// ```
pub struct ReactionHandler {
    target: MessageId,
    timeout: Option<Duration>,
    action: Action<Reaction>,
    on_expire: Option<Action<()>>,
}

impl ReactionHandler {
    /// Creates a handler for reactions to the message with id `target`.
    pub fn new<F, Fut>(target: impl Into<MessageId>, f: F) -> Self
    where
        F: Fn(Reaction, Bot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        Self {
            target: target.into(),
            timeout: None,
            action: action(f),
            on_expire: None,
        }
    }

    /// Creates a handler for reactions to `message`.
    pub fn for_message<F, Fut>(message: &Message, f: F) -> Self
    where
        F: Fn(Reaction, Bot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        Self::new(message.id.clone(), f)
    }

    /// Expires the handler after `lifetime`.
    pub fn with_timeout(mut self, lifetime: Duration) -> Self {
        self.timeout = Some(lifetime);
        self
    }

    /// Runs `f` when the handler expires.
    pub fn on_expire<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Bot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        self.on_expire = Some(action(move |(), bot| f(bot)));
        self
    }

    /// Returns the target message id.
    pub fn target(&self) -> &MessageId {
        &self.target
    }
}

#[async_trait]
impl Handler for ReactionHandler {
    fn name(&self) -> String {
        format!("ReactionHandler({})", self.target)
    }

    fn event_kind(&self) -> Option<EventKind> {
        Some(EventKind::ReactionAdded)
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn check(&self, event: &Event, _bot: &Bot) -> HandlerResult<bool> {
        Ok(event
            .as_reaction()
            .is_some_and(|reaction| reaction.message_id == self.target))
    }

    async fn execute(&self, event: &Event, bot: &Bot) -> HandlerResult<()> {
        match event.as_reaction() {
            Some(reaction) => (self.action)(reaction.clone(), bot.clone()).await,
            None => Ok(()),
        }
    }

    async fn on_timeout(&self, bot: &Bot) -> HandlerResult<()> {
        match &self.on_expire {
            Some(on_expire) => on_expire((), bot.clone()).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ReactionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactionHandler")
            .field("target", &self.target)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stibium_core::testing::MockPlatform;
    use stibium_core::{BotOptions, Thread};

    #[tokio::test]
    async fn test_matches_only_target_message() {
        let bot = Bot::new(Arc::new(MockPlatform::new()), BotOptions::default());
        let target = Message::new("m1", "U1", Thread::group("T1"));
        let handler = ReactionHandler::for_message(&target, |_, _| async { Ok(()) });

        let on_target = Event::reaction(Reaction::new("m1", "👍", "U2", Thread::group("T1")));
        let elsewhere = Event::reaction(Reaction::new("m2", "👍", "U2", Thread::group("T1")));
        let message = Event::message(target.clone());

        assert!(handler.check(&on_target, &bot).await.unwrap());
        assert!(!handler.check(&elsewhere, &bot).await.unwrap());
        assert!(!handler.check(&message, &bot).await.unwrap());
    }
}
