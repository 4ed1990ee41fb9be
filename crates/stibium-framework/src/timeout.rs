//! One-shot delayed work.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use stibium_core::{Bot, EventKind, Handler, HandlerResult};

use crate::action::{Action, action};

/// Runs an action once, `delay` after registration.
///
/// ```rust,ignore
/// let sent = bot.send(&thread, "This message will self-destruct").await?;
/// bot.register(TimeoutHandler::new(Duration::from_secs(10), move |bot: Bot| {
///     let thread = thread.clone();
///     async move {
///         bot.send(&thread, "Boom").await?;
///         Ok(())
///     }
/// }))
/// .await?;
/// ```
pub struct TimeoutHandler {
    delay: Duration,
    action: Action<()>,
}

impl TimeoutHandler {
    /// Creates a handler firing after `delay`.
    pub fn new<F, Fut>(delay: Duration, f: F) -> Self
    where
        F: Fn(Bot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        Self {
            delay,
            action: action(move |(), bot| f(bot)),
        }
    }

    /// Returns the delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl Handler for TimeoutHandler {
    fn name(&self) -> String {
        format!("TimeoutHandler({:?})", self.delay)
    }

    fn event_kind(&self) -> Option<EventKind> {
        Some(EventKind::Timeout)
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.delay)
    }

    async fn on_timeout(&self, bot: &Bot) -> HandlerResult<()> {
        (self.action)((), bot.clone()).await
    }
}

impl std::fmt::Debug for TimeoutHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutHandler")
            .field("delay", &self.delay)
            .finish()
    }
}
