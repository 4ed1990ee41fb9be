//! Event dispatcher for Stibium.
//!
//! The [`Dispatcher`] consumes the bot's inbound event feed and routes each
//! event to the handlers registered for its kind.
//!
//! # Dispatch Protocol
//!
//! For every inbound event:
//!
//! 1. Preprocess: a `message` is acknowledged as delivered; a reaction without
//!    its message gets the message attached when the platform can find it
//! 2. Snapshot the registry bucket for the event kind
//! 3. For each handler still registered, in registration order:
//!    - run `check` through the executor, with notices suppressed
//!    - a faulting `check` permanently disables the handler and the owner is told
//!    - a matching handler is *engaged*: mark read, typing on, short pause,
//!      `execute` (notices on, interrupts caught), typing off
//!
//! Every matching handler runs; there is no early exit across handlers.
//! Each event is dispatched on its own task, so a slow handler never holds up
//! the feed.

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, debug, error, span, warn};

use super::executor::{Outcome, RunOptions};
use super::registry::RegistryEntry;
use crate::bot::Bot;
use crate::foundation::{Cancelled, Event, EventKind, EventPayload};
use crate::integration::TypingStatus;

/// Routes inbound events to registered handlers.
#[derive(Clone)]
pub struct Dispatcher {
    bot: Bot,
}

impl Dispatcher {
    /// Creates a dispatcher for `bot`.
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Consumes `events` until `shutdown` is cancelled or the feed closes.
    ///
    /// Returns `Err(Cancelled)` as soon as any dispatch lets an operator
    /// interrupt through.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<Event>,
        shutdown: CancellationToken,
    ) -> Result<(), Cancelled> {
        debug!("Dispatch loop started");
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(in_flight = tasks.len(), "Dispatch loop stopping");
                    tasks.abort_all();
                    return Ok(());
                }
                received = events.recv() => match received {
                    Some(event) => {
                        let dispatcher = self.clone();
                        tasks.spawn(async move { dispatcher.dispatch(event).await });
                    }
                    None => {
                        debug!("Event feed closed");
                        break;
                    }
                },
                Some(joined) = tasks.join_next() => {
                    if let Err(cancelled) = Self::settle(joined) {
                        tasks.abort_all();
                        return Err(cancelled);
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            Self::settle(joined)?;
        }
        Ok(())
    }

    /// Dispatches one event and returns how many handlers were engaged.
    pub async fn dispatch(&self, mut event: Event) -> Result<usize, Cancelled> {
        let kind = event.kind().clone();
        let span = span!(Level::DEBUG, "dispatch", kind = %kind);

        async move {
            self.preprocess(&mut event).await;

            let registry = self.bot.registry();
            let mut engaged = 0;

            for entry in registry.snapshot(&kind) {
                // Removed by a concurrent fault, expiry or unregister.
                if !registry.contains(&kind, entry.id) {
                    continue;
                }

                let name = entry.handler.name();
                let options = RunOptions::new()
                    .in_thread(event.thread().cloned())
                    .notify(false);
                let outcome = self
                    .bot
                    .executor()
                    .run(
                        &format!("{name}.check"),
                        entry.handler.check(&event, &self.bot),
                        options,
                    )
                    .await?;

                match outcome {
                    Outcome::Completed(true) => {
                        self.engage(&entry, &event).await?;
                        engaged += 1;
                    }
                    Outcome::Completed(false) => {}
                    _ => self.disable(&kind, &entry).await,
                }
            }

            debug!(engaged, "Event dispatched");
            Ok(engaged)
        }
        .instrument(span)
        .await
    }

    async fn preprocess(&self, event: &mut Event) {
        let platform = self.bot.platform();
        match event.payload_mut() {
            EventPayload::Message(message) => {
                if let Err(e) = platform.mark_delivered(&message.thread, &message.id).await {
                    warn!(message = %message.id, error = %e, "Failed to mark message as delivered");
                }
            }
            EventPayload::Reaction(reaction) if reaction.message.is_none() => {
                match platform
                    .fetch_message_by_id(&reaction.thread, &reaction.message_id)
                    .await
                {
                    Ok(message) => reaction.message = message,
                    Err(e) => {
                        debug!(message = %reaction.message_id, error = %e, "Reacted message unavailable")
                    }
                }
            }
            _ => {}
        }
    }

    async fn engage(&self, entry: &RegistryEntry, event: &Event) -> Result<(), Cancelled> {
        let platform = self.bot.platform();
        let thread = event.thread();

        if let Some(thread) = thread {
            if let Err(e) = platform.mark_read(thread).await {
                warn!(thread = %thread, error = %e, "Failed to mark thread as read");
            }
            if let Err(e) = platform.set_typing(thread, TypingStatus::Typing).await {
                warn!(thread = %thread, error = %e, "Failed to set typing indicator");
            }
        }
        tokio::time::sleep(self.bot.options().engagement_delay).await;

        let options = RunOptions::new()
            .in_thread(thread.cloned())
            .catch_interrupt(true);
        let result = self
            .bot
            .executor()
            .run(
                &format!("{}.execute", entry.handler.name()),
                entry.handler.execute(event, &self.bot),
                options,
            )
            .await;

        if let Some(thread) = thread {
            if let Err(e) = platform.set_typing(thread, TypingStatus::Stopped).await {
                warn!(thread = %thread, error = %e, "Failed to clear typing indicator");
            }
        }
        result.map(drop)
    }

    async fn disable(&self, kind: &EventKind, entry: &RegistryEntry) {
        let name = entry.handler.name();
        if !self.bot.registry().remove(kind, entry.id) {
            return;
        }
        error!(handler = %name, id = %entry.id, "Handler disabled after a faulting check");
        self.bot
            .executor()
            .report_to_owner(&format!(
                "The handler {name} was disabled, because of causing an exception."
            ))
            .await;
    }

    fn settle(
        joined: Result<Result<usize, Cancelled>, tokio::task::JoinError>,
    ) -> Result<(), Cancelled> {
        match joined {
            Ok(result) => result.map(drop),
            Err(e) if e.is_panic() => {
                error!(error = %e, "Dispatch task panicked");
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("bot", &self.bot.name())
            .finish()
    }
}
