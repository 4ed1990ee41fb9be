//! Self-rescheduling periodic work.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stibium_core::{Bot, Event, EventKind, Handler, HandlerResult};
use tokio::time::Instant;

use crate::action::{Action, action};

type Schedule = Arc<dyn Fn(Instant) -> HandlerResult<Instant> + Send + Sync>;

/// Runs an action on a schedule.
///
/// The schedule maps the current firing instant to the next one. The cycle
/// only ends when the schedule returns an error.
///
/// ```rust,ignore
/// // Every day at the same time, until a fixed deadline.
/// let stop = Instant::now() + Duration::from_secs(7 * 86_400);
/// bot.register(RecurrentHandler::new(
///     move |now| {
///         let next = now + Duration::from_secs(86_400);
///         anyhow::ensure!(next < stop, "reminder expired");
///         Ok(next)
///     },
///     |_fired_at, bot: Bot| async move {
///         bot.send(&Thread::group("T1"), "Daily reminder").await?;
///         Ok(())
///     },
/// ))
/// .await?;
/// ```
pub struct RecurrentHandler {
    schedule: Schedule,
    action: Action<Instant>,
}

impl RecurrentHandler {
    /// Creates a handler with a custom schedule.
    pub fn new<S, F, Fut>(schedule: S, f: F) -> Self
    where
        S: Fn(Instant) -> HandlerResult<Instant> + Send + Sync + 'static,
        F: Fn(Instant, Bot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        Self {
            schedule: Arc::new(schedule),
            action: action(f),
        }
    }

    /// Creates a handler firing every `period`.
    pub fn every<F, Fut>(period: Duration, f: F) -> Self
    where
        F: Fn(Instant, Bot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        Self::new(
            move |now| {
                now.checked_add(period)
                    .ok_or_else(|| anyhow::anyhow!("period {period:?} overflows the clock"))
            },
            f,
        )
    }
}

#[async_trait]
impl Handler for RecurrentHandler {
    fn event_kind(&self) -> Option<EventKind> {
        Some(EventKind::Recurrent)
    }

    async fn execute(&self, event: &Event, bot: &Bot) -> HandlerResult<()> {
        let fired_at = event.tick_instant().unwrap_or_else(Instant::now);
        (self.action)(fired_at, bot.clone()).await
    }

    async fn next_time(&self, now: Instant) -> HandlerResult<Instant> {
        (self.schedule)(now)
    }
}

impl std::fmt::Debug for RecurrentHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecurrentHandler").finish_non_exhaustive()
    }
}
