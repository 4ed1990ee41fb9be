//! Timeout and recurrence scheduler.
//!
//! The scheduler keeps a time-ordered queue of pending work and runs it from a
//! single loop, independently of the reactive dispatch path. Three kinds of
//! work exist:
//!
//! - **Timeout**: fires `on_timeout` once after the handler's delay, then
//!   forgets the handler.
//! - **Expiry**: removes a reactive handler from the registry after its
//!   lifetime, then fires its `on_timeout`.
//! - **Recurrence**: computes the first fire time with `next_time`, then after
//!   every firing runs `execute` and recomputes `next_time` from the firing
//!   instant. Only a failing `next_time` stops the cycle; a failing `execute`
//!   does not.
//!
//! Due entries run on their own tasks, so a slow handler never delays other
//! timers. All handler code goes through the [`Executor`](super::Executor)
//! with user notification suppressed.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, span, trace, warn, Instrument};

use super::executor::RunOptions;
use super::handler::{BoxedHandler, HandlerId};
use crate::bot::Bot;
use crate::foundation::{Cancelled, Event, EventKind};

/// Default polling interval when nothing is scheduled.
pub const DEFAULT_IDLE_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
enum Job {
    Timeout,
    Expire(EventKind),
    Plan,
    Recurrent,
}

struct Scheduled {
    due: Instant,
    seq: u64,
    id: HandlerId,
    handler: BoxedHandler,
    job: Job,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Longest delay honored; longer delays are clamped to it.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 86_400);

/// Returns the instant `delay` from now, clamped to [`FAR_FUTURE`].
fn due_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay.min(FAR_FUTURE))
        .or_else(|| now.checked_add(Duration::from_secs(86_400)))
        .unwrap_or(now)
}

#[derive(Default)]
struct State {
    queue: BinaryHeap<Reverse<Scheduled>>,
    /// Recurrent handlers taken off the queue and not yet requeued.
    firing: HashSet<HandlerId>,
    /// Firing handlers whose cycle must end instead of being requeued.
    cancelled: HashSet<HandlerId>,
}

/// Time-ordered queue of scheduled handler work.
pub struct Scheduler {
    state: Mutex<State>,
    wakeup: Notify,
    seq: AtomicU64,
    idle_tick: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TICK)
    }
}

impl Scheduler {
    /// Creates an empty scheduler polling at `idle_tick` when idle.
    pub fn new(idle_tick: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            wakeup: Notify::new(),
            seq: AtomicU64::new(0),
            idle_tick,
        }
    }

    /// Schedules a one-shot `on_timeout` after `delay`.
    pub fn schedule_timeout(&self, id: HandlerId, handler: BoxedHandler, delay: Duration) {
        self.push(due_after(delay), id, handler, Job::Timeout);
    }

    /// Schedules removal of a reactive handler after `lifetime`.
    pub fn schedule_expiry(
        &self,
        id: HandlerId,
        kind: EventKind,
        handler: BoxedHandler,
        lifetime: Duration,
    ) {
        self.push(due_after(lifetime), id, handler, Job::Expire(kind));
    }

    /// Starts the recurrence cycle of a handler.
    ///
    /// The first fire time is computed by the scheduler loop, through the
    /// executor, as soon as the loop runs.
    pub fn schedule_recurrent(&self, id: HandlerId, handler: BoxedHandler) {
        self.push(Instant::now(), id, handler, Job::Plan);
    }

    /// Cancels all pending work of a handler.
    ///
    /// A recurrent handler that is currently firing will not be requeued.
    /// Returns `true` if queued work was dropped or a running cycle was
    /// stopped.
    pub fn cancel(&self, id: HandlerId) -> bool {
        let (removed, stopped) = {
            let mut state = self.state.lock();
            let removed = Self::retain_other(&mut state, id);
            let stopped = state.firing.contains(&id) && state.cancelled.insert(id);
            (removed, stopped)
        };
        if removed {
            self.wakeup.notify_one();
        }
        debug!(id = %id, removed, stopped, "Scheduled work cancelled");
        removed || stopped
    }

    /// Drops queued work of a handler without touching in-flight firings.
    pub fn discard(&self, id: HandlerId) -> bool {
        let removed = Self::retain_other(&mut self.state.lock(), id);
        if removed {
            self.wakeup.notify_one();
        }
        removed
    }

    /// Returns the number of queued entries.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Returns the earliest due instant.
    pub fn next_due(&self) -> Option<Instant> {
        self.state.lock().queue.peek().map(|Reverse(entry)| entry.due)
    }

    /// Runs the scheduler loop until `shutdown` is cancelled.
    ///
    /// Returns `Err(Cancelled)` when an operator interrupt propagates out of a
    /// scheduled execution.
    pub async fn run(&self, bot: &Bot, shutdown: CancellationToken) -> Result<(), Cancelled> {
        debug!(pending = self.pending(), "Scheduler loop started");
        let mut tasks = JoinSet::new();

        loop {
            for entry in self.take_due(Instant::now()) {
                let bot = bot.clone();
                let span = span!(Level::DEBUG, "scheduled", handler = %entry.handler.name(), id = %entry.id);
                tasks.spawn(async move { bot.scheduler().fire(entry, &bot).await }.instrument(span));
            }

            let wake_at = self
                .next_due()
                .unwrap_or_else(|| due_after(self.idle_tick));

            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(in_flight = tasks.len(), "Scheduler loop stopping");
                    self.abort(&mut tasks);
                    return Ok(());
                }
                _ = sleep_until(wake_at) => {}
                _ = self.wakeup.notified() => {}
                Some(joined) = tasks.join_next() => match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(cancelled)) => {
                        self.abort(&mut tasks);
                        return Err(cancelled);
                    }
                    Err(e) if e.is_panic() => error!(error = %e, "Scheduled task panicked"),
                    Err(_) => {}
                },
            }
        }
    }

    /// Aborts in-flight firings; their cycles end with the loop.
    fn abort(&self, tasks: &mut JoinSet<Result<(), Cancelled>>) {
        tasks.abort_all();
        let mut state = self.state.lock();
        state.firing.clear();
        state.cancelled.clear();
    }

    fn retain_other(state: &mut State, id: HandlerId) -> bool {
        let before = state.queue.len();
        state.queue.retain(|Reverse(entry)| entry.id != id);
        state.queue.len() != before
    }

    fn entry(&self, due: Instant, id: HandlerId, handler: BoxedHandler, job: Job) -> Reverse<Scheduled> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        trace!(id = %id, handler = %handler.name(), ?job, "Work scheduled");
        Reverse(Scheduled {
            due,
            seq,
            id,
            handler,
            job,
        })
    }

    fn push(&self, due: Instant, id: HandlerId, handler: BoxedHandler, job: Job) {
        let entry = self.entry(due, id, handler, job);
        self.state.lock().queue.push(entry);
        self.wakeup.notify_one();
    }

    fn take_due(&self, now: Instant) -> Vec<Scheduled> {
        let mut state = self.state.lock();
        let mut due = Vec::new();
        while state.queue.peek().is_some_and(|Reverse(entry)| entry.due <= now) {
            if let Some(Reverse(entry)) = state.queue.pop() {
                if matches!(entry.job, Job::Plan | Job::Recurrent) {
                    state.firing.insert(entry.id);
                }
                due.push(entry);
            }
        }
        due
    }

    /// Ends a firing of a recurrent handler, requeueing it at `next` unless
    /// its cycle was cancelled meanwhile.
    fn finish_cycle(&self, id: HandlerId, next: Option<(Instant, BoxedHandler)>) {
        let requeued = {
            let mut state = self.state.lock();
            state.firing.remove(&id);
            if state.cancelled.remove(&id) {
                debug!(id = %id, "Recurrence cancelled");
                false
            } else if let Some((due, handler)) = next {
                let entry = self.entry(due, id, handler, Job::Recurrent);
                state.queue.push(entry);
                true
            } else {
                false
            }
        };
        if requeued {
            self.wakeup.notify_one();
        }
    }

    async fn fire(&self, entry: Scheduled, bot: &Bot) -> Result<(), Cancelled> {
        let Scheduled {
            id, handler, job, ..
        } = entry;
        let executor = bot.executor();
        let quiet = || RunOptions::new().notify(false);
        let name = handler.name();

        match job {
            Job::Timeout => {
                debug!("Timeout elapsed");
                let _ = executor
                    .run(&format!("{name}.on_timeout"), handler.on_timeout(bot), quiet())
                    .await?;
            }
            Job::Expire(kind) => {
                if bot.registry().remove(&kind, id) {
                    debug!(kind = %kind, "Handler expired");
                    let _ = executor
                        .run(&format!("{name}.on_timeout"), handler.on_timeout(bot), quiet())
                        .await?;
                }
            }
            Job::Plan => {
                self.plan_next(id, handler, Instant::now(), bot).await?;
            }
            Job::Recurrent => {
                let fired_at = Instant::now();
                let event = Event::tick(EventKind::Recurrent, fired_at);
                let executed = executor
                    .run(&format!("{name}.execute"), handler.execute(&event, bot), quiet())
                    .await;
                if let Err(cancelled) = executed {
                    self.finish_cycle(id, None);
                    return Err(cancelled);
                }
                self.plan_next(id, handler, fired_at, bot).await?;
            }
        }
        Ok(())
    }

    async fn plan_next(
        &self,
        id: HandlerId,
        handler: BoxedHandler,
        from: Instant,
        bot: &Bot,
    ) -> Result<(), Cancelled> {
        if self.state.lock().cancelled.contains(&id) {
            self.finish_cycle(id, None);
            return Ok(());
        }

        let label = format!("{}.next_time", handler.name());
        let outcome = bot
            .executor()
            .run(&label, handler.next_time(from), RunOptions::new().notify(false))
            .await;

        match outcome {
            Ok(outcome) => match outcome.completed() {
                Some(due) => self.finish_cycle(id, Some((due, handler))),
                None => {
                    warn!(id = %id, "Recurrent handler stopped: no next execution time");
                    self.finish_cycle(id, None);
                }
            },
            Err(cancelled) => {
                self.finish_cycle(id, None);
                return Err(cancelled);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("firing", &self.state.lock().firing.len())
            .field("idle_tick", &self.idle_tick)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::BotOptions;
    use crate::foundation::HandlerResult;
    use crate::framework::handler::Handler;
    use crate::testing::MockPlatform;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    struct CountingTimeout {
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for CountingTimeout {
        fn event_kind(&self) -> Option<EventKind> {
            Some(EventKind::Timeout)
        }

        fn timeout(&self) -> Option<Duration> {
            Some(self.delay)
        }

        async fn on_timeout(&self, _bot: &Bot) -> HandlerResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct EverySecond {
        fired: Arc<Mutex<Vec<Instant>>>,
        fail_execute: bool,
        plans_left: Option<AtomicUsize>,
        busy: Duration,
    }

    #[async_trait]
    impl Handler for EverySecond {
        fn event_kind(&self) -> Option<EventKind> {
            Some(EventKind::Recurrent)
        }

        async fn execute(&self, event: &Event, _bot: &Bot) -> HandlerResult<()> {
            self.fired.lock().push(event.tick_instant().unwrap_or_else(Instant::now));
            tokio::time::sleep(self.busy).await;
            if self.fail_execute {
                anyhow::bail!("recurrent action failed");
            }
            Ok(())
        }

        async fn next_time(&self, now: Instant) -> HandlerResult<Instant> {
            if let Some(left) = &self.plans_left {
                if left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_err() {
                    anyhow::bail!("no more plans");
                }
            }
            Ok(now + Duration::from_secs(1))
        }
    }

    fn every_second(fail_execute: bool, plans: Option<usize>) -> (EverySecond, Arc<Mutex<Vec<Instant>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let handler = EverySecond {
            fired: Arc::clone(&fired),
            fail_execute,
            plans_left: plans.map(AtomicUsize::new),
            busy: Duration::ZERO,
        };
        (handler, fired)
    }

    fn spawn_loop(bot: &Bot) -> CancellationToken {
        let token = CancellationToken::new();
        let bot = bot.clone();
        let child = token.clone();
        tokio::spawn(async move { bot.scheduler().run(&bot, child).await });
        token
    }

    fn bot() -> (Bot, Arc<MockPlatform>) {
        let platform = Arc::new(MockPlatform::new());
        let bot = Bot::new(platform.clone(), BotOptions::new("test").owner("owner"));
        (bot, platform)
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_exactly_once() {
        let (bot, _) = bot();
        let calls = Arc::new(AtomicUsize::new(0));
        bot.register(CountingTimeout {
            delay: Duration::from_secs(5),
            calls: Arc::clone(&calls),
        })
        .await
        .unwrap();
        let token = spawn_loop(&bot);

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bot.scheduler().pending(), 0);
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_recurrent_fires_every_unit() {
        let (bot, _) = bot();
        let (handler, fired) = every_second(false, None);
        let start = Instant::now();
        bot.register(handler).await.unwrap();
        let token = spawn_loop(&bot);

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        token.cancel();

        let fired = fired.lock().clone();
        assert_eq!(fired.len(), 10);
        for (n, at) in fired.iter().enumerate() {
            assert_eq!(*at - start, Duration::from_secs(n as u64 + 1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_action_keeps_recurring() {
        let (bot, platform) = bot();
        let (handler, fired) = every_second(true, None);
        bot.register(handler).await.unwrap();
        let token = spawn_loop(&bot);

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        token.cancel();

        assert_eq!(fired.lock().len(), 3);
        assert_eq!(platform.sent_to(&crate::foundation::Thread::user("owner")).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_next_time_halts_recurrence() {
        let (bot, _) = bot();
        let (handler, fired) = every_second(false, Some(3));
        bot.register(handler).await.unwrap();
        let token = spawn_loop(&bot);

        tokio::time::sleep(Duration::from_secs(10)).await;
        token.cancel();

        // Three successful plans, three firings.
        assert_eq!(fired.lock().len(), 3);
        assert_eq!(bot.scheduler().pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_timeout() {
        let (bot, _) = bot();
        let calls = Arc::new(AtomicUsize::new(0));
        let registered = bot
            .register(CountingTimeout {
                delay: Duration::from_secs(5),
                calls: Arc::clone(&calls),
            })
            .await
            .unwrap();
        let token = spawn_loop(&bot);

        tokio::time::sleep(Duration::from_secs(1)).await;
        bot.unregister(&registered);
        tokio::time::sleep(Duration::from_secs(10)).await;
        token.cancel();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_delay_is_clamped() {
        let (bot, _) = bot();
        let calls = Arc::new(AtomicUsize::new(0));
        bot.register(CountingTimeout {
            delay: Duration::MAX,
            calls: Arc::clone(&calls),
        })
        .await
        .unwrap();
        assert_eq!(bot.scheduler().pending(), 1);
        let due = bot.scheduler().next_due().unwrap();
        assert!(due >= Instant::now() + Duration::from_secs(29 * 365 * 86_400));

        let token = spawn_loop(&bot);
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        token.cancel();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(bot.scheduler().pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_between_firings_stops_recurrence() {
        let (bot, _) = bot();
        let (handler, fired) = every_second(false, None);
        let registered = bot.register(handler).await.unwrap();
        let token = spawn_loop(&bot);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(fired.lock().len(), 2);
        assert!(bot.unregister(&registered));
        assert_eq!(bot.scheduler().pending(), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();

        assert_eq!(fired.lock().len(), 2);
        assert!(!bot.unregister(&registered));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_during_firing_stops_recurrence() {
        let (bot, _) = bot();
        let (mut handler, fired) = every_second(false, None);
        handler.busy = Duration::from_secs(3);
        let registered = bot.register(handler).await.unwrap();
        let token = spawn_loop(&bot);

        // First firing at 1s stays busy until 4s.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(bot.scheduler().pending(), 0);
        assert!(bot.unregister(&registered));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.lock().len(), 1);
        assert_eq!(bot.scheduler().pending(), 0);
        {
            let state = bot.scheduler().state.lock();
            assert!(state.firing.is_empty());
            assert!(state.cancelled.is_empty());
        }
        assert!(!bot.unregister(&registered));
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_after_timeout_fired_leaves_nothing_behind() {
        let (bot, _) = bot();
        let calls = Arc::new(AtomicUsize::new(0));
        let registered = bot
            .register(CountingTimeout {
                delay: Duration::from_secs(1),
                calls: Arc::clone(&calls),
            })
            .await
            .unwrap();
        let token = spawn_loop(&bot);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!bot.unregister(&registered));
        assert!(bot.scheduler().state.lock().cancelled.is_empty());
        token.cancel();
    }
}
