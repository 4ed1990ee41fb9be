//! Untrusted executor.
//!
//! Every piece of handler-authored code (predicates, actions, setup, timeout
//! callbacks and schedule computations) runs through an [`Executor`]. The
//! executor enforces a deadline, captures errors and panics, and reports them,
//! so that no failure from handler code ever unwinds into the dispatch or
//! scheduler loops.
//!
//! # Outcomes
//!
//! | Fault | User notice (if `thread` and `notify`) | Result |
//! |---|---|---|
//! | none | - | `Ok(Outcome::Completed(value))` |
//! | deadline exceeded | [`Notices::timed_out`] | `Ok(Outcome::TimedOut)` |
//! | error or panic | [`Notices::failed`] + terminal message | `Ok(Outcome::Failed)` |
//! | interrupt, caught | [`Notices::interrupted`] | `Ok(Outcome::Interrupted)` |
//! | interrupt, not caught | - | `Err(Cancelled)` |
//!
//! Failures are additionally logged with their full trace and, when an owner
//! is configured, sent to the owner's private thread.
//!
//! An interrupt only reaches executions that do not catch it when no catching
//! execution is in flight.
//!
//! # Example
//!
//! ```rust,ignore
//! let options = RunOptions::new().thread(message.thread.clone()).catch_interrupt(true);
//! let outcome = executor
//!     .run("echo.execute", handler.execute(&event, &bot), options)
//!     .await?;
//! if !outcome.is_completed() {
//!     // already reported
//! }
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::foundation::{Cancelled, HandlerResult, SendOptions, Thread};
use crate::integration::BoxedPlatform;

/// Default execution deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

// ============================================================================
// Notices
// ============================================================================

/// User-facing texts sent by the executor and the command handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notices {
    /// Sent when an execution exceeds its deadline.
    pub timed_out: String,
    /// Sent when an execution fails; the failure's terminal message follows on a new line.
    pub failed: String,
    /// Sent when an operator interrupt cancels an execution.
    pub interrupted: String,
    /// Sent before running a command that asked to acknowledge first.
    pub please_wait: String,
}

impl Default for Notices {
    fn default() -> Self {
        Self {
            timed_out: "The command took too long to execute and was cancelled.".to_string(),
            failed: "An error occurred and the action could not be completed.\n\
                     The administrator has been notified."
                .to_string(),
            interrupted: "The command has been interrupted by admin".to_string(),
            please_wait: "Please wait...".to_string(),
        }
    }
}

// ============================================================================
// Run Options & Outcome
// ============================================================================

/// Per-call supervision options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Conversation to notify about faults.
    pub thread: Option<Thread>,
    /// Whether the conversation is notified at all.
    pub notify: bool,
    /// Whether an operator interrupt is absorbed instead of propagated.
    pub catch_interrupt: bool,
    /// Deadline override; the executor default applies when `None`.
    pub deadline: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            thread: None,
            notify: true,
            catch_interrupt: false,
            deadline: None,
        }
    }
}

impl RunOptions {
    /// Creates options with notification on and interrupt catching off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the conversation context.
    pub fn thread(mut self, thread: Thread) -> Self {
        self.thread = Some(thread);
        self
    }

    /// Sets or clears the conversation context.
    pub fn in_thread(mut self, thread: Option<Thread>) -> Self {
        self.thread = thread;
        self
    }

    /// Enables or suppresses user notices.
    pub fn notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }

    /// Enables or disables interrupt catching.
    pub fn catch_interrupt(mut self, catch: bool) -> Self {
        self.catch_interrupt = catch;
        self
    }

    /// Overrides the deadline.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Result of a supervised execution that did not propagate.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Outcome<T> {
    /// The code completed with a value.
    Completed(T),
    /// The deadline was exceeded.
    TimedOut,
    /// The code returned an error or panicked.
    Failed,
    /// An operator interrupt was absorbed.
    Interrupted,
}

impl<T> Outcome<T> {
    /// Returns `true` if the code completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns the value, if the code completed.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the value, or `default` on any fault.
    pub fn unwrap_or(self, default: T) -> T {
        self.completed().unwrap_or(default)
    }
}

/// A fault captured by [`Executor::supervise`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// The deadline was exceeded.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The code returned an error or panicked.
    #[error("{message}")]
    Failed {
        /// Terminal message, safe to show to users.
        message: String,
        /// Full error chain.
        trace: String,
    },

    /// An operator interrupt arrived.
    #[error("interrupted by operator")]
    Interrupted,
}

impl Fault {
    fn from_error(err: &anyhow::Error) -> Self {
        Self::Failed {
            message: err.to_string(),
            trace: format!("{err:?}"),
        }
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string());
        Self::Failed {
            trace: format!("panicked: {message}"),
            message,
        }
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Supervised call boundary for handler-authored code.
pub struct Executor {
    platform: BoxedPlatform,
    owner: Option<Thread>,
    deadline: Duration,
    notices: Notices,
    /// Wakes interrupt-catching executions.
    absorb: Notify,
    /// Wakes every execution; used only when nothing absorbs the interrupt.
    halt: Notify,
    absorbing: AtomicUsize,
}

impl Executor {
    /// Creates an executor reporting through `platform`.
    pub fn new(platform: BoxedPlatform, owner: Option<Thread>) -> Self {
        Self {
            platform,
            owner,
            deadline: DEFAULT_DEADLINE,
            notices: Notices::default(),
            absorb: Notify::new(),
            halt: Notify::new(),
            absorbing: AtomicUsize::new(0),
        }
    }

    /// Sets the default deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Sets the user-facing notices.
    pub fn with_notices(mut self, notices: Notices) -> Self {
        self.notices = notices;
        self
    }

    /// Returns the default deadline.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Returns the user-facing notices.
    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    /// Returns the owner's private thread, if configured.
    pub fn owner(&self) -> Option<&Thread> {
        self.owner.as_ref()
    }

    /// Runs `future` under supervision and handles any fault.
    ///
    /// Returns `Err(Cancelled)` only for an operator interrupt when
    /// `options.catch_interrupt` is false.
    pub async fn run<T, F>(
        &self,
        label: &str,
        future: F,
        options: RunOptions,
    ) -> Result<Outcome<T>, Cancelled>
    where
        F: Future<Output = HandlerResult<T>>,
    {
        let deadline = options.deadline.unwrap_or(self.deadline);
        let _absorbing = options
            .catch_interrupt
            .then(|| AbsorbGuard::new(&self.absorbing));

        let fault = match self
            .guard(future, deadline, options.catch_interrupt)
            .await
        {
            Ok(value) => return Ok(Outcome::Completed(value)),
            Err(fault) => fault,
        };

        let target = options.thread.as_ref().filter(|_| options.notify);
        match fault {
            Fault::TimedOut(deadline) => {
                warn!(label, ?deadline, "Execution timed out");
                if let Some(thread) = target {
                    self.notify(thread, &self.notices.timed_out).await;
                }
                Ok(Outcome::TimedOut)
            }
            Fault::Failed { message, trace } => {
                error!(label, thread = ?options.thread, "Execution failed: {trace}");
                if let Some(thread) = target {
                    let notice = format!("{}\n{}", self.notices.failed, message);
                    self.notify(thread, &notice).await;
                }
                let thread = options
                    .thread
                    .as_ref()
                    .map_or_else(|| "none".to_string(), Thread::to_string);
                self.report_to_owner(&format!(
                    "Error while running {label}\nin thread {thread}\nFull trace:\n{trace}"
                ))
                .await;
                Ok(Outcome::Failed)
            }
            Fault::Interrupted if options.catch_interrupt => {
                info!(label, "Execution interrupted by operator");
                if let Some(thread) = target {
                    self.notify(thread, &self.notices.interrupted).await;
                }
                Ok(Outcome::Interrupted)
            }
            Fault::Interrupted => {
                warn!(label, "Operator interrupt propagated");
                Err(Cancelled)
            }
        }
    }

    /// Runs `future` with the deadline, panic and interrupt capture of
    /// [`run`](Self::run), but returns the fault instead of reporting it.
    pub async fn supervise<T, F>(&self, future: F, deadline: Duration) -> Result<T, Fault>
    where
        F: Future<Output = HandlerResult<T>>,
    {
        self.guard(future, deadline, false).await
    }

    async fn guard<T, F>(&self, future: F, deadline: Duration, catching: bool) -> Result<T, Fault>
    where
        F: Future<Output = HandlerResult<T>>,
    {
        let interrupted = if catching {
            self.absorb.notified()
        } else {
            self.halt.notified()
        };
        let guarded = AssertUnwindSafe(future).catch_unwind();
        tokio::select! {
            biased;
            _ = interrupted => Err(Fault::Interrupted),
            result = tokio::time::timeout(deadline, guarded) => match result {
                Err(_) => Err(Fault::TimedOut(deadline)),
                Ok(Err(payload)) => Err(Fault::from_panic(payload)),
                Ok(Ok(Err(err))) => Err(Fault::from_error(&err)),
                Ok(Ok(Ok(value))) => Ok(value),
            },
        }
    }

    /// Delivers an operator interrupt.
    ///
    /// While interrupt-catching executions are in flight, only those are
    /// cancelled and `true` is returned: the interrupt is absorbed and every
    /// other execution keeps running. Otherwise every in-flight execution is
    /// cancelled and `false` is returned.
    pub fn interrupt(&self) -> bool {
        let absorbed = self.absorbing.load(Ordering::SeqCst) > 0;
        info!(absorbed, "Operator interrupt");
        if absorbed {
            self.absorb.notify_waiters();
        } else {
            self.halt.notify_waiters();
            self.absorb.notify_waiters();
        }
        absorbed
    }

    /// Sends `text` to the owner's private thread.
    ///
    /// Best-effort: a missing owner or a delivery failure is only logged.
    pub async fn report_to_owner(&self, text: &str) {
        let Some(owner) = &self.owner else {
            debug!("No owner configured, report dropped");
            return;
        };
        if let Err(e) = self
            .platform
            .send_message(owner, text, &SendOptions::default())
            .await
        {
            error!(owner = %owner, error = %e, "Failed to report to owner");
        }
    }

    async fn notify(&self, thread: &Thread, text: &str) {
        if let Err(e) = self
            .platform
            .send_message(thread, text, &SendOptions::default())
            .await
        {
            warn!(thread = %thread, error = %e, "Failed to send notice");
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("owner", &self.owner)
            .field("deadline", &self.deadline)
            .field("absorbing", &self.absorbing.load(Ordering::Relaxed))
            .finish()
    }
}

/// Counts interrupt-catching executions while they are in flight.
struct AbsorbGuard<'a>(&'a AtomicUsize);

impl<'a> AbsorbGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for AbsorbGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
