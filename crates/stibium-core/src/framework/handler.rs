//! Handler system for the Stibium core.
//!
//! A [`Handler`] is a unit of reactive or scheduled behaviour scoped to one
//! [`EventKind`]. The bot never calls these methods directly: every call goes
//! through the [`Executor`](super::executor::Executor), which enforces a
//! deadline and turns failures into reports.
//!
//! # Example
//!
//! ```rust,ignore
//! use stibium_core::{Bot, Event, EventKind, Handler, HandlerResult};
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Handler for Greeter {
//!     fn event_kind(&self) -> Option<EventKind> {
//!         Some(EventKind::Message)
//!     }
//!
//!     async fn check(&self, event: &Event, _bot: &Bot) -> HandlerResult<bool> {
//!         Ok(event.as_message().and_then(|m| m.text.as_deref()) == Some("hello"))
//!     }
//!
//!     async fn execute(&self, event: &Event, bot: &Bot) -> HandlerResult<()> {
//!         if let Some(message) = event.as_message() {
//!             bot.reply(message, "Hi!").await?;
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::bot::Bot;
use crate::foundation::{Event, EventKind, HandlerResult};

// ============================================================================
// Handler Trait
// ============================================================================

/// The capability set shared by every handler variant.
///
/// Only [`event_kind`](Handler::event_kind) has no useful default; a handler
/// returning `None` is rejected at registration.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Display name used in logs and failure reports.
    fn name(&self) -> String {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("handler")
            .to_string()
    }

    /// The event kind this handler belongs to.
    fn event_kind(&self) -> Option<EventKind>;

    /// Delay before a timeout handler fires, or lifetime of a reactive handler.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Prepares the handler once the owning bot is known.
    async fn setup(&self, _bot: &Bot) -> HandlerResult<()> {
        Ok(())
    }

    /// Decides whether this handler reacts to `event`.
    async fn check(&self, _event: &Event, _bot: &Bot) -> HandlerResult<bool> {
        Ok(false)
    }

    /// Runs the handler's action.
    async fn execute(&self, _event: &Event, _bot: &Bot) -> HandlerResult<()> {
        Ok(())
    }

    /// Called when the handler's timeout elapses.
    async fn on_timeout(&self, _bot: &Bot) -> HandlerResult<()> {
        Ok(())
    }

    /// Computes the next execution time of a recurrent handler.
    async fn next_time(&self, _now: Instant) -> HandlerResult<Instant> {
        anyhow::bail!("{} does not define a schedule", self.name())
    }
}

/// A type-erased handler.
pub type BoxedHandler = Arc<dyn Handler>;

// ============================================================================
// Handler Identity
// ============================================================================

/// Identifier assigned to a handler when it is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub(crate) u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A handler that has been registered with a bot.
///
/// Dereferences to the handler itself, so registration can be chained:
///
/// ```rust,ignore
/// let echo = bot.register(CommandHandler::new("echo", echo)).await?;
/// println!("{}", echo.command());
/// bot.unregister(&echo);
/// ```
pub struct Registered<H: ?Sized> {
    pub(crate) id: HandlerId,
    pub(crate) kind: EventKind,
    pub(crate) handler: Arc<H>,
}

impl<H: ?Sized> Registered<H> {
    /// Returns the registration id.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Returns the event kind the handler was registered under.
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Returns the shared handler.
    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }
}

impl<H: ?Sized> Clone for Registered<H> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            kind: self.kind.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H: ?Sized> Deref for Registered<H> {
    type Target = H;

    fn deref(&self) -> &Self::Target {
        &self.handler
    }
}

impl<H: ?Sized> fmt::Debug for Registered<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registered")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}
