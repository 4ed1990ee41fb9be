//! Type-erased handler actions.
//!
//! Every ready-made handler wraps a user closure. Closures receive owned
//! arguments and a [`Bot`] clone so the returned future can be `'static`.

use std::future::Future;
use std::sync::Arc;

use stibium_core::{Bot, HandlerResult};

/// A boxed, `'static` future returned by handler actions.
pub type BoxFuture<T> = futures::future::BoxFuture<'static, HandlerResult<T>>;

/// A shared action taking an argument of type `A` and the bot.
pub(crate) type Action<A> = Arc<dyn Fn(A, Bot) -> BoxFuture<()> + Send + Sync>;

/// Erases an async closure into an [`Action`].
pub(crate) fn action<A, F, Fut>(f: F) -> Action<A>
where
    F: Fn(A, Bot) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<()>> + Send + 'static,
{
    Arc::new(move |arg, bot| Box::pin(f(arg, bot)))
}
