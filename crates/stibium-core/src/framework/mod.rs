//! Framework layer - Event processing and scheduling.
//!
//! This module contains:
//! - The [`Handler`] trait and registration handles
//! - The [`HandlerRegistry`] of reactive handlers
//! - The untrusted [`Executor`] every piece of handler code runs through
//! - The [`Scheduler`] for timeouts, expiries and recurrences
//! - The [`Dispatcher`] driving inbound events to handlers

pub mod dispatcher;
pub mod executor;
pub mod handler;
pub mod registry;
pub mod scheduler;

pub use dispatcher::Dispatcher;
pub use executor::{DEFAULT_DEADLINE, Executor, Fault, Notices, Outcome, RunOptions};
pub use handler::{BoxedHandler, Handler, HandlerId, Registered};
pub use registry::{HandlerRegistry, RegistryEntry};
pub use scheduler::{DEFAULT_IDLE_TICK, Scheduler};
