//! Events Module
//!
//! Mutation events and the notifier that delivers them to subscribers and waiters.

mod event;
mod notifier;

pub use event::{CacheEvent, EventKind};
pub use notifier::{EventWaiter, Notifier, Subscription};
