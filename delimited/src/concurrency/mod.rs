//! Concurrency primitives shared by the dispatch buffer and the reader.
//!
//! Both primitives wrap a [`tokio::sync::watch`] channel carrying a boolean: the pause gate
//! that holds back delivery of queued items, and the shutdown signal that ends the worker loop.
//! Watch channels keep only the latest value, so a receiver that subscribes late still observes
//! the current state, and waiters never miss a transition that happened before they started
//! waiting.

pub mod pause;
pub mod shutdown;
