//! qdir core -- a step-driven production scheduler for incremental games.
//!
//! Independent *producers* each own a FIFO queue of *actions* (waits, locks,
//! productions, and compounds of those). One call to
//! [`manager::Manager::evaluate`] advances every producer by the same `dt`,
//! and time a finished action leaves over flows on to the next action in the
//! same step. A production, once its wait runs out, unpauses another
//! producer and hands it the overflow, so chains of producers can complete
//! within a single step.
//!
//! # Tick Pipeline
//!
//! 1. **Pre-tick** -- Apply mutations returned by reactive event handlers.
//! 2. **Order** -- Stable sort: unpaused first, busy before idle, then the
//!    head action closest to completion first.
//! 3. **Drain** -- Evaluate each producer once, cascading leftover time.
//! 4. **Post-tick** -- Increment the tick counter and deliver buffered events.
//!
//! # Building a Chain
//!
//! ```rust,ignore
//! let mut manager = Manager::new();
//! let root = manager.create_unpaused_producer();
//! let next = manager.enqueue_produce(root, secs(1))?;
//! manager.enqueue_produce(next, secs(1))?;
//! manager.evaluate(secs(2))?; // both productions finish
//! ```
//!
//! # Key Types
//!
//! - [`manager::Manager`] -- Producer registry and step driver.
//! - [`action::Action`] -- One queued unit of work, a closed sum over
//!   [`action::ActionKind`].
//! - [`producer::Producer`] -- A paused flag plus an [`queue::ActionQueue`].
//! - [`hooks::Hooks`] -- Lock predicates and wait callbacks, referenced by id.
//! - [`time::SimTime`] -- Q32.32 fixed-point simulated time.
//! - [`event::EventBus`] -- Buffered lifecycle events.
//! - [`serialize`] -- Snapshots, revival, JSON and versioned binary formats.

pub mod action;
pub mod config;
pub mod error;
pub mod event;
pub mod hooks;
pub mod id;
pub mod manager;
pub mod producer;
pub mod queue;
pub mod serialize;
pub mod sim;
pub mod time;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
