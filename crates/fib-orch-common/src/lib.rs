//! Common orchestration abstractions for FIB reconciliation.
//!
//! This crate provides the traits and primitives shared by the reconcilers
//! of the FIB manager:
//!
//! - [`Orch`]: Base trait for orchestration agents driven by the daemon
//! - [`TaskStatus`] / [`TaskError`]: Result classification for one unit of work
//! - [`KeyedSequencer`]: Per-key FIFO ordering for concurrently dispatched work
//! - [`acquire`]: Bounded wait for a collaborator to become available
//!
//! # Architecture
//!
//! The orchestration model is event driven:
//!
//! 1. Route, tunnel and device notifications arrive from external sources
//! 2. The daemon dispatches each notification as an independent task
//! 3. Tasks touching the same key run in arrival order via a [`KeyedSequencer`]
//! 4. Orchs translate notifications into flow-programming calls
//! 5. Failures are classified into a [`TaskStatus`] for reporting
//!
//! # Example
//!
//! ```ignore
//! use fib_orch_common::KeyedSequencer;
//!
//! let sequencer: KeyedSequencer<String> = KeyedSequencer::new();
//!
//! // Issue tickets in arrival order, then run the work anywhere.
//! let ticket = sequencer.ticket(key.clone());
//! tokio::spawn(async move {
//!     let _turn = ticket.wait().await;
//!     // ... program state for `key`
//! });
//! ```

mod dependency;
mod orch;
mod sequencer;
mod task;

pub use dependency::{acquire, Dependency, DependencyTimeout};
pub use orch::Orch;
pub use sequencer::{KeyedSequencer, Ticket, Turn};
pub use task::{TaskError, TaskStatus};
