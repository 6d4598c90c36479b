//! Pending-entry store.
//!
//! Keeps routes whose next-hop tunnel is not operational yet, so a later
//! tunnel-up can replay them regardless of which notification arrived first.

mod store;

pub use store::{ParkOutcome, PendingStore};
