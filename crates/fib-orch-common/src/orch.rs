//! The Orch trait: what the daemon needs from a reconciler.

use async_trait::async_trait;

/// A reconciler driven by the daemon.
///
/// Orchs are shared between concurrently running notification tasks, so
/// every method takes `&self` and implementations keep their state behind
/// interior mutability. Notification entry points are inherent methods of
/// each Orch; this trait only covers what the daemon does with any of them:
/// periodic maintenance and introspection.
#[async_trait]
pub trait Orch: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Periodic housekeeping, run from the daemon's timer between
    /// notifications.
    async fn do_task(&self);

    /// Whether the Orch holds work it cannot complete yet.
    fn has_pending_tasks(&self) -> bool {
        false
    }

    /// One human-readable line per piece of pending work.
    fn dump_pending_tasks(&self) -> Vec<String> {
        Vec::new()
    }
}
