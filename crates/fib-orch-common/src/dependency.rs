//! Bounded wait for collaborators that come up asynchronously.

use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;
use thiserror::Error;

/// A collaborator that may not be available yet.
#[async_trait]
pub trait Dependency: Send + Sync {
    /// What the caller gets once the dependency is available.
    type Handle: Send;

    fn name(&self) -> &str;

    /// Returns the handle if available right now.
    async fn try_get(&self) -> Option<Self::Handle>;
}

/// The dependency did not become available in time.
#[derive(Debug, Clone, Error)]
#[error("dependency {name} unavailable after {waited:?}")]
pub struct DependencyTimeout {
    pub name: String,
    pub waited: Duration,
}

/// Polls `dependency` every `poll` until it yields a handle or `max_wait`
/// elapses.
pub async fn acquire<D>(
    dependency: &D,
    max_wait: Duration,
    poll: Duration,
) -> Result<D::Handle, DependencyTimeout>
where
    D: Dependency + ?Sized,
{
    let wait = async {
        loop {
            if let Some(handle) = dependency.try_get().await {
                return handle;
            }
            debug!("Waiting for dependency {}", dependency.name());
            tokio::time::sleep(poll).await;
        }
    };

    match tokio::time::timeout(max_wait, wait).await {
        Ok(handle) => Ok(handle),
        Err(_) => {
            warn!(
                "Dependency {} unavailable after {:?}",
                dependency.name(),
                max_wait
            );
            Err(DependencyTimeout {
                name: dependency.name().to_string(),
                waited: max_wait,
            })
        }
    }
}
