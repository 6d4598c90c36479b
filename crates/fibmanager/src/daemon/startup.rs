//! Startup wait for the collaborators the FibOrch depends on.

use async_trait::async_trait;
use fib_orch_common::{acquire, Dependency, DependencyTimeout};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

use crate::fib::RouteSource;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Available once the route source answers a listing query.
pub struct RouteSourceReady {
    routes: Arc<dyn RouteSource>,
}

impl RouteSourceReady {
    pub fn new(routes: Arc<dyn RouteSource>) -> Self {
        Self { routes }
    }
}

#[async_trait]
impl Dependency for RouteSourceReady {
    /// Number of VRF tables known at startup.
    type Handle = usize;

    fn name(&self) -> &str {
        "route-source"
    }

    async fn try_get(&self) -> Option<usize> {
        match self.routes.route_distinguishers().await {
            Ok(rds) => Some(rds.len()),
            Err(e) => {
                debug!("route source not ready: {}", e);
                None
            }
        }
    }
}

/// Waits up to `max_wait` for the route source.
pub async fn wait_for_route_source(
    routes: Arc<dyn RouteSource>,
    max_wait: Duration,
) -> Result<usize, DependencyTimeout> {
    let tables = acquire(&RouteSourceReady::new(routes), max_wait, POLL_INTERVAL).await?;
    info!("Route source ready with {} VRF tables", tables);
    Ok(tables)
}
