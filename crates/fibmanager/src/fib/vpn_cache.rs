//! Route distinguisher to VPN id cache.

use dashmap::DashMap;
use log::debug;
use std::sync::Arc;
use vpn_types::{RouteDistinguisher, VpnId};

use super::callbacks::VpnIdResolver;
use super::error::Result;

/// Caches successful VPN id lookups. Failures are never cached so an rd
/// configured later resolves on the next attempt.
pub struct VpnIdCache {
    resolver: Arc<dyn VpnIdResolver>,
    cache: DashMap<RouteDistinguisher, VpnId>,
}

impl VpnIdCache {
    pub fn new(resolver: Arc<dyn VpnIdResolver>) -> Self {
        Self {
            resolver,
            cache: DashMap::new(),
        }
    }

    pub async fn resolve(&self, rd: &RouteDistinguisher) -> Result<VpnId> {
        if let Some(id) = self.cache.get(rd) {
            return Ok(*id);
        }

        let id = self.resolver.resolve(rd).await?;
        debug!("VpnIdCache: resolved {} to vpn {}", rd, id);
        self.cache.insert(*rd, id);
        Ok(id)
    }

    /// Seeds the cache with an id learned from the caller.
    pub fn remember(&self, rd: RouteDistinguisher, vpn_id: VpnId) {
        self.cache.insert(rd, vpn_id);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fib::FibError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VpnIdResolver for CountingResolver {
        async fn resolve(&self, rd: &RouteDistinguisher) -> Result<VpnId> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if rd.assigned() == 100 {
                Ok(VpnId(7))
            } else {
                Err(FibError::VpnIdUnresolved(*rd))
            }
        }
    }

    #[tokio::test]
    async fn test_hits_are_cached_misses_are_not() {
        let resolver = Arc::new(CountingResolver {
            calls: AtomicUsize::new(0),
        });
        let cache = VpnIdCache::new(resolver.clone());
        let known: RouteDistinguisher = "65000:100".parse().unwrap();
        let unknown: RouteDistinguisher = "65000:200".parse().unwrap();

        assert_eq!(cache.resolve(&known).await.unwrap(), VpnId(7));
        assert_eq!(cache.resolve(&known).await.unwrap(), VpnId(7));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

        assert!(cache.resolve(&unknown).await.is_err());
        assert!(cache.resolve(&unknown).await.is_err());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.len(), 1);
    }
}
