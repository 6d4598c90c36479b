//! Pending-entry store implementation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use vpn_types::{DpnId, IpPrefix, PendingFibEntry, RouteDistinguisher, TunnelEndpointPair};

/// Result of [`PendingStore::park_unless`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkOutcome {
    /// The tunnel is operational; nothing was parked.
    Ready,
    /// The entry was parked by this call.
    Parked,
    /// The entry was already parked.
    AlreadyParked,
}

impl ParkOutcome {
    pub fn is_parked(&self) -> bool {
        !matches!(self, ParkOutcome::Ready)
    }
}

/// Routes waiting for a tunnel, keyed by the tunnel they need.
///
/// Every read-modify-write runs inside a single DashMap entry guard, so
/// operations on the same pair are mutually exclusive while different pairs
/// proceed in parallel. No record is ever left with an empty list.
///
/// Callers must not program flows while holding anything returned from
/// here; all methods release the guard before returning.
#[derive(Debug, Default)]
pub struct PendingStore {
    entries: DashMap<TunnelEndpointPair, Vec<PendingFibEntry>>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks (rd, prefix) under `pair`. Returns false if it was already there.
    pub fn add_pending(
        &self,
        pair: TunnelEndpointPair,
        rd: RouteDistinguisher,
        prefix: IpPrefix,
    ) -> bool {
        let entry = PendingFibEntry::new(rd, prefix);
        let mut list = self.entries.entry(pair).or_default();
        if list.contains(&entry) {
            return false;
        }
        list.push(entry);
        debug!("PendingStore: parked {} under {}", entry, pair);
        true
    }

    /// Parks (rd, prefix) under `pair` unless `ready` returns true.
    ///
    /// `ready` runs while the pair is locked. A tunnel-up that marks the
    /// tunnel operational before draining therefore either sees this entry
    /// in its drain or makes `ready` return true; the route is never left
    /// behind.
    pub fn park_unless<F>(
        &self,
        pair: TunnelEndpointPair,
        rd: RouteDistinguisher,
        prefix: IpPrefix,
        ready: F,
    ) -> ParkOutcome
    where
        F: FnOnce() -> bool,
    {
        let entry = PendingFibEntry::new(rd, prefix);
        match self.entries.entry(pair) {
            Entry::Occupied(mut occupied) => {
                if ready() {
                    return ParkOutcome::Ready;
                }
                let list = occupied.get_mut();
                if list.contains(&entry) {
                    return ParkOutcome::AlreadyParked;
                }
                list.push(entry);
                debug!("PendingStore: parked {} under {}", entry, pair);
                ParkOutcome::Parked
            }
            Entry::Vacant(vacant) => {
                if ready() {
                    return ParkOutcome::Ready;
                }
                vacant.insert(vec![entry]);
                debug!("PendingStore: parked {} under new record {}", entry, pair);
                ParkOutcome::Parked
            }
        }
    }

    /// Removes and returns everything parked under `pair`.
    pub fn drain_pending(&self, pair: &TunnelEndpointPair) -> Vec<PendingFibEntry> {
        match self.entries.remove(pair) {
            Some((_, list)) => {
                debug!("PendingStore: drained {} entries from {}", list.len(), pair);
                list
            }
            None => Vec::new(),
        }
    }

    /// Deletes the record for `pair` if its list is empty.
    pub fn remove_if_empty(&self, pair: &TunnelEndpointPair) -> bool {
        self.entries.remove_if(pair, |_, list| list.is_empty()).is_some()
    }

    /// Removes one entry, deleting the record if it became empty.
    pub fn remove_pending(
        &self,
        pair: &TunnelEndpointPair,
        rd: &RouteDistinguisher,
        prefix: &IpPrefix,
    ) -> bool {
        let Entry::Occupied(mut occupied) = self.entries.entry(*pair) else {
            return false;
        };

        let list = occupied.get_mut();
        let before = list.len();
        list.retain(|e| !(e.rd == *rd && e.prefix == *prefix));
        let removed = list.len() != before;

        if list.is_empty() {
            occupied.remove();
            debug!("PendingStore: record {} emptied and removed", pair);
        }
        removed
    }

    /// Prunes every entry of `rd` under any pair sourced at `dpn`.
    ///
    /// Returns the number of entries removed.
    pub fn remove_rd_for_dpn(&self, dpn: DpnId, rd: &RouteDistinguisher) -> usize {
        let pairs: Vec<TunnelEndpointPair> = self
            .entries
            .iter()
            .map(|r| *r.key())
            .filter(|pair| pair.src_dpn == dpn)
            .collect();

        let mut removed = 0;
        for pair in pairs {
            if let Entry::Occupied(mut occupied) = self.entries.entry(pair) {
                let list = occupied.get_mut();
                let before = list.len();
                list.retain(|e| e.rd != *rd);
                removed += before - list.len();
                if list.is_empty() {
                    occupied.remove();
                }
            }
        }

        if removed > 0 {
            debug!(
                "PendingStore: pruned {} entries of {} parked on {}",
                removed, rd, dpn
            );
        }
        removed
    }

    /// Deletes every record whose list is empty. Returns how many went.
    pub fn remove_empty_records(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, list| !list.is_empty());
        before.saturating_sub(self.entries.len())
    }

    /// Returns every pair under which (rd, prefix) is parked.
    pub fn pairs_for(&self, rd: &RouteDistinguisher, prefix: &IpPrefix) -> Vec<TunnelEndpointPair> {
        let mut pairs: Vec<TunnelEndpointPair> = self
            .entries
            .iter()
            .filter(|r| r.value().iter().any(|e| e.rd == *rd && e.prefix == *prefix))
            .map(|r| *r.key())
            .collect();
        pairs.sort();
        pairs
    }

    /// Prunes (rd, prefix) from every pair. Returns the number of records
    /// it was removed from.
    pub fn remove_route(&self, rd: &RouteDistinguisher, prefix: &IpPrefix) -> usize {
        self.pairs_for(rd, prefix)
            .iter()
            .filter(|pair| self.remove_pending(pair, rd, prefix))
            .count()
    }

    /// Returns the entries parked under `pair`, in arrival order.
    pub fn pending_for(&self, pair: &TunnelEndpointPair) -> Vec<PendingFibEntry> {
        self.entries
            .get(pair)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    pub fn contains(
        &self,
        pair: &TunnelEndpointPair,
        rd: &RouteDistinguisher,
        prefix: &IpPrefix,
    ) -> bool {
        self.entries
            .get(pair)
            .map(|list| list.iter().any(|e| e.rd == *rd && e.prefix == *prefix))
            .unwrap_or(false)
    }

    /// Total number of parked entries.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|r| r.value().len()).sum()
    }

    /// Number of tunnel pairs with parked entries.
    pub fn record_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns all records sorted by pair, entries sorted by (rd, prefix).
    pub fn snapshot(&self) -> Vec<(TunnelEndpointPair, Vec<PendingFibEntry>)> {
        let mut records: Vec<_> = self
            .entries
            .iter()
            .map(|r| {
                let mut list = r.value().clone();
                list.sort();
                (*r.key(), list)
            })
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        records
    }
}
