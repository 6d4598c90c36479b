//! Per-key FIFO sequencing of concurrently running tasks.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

type Tails<K> = DashMap<K, (u64, oneshot::Receiver<()>)>;

/// Hands out turns per key in the order tickets were issued.
///
/// [`ticket`](Self::ticket) is synchronous, so a dispatcher that issues
/// tickets in arrival order and then spawns one task per event gets
/// strictly ordered execution per key, while tasks for different keys run
/// in parallel. Each ticket waits only for the ticket issued just before it
/// on the same key.
pub struct KeyedSequencer<K>
where
    K: Eq + Hash + Clone,
{
    tails: Arc<Tails<K>>,
    next_gen: AtomicU64,
}

impl<K> KeyedSequencer<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            tails: Arc::new(DashMap::new()),
            next_gen: AtomicU64::new(0),
        }
    }

    /// Takes the next turn for `key`.
    pub fn ticket(&self, key: K) -> Ticket<K> {
        let gen = self.next_gen.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();
        let prev = self
            .tails
            .insert(key.clone(), (gen, done_rx))
            .map(|(_, rx)| rx);

        Ticket {
            prev,
            slot: Slot {
                key,
                gen,
                done: Some(done_tx),
                tails: Arc::clone(&self.tails),
            },
        }
    }

    /// Number of keys with an outstanding ticket.
    pub fn active_keys(&self) -> usize {
        self.tails.len()
    }
}

impl<K> Default for KeyedSequencer<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A place in the queue for one key.
///
/// Dropping a ticket without waiting releases its turn immediately.
pub struct Ticket<K>
where
    K: Eq + Hash + Clone,
{
    prev: Option<oneshot::Receiver<()>>,
    slot: Slot<K>,
}

impl<K> Ticket<K>
where
    K: Eq + Hash + Clone,
{
    /// Waits until every earlier ticket for the same key has finished.
    pub async fn wait(mut self) -> Turn<K> {
        if let Some(prev) = self.prev.take() {
            // A dropped sender also means the predecessor is done.
            let _ = prev.await;
        }
        Turn { slot: self.slot }
    }

    pub fn key(&self) -> &K {
        &self.slot.key
    }
}

/// Proof that it is this ticket's turn. The next ticket runs once this is
/// dropped.
pub struct Turn<K>
where
    K: Eq + Hash + Clone,
{
    slot: Slot<K>,
}

impl<K> Turn<K>
where
    K: Eq + Hash + Clone,
{
    pub fn key(&self) -> &K {
        &self.slot.key
    }
}

struct Slot<K>
where
    K: Eq + Hash + Clone,
{
    key: K,
    gen: u64,
    done: Option<oneshot::Sender<()>>,
    tails: Arc<Tails<K>>,
}

impl<K> Drop for Slot<K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
        let gen = self.gen;
        self.tails.remove_if(&self.key, |_, (tail_gen, _)| *tail_gen == gen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_last_turn() {
        let seq: KeyedSequencer<u32> = KeyedSequencer::new();
        {
            let turn = seq.ticket(7).wait().await;
            assert_eq!(*turn.key(), 7);
            assert_eq!(seq.active_keys(), 1);
        }
        assert_eq!(seq.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_wait() {
        let seq: KeyedSequencer<u32> = KeyedSequencer::new();
        let _a = seq.ticket(1).wait().await;
        let b = tokio::time::timeout(Duration::from_millis(100), seq.ticket(2).wait()).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_ticket_releases_turn() {
        let seq: KeyedSequencer<u32> = KeyedSequencer::new();
        let first = seq.ticket(1);
        let second = seq.ticket(1);
        drop(first);
        let turn = tokio::time::timeout(Duration::from_millis(100), second.wait()).await;
        assert!(turn.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_runs_in_ticket_order() {
        let seq = Arc::new(KeyedSequencer::<u32>::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..16usize {
            let ticket = seq.ticket(42);
            let order = Arc::clone(&order);
            let inside = Arc::clone(&inside);
            handles.push(tokio::spawn(async move {
                let _turn = ticket.wait().await;
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                // Later tickets finish faster; order must still hold.
                tokio::time::sleep(Duration::from_millis((16 - i) as u64)).await;
                order.lock().unwrap().push(i);
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), (0..16).collect::<Vec<_>>());
        assert_eq!(seq.active_keys(), 0);
    }
}
