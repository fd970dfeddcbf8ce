//! Single-flight deduplication
//!
//! At most one in-flight computation per key. Later callers for the same key
//! receive a handle to the running computation instead of starting another.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

/// Handle to an in-flight computation; await it for the result
pub type Flight<V> = Shared<BoxFuture<'static, V>>;

struct Registry<K, V> {
    next_id: u64,
    calls: HashMap<K, (u64, Flight<V>)>,
}

pub struct SingleFlight<K, V> {
    registry: Arc<Mutex<Registry<K, V>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                calls: HashMap::new(),
            })),
        }
    }

    /// Handle to the computation registered for `key`, if any
    pub fn get(&self, key: &K) -> Option<Flight<V>> {
        self.registry.lock().calls.get(key).map(|(_, flight)| flight.clone())
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.registry.lock().calls.contains_key(key)
    }

    /// Deregister `key` before its computation returns
    ///
    /// Lets the owner close the window between publishing a result and the
    /// computation's own cleanup. The running computation is not cancelled and
    /// will not remove a later registration under the same key.
    pub fn forget(&self, key: &K) {
        self.registry.lock().calls.remove(key);
    }

    /// Join the computation for `key`, or start `work` if none is registered
    ///
    /// Returns the handle and whether `work` was started by this call. A started
    /// computation is spawned on the tokio runtime, so it runs to completion and
    /// deregisters itself even if every handle is dropped. Must be called from
    /// within a runtime.
    pub fn run<F>(&self, key: K, work: F) -> (Flight<V>, bool)
    where
        F: Future<Output = V> + Send + 'static,
    {
        let mut registry = self.registry.lock();
        if let Some((_, existing)) = registry.calls.get(&key) {
            return (existing.clone(), false);
        }

        let id = registry.next_id;
        registry.next_id += 1;

        let shared = Arc::clone(&self.registry);
        let registered_key = key.clone();
        let flight = async move {
            let value = work.await;
            let mut registry = shared.lock();
            if registry.calls.get(&registered_key).is_some_and(|(current, _)| *current == id) {
                registry.calls.remove(&registered_key);
            }
            value
        }
        .boxed()
        .shared();

        registry.calls.insert(key, (id, flight.clone()));
        drop(registry);

        tokio::spawn(flight.clone());
        (flight, true)
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for SingleFlight<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.registry.lock().calls.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counted(counter: &Arc<AtomicUsize>, value: u32) -> impl Future<Output = u32> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            value
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_runs_once() {
        let flights = SingleFlight::<String, u32>::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let (first, started_first) = flights.run("u1".into(), counted(&counter, 1));
        let (second, started_second) = flights.run("u1".into(), counted(&counter, 2));

        assert!(started_first);
        assert!(!started_second);
        assert_eq!(first.await, 1);
        assert_eq!(second.await, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_run_separately() {
        let flights = SingleFlight::<String, u32>::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let (a, _) = flights.run("u1".into(), counted(&counter, 1));
        let (b, _) = flights.run("u2".into(), counted(&counter, 2));

        assert!(flights.is_in_flight(&"u1".to_string()));
        assert!(flights.is_in_flight(&"u2".to_string()));
        assert_eq!((a.await, b.await), (1, 2));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_released_after_completion() {
        let flights = SingleFlight::<String, u32>::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let (flight, _) = flights.run("u1".into(), counted(&counter, 1));
        assert!(flights.is_in_flight(&"u1".to_string()));
        flight.await;
        assert!(!flights.is_in_flight(&"u1".to_string()));

        let (again, started) = flights.run("u1".into(), counted(&counter, 3));
        assert!(started);
        assert_eq!(again.await, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_without_waiters() {
        let flights = SingleFlight::<String, u32>::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let (flight, _) = flights.run("u1".into(), counted(&counter, 1));
        drop(flight);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!flights.is_in_flight(&"u1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_allows_a_new_run() {
        let flights = SingleFlight::<String, u32>::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let key = "u1".to_string();

        let (old, _) = flights.run(key.clone(), counted(&counter, 1));
        flights.forget(&key);
        assert!(!flights.is_in_flight(&key));

        let (new, started) = flights.run(key.clone(), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            2
        });
        assert!(started);

        // The old computation finishing must not deregister the new one
        assert_eq!(old.await, 1);
        assert!(flights.is_in_flight(&key));
        assert_eq!(new.await, 2);
        assert!(!flights.is_in_flight(&key));
    }
}
