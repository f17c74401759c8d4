//! Keyed single-flight registry.
//!
//! At most one operation per key is in progress at a time. Callers that
//! arrive while it runs get a clone of the same shared future and observe
//! the same result, success or failure.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

pub type Flight<T> = Shared<BoxFuture<'static, T>>;

pub struct SingleFlight<K, T: Clone> {
    in_flight: Arc<Mutex<HashMap<K, Flight<T>>>>,
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Join the operation running for `key`, or start one with `make`.
    ///
    /// Returns the shared handle and whether this call started it. `make` is
    /// only invoked when nothing is in flight. The entry is removed once the
    /// operation finishes, so a failure is never replayed to later callers.
    pub fn run<F, Fut>(&self, key: K, make: F) -> (Flight<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut in_flight = self.in_flight.lock();
        if let Some(existing) = in_flight.get(&key) {
            return (existing.clone(), false);
        }

        let registry = Arc::clone(&self.in_flight);
        let cleanup_key = key.clone();
        let work = make();
        let flight = async move {
            let out = work.await;
            registry.lock().remove(&cleanup_key);
            out
        }
        .boxed()
        .shared();

        in_flight.insert(key, flight.clone());
        (flight, true)
    }

    #[cfg(test)]
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.lock().contains_key(key)
    }
}
