//! Single-flight fetch coordinator.
//!
//! Collapses concurrent fetches of the same key into one upstream call.
//! The fetch itself runs on a spawned task so dropping any caller, including
//! the one that started it, never abandons work other callers wait on.
//! A fetch that overlaps a cache invalidation never writes its result back.

use common::{Error, Result};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::store::TtlCache;

type InFlightMap = HashMap<String, watch::Receiver<Flight>>;

/// State of an in-flight fetch as seen by its waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flight {
    Running,
    Stored,
    /// Fetched, but the cache was invalidated meanwhile so nothing was stored.
    Discarded,
    Failed,
}

/// Owns the in-flight marker for one fetch.
///
/// `finish` removes the marker before publishing the outcome, so a waiter
/// that wakes up and retries never rejoins the finished fetch. Dropping the
/// guard without `finish` (a panicking fetch) removes the marker and closes
/// the channel; waiters then see `Running` and treat it as a failure.
struct InFlightGuard {
    in_flight: Arc<Mutex<InFlightMap>>,
    key: String,
    done: watch::Sender<Flight>,
    cleared: bool,
}

impl InFlightGuard {
    fn finish(mut self, outcome: Flight) {
        self.clear();
        self.done.send_replace(outcome);
    }

    fn clear(&mut self) {
        if !self.cleared {
            lock(&self.in_flight).remove(&self.key);
            self.cleared = true;
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.clear();
    }
}

enum Role {
    Leader(watch::Sender<Flight>),
    Waiter(watch::Receiver<Flight>),
}

#[derive(Debug, Clone)]
pub struct SingleFlight {
    cache: Arc<TtlCache>,
    in_flight: Arc<Mutex<InFlightMap>>,
}

impl SingleFlight {
    pub fn new(cache: Arc<TtlCache>) -> Self {
        Self {
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    /// Number of fetches currently running.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Cached value for `key`, or the result of a single shared `fetch`.
    ///
    /// Successful results are cached for `ttl`; failures are not cached, so
    /// the next caller retries. A result whose fetch overlapped a
    /// `delete_prefix` or `clear` is returned to its leader but not cached,
    /// and waiters on it fetch again.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        loop {
            // 1. Fast path.
            if let Some(hit) = self.cache.get_as::<T>(key) {
                return Ok(hit);
            }

            // 2. Re-check and claim under the bookkeeping lock.
            let role = {
                let mut in_flight = lock(&self.in_flight);
                if let Some(hit) = self.cache.peek_as::<T>(key) {
                    return Ok(hit);
                }
                match in_flight.get(key) {
                    Some(rx) => Role::Waiter(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(Flight::Running);
                        in_flight.insert(key.to_string(), rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                // 3. Join the running fetch.
                Role::Waiter(mut done) => {
                    debug!(key, "joining in-flight fetch");
                    // Resolves once the leader finishes or its sender drops.
                    let _ = done.changed().await;
                    let outcome = *done.borrow();
                    match outcome {
                        Flight::Stored => {
                            if let Some(hit) = self.cache.peek_as::<T>(key) {
                                return Ok(hit);
                            }
                            debug!(key, "shared result already invalidated, fetching again");
                        }
                        Flight::Discarded => {
                            debug!(key, "shared fetch overlapped an invalidation, fetching again");
                        }
                        Flight::Running | Flight::Failed => {
                            return Err(Error::Upstream(format!("in-flight fetch for {key} failed")));
                        }
                    }
                }
                // 4. Run the fetch outside the lock.
                Role::Leader(tx) => return self.lead(key, ttl, tx, fetch()).await,
            }
        }
    }

    async fn lead<T, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        done: watch::Sender<Flight>,
        fut: Fut,
    ) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            key: key.to_string(),
            done,
            cleared: false,
        };
        let cache = Arc::clone(&self.cache);
        let owned_key = key.to_string();
        let generation = cache.generation();

        let task = tokio::spawn(async move {
            let guard = guard;
            match fut.await {
                Ok(value) => {
                    let value = Arc::new(value);
                    let stored =
                        cache.set_if_generation(owned_key, value.clone(), ttl, generation);
                    guard.finish(if stored { Flight::Stored } else { Flight::Discarded });
                    Ok(value)
                }
                Err(e) => {
                    guard.finish(Flight::Failed);
                    Err(e)
                }
            }
        });

        match task.await {
            Ok(result) => {
                if let Err(e) = &result {
                    warn!(key, error = %e, "upstream fetch failed");
                }
                result
            }
            Err(join_err) => Err(Error::Other(format!(
                "fetch task for {key} did not complete: {join_err}"
            ))),
        }
    }

    /// `get_or_fetch` bounded by a caller deadline. Expiry only abandons this
    /// caller's wait; the shared fetch keeps running for everyone else.
    pub async fn get_or_fetch_with_deadline<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        deadline: Duration,
        fetch: F,
    ) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        match tokio::time::timeout(deadline, self.get_or_fetch(key, ttl, fetch)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!("fetch for {key} exceeded {deadline:?}"))),
        }
    }
}

fn lock(map: &Mutex<InFlightMap>) -> MutexGuard<'_, InFlightMap> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}
