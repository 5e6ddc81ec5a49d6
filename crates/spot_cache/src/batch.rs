//! Bounded-concurrency batch fetch.

use common::Result;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

/// Fetch every key with at most `max_concurrency` fetches in flight.
///
/// Failed keys are logged and left out of the result; the batch itself never
/// fails.
pub async fn fetch_all<K, V, F, Fut>(
    keys: impl IntoIterator<Item = K>,
    fetch_one: F,
    max_concurrency: usize,
) -> HashMap<K, V>
where
    K: Eq + Hash + Clone + Display + Send + 'static,
    V: Send + 'static,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<V>> + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for key in keys {
        let fut = fetch_one(key.clone());
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => fut.await,
                Err(e) => Err(common::Error::Other(format!("batch semaphore closed: {e}"))),
            };
            (key, result)
        });
    }

    let mut results = HashMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((key, Ok(value))) => {
                results.insert(key, value);
            }
            Ok((key, Err(e))) => warn!(key = %key, error = %e, "batch fetch failed, skipping"),
            Err(e) => warn!(error = %e, "batch task did not complete"),
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_failures_are_skipped() {
        let keys = vec!["m5.large", "c5.xlarge", "r5.large", "t3.micro", "m6i.large"];
        let results = fetch_all(
            keys,
            |key| async move {
                if key == "t3.micro" {
                    Err(Error::Upstream("throttled".into()))
                } else {
                    Ok(key.len())
                }
            },
            2,
        )
        .await;

        assert_eq!(results.len(), 4, "one failing key should be dropped");
        assert!(!results.contains_key("t3.micro"));
        assert_eq!(results.get("m5.large"), Some(&8));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = fetch_all(
            0..8u32,
            |key| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(key * 2)
                }
            },
            2,
        )
        .await;

        assert_eq!(results.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2, "at most two fetches in flight");
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_progresses() {
        let results = fetch_all(vec![1u8, 2, 3], |k| async move { Ok(k) }, 0).await;
        assert_eq!(results.len(), 3);
    }
}
