//! Provider registry: constructors by ID, instances built once on demand.

use common::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::provider::CloudProvider;

pub type Constructor = Arc<dyn Fn() -> Result<Arc<dyn CloudProvider>> + Send + Sync>;

#[derive(Default)]
pub struct ProviderRegistry {
    constructors: DashMap<String, Constructor>,
    instances: DashMap<String, Arc<dyn CloudProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `constructor` under `id`. A later registration replaces an
    /// earlier one and evicts any instance it already built.
    pub fn register_constructor<F>(&self, id: impl Into<String>, constructor: F)
    where
        F: Fn() -> Result<Arc<dyn CloudProvider>> + Send + Sync + 'static,
    {
        let id = id.into();
        let replaced = self.constructors.insert(id.clone(), Arc::new(constructor)).is_some();
        self.instances.remove(&id);
        debug!(provider = %id, replaced, "provider constructor registered");
    }

    /// The instance for `id`, constructing it on first use. Failed
    /// constructions are not remembered, so the next call tries again.
    pub fn get_or_create(&self, id: &str) -> Result<Arc<dyn CloudProvider>> {
        if let Some(existing) = self.instances.get(id) {
            return Ok(Arc::clone(existing.value()));
        }
        if !self.constructors.contains_key(id) {
            return Err(Error::UnsupportedProvider(id.to_string()));
        }

        // The entry holds its shard lock while constructing, so concurrent
        // first calls build exactly once. The constructor is read under that
        // lock: a registration racing this call either lands first and is
        // used here, or evicts what this call builds.
        match self.instances.entry(id.to_string()) {
            Entry::Occupied(e) => Ok(Arc::clone(e.get())),
            Entry::Vacant(v) => {
                let constructor = self
                    .constructors
                    .get(id)
                    .map(|c| Arc::clone(c.value()))
                    .ok_or_else(|| Error::UnsupportedProvider(id.to_string()))?;
                let provider = constructor()?;
                info!(provider = %id, "provider initialized");
                v.insert(Arc::clone(&provider));
                Ok(provider)
            }
        }
    }

    /// Registered IDs, sorted.
    pub fn supported_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.constructors.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn is_supported(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.supported_providers())
            .field("initialized", &self.instances.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Snapshot, SnapshotProvider};
    use crate::test_context;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn provider_with_region(id: &str, region: &str) -> Result<Arc<dyn CloudProvider>> {
        let snapshot = Snapshot {
            default_region: region.to_string(),
            ..Snapshot::default()
        };
        let provider: Arc<dyn CloudProvider> =
            Arc::new(SnapshotProvider::from_snapshot(id, snapshot, test_context()));
        Ok(provider)
    }

    // ── registration ──

    #[test]
    fn test_last_registration_wins() {
        let registry = ProviderRegistry::new();
        registry.register_constructor("aws", || provider_with_region("aws", "first"));
        registry.register_constructor("aws", || provider_with_region("aws", "second"));

        let p = registry.get_or_create("aws").expect("registered");
        assert_eq!(p.default_region(), "second");
        assert_eq!(registry.supported_providers(), vec!["aws".to_string()]);
    }

    #[test]
    fn test_reregistration_evicts_memoized_instance() {
        let registry = ProviderRegistry::new();
        registry.register_constructor("gcp", || provider_with_region("gcp", "old"));
        assert_eq!(registry.get_or_create("gcp").unwrap().default_region(), "old");

        registry.register_constructor("gcp", || provider_with_region("gcp", "new"));
        assert_eq!(registry.get_or_create("gcp").unwrap().default_region(), "new");
    }

    #[test]
    fn test_unknown_provider_is_unsupported() {
        let registry = ProviderRegistry::new();
        let err = registry.get_or_create("oracle").err().expect("should fail");
        assert!(matches!(err, Error::UnsupportedProvider(ref id) if id == "oracle"));
        assert!(!registry.is_supported("oracle"));
    }

    #[test]
    fn test_registration_racing_first_access_still_wins() {
        for round in 0..200 {
            let registry = Arc::new(ProviderRegistry::new());
            registry.register_constructor("aws", || provider_with_region("aws", "old"));

            let reader = {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get_or_create("aws").map(|_| ()))
            };
            let writer = {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry.register_constructor("aws", || provider_with_region("aws", "new"))
                })
            };
            reader.join().expect("reader").expect("provider");
            writer.join().expect("writer");

            let p = registry.get_or_create("aws").expect("registered");
            assert_eq!(p.default_region(), "new", "round {round}: stale instance memoized");
        }
    }

    // ── memoization ──

    #[test]
    fn test_failed_construction_is_not_memoized() {
        let registry = ProviderRegistry::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        registry.register_constructor("azure", move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::Config("credentials missing".into()))
            } else {
                provider_with_region("azure", "eastus")
            }
        });

        assert!(registry.get_or_create("azure").is_err());
        assert!(registry.get_or_create("azure").is_ok(), "second attempt retries");
        assert!(registry.get_or_create("azure").is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2, "success is memoized");
    }

    #[test]
    fn test_concurrent_first_access_constructs_once() {
        let registry = Arc::new(ProviderRegistry::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        registry.register_constructor("aws", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            provider_with_region("aws", "us-east-1")
        });

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get_or_create("aws").map(|p| p.id().to_string()))
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().expect("thread").expect("provider"), "aws");
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }
}
