//! Provider contracts, the provider registry and the snapshot-backed clouds.

pub mod provider;
pub mod rate_limit;
pub mod registry;
pub mod snapshot;

pub use provider::{
    CloudProvider, InstanceSpecsProvider, PriceHistoryProvider, ProviderContext, ProviderFactory,
    ProviderSettings, SpotDataProvider, ZoneProvider,
};
pub use rate_limit::UpstreamLimiter;
pub use registry::ProviderRegistry;
pub use snapshot::{builtin_providers, Snapshot, SnapshotProvider};

#[cfg(test)]
pub(crate) fn test_context() -> ProviderContext {
    use std::sync::Arc;
    use std::time::Duration;

    let settings = ProviderSettings {
        data_dir: "data".into(),
        cache_ttl: Duration::from_secs(600),
        price_history_ttl: Duration::from_secs(7200),
        batch_concurrency: 2,
    };
    ProviderContext::new(
        Arc::new(spot_cache::TtlCache::new(settings.cache_ttl)),
        UpstreamLimiter::per_second(1000),
        settings,
    )
}
