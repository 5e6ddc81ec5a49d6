//! Provider capability contracts.
//!
//! A cloud is a bundle of capabilities: spot data and instance specs are
//! required, price history and zone availability are optional. The core only
//! ever sees these traits.

use async_trait::async_trait;
use common::config::AdvisorConfig;
use common::{
    InstanceSpecs, OperatingSystem, PriceAnalysis, Result, SpotData, ZoneInfo,
};
use spot_cache::{SingleFlight, TtlCache};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::rate_limit::UpstreamLimiter;

#[async_trait]
pub trait SpotDataProvider: Send + Sync {
    async fn fetch_spot_data(&self, region: &str, os: OperatingSystem) -> Result<Vec<SpotData>>;

    fn supported_regions(&self) -> Vec<String>;

    /// Drop everything this provider has cached; returns the entry count.
    async fn refresh_data(&self) -> Result<usize>;
}

#[async_trait]
pub trait InstanceSpecsProvider: Send + Sync {
    /// `Error::NotFound` for unknown instance types.
    async fn get_instance_specs(&self, instance_type: &str) -> Result<InstanceSpecs>;

    async fn get_all_instance_specs(&self) -> Result<Vec<InstanceSpecs>>;
}

#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    /// `Ok(None)` when there is no usable history for the type.
    async fn get_price_analysis(
        &self,
        region: &str,
        instance_type: &str,
        lookback_days: u32,
    ) -> Result<Option<PriceAnalysis>>;

    /// Analyses for every type that has history; types without it, or whose
    /// fetch failed, are absent.
    async fn get_batch_price_analysis(
        &self,
        region: &str,
        instance_types: &[String],
        lookback_days: u32,
    ) -> Result<HashMap<String, PriceAnalysis>>;
}

#[async_trait]
pub trait ZoneProvider: Send + Sync {
    async fn get_zone_availability(&self, instance_type: &str, region: &str) -> Result<Vec<ZoneInfo>>;
}

/// One registered cloud.
pub trait CloudProvider: Send + Sync {
    fn id(&self) -> &str;

    fn default_region(&self) -> &str;

    fn spot_data(&self) -> Arc<dyn SpotDataProvider>;

    fn instance_specs(&self) -> Arc<dyn InstanceSpecsProvider>;

    fn price_history(&self) -> Option<Arc<dyn PriceHistoryProvider>> {
        None
    }

    fn zones(&self) -> Option<Arc<dyn ZoneProvider>> {
        None
    }
}

/// Shared services handed to provider factories.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub cache: Arc<TtlCache>,
    pub flights: SingleFlight,
    pub limiter: UpstreamLimiter,
    pub settings: ProviderSettings,
}

/// The slice of configuration providers care about.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub data_dir: String,
    pub cache_ttl: Duration,
    pub price_history_ttl: Duration,
    pub batch_concurrency: usize,
}

impl ProviderSettings {
    pub fn from_config(config: &AdvisorConfig) -> Self {
        Self {
            data_dir: config.providers.data_dir.clone(),
            cache_ttl: Duration::from_secs(config.cache.ttl_secs),
            price_history_ttl: Duration::from_secs(config.cache.price_history_ttl_secs),
            batch_concurrency: config.analysis.batch_concurrency,
        }
    }
}

impl ProviderContext {
    pub fn new(cache: Arc<TtlCache>, limiter: UpstreamLimiter, settings: ProviderSettings) -> Self {
        Self {
            flights: SingleFlight::new(Arc::clone(&cache)),
            cache,
            limiter,
            settings,
        }
    }
}

/// Builds a provider from the shared services.
pub type ProviderFactory = Arc<dyn Fn(&ProviderContext) -> Result<Arc<dyn CloudProvider>> + Send + Sync>;
