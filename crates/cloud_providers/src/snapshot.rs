//! Providers backed by a JSON snapshot of a cloud's spot market.
//!
//! Each cloud reads `<data_dir>/<id>.json`. Every read goes through the rate
//! limiter and the single-flight cache, exactly as a live API client would.

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use common::{
    Error, InstanceSpecs, OperatingSystem, PriceAnalysis, PriceSample, Result, SpotData, ZoneInfo,
};
use serde::{Deserialize, Serialize};
use spot_cache::keys::{self, CacheKey};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::provider::{
    CloudProvider, InstanceSpecsProvider, PriceHistoryProvider, ProviderContext, ProviderFactory,
    SpotDataProvider, ZoneProvider,
};

/// On-disk layout of a provider snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub default_region: String,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub instance_specs: Vec<InstanceSpecs>,
    #[serde(default)]
    pub spot_data: Vec<SpotData>,
    /// region -> instance type -> samples
    #[serde(default)]
    pub price_history: HashMap<String, HashMap<String, Vec<PriceSample>>>,
    /// region -> instance type -> zones
    #[serde(default)]
    pub zones: HashMap<String, HashMap<String, Vec<ZoneInfo>>>,
}

impl Snapshot {
    fn spot_for(&self, provider: &str, region: &str, os: OperatingSystem) -> Vec<SpotData> {
        self.spot_data
            .iter()
            .filter(|s| s.region == region && s.os == os)
            .cloned()
            .map(|mut s| {
                if s.provider.is_empty() {
                    s.provider = provider.to_string();
                }
                s
            })
            .collect()
    }

    fn specs(&self, provider: &str) -> Vec<InstanceSpecs> {
        self.instance_specs
            .iter()
            .cloned()
            .map(|mut s| {
                if s.provider.is_empty() {
                    s.provider = provider.to_string();
                }
                s
            })
            .collect()
    }

    /// Samples within `lookback_days` of the newest one; 0 keeps everything.
    fn recent_samples(&self, region: &str, instance_type: &str, lookback_days: u32) -> Vec<PriceSample> {
        let Some(samples) = self.price_history.get(region).and_then(|r| r.get(instance_type)) else {
            return Vec::new();
        };
        let Some(newest) = samples.iter().map(|s| s.timestamp).max() else {
            return Vec::new();
        };
        if lookback_days == 0 {
            return samples.clone();
        }
        let cutoff = newest - ChronoDuration::days(i64::from(lookback_days));
        samples.iter().filter(|s| s.timestamp >= cutoff).cloned().collect()
    }

    fn zones_for(&self, region: &str, instance_type: &str) -> Vec<ZoneInfo> {
        self.zones
            .get(region)
            .and_then(|r| r.get(instance_type))
            .cloned()
            .unwrap_or_default()
    }

    /// Declared regions, or the regions present in the spot data.
    fn known_regions(&self) -> Vec<String> {
        if !self.regions.is_empty() {
            return self.regions.clone();
        }
        self.spot_data
            .iter()
            .map(|s| s.region.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Static facts about a built-in cloud.
#[derive(Debug, Clone, Copy)]
pub struct CloudProfile {
    pub id: &'static str,
    pub default_region: &'static str,
    pub regions: &'static [&'static str],
}

pub const AWS: CloudProfile = CloudProfile {
    id: "aws",
    default_region: "us-east-1",
    regions: &[
        "us-east-1",
        "us-east-2",
        "us-west-1",
        "us-west-2",
        "eu-west-1",
        "eu-central-1",
        "ap-southeast-1",
        "ap-northeast-1",
    ],
};

pub const AZURE: CloudProfile = CloudProfile {
    id: "azure",
    default_region: "eastus",
    regions: &["eastus", "eastus2", "westus2", "westeurope", "northeurope", "southeastasia"],
};

pub const GCP: CloudProfile = CloudProfile {
    id: "gcp",
    default_region: "us-central1",
    regions: &["us-central1", "us-east1", "us-west1", "europe-west1", "asia-east1"],
};

#[derive(Debug, Clone)]
enum Origin {
    File(PathBuf),
    Memory(Arc<Snapshot>),
}

/// Shared state behind every capability of one snapshot provider.
#[derive(Debug, Clone)]
struct SnapshotSource {
    id: String,
    default_region: String,
    regions: Vec<String>,
    origin: Origin,
    ctx: ProviderContext,
}

impl SnapshotSource {
    /// One upstream read: wait for a limiter slot, then load the snapshot.
    async fn load(&self) -> Result<Arc<Snapshot>> {
        if !self.ctx.limiter.try_acquire() {
            debug!(provider = %self.id, "upstream reads throttled, waiting for a slot");
            self.ctx.limiter.acquire().await;
        }
        match &self.origin {
            Origin::Memory(snapshot) => Ok(Arc::clone(snapshot)),
            Origin::File(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| Error::Upstream(format!("{}: {e}", path.display())))?;
                let snapshot: Snapshot = serde_json::from_str(&raw)?;
                debug!(
                    provider = %self.id,
                    path = %path.display(),
                    spot_entries = snapshot.spot_data.len(),
                    "snapshot loaded"
                );
                Ok(Arc::new(snapshot))
            }
        }
    }

    fn check_region(&self, region: &str) -> Result<()> {
        if region.trim().is_empty() {
            return Err(Error::validation("region", "must not be empty"));
        }
        if !self.regions.is_empty() && !self.regions.iter().any(|r| r == region) {
            return Err(Error::validation(
                "region",
                format!("'{region}' is not supported by {}", self.id),
            ));
        }
        Ok(())
    }

    async fn all_specs(&self) -> Result<Arc<Vec<InstanceSpecs>>> {
        let key = CacheKey::new(&self.id, keys::SPECS, keys::GLOBAL).to_string();
        let this = self.clone();
        self.ctx
            .flights
            .get_or_fetch(&key, self.ctx.settings.cache_ttl, move || async move {
                let snapshot = this.load().await?;
                Ok::<_, Error>(snapshot.specs(&this.id))
            })
            .await
    }
}

#[async_trait]
impl SpotDataProvider for SnapshotSource {
    async fn fetch_spot_data(&self, region: &str, os: OperatingSystem) -> Result<Vec<SpotData>> {
        self.check_region(region)?;
        let key = CacheKey::new(&self.id, keys::SPOT, region)
            .with_id(os.to_string())
            .to_string();
        let this = self.clone();
        let region_owned = region.to_string();
        let data = self
            .ctx
            .flights
            .get_or_fetch(&key, self.ctx.settings.cache_ttl, move || async move {
                let snapshot = this.load().await?;
                Ok::<_, Error>(snapshot.spot_for(&this.id, &region_owned, os))
            })
            .await?;
        Ok(data.as_ref().clone())
    }

    fn supported_regions(&self) -> Vec<String> {
        self.regions.clone()
    }

    async fn refresh_data(&self) -> Result<usize> {
        let removed = self.ctx.cache.delete_prefix(&keys::provider_prefix(&self.id));
        info!(provider = %self.id, removed, "provider cache refreshed");
        Ok(removed)
    }
}

#[async_trait]
impl InstanceSpecsProvider for SnapshotSource {
    async fn get_instance_specs(&self, instance_type: &str) -> Result<InstanceSpecs> {
        self.all_specs()
            .await?
            .iter()
            .find(|s| s.instance_type == instance_type)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{} instance type '{instance_type}'", self.id)))
    }

    async fn get_all_instance_specs(&self) -> Result<Vec<InstanceSpecs>> {
        Ok(self.all_specs().await?.as_ref().clone())
    }
}

#[async_trait]
impl PriceHistoryProvider for SnapshotSource {
    async fn get_price_analysis(
        &self,
        region: &str,
        instance_type: &str,
        lookback_days: u32,
    ) -> Result<Option<PriceAnalysis>> {
        self.check_region(region)?;
        let key = CacheKey::new(&self.id, keys::PRICE_HISTORY, region)
            .with_id(format!("{instance_type}:{lookback_days}d"))
            .to_string();
        let this = self.clone();
        let region_owned = region.to_string();
        let type_owned = instance_type.to_string();
        let analysis = self
            .ctx
            .flights
            .get_or_fetch(&key, self.ctx.settings.price_history_ttl, move || async move {
                let snapshot = this.load().await?;
                let samples = snapshot.recent_samples(&region_owned, &type_owned, lookback_days);
                Ok::<_, Error>(analyzer::history::analyze(&type_owned, &samples))
            })
            .await?;
        Ok(analysis.as_ref().clone())
    }

    async fn get_batch_price_analysis(
        &self,
        region: &str,
        instance_types: &[String],
        lookback_days: u32,
    ) -> Result<HashMap<String, PriceAnalysis>> {
        self.check_region(region)?;
        let results = spot_cache::fetch_all(
            instance_types.iter().cloned(),
            |instance_type: String| {
                let this = self.clone();
                let region = region.to_string();
                async move {
                    this.get_price_analysis(&region, &instance_type, lookback_days)
                        .await
                }
            },
            self.ctx.settings.batch_concurrency,
        )
        .await;

        let analyses: HashMap<String, PriceAnalysis> = results
            .into_iter()
            .filter_map(|(instance_type, analysis)| analysis.map(|a| (instance_type, a)))
            .collect();
        debug!(
            provider = %self.id,
            requested = instance_types.len(),
            with_history = analyses.len(),
            "batch price analysis complete"
        );
        Ok(analyses)
    }
}

#[async_trait]
impl ZoneProvider for SnapshotSource {
    async fn get_zone_availability(&self, instance_type: &str, region: &str) -> Result<Vec<ZoneInfo>> {
        self.check_region(region)?;
        let key = CacheKey::new(&self.id, keys::ZONES, region)
            .with_id(instance_type)
            .to_string();
        let this = self.clone();
        let region_owned = region.to_string();
        let type_owned = instance_type.to_string();
        let zones = self
            .ctx
            .flights
            .get_or_fetch(&key, self.ctx.settings.cache_ttl, move || async move {
                let snapshot = this.load().await?;
                Ok::<_, Error>(snapshot.zones_for(&region_owned, &type_owned))
            })
            .await?;
        Ok(zones.as_ref().clone())
    }
}

/// A cloud whose every capability is served from one snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotProvider {
    source: Arc<SnapshotSource>,
}

impl SnapshotProvider {
    /// Provider reading `<data_dir>/<id>.json` on each upstream read.
    pub fn open(profile: CloudProfile, ctx: ProviderContext) -> Self {
        let path = Path::new(&ctx.settings.data_dir).join(format!("{}.json", profile.id));
        Self {
            source: Arc::new(SnapshotSource {
                id: profile.id.to_string(),
                default_region: profile.default_region.to_string(),
                regions: profile.regions.iter().map(|r| r.to_string()).collect(),
                origin: Origin::File(path),
                ctx,
            }),
        }
    }

    /// Provider serving an already loaded snapshot.
    pub fn from_snapshot(id: impl Into<String>, snapshot: Snapshot, ctx: ProviderContext) -> Self {
        let regions = snapshot.known_regions();
        let default_region = if snapshot.default_region.is_empty() {
            regions.first().cloned().unwrap_or_default()
        } else {
            snapshot.default_region.clone()
        };
        Self {
            source: Arc::new(SnapshotSource {
                id: id.into(),
                default_region,
                regions,
                origin: Origin::Memory(Arc::new(snapshot)),
                ctx,
            }),
        }
    }
}

impl CloudProvider for SnapshotProvider {
    fn id(&self) -> &str {
        &self.source.id
    }

    fn default_region(&self) -> &str {
        &self.source.default_region
    }

    fn spot_data(&self) -> Arc<dyn SpotDataProvider> {
        self.source.clone()
    }

    fn instance_specs(&self) -> Arc<dyn InstanceSpecsProvider> {
        self.source.clone()
    }

    fn price_history(&self) -> Option<Arc<dyn PriceHistoryProvider>> {
        Some(self.source.clone())
    }

    fn zones(&self) -> Option<Arc<dyn ZoneProvider>> {
        Some(self.source.clone())
    }
}

/// Factories for the snapshot-backed `aws`, `azure` and `gcp` providers.
pub fn builtin_providers() -> Vec<(String, ProviderFactory)> {
    [AWS, AZURE, GCP]
        .into_iter()
        .map(|profile| {
            let factory: ProviderFactory = Arc::new(move |ctx: &ProviderContext| {
                let provider: Arc<dyn CloudProvider> =
                    Arc::new(SnapshotProvider::open(profile, ctx.clone()));
                Ok(provider)
            });
            (profile.id.to_string(), factory)
        })
        .collect()
}
