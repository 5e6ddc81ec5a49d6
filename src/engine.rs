//! Composition root: shared services, the provider registry and the core
//! operations built on top of them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use analyzer::{predictor, recommendation, zones, EnhancedSignals, ScoringPool, ZoneInputs};
use chrono::Utc;
use cloud_providers::{
    CloudProvider, ProviderContext, ProviderFactory, ProviderRegistry, ProviderSettings,
    UpstreamLimiter,
};
use common::config::AdvisorConfig;
use common::{
    AnalysisResult, Candidate, Error, InstanceSpecs, InterruptionFrequency, OperatingSystem,
    PriceAnalysis, PricePrediction, Result, ScoredCandidate, SpotData, UsageRequirements,
    ZoneRecommendationResult,
};
use spot_cache::{CacheStats, TtlCache};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

pub struct Engine {
    config: AdvisorConfig,
    cache: Arc<TtlCache>,
    registry: ProviderRegistry,
    sweeper: JoinHandle<()>,
}

impl Engine {
    /// Build the shared cache, single-flight layer and rate limiter, then
    /// register each provider factory. Must be called inside a Tokio runtime.
    pub fn new(config: AdvisorConfig, providers: Vec<(String, ProviderFactory)>) -> Self {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(config.cache.ttl_secs)));
        let sweeper = cache.spawn_sweeper(Duration::from_secs(config.cache.sweep_interval_secs.max(1)));
        let limiter = UpstreamLimiter::per_second(config.providers.upstream_reads_per_sec);
        let ctx = ProviderContext::new(
            Arc::clone(&cache),
            limiter,
            ProviderSettings::from_config(&config),
        );

        let registry = ProviderRegistry::new();
        for (id, factory) in providers {
            let ctx = ctx.clone();
            registry.register_constructor(id, move || factory(&ctx));
        }
        info!(providers = ?registry.supported_providers(), "engine ready");

        Self {
            config,
            cache,
            registry,
            sweeper,
        }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub fn supported_providers(&self) -> Vec<String> {
        self.registry.supported_providers()
    }

    /// Requirements seeded from the configured analysis defaults.
    pub fn default_requirements(&self, region: impl Into<String>) -> UsageRequirements {
        let analysis = &self.config.analysis;
        UsageRequirements {
            region: region.into(),
            top_n: analysis.default_top_n,
            max_interruption: InterruptionFrequency::from_level(analysis.default_max_interruption)
                .unwrap_or(InterruptionFrequency::Medium),
            allow_burstable: analysis.allow_burstable,
            allow_bare_metal: analysis.allow_bare_metal,
            ..UsageRequirements::default()
        }
    }

    // ── Analysis ──────────────────────────────────────────────────────

    #[instrument(skip(self, requirements), fields(region = %requirements.region))]
    pub async fn analyze(&self, provider: &str, requirements: UsageRequirements) -> Result<AnalysisResult> {
        self.with_deadline("analyze", self.run_analysis(provider, requirements, false))
            .await
    }

    #[instrument(skip(self, requirements), fields(region = %requirements.region))]
    pub async fn analyze_enhanced(
        &self,
        provider: &str,
        requirements: UsageRequirements,
    ) -> Result<AnalysisResult> {
        self.with_deadline("analyze_enhanced", self.run_analysis(provider, requirements, true))
            .await
    }

    async fn run_analysis(
        &self,
        provider_id: &str,
        mut req: UsageRequirements,
        enhanced: bool,
    ) -> Result<AnalysisResult> {
        let provider = self.registry.get_or_create(provider_id)?;
        if req.region.trim().is_empty() {
            req.region = provider.default_region().to_string();
        }
        analyzer::validate_requirements(&req)?;

        let spot = provider.spot_data().fetch_spot_data(&req.region, req.os).await?;
        let specs = provider.instance_specs().get_all_instance_specs().await?;
        let total_analyzed = spot.len();
        let candidates = join_candidates(spot, specs);

        let outcome = analyzer::filter_candidates(candidates, &req);
        let filtered_out = total_analyzed - outcome.eligible.len();
        let pool = ScoringPool::from_candidates(&outcome.eligible);

        let mut insights = vec![format!(
            "{} of {} instance types met the requirements",
            outcome.eligible.len(),
            total_analyzed
        )];
        if let Some((reason, count)) = most_common_rejection(&outcome.rejected) {
            insights.push(format!("Most common exclusion: {reason} ({count})"));
        }

        let scored: Vec<ScoredCandidate> = if enhanced {
            let types: Vec<String> = outcome
                .eligible
                .iter()
                .map(|c| c.specs.instance_type.clone())
                .collect();
            let analyses = self.batch_price_analysis(&provider, &req.region, &types).await;
            let zone_counts = self.zone_counts(&provider, &req.region, &types).await;
            insights.push(if analyses.is_empty() {
                "Enhanced factors estimated from instance characteristics".to_string()
            } else {
                format!(
                    "Price history covered {} of {} candidates",
                    analyses.len(),
                    types.len()
                )
            });

            let weights = self.config.scoring.enhanced_weights;
            outcome
                .eligible
                .iter()
                .map(|c| {
                    let signals = EnhancedSignals {
                        analysis: analyses.get(&c.specs.instance_type),
                        zone_count: zone_counts.get(&c.specs.instance_type).copied(),
                    };
                    analyzer::score_enhanced(c, &req, &pool, signals, &weights)
                })
                .collect()
        } else {
            outcome
                .eligible
                .iter()
                .map(|c| analyzer::score(c, &req, &pool))
                .collect()
        };

        let scored_count = scored.len();
        let min_viable = self.config.analysis.min_viable_score;
        let top = analyzer::rank(scored, req.top_n, min_viable);
        if top.is_empty() && scored_count > 0 {
            insights.push(format!("No candidate reached the minimum viable score of {min_viable:.0}"));
        }

        info!(
            provider = provider_id,
            total_analyzed,
            filtered_out,
            returned = top.len(),
            enhanced,
            "analysis complete"
        );

        Ok(AnalysisResult {
            provider: provider_id.to_string(),
            region: req.region.clone(),
            summary: recommendation::summary(&top),
            top_instances: top,
            requirements: req,
            total_analyzed,
            filtered_out,
            enhanced,
            insights,
            analyzed_at: Utc::now(),
        })
    }

    async fn batch_price_analysis(
        &self,
        provider: &Arc<dyn CloudProvider>,
        region: &str,
        types: &[String],
    ) -> HashMap<String, PriceAnalysis> {
        let Some(history) = provider.price_history() else {
            return HashMap::new();
        };
        let lookback = self.config.analysis.price_history_lookback_days;
        match history.get_batch_price_analysis(region, types, lookback).await {
            Ok(analyses) => analyses,
            Err(e) => {
                warn!(provider = provider.id(), error = %e, "price history unavailable, estimating");
                HashMap::new()
            }
        }
    }

    async fn zone_counts(
        &self,
        provider: &Arc<dyn CloudProvider>,
        region: &str,
        types: &[String],
    ) -> HashMap<String, usize> {
        let Some(zone_provider) = provider.zones() else {
            return HashMap::new();
        };
        let counts = spot_cache::fetch_all(
            types.iter().cloned(),
            |instance_type: String| {
                let zone_provider = Arc::clone(&zone_provider);
                let region = region.to_string();
                async move {
                    let zones = zone_provider
                        .get_zone_availability(&instance_type, &region)
                        .await?;
                    // An empty list means no zone data, not zero capacity.
                    let usable = (!zones.is_empty())
                        .then(|| zones.iter().filter(|z| z.available && !z.restricted).count());
                    Ok::<_, Error>(usable)
                }
            },
            self.config.analysis.batch_concurrency,
        )
        .await;
        counts
            .into_iter()
            .filter_map(|(instance_type, usable)| usable.map(|n| (instance_type, n)))
            .collect()
    }

    // ── Prediction ────────────────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn predict_price(
        &self,
        provider: &str,
        region: &str,
        instance_type: &str,
    ) -> Result<PricePrediction> {
        self.with_deadline("predict_price", self.run_prediction(provider, region, instance_type))
            .await
    }

    async fn run_prediction(
        &self,
        provider_id: &str,
        region: &str,
        instance_type: &str,
    ) -> Result<PricePrediction> {
        let provider = self.registry.get_or_create(provider_id)?;
        let region = resolve_region(&provider, region);
        let analysis = self.price_analysis(&provider, &region, instance_type).await;

        let fallback = match &analysis {
            Some(a) if a.data_points >= 2 => None,
            _ => {
                let spot = self.spot_entry(&provider, &region, instance_type).await;
                if spot.is_none() && analysis.is_none() {
                    // Surfaces NotFound for instance types the provider does not know.
                    provider.instance_specs().get_instance_specs(instance_type).await?;
                }
                spot.map(|s| s.spot_price).filter(|p| *p > 0.0)
            }
        };

        Ok(predictor::predict(instance_type, &region, analysis.as_ref(), fallback))
    }

    // ── Zones ─────────────────────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn recommend_zones(
        &self,
        provider: &str,
        region: &str,
        instance_type: &str,
    ) -> Result<ZoneRecommendationResult> {
        self.with_deadline("recommend_zones", self.run_zone_recommendation(provider, region, instance_type))
            .await
    }

    async fn run_zone_recommendation(
        &self,
        provider_id: &str,
        region: &str,
        instance_type: &str,
    ) -> Result<ZoneRecommendationResult> {
        let provider = self.registry.get_or_create(provider_id)?;
        let region = resolve_region(&provider, region);
        if region.is_empty() {
            return Err(Error::validation("region", "must not be empty"));
        }

        let availability = match provider.zones() {
            Some(z) => match z.get_zone_availability(instance_type, &region).await {
                Ok(zones) => Some(zones),
                Err(e) => {
                    warn!(provider = provider_id, error = %e, "zone availability unavailable");
                    None
                }
            },
            None => None,
        };
        let analysis = self.price_analysis(&provider, &region, instance_type).await;
        let spot = self.spot_entry(&provider, &region, instance_type).await;

        let result = zones::recommend(ZoneInputs {
            provider: provider_id,
            region: &region,
            instance_type,
            availability,
            analysis: analysis.as_ref(),
            spot: spot.as_ref(),
            limit: self.config.analysis.zone_recommendations,
        });
        debug!(
            best_zone = ?result.best_zone,
            confidence = result.confidence,
            sources = ?result.data_sources,
            "zone recommendation ready"
        );
        Ok(result)
    }

    // ── Cache ─────────────────────────────────────────────────────────

    pub fn cache_status(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop one provider's cached data, or everything when no provider is
    /// named. Returns the number of entries removed.
    #[instrument(skip(self))]
    pub async fn refresh(&self, provider: Option<&str>) -> Result<usize> {
        match provider {
            Some(id) => self.registry.get_or_create(id)?.spot_data().refresh_data().await,
            None => {
                let removed = self.cache.clear();
                info!(removed, "cache cleared");
                Ok(removed)
            }
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────

    async fn with_deadline<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = Duration::from_secs(self.config.analysis.request_timeout_secs);
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout_secs = limit.as_secs(), "operation timed out");
                Err(Error::Timeout(format!("{op} exceeded {}s", limit.as_secs())))
            }
        }
    }

    /// Price analysis for one type; absent history and upstream failures
    /// both yield `None`.
    async fn price_analysis(
        &self,
        provider: &Arc<dyn CloudProvider>,
        region: &str,
        instance_type: &str,
    ) -> Option<PriceAnalysis> {
        let history = provider.price_history()?;
        let lookback = self.config.analysis.price_history_lookback_days;
        match history.get_price_analysis(region, instance_type, lookback).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(provider = provider.id(), instance_type, error = %e, "price history unavailable");
                None
            }
        }
    }

    async fn spot_entry(
        &self,
        provider: &Arc<dyn CloudProvider>,
        region: &str,
        instance_type: &str,
    ) -> Option<SpotData> {
        match provider.spot_data().fetch_spot_data(region, OperatingSystem::Linux).await {
            Ok(spot) => spot.into_iter().find(|s| s.instance_type == instance_type),
            Err(e) => {
                debug!(provider = provider.id(), error = %e, "spot data unavailable");
                None
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

fn resolve_region(provider: &Arc<dyn CloudProvider>, region: &str) -> String {
    if region.trim().is_empty() {
        provider.default_region().to_string()
    } else {
        region.to_string()
    }
}

/// Pair spot entries with their specs; entries without specs are skipped.
fn join_candidates(spot: Vec<SpotData>, specs: Vec<InstanceSpecs>) -> Vec<Candidate> {
    let by_type: HashMap<String, InstanceSpecs> = specs
        .into_iter()
        .map(|s| (s.instance_type.clone(), s))
        .collect();
    let total = spot.len();
    let candidates: Vec<Candidate> = spot
        .into_iter()
        .filter_map(|s| {
            let specs = by_type.get(&s.instance_type)?.clone();
            Some(Candidate { specs, spot: s })
        })
        .collect();
    if candidates.len() < total {
        debug!(missing = total - candidates.len(), "spot entries without specs skipped");
    }
    candidates
}

fn most_common_rejection(rejected: &[(String, analyzer::Rejection)]) -> Option<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for (_, reason) in rejected {
        *counts.entry(rejection_kind(reason).to_string()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(ka, a), (kb, b)| a.cmp(b).then_with(|| kb.cmp(ka)))
}

fn rejection_kind(reason: &analyzer::Rejection) -> &'static str {
    use analyzer::Rejection::*;
    match reason {
        Deprecated => "deprecated",
        TooFewVcpu { .. } | TooManyVcpu { .. } => "vCPU out of range",
        TooLittleMemory { .. } | TooMuchMemory { .. } => "memory out of range",
        UnwantedGpu | MissingGpu | TooFewGpus { .. } | GpuTypeMismatch { .. } => "GPU mismatch",
        Burstable => "burstable",
        BareMetal => "bare metal",
        FamilyExcluded(_) => "family not allowed",
        ArchitectureMismatch { .. } => "architecture mismatch",
        TooLittleStorage { .. } => "storage too small",
        InterruptionTooHigh(_) => "interruption too high",
        SavingsTooLow { .. } | NoSavings => "savings too low",
    }
}
