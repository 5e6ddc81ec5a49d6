//! Advisor configuration types.

use serde::{Deserialize, Serialize};

/// Top-level advisor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// Provider used when a command does not name one.
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Shared cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Analysis defaults and concurrency limits.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Scoring tunables.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Data source settings for the built-in providers.
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// TTL cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default entry lifetime in seconds.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Interval between background sweeps of expired entries.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Lifetime of cached price-history analyses.
    #[serde(default = "default_price_history_ttl")]
    pub price_history_ttl_secs: u64,
}

/// Analysis defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Number of ranked instances returned when a request leaves top_n unset.
    #[serde(default = "default_top_n")]
    pub default_top_n: usize,

    /// Interruption bucket (0-4) tolerated when a request leaves it unset.
    #[serde(default = "default_max_interruption")]
    pub default_max_interruption: u8,

    /// Include burstable families by default.
    #[serde(default = "default_true")]
    pub allow_burstable: bool,

    /// Include bare metal by default.
    #[serde(default)]
    pub allow_bare_metal: bool,

    /// Candidates scoring below this (0-100) are dropped before ranking.
    #[serde(default = "default_min_viable_score")]
    pub min_viable_score: f64,

    /// Days of price history used for predictions and enhanced scoring.
    #[serde(default = "default_lookback_days")]
    pub price_history_lookback_days: u32,

    /// Max concurrent upstream fetches in batch operations.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Deadline for a single engine operation.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Number of zones surfaced in zone recommendations (0 = all).
    #[serde(default = "default_zone_recommendations")]
    pub zone_recommendations: usize,
}

/// Scoring tunables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Relative weights of the enhanced factors.
    #[serde(default)]
    pub enhanced_weights: EnhancedWeights,
}

/// Relative weights of the five enhanced factors. Normalized by their sum,
/// so they need not add up to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnhancedWeights {
    #[serde(default = "default_volatility_weight")]
    pub volatility: f64,
    #[serde(default = "default_trend_weight")]
    pub trend: f64,
    #[serde(default = "default_capacity_pool_weight")]
    pub capacity_pool: f64,
    #[serde(default = "default_time_pattern_weight")]
    pub time_pattern: f64,
    #[serde(default = "default_popularity_weight")]
    pub popularity: f64,
}

impl EnhancedWeights {
    pub fn sum(&self) -> f64 {
        self.volatility + self.trend + self.capacity_pool + self.time_pattern + self.popularity
    }
}

/// Built-in provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Directory holding `<provider>.json` snapshot files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Provider IDs to register at startup.
    #[serde(default = "default_enabled_providers")]
    pub enabled: Vec<String>,

    /// Upstream reads allowed per second, shared by all providers.
    #[serde(default = "default_upstream_reads_per_sec")]
    pub upstream_reads_per_sec: u32,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            cache: CacheConfig::default(),
            analysis: AnalysisConfig::default(),
            scoring: ScoringConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            price_history_ttl_secs: default_price_history_ttl(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_top_n: default_top_n(),
            default_max_interruption: default_max_interruption(),
            allow_burstable: true,
            allow_bare_metal: false,
            min_viable_score: default_min_viable_score(),
            price_history_lookback_days: default_lookback_days(),
            batch_concurrency: default_batch_concurrency(),
            request_timeout_secs: default_request_timeout(),
            zone_recommendations: default_zone_recommendations(),
        }
    }
}

impl Default for EnhancedWeights {
    fn default() -> Self {
        Self {
            volatility: default_volatility_weight(),
            trend: default_trend_weight(),
            capacity_pool: default_capacity_pool_weight(),
            time_pattern: default_time_pattern_weight(),
            popularity: default_popularity_weight(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            enabled: default_enabled_providers(),
            upstream_reads_per_sec: default_upstream_reads_per_sec(),
        }
    }
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_provider() -> String {
    "aws".into()
}

fn default_cache_ttl() -> u64 {
    2 * 60 * 60
}

fn default_sweep_interval() -> u64 {
    10 * 60
}

fn default_price_history_ttl() -> u64 {
    2 * 60 * 60
}

fn default_top_n() -> usize {
    10
}

fn default_max_interruption() -> u8 {
    2
}

fn default_min_viable_score() -> f64 {
    30.0
}

fn default_lookback_days() -> u32 {
    7
}

fn default_batch_concurrency() -> usize {
    5
}

fn default_request_timeout() -> u64 {
    60
}

fn default_zone_recommendations() -> usize {
    0
}

fn default_volatility_weight() -> f64 {
    0.25
}

fn default_trend_weight() -> f64 {
    0.20
}

fn default_capacity_pool_weight() -> f64 {
    0.20
}

fn default_time_pattern_weight() -> f64 {
    0.20
}

fn default_popularity_weight() -> f64 {
    0.15
}

fn default_data_dir() -> String {
    "data".into()
}

fn default_enabled_providers() -> Vec<String> {
    vec!["aws".into(), "azure".into(), "gcp".into()]
}

fn default_upstream_reads_per_sec() -> u32 {
    20
}
