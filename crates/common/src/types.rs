//! Domain types shared across the advisor.

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::Error;

// ── Enums ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OperatingSystem {
    #[default]
    Linux,
    Windows,
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingSystem::Linux => write!(f, "Linux"),
            OperatingSystem::Windows => write!(f, "Windows"),
        }
    }
}

impl FromStr for OperatingSystem {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linux" | "linux/unix" => Ok(OperatingSystem::Linux),
            "windows" => Ok(OperatingSystem::Windows),
            other => Err(Error::validation("os", format!("unknown operating system '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceCategory {
    #[default]
    GeneralPurpose,
    ComputeOptimized,
    MemoryOptimized,
    StorageOptimized,
    AcceleratedComputing,
    HighPerformance,
}

impl FromStr for InstanceCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "general_purpose" | "general" => Ok(InstanceCategory::GeneralPurpose),
            "compute_optimized" | "compute" => Ok(InstanceCategory::ComputeOptimized),
            "memory_optimized" | "memory" => Ok(InstanceCategory::MemoryOptimized),
            "storage_optimized" | "storage" => Ok(InstanceCategory::StorageOptimized),
            "accelerated_computing" | "gpu" => Ok(InstanceCategory::AcceleratedComputing),
            "high_performance" | "hpc" => Ok(InstanceCategory::HighPerformance),
            other => Err(Error::validation("category", format!("unknown category '{other}'"))),
        }
    }
}

/// Bucketed reclamation rate of a spot instance, ordered from safest to
/// riskiest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionFrequency {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl InterruptionFrequency {
    /// Bucket index, 0 (VeryLow) through 4 (VeryHigh).
    pub fn level(self) -> u8 {
        match self {
            InterruptionFrequency::VeryLow => 0,
            InterruptionFrequency::Low => 1,
            InterruptionFrequency::Medium => 2,
            InterruptionFrequency::High => 3,
            InterruptionFrequency::VeryHigh => 4,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(InterruptionFrequency::VeryLow),
            1 => Some(InterruptionFrequency::Low),
            2 => Some(InterruptionFrequency::Medium),
            3 => Some(InterruptionFrequency::High),
            4 => Some(InterruptionFrequency::VeryHigh),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InterruptionFrequency::VeryLow => "<5%",
            InterruptionFrequency::Low => "5-10%",
            InterruptionFrequency::Medium => "10-15%",
            InterruptionFrequency::High => "15-20%",
            InterruptionFrequency::VeryHigh => ">20%",
        }
    }
}

impl fmt::Display for InterruptionFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    #[default]
    Current,
    Previous,
    Legacy,
    Deprecated,
}

/// Whether a value came from real provider data or was estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    #[default]
    Measured,
    Estimated,
}

// ── Instance data ─────────────────────────────────────────────────────

/// Hardware specification of one instance type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpecs {
    pub instance_type: String,
    pub vcpu: u32,
    pub memory_gb: f64,
    #[serde(default)]
    pub has_gpu: bool,
    #[serde(default)]
    pub gpu_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_type: Option<String>,
    #[serde(default)]
    pub storage_gb: f64,
    #[serde(default = "default_architecture")]
    pub architecture: String,
    #[serde(default)]
    pub category: InstanceCategory,
    #[serde(default)]
    pub generation: Generation,
    #[serde(default)]
    pub is_deprecated: bool,
    #[serde(default)]
    pub is_burstable: bool,
    #[serde(default)]
    pub is_bare_metal: bool,
    #[serde(default)]
    pub provider: String,
}

impl InstanceSpecs {
    pub fn family(&self) -> String {
        instance_family(&self.instance_type)
    }
}

/// Spot pricing and interruption data for one instance type in one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotData {
    pub instance_type: String,
    pub region: String,
    #[serde(default)]
    pub os: OperatingSystem,
    pub savings_percent: u32,
    pub interruption: InterruptionFrequency,
    /// Hourly spot price in USD; 0 when the source only publishes savings.
    #[serde(default)]
    pub spot_price: f64,
    #[serde(default)]
    pub on_demand_price: f64,
    #[serde(default)]
    pub provider: String,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub data_source: DataSource,
}

/// The scoring engine's working unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub specs: InstanceSpecs,
    pub spot: SpotData,
}

impl Candidate {
    pub fn new(specs: InstanceSpecs, spot: SpotData) -> Self {
        Self { specs, spot }
    }

    pub fn instance_type(&self) -> &str {
        &self.specs.instance_type
    }
}

// ── Scoring output ────────────────────────────────────────────────────

/// Per-factor scores on a 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub savings_score: f64,
    pub stability_score: f64,
    pub fitness_score: f64,
    pub value_score: f64,
    /// Points subtracted for older hardware generations.
    pub generation_penalty: f64,
}

impl ScoreBreakdown {
    pub const SAVINGS_WEIGHT: f64 = 0.30;
    pub const STABILITY_WEIGHT: f64 = 0.25;
    pub const FITNESS_WEIGHT: f64 = 0.25;
    pub const VALUE_WEIGHT: f64 = 0.20;

    /// Weighted composite, clamped to [0, 100].
    pub fn total(&self) -> f64 {
        let raw = self.savings_score * Self::SAVINGS_WEIGHT
            + self.stability_score * Self::STABILITY_WEIGHT
            + self.fitness_score * Self::FITNESS_WEIGHT
            + self.value_score * Self::VALUE_WEIGHT
            - self.generation_penalty;
        raw.clamp(0.0, 100.0)
    }
}

/// Second-pass signals blended into the final score in enhanced mode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnhancedFactors {
    pub volatility_score: f64,
    pub trend_score: f64,
    pub capacity_pool_score: f64,
    pub time_pattern_score: f64,
    pub popularity_score: f64,
    pub combined_enhanced_score: f64,
    pub data_source: DataSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub specs: InstanceSpecs,
    pub spot: SpotData,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    /// 1-based; 0 until the candidate has been ranked.
    pub rank: usize,
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced: Option<EnhancedFactors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
}

impl ScoredCandidate {
    pub fn instance_type(&self) -> &str {
        &self.specs.instance_type
    }

    /// Score used for ordering: the blended final score when present.
    pub fn ranking_score(&self) -> f64 {
        self.final_score.unwrap_or(self.score)
    }
}

// ── Requests & results ────────────────────────────────────────────────

/// Workload requirements supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRequirements {
    pub min_vcpu: u32,
    #[serde(default)]
    pub max_vcpu: Option<u32>,
    #[serde(default)]
    pub min_memory_gb: Option<f64>,
    #[serde(default)]
    pub max_memory_gb: Option<f64>,
    #[serde(default)]
    pub requires_gpu: bool,
    #[serde(default)]
    pub min_gpu_count: Option<u32>,
    #[serde(default)]
    pub gpu_type: Option<String>,
    #[serde(default)]
    pub min_storage_gb: Option<f64>,
    #[serde(default)]
    pub preferred_category: Option<InstanceCategory>,
    /// `x86_64` or `arm64`.
    #[serde(default)]
    pub architecture: Option<String>,
    pub region: String,
    #[serde(default)]
    pub os: OperatingSystem,
    pub max_interruption: InterruptionFrequency,
    #[serde(default)]
    pub min_savings_percent: Option<u32>,
    #[serde(default)]
    pub allow_burstable: bool,
    #[serde(default)]
    pub allow_bare_metal: bool,
    /// Instance families to keep (`m`, `c`, `D`, ...); empty keeps all.
    #[serde(default)]
    pub families: Vec<String>,
    pub top_n: usize,
}

impl Default for UsageRequirements {
    fn default() -> Self {
        Self {
            min_vcpu: 2,
            max_vcpu: None,
            min_memory_gb: None,
            max_memory_gb: None,
            requires_gpu: false,
            min_gpu_count: None,
            gpu_type: None,
            min_storage_gb: None,
            preferred_category: None,
            architecture: None,
            region: "us-east-1".into(),
            os: OperatingSystem::Linux,
            max_interruption: InterruptionFrequency::Medium,
            min_savings_percent: None,
            allow_burstable: false,
            allow_bare_metal: false,
            families: Vec::new(),
            top_n: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub provider: String,
    pub region: String,
    pub requirements: UsageRequirements,
    pub top_instances: Vec<ScoredCandidate>,
    pub total_analyzed: usize,
    pub filtered_out: usize,
    pub enhanced: bool,
    pub summary: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub insights: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

// ── Price history ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

/// Aggregate statistics for one availability zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStats {
    pub zone: String,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub volatility: f64,
    pub data_points: usize,
}

/// Average price observed in one weekday/hour slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSlot {
    pub weekday: Weekday,
    pub hour: u32,
    pub avg_price: f64,
    pub samples: usize,
}

/// Statistics over a window of spot price samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAnalysis {
    pub instance_type: String,
    /// Zone with the lowest average price, when samples carry zones.
    pub best_zone: Option<String>,
    pub current_price: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub std_dev: f64,
    /// Coefficient of variation (std_dev / avg_price).
    pub volatility: f64,
    /// Least-squares slope in price units per hour.
    pub trend_slope: f64,
    /// Slope as percent of the average price per hour, clamped to [-1, 1].
    pub trend_score: f64,
    pub data_points: usize,
    pub time_span_hours: f64,
    /// Hour of day (UTC) -> average price.
    pub hourly_pattern: BTreeMap<u32, f64>,
    /// Days from Monday -> average price.
    pub weekday_pattern: BTreeMap<u32, f64>,
    pub slot_pattern: Vec<PatternSlot>,
    pub zones: Vec<ZoneStats>,
}

// ── Prediction ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityRisk {
    Low,
    Medium,
    High,
}

/// Which estimator produced a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionMethod {
    LinearRegression,
    Heuristic,
}

impl fmt::Display for PredictionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionMethod::LinearRegression => write!(f, "linear_regression"),
            PredictionMethod::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Two-hour UTC window with the lowest historical average price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchWindow {
    pub weekday: Weekday,
    pub start_hour: u32,
    pub end_hour: u32,
    pub avg_price: f64,
}

impl fmt::Display for LaunchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:00-{:02}:00 UTC",
            self.weekday, self.start_hour, self.end_hour
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePrediction {
    pub instance_type: String,
    pub region: String,
    pub current_price: f64,
    pub predicted_1h: f64,
    pub predicted_6h: f64,
    pub predicted_24h: f64,
    pub trend_direction: TrendDirection,
    pub volatility_risk: VolatilityRisk,
    pub confidence: f64,
    pub optimal_launch_time: Option<LaunchWindow>,
    pub method: PredictionMethod,
    pub data_points: usize,
    pub generated_at: DateTime<Utc>,
}

// ── Zones ─────────────────────────────────────────────────────────────

/// Availability of an instance type in one zone, as reported upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneInfo {
    pub zone: String,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default)]
    pub restricted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restriction_reason: Option<String>,
    /// 0-100, higher means more capacity is likely.
    #[serde(default)]
    pub capacity_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecommendation {
    pub zone: String,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub volatility: f64,
    pub rank: usize,
    /// Composite used for ordering (price when ranking on cost alone).
    pub score: f64,
    pub available: bool,
    pub restricted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity_score: Option<f64>,
    pub price_predicted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneRecommendationResult {
    pub instance_type: String,
    pub region: String,
    pub recommendations: Vec<ZoneRecommendation>,
    pub best_zone: Option<String>,
    pub next_best_zone: Option<String>,
    /// Percent spread between the cheapest and priciest ranked zone.
    pub price_differential: Option<f64>,
    pub insights: Vec<String>,
    pub confidence: f64,
    pub data_sources: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Leading family letters of an instance type name.
///
/// `m5.large` -> `m`, `Standard_D4s_v5` -> `D`, `n2-standard-4` -> `n`.
pub fn instance_family(instance_type: &str) -> String {
    if let Some(rest) = instance_type.strip_prefix("Standard_") {
        let letters: String = rest.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        return letters.to_ascii_uppercase();
    }
    instance_type
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect()
}

fn default_architecture() -> String {
    "x86_64".into()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── breakdown ──

    #[test]
    fn test_breakdown_total_matches_weights() {
        let b = ScoreBreakdown {
            savings_score: 80.0,
            stability_score: 60.0,
            fitness_score: 100.0,
            value_score: 50.0,
            generation_penalty: 4.5,
        };
        let expected = 0.30 * 80.0 + 0.25 * 60.0 + 0.25 * 100.0 + 0.20 * 50.0 - 4.5;
        assert!((b.total() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_breakdown_total_clamps_at_zero() {
        let b = ScoreBreakdown {
            generation_penalty: 15.0,
            ..ScoreBreakdown::default()
        };
        assert_eq!(b.total(), 0.0);
    }

    // ── enums ──

    #[test]
    fn test_interruption_order_and_levels() {
        assert!(InterruptionFrequency::VeryLow < InterruptionFrequency::VeryHigh);
        for level in 0..5 {
            let bucket = InterruptionFrequency::from_level(level).expect("valid level");
            assert_eq!(bucket.level(), level);
        }
        assert!(InterruptionFrequency::from_level(5).is_none());
        assert_eq!(InterruptionFrequency::Medium.to_string(), "10-15%");
    }

    #[test]
    fn test_os_parse() {
        assert_eq!("linux".parse::<OperatingSystem>().unwrap(), OperatingSystem::Linux);
        assert_eq!("Windows".parse::<OperatingSystem>().unwrap(), OperatingSystem::Windows);
        assert!("beos".parse::<OperatingSystem>().is_err());
    }

    #[test]
    fn test_category_parse_aliases() {
        assert_eq!(
            "memory-optimized".parse::<InstanceCategory>().unwrap(),
            InstanceCategory::MemoryOptimized
        );
        assert_eq!("gpu".parse::<InstanceCategory>().unwrap(), InstanceCategory::AcceleratedComputing);
    }

    // ── families ──

    #[test]
    fn test_instance_family() {
        assert_eq!(instance_family("m5.large"), "m");
        assert_eq!(instance_family("c6gn.xlarge"), "c");
        assert_eq!(instance_family("Standard_D4s_v5"), "D");
        assert_eq!(instance_family("n2-standard-4"), "n");
    }

    // ── serde ──

    #[test]
    fn test_specs_defaults_from_json() {
        let specs: InstanceSpecs =
            serde_json::from_str(r#"{"instance_type":"m5.large","vcpu":2,"memory_gb":8.0}"#)
                .unwrap();
        assert_eq!(specs.architecture, "x86_64");
        assert_eq!(specs.generation, Generation::Current);
        assert!(!specs.has_gpu);
    }

    #[test]
    fn test_zone_info_defaults_available() {
        let zone: ZoneInfo = serde_json::from_str(r#"{"zone":"us-east-1a"}"#).unwrap();
        assert!(zone.available);
        assert!(!zone.restricted);
        assert!(zone.capacity_score.is_none());
    }

    #[test]
    fn test_launch_window_display() {
        let w = LaunchWindow {
            weekday: Weekday::Tue,
            start_hour: 3,
            end_hour: 5,
            avg_price: 0.01,
        };
        assert_eq!(w.to_string(), "Tue 03:00-05:00 UTC");
    }
}
