//! Enhanced scoring: price-history and availability signals blended into the
//! base score.
//!
//! Factors come from a measured [`PriceAnalysis`] when one is available and
//! from instance characteristics otherwise; the result is tagged with its
//! [`DataSource`] either way.

use common::config::EnhancedWeights;
use common::{
    Candidate, DataSource, EnhancedFactors, Generation, InstanceCategory, InterruptionFrequency,
    PriceAnalysis, ScoredCandidate, UsageRequirements,
};

use crate::history::coefficient_of_variation;
use crate::scoring::{self, ScoringPool};

pub const BASE_SHARE: f64 = 0.60;
pub const ENHANCED_SHARE: f64 = 0.40;

/// Capacity penalty when the zone provider lists the type but no zone is
/// available and unrestricted.
const NO_USABLE_ZONE_PENALTY: f64 = 30.0;

/// Regions with enough zones that capacity is rarely the bottleneck.
const LARGE_REGIONS: &[&str] = &[
    "us-east-1",
    "us-west-2",
    "eu-west-1",
    "eu-central-1",
    "ap-northeast-1",
    "eastus",
    "westeurope",
    "us-central1",
    "europe-west1",
];

/// Optional inputs for the enhanced factors.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnhancedSignals<'a> {
    pub analysis: Option<&'a PriceAnalysis>,
    /// Zones the instance type is offered in, when a zone provider answered.
    pub zone_count: Option<usize>,
}

/// `0.60 * base + 0.40 * enhanced`.
pub fn blend(base_score: f64, combined_enhanced: f64) -> f64 {
    BASE_SHARE * base_score + ENHANCED_SHARE * combined_enhanced
}

/// Weighted average of the five factors, normalized by the weight sum.
pub fn combine(factors: &EnhancedFactors, weights: &EnhancedWeights) -> f64 {
    let w = if weights.sum() > 0.0 { *weights } else { EnhancedWeights::default() };
    (factors.volatility_score * w.volatility
        + factors.trend_score * w.trend
        + factors.capacity_pool_score * w.capacity_pool
        + factors.time_pattern_score * w.time_pattern
        + factors.popularity_score * w.popularity)
        / w.sum()
}

pub fn enhanced_factors(
    candidate: &Candidate,
    region: &str,
    signals: EnhancedSignals<'_>,
    weights: &EnhancedWeights,
) -> EnhancedFactors {
    let mut factors = match signals.analysis.filter(|a| a.data_points > 0) {
        Some(a) => EnhancedFactors {
            volatility_score: measured_volatility(a),
            trend_score: measured_trend(a),
            capacity_pool_score: measured_capacity_pool(a),
            time_pattern_score: measured_time_pattern(a),
            data_source: DataSource::Measured,
            ..EnhancedFactors::default()
        },
        None => EnhancedFactors {
            volatility_score: estimated_volatility(candidate),
            trend_score: estimated_trend(candidate),
            capacity_pool_score: estimated_capacity_pool(candidate, region, signals.zone_count),
            time_pattern_score: estimated_time_pattern(candidate.spot.interruption),
            data_source: DataSource::Estimated,
            ..EnhancedFactors::default()
        },
    };
    factors.popularity_score = popularity(candidate);
    factors.combined_enhanced_score = combine(&factors, weights);
    factors.insights = insights(&factors);
    factors
}

/// Base score plus enhanced factors and the blended final score.
pub fn score_enhanced(
    candidate: &Candidate,
    req: &UsageRequirements,
    pool: &ScoringPool,
    signals: EnhancedSignals<'_>,
    weights: &EnhancedWeights,
) -> ScoredCandidate {
    let mut scored = scoring::score(candidate, req, pool);
    let factors = enhanced_factors(candidate, &req.region, signals, weights);
    scored.final_score = Some(blend(scored.score, factors.combined_enhanced_score));
    scored.enhanced = Some(factors);
    scoring::annotate(&mut scored, req);
    scored
}

// ── Measured factors ──────────────────────────────────────────────────

fn measured_volatility(a: &PriceAnalysis) -> f64 {
    match a.volatility {
        v if v <= 0.05 => 95.0,
        v if v <= 0.10 => 85.0,
        v if v <= 0.20 => 70.0,
        v if v <= 0.35 => 50.0,
        _ => 30.0,
    }
}

/// Falling prices score high, rising prices low.
fn measured_trend(a: &PriceAnalysis) -> f64 {
    100.0 * (0.5 - 0.4 * a.trend_score).clamp(0.0, 1.0)
}

fn measured_time_pattern(a: &PriceAnalysis) -> f64 {
    if a.hourly_pattern.len() < 2 {
        return 60.0;
    }
    let hourly: Vec<f64> = a.hourly_pattern.values().copied().collect();
    match coefficient_of_variation(&hourly) {
        cv if cv <= 0.02 => 95.0,
        cv if cv <= 0.05 => 80.0,
        cv if cv <= 0.10 => 65.0,
        _ => 50.0,
    }
}

fn measured_capacity_pool(a: &PriceAnalysis) -> f64 {
    let mut score: f64 = 70.0;
    if a.best_zone.is_some() {
        score += 10.0;
    }
    score += match a.data_points {
        n if n >= 500 => 15.0,
        n if n >= 100 => 10.0,
        n if n >= 50 => 5.0,
        _ => 0.0,
    };
    score.clamp(0.0, 100.0)
}

// ── Estimated factors ─────────────────────────────────────────────────

fn estimated_volatility(c: &Candidate) -> f64 {
    let specs = &c.specs;
    let mut score: f64 = 70.0;
    score += match specs.generation {
        Generation::Current => 20.0,
        Generation::Previous => 10.0,
        Generation::Legacy => -10.0,
        Generation::Deprecated => -30.0,
    };
    if specs.vcpu >= 16 {
        score += 10.0;
    } else if specs.vcpu <= 2 {
        score -= 10.0;
    }
    score += match specs.category {
        InstanceCategory::StorageOptimized => 10.0,
        InstanceCategory::MemoryOptimized => 5.0,
        _ => 0.0,
    };
    if specs.architecture == "arm64" {
        score += 10.0;
    }
    score.clamp(0.0, 100.0)
}

fn estimated_trend(c: &Candidate) -> f64 {
    let interruption = c.spot.interruption;
    let mut score: f64 = match c.specs.generation {
        Generation::Current if interruption <= InterruptionFrequency::Low => 85.0,
        Generation::Current => 70.0,
        Generation::Previous => 60.0,
        _ => 50.0,
    };
    if interruption >= InterruptionFrequency::High {
        score -= 20.0;
    }
    score.clamp(0.0, 100.0)
}

fn estimated_capacity_pool(c: &Candidate, region: &str, zone_count: Option<usize>) -> f64 {
    let mut score: f64 = 70.0;
    match zone_count {
        Some(0) => score -= NO_USABLE_ZONE_PENALTY,
        Some(zones) => score += ((zones - 1) as f64 * 10.0).min(20.0),
        None => {}
    }
    if c.specs.architecture == "arm64" && c.specs.generation == Generation::Current {
        score += 10.0;
    }
    if LARGE_REGIONS.contains(&region) {
        score += 10.0;
    }
    score.clamp(0.0, 100.0)
}

fn estimated_time_pattern(interruption: InterruptionFrequency) -> f64 {
    match interruption {
        InterruptionFrequency::VeryLow => 95.0,
        InterruptionFrequency::Low => 85.0,
        InterruptionFrequency::Medium => 70.0,
        InterruptionFrequency::High => 50.0,
        InterruptionFrequency::VeryHigh => 30.0,
    }
}

/// High savings with low interruption suggests an underused pool.
fn popularity(c: &Candidate) -> f64 {
    let savings = f64::from(c.spot.savings_percent) / 100.0;
    let stability = 1.0 - f64::from(c.spot.interruption.level()) / 4.0;
    match (savings, stability) {
        (s, st) if s >= 0.7 && st >= 0.75 => 95.0,
        (s, st) if s >= 0.6 && st >= 0.75 => 85.0,
        (_, st) if st >= 0.75 => 70.0,
        _ => 50.0,
    }
}

fn insights(f: &EnhancedFactors) -> Vec<String> {
    let mut out = Vec::new();
    if f.data_source == DataSource::Measured {
        out.push("Scored from measured price history".to_string());
    }
    if f.volatility_score >= 85.0 {
        out.push("Stable pricing with minimal fluctuation".into());
    } else if f.volatility_score <= 50.0 {
        out.push("Volatile pricing, consider a max price limit".into());
    }
    if f.popularity_score >= 90.0 {
        out.push("Hidden gem: high savings with low interruption".into());
    }
    if f.trend_score >= 80.0 {
        out.push("Availability has held steady over time".into());
    } else if f.trend_score <= 40.0 {
        out.push("Rising competition, expect more interruptions".into());
    }
    if f.capacity_pool_score >= 85.0 {
        out.push("Widely available across zones".into());
    }
    if f.time_pattern_score >= 90.0 {
        out.push("Consistent regardless of time of day".into());
    } else if f.time_pattern_score <= 50.0 {
        out.push("Time-sensitive, prefer off-peak hours".into());
    }
    if f.combined_enhanced_score >= 85.0 {
        out.push("Top pick across all signals".into());
    } else if f.combined_enhanced_score >= 70.0 {
        out.push("Good overall profile for spot workloads".into());
    } else if f.combined_enhanced_score <= 50.0 {
        out.push("Use with caution, diversify instance types".into());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{InstanceSpecs, SpotData};
    use std::collections::BTreeMap;

    fn candidate(savings: u32, interruption: &str) -> Candidate {
        let specs: InstanceSpecs = serde_json::from_value(serde_json::json!({
            "instance_type": "m5.xlarge",
            "vcpu": 4,
            "memory_gb": 16.0,
        }))
        .unwrap();
        let spot: SpotData = serde_json::from_value(serde_json::json!({
            "instance_type": "m5.xlarge",
            "region": "us-east-1",
            "savings_percent": savings,
            "interruption": interruption,
        }))
        .unwrap();
        Candidate::new(specs, spot)
    }

    fn analysis(volatility: f64, trend_score: f64, data_points: usize) -> PriceAnalysis {
        PriceAnalysis {
            instance_type: "m5.xlarge".into(),
            best_zone: Some("us-east-1b".into()),
            current_price: 0.07,
            avg_price: 0.07,
            min_price: 0.06,
            max_price: 0.08,
            std_dev: 0.07 * volatility,
            volatility,
            trend_slope: 0.0,
            trend_score,
            data_points,
            time_span_hours: 168.0,
            hourly_pattern: BTreeMap::from([(0, 0.070), (12, 0.071)]),
            weekday_pattern: BTreeMap::new(),
            slot_pattern: Vec::new(),
            zones: Vec::new(),
        }
    }

    // ── blend ──

    #[test]
    fn test_final_score_is_sixty_forty_blend() {
        let c = candidate(70, "low");
        let req = UsageRequirements::default();
        let pool = ScoringPool::default();
        let s = score_enhanced(&c, &req, &pool, EnhancedSignals::default(), &EnhancedWeights::default());

        let factors = s.enhanced.as_ref().expect("factors attached");
        let expected = 0.6 * s.score + 0.4 * factors.combined_enhanced_score;
        assert!((s.final_score.unwrap() - expected).abs() < 1e-9);
        assert_eq!(s.score, scoring::score(&c, &req, &pool).score, "base score still reported");
    }

    #[test]
    fn test_weights_are_tunable() {
        let factors = EnhancedFactors {
            volatility_score: 100.0,
            popularity_score: 0.0,
            ..EnhancedFactors::default()
        };
        let only_volatility = EnhancedWeights {
            volatility: 2.0,
            trend: 0.0,
            capacity_pool: 0.0,
            time_pattern: 0.0,
            popularity: 0.0,
        };
        assert_eq!(combine(&factors, &only_volatility), 100.0, "normalized by weight sum");

        let zero = EnhancedWeights {
            volatility: 0.0,
            trend: 0.0,
            capacity_pool: 0.0,
            time_pattern: 0.0,
            popularity: 0.0,
        };
        assert!((combine(&factors, &zero) - 25.0).abs() < 1e-9, "zero weights fall back to defaults");
    }

    // ── factor sources ──

    #[test]
    fn test_measured_factors() {
        let c = candidate(70, "low");
        let a = analysis(0.04, -0.5, 600);
        let f = enhanced_factors(
            &c,
            "us-east-1",
            EnhancedSignals { analysis: Some(&a), zone_count: None },
            &EnhancedWeights::default(),
        );
        assert_eq!(f.data_source, DataSource::Measured);
        assert_eq!(f.volatility_score, 95.0);
        assert!((f.trend_score - 70.0).abs() < 1e-9, "0.5 + 0.2 = 0.7");
        assert_eq!(f.capacity_pool_score, 95.0);
        assert_eq!(f.time_pattern_score, 95.0);
    }

    #[test]
    fn test_estimated_factors_when_history_missing() {
        let c = candidate(75, "very_low");
        let f = enhanced_factors(
            &c,
            "us-east-1",
            EnhancedSignals { analysis: None, zone_count: Some(3) },
            &EnhancedWeights::default(),
        );
        assert_eq!(f.data_source, DataSource::Estimated);
        assert_eq!(f.volatility_score, 90.0, "current gen, 4 vCPU, general purpose");
        assert_eq!(f.trend_score, 85.0);
        assert_eq!(f.capacity_pool_score, 100.0, "70 + 20 zones + 10 large region");
        assert_eq!(f.time_pattern_score, 95.0);
        assert_eq!(f.popularity_score, 95.0);
        assert!(f.insights.iter().any(|i| i.starts_with("Hidden gem")));
    }

    #[test]
    fn test_no_usable_zone_lowers_capacity() {
        let c = candidate(70, "low");
        let factors = |zone_count| {
            enhanced_factors(
                &c,
                "sa-east-1",
                EnhancedSignals { analysis: None, zone_count },
                &EnhancedWeights::default(),
            )
        };
        assert_eq!(factors(None).capacity_pool_score, 70.0, "no zone data is neutral");
        assert_eq!(factors(Some(1)).capacity_pool_score, 70.0);
        assert_eq!(factors(Some(0)).capacity_pool_score, 40.0, "unavailable everywhere");
    }

    #[test]
    fn test_high_interruption_drags_trend() {
        let c = candidate(40, "very_high");
        let f = enhanced_factors(&c, "sa-east-1", EnhancedSignals::default(), &EnhancedWeights::default());
        assert_eq!(f.trend_score, 50.0);
        assert_eq!(f.popularity_score, 50.0);
        assert_eq!(f.capacity_pool_score, 70.0);
    }
}
