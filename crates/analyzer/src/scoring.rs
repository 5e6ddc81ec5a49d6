//! Base multi-factor scoring and ranking.
//!
//! Every factor is on a 0-100 scale; the composite is defined by
//! [`ScoreBreakdown::total`].

use common::{
    Candidate, Generation, InterruptionFrequency, ScoreBreakdown, ScoredCandidate,
    UsageRequirements,
};
use std::cmp::Ordering;

use crate::recommendation;

/// Candidates scoring below this are dropped before ranking.
pub const MIN_VIABLE_SCORE: f64 = 30.0;

/// Savings percentage treated as the realistic ceiling.
const MAX_REALISTIC_SAVINGS: f64 = 90.0;

/// Points removed for the oldest generation; others are fractions of it.
const GENERATION_PENALTY_MAX: f64 = 15.0;

/// Pool-wide context for relative factors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringPool {
    /// Lowest spot price per capacity unit among priced candidates.
    pub best_cost_per_unit: Option<f64>,
}

impl ScoringPool {
    pub fn from_candidates(candidates: &[Candidate]) -> Self {
        let best = candidates
            .iter()
            .filter_map(cost_per_unit)
            .fold(None, |best: Option<f64>, c| Some(best.map_or(c, |b| b.min(c))));
        Self { best_cost_per_unit: best }
    }
}

/// vCPUs plus a quarter of the memory in GB.
pub fn capacity_units(candidate: &Candidate) -> f64 {
    f64::from(candidate.specs.vcpu) + candidate.specs.memory_gb / 4.0
}

fn cost_per_unit(candidate: &Candidate) -> Option<f64> {
    let units = capacity_units(candidate);
    let price = candidate.spot.spot_price;
    (price > 0.0 && units > 0.0).then(|| price / units)
}

// ── Factors ───────────────────────────────────────────────────────────

pub fn savings_score(savings_percent: u32) -> f64 {
    (f64::from(savings_percent) / MAX_REALISTIC_SAVINGS).min(1.0) * 100.0
}

pub fn stability_score(interruption: InterruptionFrequency) -> f64 {
    match interruption {
        InterruptionFrequency::VeryLow => 100.0,
        InterruptionFrequency::Low => 80.0,
        InterruptionFrequency::Medium => 60.0,
        InterruptionFrequency::High => 40.0,
        InterruptionFrequency::VeryHigh => 20.0,
    }
}

/// How closely the hardware matches the request.
pub fn fitness_score(candidate: &Candidate, req: &UsageRequirements) -> f64 {
    let specs = &candidate.specs;
    let min_memory = req.min_memory_gb.filter(|&m| m > 0.0);

    if specs.vcpu < req.min_vcpu || min_memory.is_some_and(|m| specs.memory_gb < m) {
        return 0.0;
    }
    if req.requires_gpu && !specs.has_gpu {
        return 0.0;
    }

    let mut score = 100.0;

    if req.min_vcpu > 0 {
        let ratio = f64::from(specs.vcpu) / f64::from(req.min_vcpu);
        if ratio > 2.0 {
            score *= 0.8 / ratio.log2();
        } else if ratio > 1.5 {
            score *= 0.9;
        }
    }

    if let Some(min) = min_memory {
        if specs.memory_gb / min > 2.0 {
            score *= 0.9;
        }
    }

    if req.preferred_category == Some(specs.category) {
        score *= 1.1;
    }

    if let Some(arch) = req.architecture.as_deref().filter(|a| !a.is_empty()) {
        if !specs.architecture.eq_ignore_ascii_case(arch) {
            score *= 0.7;
        }
    }

    if req.requires_gpu {
        if let Some(min_gpus) = req.min_gpu_count.filter(|&n| n > 0) {
            if specs.gpu_count < min_gpus {
                score *= f64::from(specs.gpu_count) / f64::from(min_gpus);
            }
        }
    }

    score.clamp(0.0, 100.0)
}

/// Price per capacity unit against the cheapest in the pool. Falls back to
/// a capacity/savings blend when either side has no spot price.
pub fn value_score(candidate: &Candidate, req: &UsageRequirements, pool: &ScoringPool) -> f64 {
    if let (Some(best), Some(own)) = (pool.best_cost_per_unit, cost_per_unit(candidate)) {
        return (100.0 * best / own).clamp(0.0, 100.0);
    }

    let specs = &candidate.specs;
    let vcpu_factor =
        (f64::from(specs.vcpu) + 1.0).log2() / (f64::from(req.min_vcpu.max(1)) + 1.0).log2();
    let savings_factor = f64::from(candidate.spot.savings_percent) / 100.0;
    let mem_factor = match req.min_memory_gb.filter(|&m| m > 0.0) {
        Some(min) => (specs.memory_gb / min).min(2.0) / 2.0,
        None => 1.0,
    };
    100.0 * (0.4 * vcpu_factor + 0.4 * savings_factor + 0.2 * mem_factor).clamp(0.0, 1.0)
}

pub fn generation_penalty(generation: Generation) -> f64 {
    match generation {
        Generation::Current => 0.0,
        Generation::Previous => GENERATION_PENALTY_MAX * 0.3,
        Generation::Legacy => GENERATION_PENALTY_MAX * 0.7,
        Generation::Deprecated => GENERATION_PENALTY_MAX,
    }
}

// ── Scoring ───────────────────────────────────────────────────────────

pub fn breakdown(candidate: &Candidate, req: &UsageRequirements, pool: &ScoringPool) -> ScoreBreakdown {
    ScoreBreakdown {
        savings_score: savings_score(candidate.spot.savings_percent),
        stability_score: stability_score(candidate.spot.interruption),
        fitness_score: fitness_score(candidate, req),
        value_score: value_score(candidate, req, pool),
        generation_penalty: generation_penalty(candidate.specs.generation),
    }
}

/// Score one candidate, with recommendation text and warnings attached.
pub fn score(candidate: &Candidate, req: &UsageRequirements, pool: &ScoringPool) -> ScoredCandidate {
    let breakdown = breakdown(candidate, req, pool);
    let mut scored = ScoredCandidate {
        specs: candidate.specs.clone(),
        spot: candidate.spot.clone(),
        score: breakdown.total(),
        breakdown,
        rank: 0,
        recommendation: String::new(),
        warnings: Vec::new(),
        enhanced: None,
        final_score: None,
    };
    annotate(&mut scored, req);
    scored
}

/// Refresh recommendation text and warnings from the current scores.
pub fn annotate(scored: &mut ScoredCandidate, req: &UsageRequirements) {
    scored.recommendation = recommendation::recommendation(scored, req);
    scored.warnings = recommendation::warnings(scored, req);
}

/// Drop candidates below `min_viable`, order by ranking score (descending,
/// ties by instance type), keep `top_n` and assign ranks from 1.
pub fn rank(mut scored: Vec<ScoredCandidate>, top_n: usize, min_viable: f64) -> Vec<ScoredCandidate> {
    scored.retain(|c| c.ranking_score() >= min_viable);
    scored.sort_by(|a, b| {
        b.ranking_score()
            .partial_cmp(&a.ranking_score())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.instance_type().cmp(b.instance_type()))
    });
    scored.truncate(top_n);
    for (i, c) in scored.iter_mut().enumerate() {
        c.rank = i + 1;
    }
    scored
}
