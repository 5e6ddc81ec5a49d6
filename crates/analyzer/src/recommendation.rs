//! Human-readable recommendation text, warnings and summaries.

use common::{Generation, InterruptionFrequency, ScoredCandidate, UsageRequirements};

pub fn tier_label(score: f64) -> &'static str {
    match score {
        s if s >= 85.0 => "Excellent choice",
        s if s >= 70.0 => "Good choice",
        s if s >= 55.0 => "Reasonable choice",
        s if s >= 40.0 => "Acceptable",
        _ => "Consider alternatives",
    }
}

/// Tier label followed by the notable strengths of the candidate.
pub fn recommendation(c: &ScoredCandidate, req: &UsageRequirements) -> String {
    let label = tier_label(c.ranking_score());
    let insights = strengths(c, req);
    if insights.is_empty() {
        label.to_string()
    } else {
        format!("{label} - {}", insights.join("; "))
    }
}

fn strengths(c: &ScoredCandidate, req: &UsageRequirements) -> Vec<String> {
    let mut out = Vec::new();
    let savings = c.spot.savings_percent;

    if savings >= 80 {
        out.push(format!("exceptional savings of {savings}%"));
    } else if savings >= 60 {
        out.push(format!("good savings of {savings}%"));
    }

    match c.spot.interruption {
        InterruptionFrequency::VeryLow => out.push("very stable (<5% interruption)".into()),
        InterruptionFrequency::Low => out.push("stable (5-10% interruption)".into()),
        InterruptionFrequency::Medium => {
            out.push("moderate stability (10-15% interruption)".into())
        }
        _ => {}
    }

    if c.specs.generation == Generation::Current {
        out.push("current generation hardware".into());
    }
    if c.specs.architecture == "arm64" {
        out.push("ARM-based, strong price/performance".into());
    }
    if req.preferred_category == Some(c.specs.category) {
        out.push("matches preferred category".into());
    }
    if c.breakdown.value_score >= 80.0 {
        out.push("excellent value".into());
    }

    let ratio = vcpu_ratio(c, req);
    if (1.0..=1.25).contains(&ratio) {
        out.push("optimal sizing".into());
    } else if ratio > 2.0 {
        out.push("over-provisioned (consider smaller)".into());
    }
    out
}

/// Risks the caller should know about before launching.
pub fn warnings(c: &ScoredCandidate, req: &UsageRequirements) -> Vec<String> {
    let mut out = Vec::new();
    let specs = &c.specs;
    let spot = &c.spot;

    if spot.interruption >= InterruptionFrequency::High {
        out.push(format!(
            "High interruption frequency ({}), design for fault tolerance",
            spot.interruption
        ));
    }
    if spot.savings_percent < 30 {
        out.push(format!(
            "Low savings ({}%), on-demand may be more predictable",
            spot.savings_percent
        ));
    }

    match specs.generation {
        Generation::Previous => {
            out.push("Previous generation, newer options may perform better".into())
        }
        Generation::Legacy => out.push("Legacy generation, consider a current generation type".into()),
        _ => {}
    }

    if specs.is_burstable {
        out.push("Burstable instance, sustained load may be throttled".into());
    }

    let ratio = vcpu_ratio(c, req);
    if ratio > 3.0 {
        out.push(format!("Significantly over-provisioned ({ratio:.1}x required vCPU)"));
    }

    if let Some(min_mem) = req.min_memory_gb.filter(|&m| m > 0.0) {
        let mem_ratio = specs.memory_gb / min_mem;
        if mem_ratio > 4.0 {
            out.push("Significant memory over-provisioning".into());
        } else if (1.0..1.5).contains(&mem_ratio) {
            out.push("Memory headroom is tight, consider the next size up".into());
        }
    }

    if specs.architecture == "arm64" && req.architecture.is_none() {
        out.push("ARM64 architecture, verify application compatibility".into());
    }
    if specs.is_bare_metal {
        out.push("Bare metal instance, expect longer provisioning".into());
    }
    out
}

/// One-line summary of the top pick.
pub fn summary(top: &[ScoredCandidate]) -> String {
    let Some(best) = top.first() else {
        return "No suitable instances found matching your requirements. Try relaxing constraints."
            .into();
    };
    format!(
        "Top recommendation: {} ({} vCPU, {:.0} GB RAM) with {}% savings and {} interruption rate. Score: {:.1}",
        best.instance_type(),
        best.specs.vcpu,
        best.specs.memory_gb,
        best.spot.savings_percent,
        best.spot.interruption,
        best.ranking_score(),
    )
}

fn vcpu_ratio(c: &ScoredCandidate, req: &UsageRequirements) -> f64 {
    f64::from(c.specs.vcpu) / f64::from(req.min_vcpu.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{InstanceSpecs, ScoreBreakdown, SpotData};

    fn scored(instance_type: &str, vcpu: u32, savings: u32, score: f64) -> ScoredCandidate {
        let specs: InstanceSpecs = serde_json::from_value(serde_json::json!({
            "instance_type": instance_type,
            "vcpu": vcpu,
            "memory_gb": 8.0,
        }))
        .unwrap();
        let spot: SpotData = serde_json::from_value(serde_json::json!({
            "instance_type": instance_type,
            "region": "us-east-1",
            "savings_percent": savings,
            "interruption": "very_low",
        }))
        .unwrap();
        ScoredCandidate {
            specs,
            spot,
            score,
            breakdown: ScoreBreakdown::default(),
            rank: 0,
            recommendation: String::new(),
            warnings: Vec::new(),
            enhanced: None,
            final_score: None,
        }
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(tier_label(85.0), "Excellent choice");
        assert_eq!(tier_label(84.9), "Good choice");
        assert_eq!(tier_label(55.0), "Reasonable choice");
        assert_eq!(tier_label(40.0), "Acceptable");
        assert_eq!(tier_label(10.0), "Consider alternatives");
    }

    #[test]
    fn test_recommendation_lists_strengths() {
        let req = UsageRequirements::default();
        let text = recommendation(&scored("m5.large", 2, 85, 90.0), &req);
        assert!(text.starts_with("Excellent choice - "), "got: {text}");
        assert!(text.contains("exceptional savings of 85%"));
        assert!(text.contains("optimal sizing"));
    }

    #[test]
    fn test_warnings() {
        let req = UsageRequirements::default();
        let mut c = scored("t3.2xlarge", 8, 20, 40.0);
        c.specs.is_burstable = true;
        c.spot.interruption = InterruptionFrequency::VeryHigh;

        let w = warnings(&c, &req);
        assert!(w.iter().any(|s| s.starts_with("High interruption")));
        assert!(w.iter().any(|s| s.starts_with("Low savings (20%)")));
        assert!(w.iter().any(|s| s.starts_with("Burstable")));
        assert!(w.iter().any(|s| s.contains("4.0x")), "8 vCPU against a minimum of 2");
    }

    #[test]
    fn test_summary() {
        assert!(summary(&[]).starts_with("No suitable instances"));
        let s = summary(&[scored("m5.large", 2, 70, 72.5)]);
        assert!(s.starts_with("Top recommendation: m5.large (2 vCPU, 8 GB RAM) with 70% savings"));
        assert!(s.ends_with("Score: 72.5"));
    }
}
