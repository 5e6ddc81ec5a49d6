//! Eligibility filter applied before scoring.

use common::{instance_family, Candidate, Error, InterruptionFrequency, Result, UsageRequirements};
use std::fmt;

/// Why a candidate was excluded. Only the first failing check is reported.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Deprecated,
    TooFewVcpu { have: u32, need: u32 },
    TooManyVcpu { have: u32, max: u32 },
    TooLittleMemory { have: f64, need: f64 },
    TooMuchMemory { have: f64, max: f64 },
    UnwantedGpu,
    MissingGpu,
    TooFewGpus { have: u32, need: u32 },
    GpuTypeMismatch { wanted: String },
    Burstable,
    BareMetal,
    FamilyExcluded(String),
    ArchitectureMismatch { have: String, wanted: String },
    TooLittleStorage { have: f64, need: f64 },
    InterruptionTooHigh(InterruptionFrequency),
    SavingsTooLow { have: u32, need: u32 },
    NoSavings,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Deprecated => write!(f, "deprecated instance type"),
            Rejection::TooFewVcpu { have, need } => write!(f, "{have} vCPU below minimum {need}"),
            Rejection::TooManyVcpu { have, max } => write!(f, "{have} vCPU above maximum {max}"),
            Rejection::TooLittleMemory { have, need } => {
                write!(f, "{have:.1} GB memory below minimum {need:.1} GB")
            }
            Rejection::TooMuchMemory { have, max } => {
                write!(f, "{have:.1} GB memory above maximum {max:.1} GB")
            }
            Rejection::UnwantedGpu => write!(f, "GPU instance not requested"),
            Rejection::MissingGpu => write!(f, "GPU required"),
            Rejection::TooFewGpus { have, need } => write!(f, "{have} GPUs below minimum {need}"),
            Rejection::GpuTypeMismatch { wanted } => write!(f, "GPU type is not {wanted}"),
            Rejection::Burstable => write!(f, "burstable instances not allowed"),
            Rejection::BareMetal => write!(f, "bare metal instances not allowed"),
            Rejection::FamilyExcluded(family) => write!(f, "family {family} not in allowed list"),
            Rejection::ArchitectureMismatch { have, wanted } => {
                write!(f, "architecture {have} does not match {wanted}")
            }
            Rejection::TooLittleStorage { have, need } => {
                write!(f, "{have:.0} GB storage below minimum {need:.0} GB")
            }
            Rejection::InterruptionTooHigh(freq) => {
                write!(f, "interruption frequency {freq} above tolerance")
            }
            Rejection::SavingsTooLow { have, need } => write!(f, "{have}% savings below {need}%"),
            Rejection::NoSavings => write!(f, "no spot savings"),
        }
    }
}

/// Candidates split into those that pass every check and those that do not.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub eligible: Vec<Candidate>,
    pub rejected: Vec<(String, Rejection)>,
}

pub fn filter_candidates(candidates: Vec<Candidate>, req: &UsageRequirements) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();
    for candidate in candidates {
        match check(&candidate, req) {
            Ok(()) => outcome.eligible.push(candidate),
            Err(reason) => outcome
                .rejected
                .push((candidate.instance_type().to_string(), reason)),
        }
    }
    outcome
}

/// Run the eligibility checks in order and stop at the first failure.
pub fn check(candidate: &Candidate, req: &UsageRequirements) -> std::result::Result<(), Rejection> {
    let specs = &candidate.specs;
    let spot = &candidate.spot;

    if specs.is_deprecated {
        return Err(Rejection::Deprecated);
    }

    if specs.vcpu < req.min_vcpu {
        return Err(Rejection::TooFewVcpu { have: specs.vcpu, need: req.min_vcpu });
    }
    if let Some(max) = req.max_vcpu.filter(|&m| m > 0) {
        if specs.vcpu > max {
            return Err(Rejection::TooManyVcpu { have: specs.vcpu, max });
        }
    }

    if let Some(need) = req.min_memory_gb.filter(|&m| m > 0.0) {
        if specs.memory_gb < need {
            return Err(Rejection::TooLittleMemory { have: specs.memory_gb, need });
        }
    }
    if let Some(max) = req.max_memory_gb.filter(|&m| m > 0.0) {
        if specs.memory_gb > max {
            return Err(Rejection::TooMuchMemory { have: specs.memory_gb, max });
        }
    }

    if specs.has_gpu && !req.requires_gpu {
        return Err(Rejection::UnwantedGpu);
    }
    if req.requires_gpu {
        if !specs.has_gpu {
            return Err(Rejection::MissingGpu);
        }
        if let Some(need) = req.min_gpu_count.filter(|&n| n > 0) {
            if specs.gpu_count < need {
                return Err(Rejection::TooFewGpus { have: specs.gpu_count, need });
            }
        }
        if let Some(wanted) = req.gpu_type.as_deref().filter(|t| !t.is_empty()) {
            let matches = specs
                .gpu_type
                .as_deref()
                .is_some_and(|have| have.to_lowercase().contains(&wanted.to_lowercase()));
            if !matches {
                return Err(Rejection::GpuTypeMismatch { wanted: wanted.to_string() });
            }
        }
    }

    if specs.is_burstable && !req.allow_burstable {
        return Err(Rejection::Burstable);
    }
    if specs.is_bare_metal && !req.allow_bare_metal {
        return Err(Rejection::BareMetal);
    }

    if !req.families.is_empty() {
        let family = instance_family(&specs.instance_type);
        if !req.families.iter().any(|f| f.eq_ignore_ascii_case(&family)) {
            return Err(Rejection::FamilyExcluded(family));
        }
    }

    if let Some(wanted) = req.architecture.as_deref().filter(|a| !a.is_empty()) {
        if !specs.architecture.eq_ignore_ascii_case(wanted) {
            return Err(Rejection::ArchitectureMismatch {
                have: specs.architecture.clone(),
                wanted: wanted.to_string(),
            });
        }
    }

    if let Some(need) = req.min_storage_gb.filter(|&s| s > 0.0) {
        if specs.storage_gb < need {
            return Err(Rejection::TooLittleStorage { have: specs.storage_gb, need });
        }
    }

    if spot.interruption > req.max_interruption {
        return Err(Rejection::InterruptionTooHigh(spot.interruption));
    }
    if let Some(need) = req.min_savings_percent.filter(|&s| s > 0) {
        if spot.savings_percent < need {
            return Err(Rejection::SavingsTooLow { have: spot.savings_percent, need });
        }
    }
    if spot.savings_percent == 0 {
        return Err(Rejection::NoSavings);
    }

    Ok(())
}

/// Reject requirements no instance could satisfy.
pub fn validate_requirements(req: &UsageRequirements) -> Result<()> {
    if req.min_vcpu == 0 {
        return Err(Error::validation("min_vcpu", "must be greater than 0"));
    }
    if req.region.trim().is_empty() {
        return Err(Error::validation("region", "must be specified"));
    }
    if let Some(max) = req.max_vcpu.filter(|&m| m > 0) {
        if max < req.min_vcpu {
            return Err(Error::validation("max_vcpu", "must be >= min_vcpu"));
        }
    }
    if let (Some(min), Some(max)) = (req.min_memory_gb, req.max_memory_gb) {
        if max > 0.0 && max < min {
            return Err(Error::validation("max_memory_gb", "must be >= min_memory_gb"));
        }
    }
    if req.top_n == 0 {
        return Err(Error::validation("top_n", "must be greater than 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{InstanceSpecs, SpotData};

    fn candidate(instance_type: &str, vcpu: u32, memory_gb: f64) -> Candidate {
        let specs: InstanceSpecs = serde_json::from_value(serde_json::json!({
            "instance_type": instance_type,
            "vcpu": vcpu,
            "memory_gb": memory_gb,
        }))
        .unwrap();
        let spot: SpotData = serde_json::from_value(serde_json::json!({
            "instance_type": instance_type,
            "region": "us-east-1",
            "savings_percent": 70,
            "interruption": "low",
        }))
        .unwrap();
        Candidate::new(specs, spot)
    }

    // ── checks ──

    #[test]
    fn test_eligible_candidate_passes() {
        let req = UsageRequirements::default();
        assert_eq!(check(&candidate("m5.large", 2, 8.0), &req), Ok(()));
    }

    #[test]
    fn test_first_failure_wins() {
        let req = UsageRequirements {
            min_vcpu: 4,
            ..UsageRequirements::default()
        };
        let mut c = candidate("m4.large", 2, 8.0);
        c.specs.is_deprecated = true;
        assert_eq!(check(&c, &req), Err(Rejection::Deprecated), "deprecated is checked first");

        c.specs.is_deprecated = false;
        assert_eq!(check(&c, &req), Err(Rejection::TooFewVcpu { have: 2, need: 4 }));
    }

    #[test]
    fn test_gpu_rules() {
        let mut gpu = candidate("p3.2xlarge", 8, 61.0);
        gpu.specs.has_gpu = true;
        gpu.specs.gpu_count = 1;
        gpu.specs.gpu_type = Some("NVIDIA V100".into());

        let plain = UsageRequirements::default();
        assert_eq!(check(&gpu, &plain), Err(Rejection::UnwantedGpu));

        let wants_a100 = UsageRequirements {
            requires_gpu: true,
            gpu_type: Some("a100".into()),
            ..UsageRequirements::default()
        };
        assert!(matches!(check(&gpu, &wants_a100), Err(Rejection::GpuTypeMismatch { .. })));

        let wants_v100 = UsageRequirements {
            requires_gpu: true,
            gpu_type: Some("v100".into()),
            ..UsageRequirements::default()
        };
        assert_eq!(check(&gpu, &wants_v100), Ok(()), "gpu type match is case-insensitive");

        let cpu_only = candidate("m5.2xlarge", 8, 32.0);
        assert_eq!(check(&cpu_only, &wants_v100), Err(Rejection::MissingGpu));
    }

    #[test]
    fn test_family_filter_strips_azure_prefix() {
        let req = UsageRequirements {
            families: vec!["d".into()],
            ..UsageRequirements::default()
        };
        assert_eq!(check(&candidate("Standard_D2s_v5", 2, 8.0), &req), Ok(()));
        assert_eq!(
            check(&candidate("Standard_E2s_v5", 2, 16.0), &req),
            Err(Rejection::FamilyExcluded("E".into()))
        );
    }

    #[test]
    fn test_spot_checks() {
        let mut c = candidate("m5.large", 2, 8.0);
        c.spot.interruption = InterruptionFrequency::High;
        let req = UsageRequirements::default();
        assert_eq!(
            check(&c, &req),
            Err(Rejection::InterruptionTooHigh(InterruptionFrequency::High))
        );

        c.spot.interruption = InterruptionFrequency::Low;
        c.spot.savings_percent = 0;
        assert_eq!(check(&c, &req), Err(Rejection::NoSavings));
    }

    #[test]
    fn test_filter_candidates_reports_reasons() {
        let mut burst = candidate("t3.large", 2, 8.0);
        burst.specs.is_burstable = true;
        let outcome = filter_candidates(
            vec![candidate("m5.large", 2, 8.0), burst],
            &UsageRequirements::default(),
        );
        assert_eq!(outcome.eligible.len(), 1);
        assert_eq!(outcome.rejected, vec![("t3.large".to_string(), Rejection::Burstable)]);
        assert_eq!(outcome.rejected[0].1.to_string(), "burstable instances not allowed");
    }

    // ── validation ──

    #[test]
    fn test_validate_requirements() {
        assert!(validate_requirements(&UsageRequirements::default()).is_ok());

        let zero = UsageRequirements {
            min_vcpu: 0,
            ..UsageRequirements::default()
        };
        assert!(matches!(
            validate_requirements(&zero),
            Err(Error::Validation { ref field, .. }) if field == "min_vcpu"
        ));

        let inverted = UsageRequirements {
            min_vcpu: 8,
            max_vcpu: Some(4),
            ..UsageRequirements::default()
        };
        assert!(validate_requirements(&inverted).is_err());

        let no_region = UsageRequirements {
            region: " ".into(),
            ..UsageRequirements::default()
        };
        assert!(validate_requirements(&no_region).is_err());
    }
}
