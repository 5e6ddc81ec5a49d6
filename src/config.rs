//! Configuration loader: `.env`, then `config.toml`, then environment overrides.

use common::config::AdvisorConfig;
use common::Error;
use std::path::Path;

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(Error::Config(format!("{env_name} must be an integer > 0"))),
    }
}

fn parse_positive_usize(raw: &str, env_name: &str) -> Result<usize, Error> {
    parse_positive_u64(raw, env_name).and_then(|v| {
        usize::try_from(v).map_err(|_| Error::Config(format!("{env_name} is out of range")))
    })
}

pub fn validate_config(config: &AdvisorConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.default_provider.trim().is_empty() {
        issues.push("default_provider must not be empty".into());
    }

    if config.cache.ttl_secs == 0 {
        issues.push("cache.ttl_secs must be > 0".into());
    }
    if config.cache.sweep_interval_secs == 0 {
        issues.push("cache.sweep_interval_secs must be > 0".into());
    }
    if config.cache.price_history_ttl_secs == 0 {
        issues.push("cache.price_history_ttl_secs must be > 0".into());
    }

    if config.analysis.default_top_n == 0 {
        issues.push("analysis.default_top_n must be > 0".into());
    }
    if config.analysis.default_max_interruption > 4 {
        issues.push("analysis.default_max_interruption must be in [0,4]".into());
    }
    if !(0.0..=100.0).contains(&config.analysis.min_viable_score) {
        issues.push("analysis.min_viable_score must be in [0,100]".into());
    }
    if config.analysis.batch_concurrency == 0 {
        issues.push("analysis.batch_concurrency must be > 0".into());
    }
    if config.analysis.request_timeout_secs == 0 {
        issues.push("analysis.request_timeout_secs must be > 0".into());
    }

    let w = &config.scoring.enhanced_weights;
    for (name, value) in [
        ("volatility", w.volatility),
        ("trend", w.trend),
        ("capacity_pool", w.capacity_pool),
        ("time_pattern", w.time_pattern),
        ("popularity", w.popularity),
    ] {
        if !value.is_finite() || value < 0.0 {
            issues.push(format!("scoring.enhanced_weights.{name} must be >= 0"));
        }
    }

    if config.providers.data_dir.trim().is_empty() {
        issues.push("providers.data_dir must not be empty".into());
    }
    if config.providers.enabled.is_empty() {
        issues.push("providers.enabled must contain at least one provider".into());
    }
    if config.providers.upstream_reads_per_sec == 0 {
        issues.push("providers.upstream_reads_per_sec must be > 0".into());
    }
    if !config.providers.enabled.is_empty()
        && !config.providers.enabled.contains(&config.default_provider)
    {
        issues.push(format!(
            "default_provider '{}' is not in providers.enabled",
            config.default_provider
        ));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply `SPOT_ADVISOR_*` overrides read through `lookup`.
fn apply_env_overrides<F>(config: &mut AdvisorConfig, lookup: F) -> Result<(), Error>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup("SPOT_ADVISOR_DATA_DIR") {
        config.providers.data_dir = dir.trim().to_string();
    }
    if let Some(raw) = lookup("SPOT_ADVISOR_CACHE_TTL_SECS") {
        config.cache.ttl_secs = parse_positive_u64(&raw, "SPOT_ADVISOR_CACHE_TTL_SECS")?;
    }
    if let Some(provider) = lookup("SPOT_ADVISOR_DEFAULT_PROVIDER") {
        config.default_provider = provider.trim().to_ascii_lowercase();
    }
    if let Some(raw) = lookup("SPOT_ADVISOR_TOP_N") {
        config.analysis.default_top_n = parse_positive_usize(&raw, "SPOT_ADVISOR_TOP_N")?;
    }
    if let Some(raw) = lookup("SPOT_ADVISOR_REQUEST_TIMEOUT_SECS") {
        config.analysis.request_timeout_secs =
            parse_positive_u64(&raw, "SPOT_ADVISOR_REQUEST_TIMEOUT_SECS")?;
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<AdvisorConfig, Error> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load advisor configuration from `path` (if it exists) and the environment.
pub fn load_config(path: &Path) -> Result<AdvisorConfig, Error> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let mut config = if path.exists() {
        read_config_file(path)?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        AdvisorConfig::default()
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── validation ──

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&AdvisorConfig::default()).is_ok());
    }

    #[test]
    fn test_validation_collects_every_issue() {
        let mut cfg = AdvisorConfig::default();
        cfg.cache.ttl_secs = 0;
        cfg.analysis.batch_concurrency = 0;
        cfg.scoring.enhanced_weights.trend = -1.0;

        let msg = validate_config(&cfg).expect_err("invalid").to_string();
        assert!(msg.contains("cache.ttl_secs"), "{msg}");
        assert!(msg.contains("analysis.batch_concurrency"), "{msg}");
        assert!(msg.contains("enhanced_weights.trend"), "{msg}");
    }

    #[test]
    fn test_default_provider_must_be_enabled() {
        let mut cfg = AdvisorConfig::default();
        cfg.default_provider = "oracle".into();
        let msg = validate_config(&cfg).expect_err("invalid").to_string();
        assert!(msg.contains("oracle"), "{msg}");
    }

    // ── env overrides ──

    #[test]
    fn test_env_overrides_apply() {
        let mut cfg = AdvisorConfig::default();
        apply_env_overrides(
            &mut cfg,
            env(&[
                ("SPOT_ADVISOR_DATA_DIR", "/srv/spot"),
                ("SPOT_ADVISOR_CACHE_TTL_SECS", "120"),
                ("SPOT_ADVISOR_DEFAULT_PROVIDER", "GCP"),
                ("SPOT_ADVISOR_TOP_N", "3"),
            ]),
        )
        .expect("valid overrides");

        assert_eq!(cfg.providers.data_dir, "/srv/spot");
        assert_eq!(cfg.cache.ttl_secs, 120);
        assert_eq!(cfg.default_provider, "gcp");
        assert_eq!(cfg.analysis.default_top_n, 3);
        assert_eq!(cfg.analysis.request_timeout_secs, 60, "untouched");
    }

    #[test]
    fn test_bad_env_override_is_config_error() {
        let mut cfg = AdvisorConfig::default();
        let err = apply_env_overrides(&mut cfg, env(&[("SPOT_ADVISOR_TOP_N", "zero")]))
            .expect_err("not a number");
        assert!(matches!(err, Error::Config(ref m) if m.contains("SPOT_ADVISOR_TOP_N")));

        let err = apply_env_overrides(&mut cfg, env(&[("SPOT_ADVISOR_REQUEST_TIMEOUT_SECS", "0")]))
            .expect_err("zero");
        assert!(matches!(err, Error::Config(_)));
    }

    // ── files ──

    #[test]
    fn test_read_config_file() {
        let path = std::env::temp_dir().join(format!("spot-advisor-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "default_provider = \"azure\"\n[analysis]\ndefault_top_n = 4\n",
        )
        .expect("write");

        let cfg = read_config_file(&path).expect("parse");
        assert_eq!(cfg.default_provider, "azure");
        assert_eq!(cfg.analysis.default_top_n, 4);
        assert_eq!(cfg.analysis.batch_concurrency, 5);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_unparseable_file_is_config_error() {
        let path = std::env::temp_dir().join(format!("spot-advisor-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "default_provider = [").expect("write");
        assert!(matches!(read_config_file(&path), Err(Error::Config(_))));
        std::fs::remove_file(&path).ok();
    }
}
