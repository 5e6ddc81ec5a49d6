//! spot-advisor: rank spot instances, predict spot prices and pick zones
//! across cloud providers.

mod config;
mod engine;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use common::{InstanceCategory, InterruptionFrequency, OperatingSystem, UsageRequirements};
use engine::Engine;

/// Spot instance advisor
#[derive(Parser)]
#[command(name = "spot-advisor", version, about = "Spot instance advisor")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rank instance types for a workload.
    Analyze(AnalyzeArgs),

    /// Predict the spot price of one instance type.
    Predict(TargetArgs),

    /// Recommend availability zones for one instance type.
    Zones(TargetArgs),

    /// Show cache statistics.
    CacheStatus,

    /// Drop cached data for one provider, or everything.
    Refresh {
        #[arg(long)]
        provider: Option<String>,
    },

    /// List registered providers.
    Providers,
}

#[derive(clap::Args)]
struct AnalyzeArgs {
    #[arg(long)]
    provider: Option<String>,
    /// Defaults to the provider's default region.
    #[arg(long)]
    region: Option<String>,
    #[arg(long, default_value_t = 2)]
    min_vcpu: u32,
    #[arg(long)]
    max_vcpu: Option<u32>,
    #[arg(long)]
    min_memory_gb: Option<f64>,
    #[arg(long)]
    max_memory_gb: Option<f64>,
    #[arg(long)]
    gpu: bool,
    #[arg(long)]
    min_gpu_count: Option<u32>,
    #[arg(long)]
    gpu_type: Option<String>,
    #[arg(long)]
    min_storage_gb: Option<f64>,
    #[arg(long)]
    category: Option<InstanceCategory>,
    /// x86_64 or arm64.
    #[arg(long)]
    architecture: Option<String>,
    #[arg(long, default_value = "linux")]
    os: OperatingSystem,
    /// 0 (<5%) through 4 (>20%).
    #[arg(long)]
    max_interruption: Option<u8>,
    #[arg(long)]
    min_savings: Option<u32>,
    #[arg(long)]
    allow_burstable: bool,
    #[arg(long)]
    allow_bare_metal: bool,
    /// Keep only these families (repeatable).
    #[arg(long = "family")]
    families: Vec<String>,
    #[arg(long)]
    top_n: Option<usize>,
    /// Blend price-history and availability signals into the score.
    #[arg(long)]
    enhanced: bool,
}

#[derive(clap::Args)]
struct TargetArgs {
    instance_type: String,
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    region: Option<String>,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "spot_advisor=info,cloud_providers=info,spot_cache=warn,analyzer=info".into()
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl AnalyzeArgs {
    fn into_requirements(self, engine: &Engine) -> Result<UsageRequirements> {
        let mut req = engine.default_requirements(self.region.unwrap_or_default());
        req.min_vcpu = self.min_vcpu;
        req.max_vcpu = self.max_vcpu;
        req.min_memory_gb = self.min_memory_gb;
        req.max_memory_gb = self.max_memory_gb;
        req.requires_gpu = self.gpu;
        req.min_gpu_count = self.min_gpu_count;
        req.gpu_type = self.gpu_type;
        req.min_storage_gb = self.min_storage_gb;
        req.preferred_category = self.category;
        req.architecture = self.architecture;
        req.os = self.os;
        if let Some(level) = self.max_interruption {
            req.max_interruption = InterruptionFrequency::from_level(level)
                .with_context(|| format!("--max-interruption must be 0-4, got {level}"))?;
        }
        req.min_savings_percent = self.min_savings;
        req.allow_burstable |= self.allow_burstable;
        req.allow_bare_metal |= self.allow_bare_metal;
        req.families = self.families;
        if let Some(n) = self.top_n {
            req.top_n = n;
        }
        Ok(req)
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = config::load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let providers = cloud_providers::builtin_providers()
        .into_iter()
        .filter(|(id, _)| cfg.providers.enabled.contains(id))
        .collect();
    let engine = Engine::new(cfg, providers);
    let default_provider = engine.config().default_provider.clone();

    match cli.command {
        Command::Analyze(args) => {
            let provider = args.provider.clone().unwrap_or(default_provider);
            let enhanced = args.enhanced;
            let req = args.into_requirements(&engine)?;
            let result = if enhanced {
                engine.analyze_enhanced(&provider, req).await
            } else {
                engine.analyze(&provider, req).await
            };
            let result = result.with_context(|| format!("analysis on {provider} failed"))?;
            info!(summary = %result.summary, "analysis finished");
            print_json(&result)
        }
        Command::Predict(args) => {
            let provider = args.provider.unwrap_or(default_provider);
            let region = args.region.unwrap_or_default();
            let prediction = engine
                .predict_price(&provider, &region, &args.instance_type)
                .await
                .with_context(|| format!("prediction for {} failed", args.instance_type))?;
            print_json(&prediction)
        }
        Command::Zones(args) => {
            let provider = args.provider.unwrap_or(default_provider);
            let region = args.region.unwrap_or_default();
            let zones = engine
                .recommend_zones(&provider, &region, &args.instance_type)
                .await
                .with_context(|| format!("zone recommendation for {} failed", args.instance_type))?;
            print_json(&zones)
        }
        Command::CacheStatus => print_json(&engine.cache_status()),
        Command::Refresh { provider } => {
            let removed = engine.refresh(provider.as_deref()).await?;
            print_json(&serde_json::json!({
                "provider": provider,
                "removed": removed,
            }))
        }
        Command::Providers => print_json(&engine.supported_providers()),
    }
}

/// 2 for bad input (unknown provider, region or instance type), 1 otherwise.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<common::Error>() {
        Some(e) if e.is_client_error() => 2,
        _ => 1,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(exit_code(&e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_separates_bad_input_from_failures() {
        let unknown = anyhow::Error::new(common::Error::UnsupportedProvider("oracle".into()))
            .context("analysis on oracle failed");
        assert_eq!(exit_code(&unknown), 2, "context must not hide the engine error");

        let upstream = anyhow::Error::new(common::Error::Upstream("data/aws.json: missing".into()));
        assert_eq!(exit_code(&upstream), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("plain failure")), 1);
    }

    #[test]
    fn test_cli_parses_analyze_flags() {
        let cli = Cli::try_parse_from([
            "spot-advisor",
            "analyze",
            "--provider",
            "aws",
            "--min-vcpu",
            "4",
            "--family",
            "m",
            "--family",
            "c",
            "--enhanced",
        ])
        .expect("valid args");
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.min_vcpu, 4);
        assert_eq!(args.families, vec!["m".to_string(), "c".to_string()]);
        assert!(args.enhanced);
    }
}
