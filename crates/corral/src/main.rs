mod manifest;
mod simulation;

use clap::{Parser, Subcommand, ValueEnum};
use corral_scheduler::CacheConfig;
use manifest::ClusterManifest;
use simulation::SimulationReport;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "corral", about = "Corral pod scheduler")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "CORRAL_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule every pod of a manifest onto its nodes and print the result
    Simulate {
        /// Path to a YAML or JSON manifest with `nodes` and `pods`
        #[arg(long, env = "CORRAL_MANIFEST")]
        manifest: PathBuf,
        /// Seconds an assumed pod may wait for confirmation
        #[arg(long, default_value_t = 30, env = "CORRAL_ASSUME_TTL_SECS")]
        assume_ttl_secs: u64,
        /// Report format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
    /// Check a manifest without scheduling anything
    Validate {
        /// Path to a YAML or JSON manifest with `nodes` and `pods`
        #[arg(long, env = "CORRAL_MANIFEST")]
        manifest: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Yaml,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Simulate {
            manifest,
            assume_ttl_secs,
            output,
        } => run_simulate(&manifest, assume_ttl_secs, output).await,
        Commands::Validate { manifest } => run_validate(&manifest),
    }
}

/// Load the manifest and schedule every pod in it
async fn run_simulate(path: &Path, assume_ttl_secs: u64, output: OutputFormat) -> miette::Result<()> {
    let manifest = ClusterManifest::load(path)?;
    let cache_config = CacheConfig::with_ttl(Duration::from_secs(assume_ttl_secs));

    let report = simulation::simulate(manifest, cache_config).await?;
    info!(
        "Simulation complete: {} placed, {} failed",
        report.placements.len(),
        report.failures.len()
    );

    match output {
        OutputFormat::Text => print_report(&report),
        OutputFormat::Json => println!("{}", corral_core::to_json_pretty(&report)?),
        OutputFormat::Yaml => print!("{}", corral_core::to_yaml(&report)?),
    }

    Ok(())
}

fn run_validate(path: &Path) -> miette::Result<()> {
    let manifest = ClusterManifest::load(path)?;
    println!(
        "{}: {} nodes, {} pods",
        path.display(),
        manifest.nodes.len(),
        manifest.pods.len()
    );
    Ok(())
}

fn print_report(report: &SimulationReport) {
    for placement in &report.placements {
        println!("{} -> {}", placement.pod, placement.node);
    }
    for failure in &report.failures {
        let pod = failure
            .pod
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<unnamed>".to_string());
        println!("{} unschedulable ({})", pod, failure.reason);
    }
}
