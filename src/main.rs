use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use toolswarm::{
    scenario::ScenarioLoader,
    snapshot::SnapshotWriter,
    web::{self, WebServerConfig},
    Millis,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Self-replenishing floating tool population")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a scenario in virtual time
    Run {
        /// Path to the scenario YAML file
        #[arg(long, default_value = "scenarios/workshop.yaml")]
        scenario: PathBuf,

        /// Override the scenario duration
        #[arg(long)]
        duration_ms: Option<Millis>,

        /// Override the snapshot interval (0 disables snapshots)
        #[arg(long)]
        snapshot_interval_ms: Option<Millis>,

        /// Directory for snapshots
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
    },
    /// Drive a live population from the wall clock over HTTP
    Serve {
        #[arg(long, default_value = "scenarios/workshop.yaml")]
        scenario: PathBuf,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// Clock resolution of the live engine
        #[arg(long, default_value_t = 100)]
        tick_ms: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let loader = ScenarioLoader::new(".");
    match cli.command {
        Command::Run {
            scenario,
            duration_ms,
            snapshot_interval_ms,
            snapshot_dir,
        } => {
            let scenario = loader.load(&scenario)?;
            let duration = scenario.duration(duration_ms);
            let writer = SnapshotWriter::new(
                snapshot_dir.unwrap_or_else(|| PathBuf::from("snapshots")),
                snapshot_interval_ms.unwrap_or(scenario.snapshot_interval_ms),
            );

            let mut engine = scenario.engine()?;
            let summary = engine.run_with_hook(
                &scenario.actions,
                duration,
                writer.interval_ms(),
                |frame| writer.write(&scenario.name, frame).map(|_| ()),
            )?;
            engine.stop();

            println!(
                "Scenario '{}' ran for {} ms. Score: {}, active tools: {}, spawned: {}, frames: {}",
                scenario.name,
                summary.ended_at_ms,
                summary.final_score,
                summary.final_active,
                summary.spawned,
                summary.frames
            );
            Ok(())
        }
        Command::Serve {
            scenario,
            host,
            port,
            tick_ms,
        } => {
            let scenario = loader.load(&scenario)?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(web::serve(WebServerConfig {
                scenario,
                host,
                port,
                tick: Duration::from_millis(tick_ms.max(1)),
            }))
        }
    }
}
