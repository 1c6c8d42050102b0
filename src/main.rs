//! RAT bench command line.
//!
//! - `run` connects the radio tester and the DC source and executes the test plan
//! - `check-config` loads and validates a bench file without touching hardware

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rat_bench::config::BenchConfig;
use rat_bench::logging;
use rat_bench::runner::{run_from_config, RunMode};

/// Transmit power and current characterization bench.
#[derive(Parser, Debug)]
#[command(name = "rat_bench", version, about = "GSM/WCDMA/LTE power and current bench")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute the test plan.
    Run {
        /// Bench configuration file.
        #[arg(long, short, default_value = "config/bench.toml")]
        config: PathBuf,

        /// Measurement mode.
        #[arg(long, short, value_enum, default_value_t = RunMode::Connected)]
        mode: RunMode,
    },
    /// Load and validate a configuration file, then print the task order.
    CheckConfig {
        /// Bench configuration file.
        #[arg(long, short, default_value = "config/bench.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, mode } => {
            let bench = BenchConfig::load_from(&config)?;
            logging::init_from_config(&bench.application);
            tracing::info!(
                name = %bench.application.name,
                config = %config.display(),
                %mode,
                "rat_bench starting"
            );
            run_from_config(&bench, mode).await?;
        }
        Command::CheckConfig { config } => {
            logging::init("info", false);
            let bench = BenchConfig::load_from(&config)?;
            for task in bench.ordered_tasks() {
                println!("{}: {} configuration(s)", task.format, task.configurations.len());
            }
        }
    }

    Ok(())
}
