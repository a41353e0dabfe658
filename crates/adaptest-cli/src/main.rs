//! adaptest CLI: validate pools, preview batch plans, simulate sessions.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "adaptest", version, about = "Adaptive examination engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and example question pool
    Init,

    /// Validate question pool TOML files
    Validate {
        /// Path to a pool file or directory
        #[arg(long)]
        pool: PathBuf,
    },

    /// Preview the questions a batch session would draw
    Plan {
        /// Path to a pool file or directory
        #[arg(long)]
        pool: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Difficulty to draw around (default: the configured starting difficulty)
        #[arg(long)]
        seed_difficulty: Option<u8>,
    },

    /// Run a whole session with a simulated test-taker
    Simulate {
        /// Path to a pool file or directory
        #[arg(long)]
        pool: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Simulated ability on the 1-10 difficulty scale
        #[arg(long, default_value = "6.0")]
        ability: f64,

        /// Time spent per question as a fraction of the expected time
        #[arg(long, default_value = "0.9")]
        pace: f64,

        /// Seed for the test-taker and, unless configured, for selection
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Also write the JSON report to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Skip supplementary sources
        #[arg(long)]
        no_sources: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("adaptest=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { pool } => commands::validate::execute(pool),
        Commands::Plan {
            pool,
            config,
            seed_difficulty,
        } => commands::plan::execute(pool, config, seed_difficulty),
        Commands::Simulate {
            pool,
            config,
            ability,
            pace,
            seed,
            json,
            output,
            no_sources,
        } => {
            commands::simulate::execute(commands::simulate::SimulateArgs {
                pool,
                config,
                ability,
                pace,
                seed,
                json,
                output,
                no_sources,
            })
            .await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
