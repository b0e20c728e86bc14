//! tessera CLI
//!
//! Runs plans with the builtin handlers, records runs and replays or
//! verifies recordings.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod commands;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use commands::{Outcome, RunOptions};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
const LOG_ENV: &str = "TESSERA_LOG";

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "tessera - deterministic step orchestration with record and replay", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a plan with the builtin handlers
    Run {
        /// Plan document
        #[arg(short, long)]
        plan: String,
        /// Id factory seed
        #[arg(long, default_value = "tessera")]
        seed: String,
        /// Run clock start in epoch milliseconds
        #[arg(long, default_value_t = 0)]
        start_time_ms: i64,
        /// Run clock advance per step
        #[arg(long, default_value_t = 1)]
        tick_ms: u64,
        /// Keep running after a failed step
        #[arg(long)]
        continue_on_failure: bool,
        /// Write a recording of the run to this path
        #[arg(short, long)]
        record: Option<String>,
        /// Recording tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Recording description
        #[arg(long)]
        description: Option<String>,
    },
    /// Re-execute a recording and compare
    Replay {
        /// Recording file
        #[arg(short, long)]
        recording: String,
    },
    /// Check a recording's integrity hash
    Verify {
        /// Recording file
        #[arg(short, long)]
        recording: String,
    },
    /// Compare the results of two recordings
    Diff {
        /// First recording
        #[arg(long)]
        left: String,
        /// Second recording
        #[arg(long)]
        right: String,
    },
    /// Print the canonical hash of a JSON document
    Hash {
        /// JSON file
        #[arg(short, long)]
        file: String,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let outcome: Outcome = match cli.command {
        Commands::Run {
            plan,
            seed,
            start_time_ms,
            tick_ms,
            continue_on_failure,
            record,
            tags,
            description,
        } => {
            let options = RunOptions {
                seed,
                start_time_ms,
                tick_ms,
                continue_on_failure,
                record,
                tags,
                description,
            };
            commands::run(&plan, &options).await?
        }
        Commands::Replay { recording } => commands::replay(&recording).await?,
        Commands::Verify { recording } => commands::verify(&recording)?,
        Commands::Diff { left, right } => commands::diff(&left, &right)?,
        Commands::Hash { file } => commands::hash(&file)?,
    };

    println!("{}", outcome.output);
    Ok(if outcome.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
