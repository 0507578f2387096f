use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use spacecode_ci::branch_spec::BranchSpec;
use spacecode_ci::config::BridgeConfig;
use spacecode_ci::safe_merge::BuildRef;
use spacecode_ci::telemetry;

#[derive(Parser)]
#[command(name = "spacecode-ci")]
#[command(version, about = "Operator tools for the SpaceCode CI bridge")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test git refs against a branch spec
    MatchBranch {
        /// Branch spec text, one pattern per line
        #[arg(long)]
        spec: String,
        /// Treat each pattern as an anchored regex instead of a wildcard
        #[arg(long)]
        regex: bool,
        #[arg(required = true)]
        refs: Vec<String>,
    },
    /// Parse a safe-merge build identifier
    ParseBuildId { id: String },
    /// Load and validate a bridge configuration file
    CheckConfig { path: PathBuf },
}

fn main() -> Result<ExitCode> {
    telemetry::init_tracing("spacecode_ci=info");
    let cli = Cli::parse();

    match cli.command {
        Commands::MatchBranch { spec, regex, refs } => {
            let spec = BranchSpec::parse(&spec, regex);
            for git_ref in &refs {
                let verdict = if spec.matches(git_ref) { "match" } else { "no match" };
                println!("{git_ref}\t{verdict}");
            }
        }
        Commands::ParseBuildId { id } => match id.parse::<BuildRef>() {
            Ok(BuildRef::Queued(queue_id)) => println!("queue item {queue_id}"),
            Ok(BuildRef::Build(number)) => println!("build {number}"),
            Err(e) => {
                eprintln!("{id}: {e}");
                return Ok(ExitCode::FAILURE);
            }
        },
        Commands::CheckConfig { path } => {
            let config = BridgeConfig::load(&path)
                .with_context(|| format!("invalid configuration in {}", path.display()))?;
            println!("{} is valid", path.display());
            println!("webhook endpoint: {}", config.webhook_endpoint());
            println!(
                "retries: {} (up to {:?} total wait)",
                config.retry.max_retries,
                config.retry_config().worst_case_wait()
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
