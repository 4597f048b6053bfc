use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stepflow::cli::{self, OutputMode};
use stepflow::config::StepflowConfig;
use stepflow::logging;

#[derive(Parser)]
#[command(name = "stepflow")]
#[command(about = "Step-sequencing engine - drive guided multi-step workflows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Working directory (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow definition interactively
    Run {
        /// Definition name or path
        definition: String,

        /// Initial data as a JSON object
        #[arg(long, default_value = "{}")]
        data: String,

        /// Output format
        #[arg(long, value_enum)]
        output: Option<OutputMode>,

        /// Write logs to the default per-run log file
        #[arg(long)]
        save_log: bool,
    },

    /// Validate a workflow definition without running it
    Validate {
        /// Definition name or path
        definition: String,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let working_dir = match cli.dir {
        Some(ref dir) => dir.clone(),
        None => std::env::current_dir().context("resolving working directory")?,
    };
    let config = StepflowConfig::load(Some(&working_dir))?;

    let log_file = match cli.command {
        Commands::Run {
            ref definition,
            save_log: true,
            ..
        } if cli.log_file.is_none() => Some(logging::default_log_path(definition)?),
        _ => cli.log_file.clone().or_else(|| config.logging.file_path()),
    };
    let log_guard = logging::init_logging(cli.debug, cli.quiet, log_file)?;

    let exit_code = match cli.command {
        Commands::Run {
            definition,
            data,
            output,
            ..
        } => {
            let data: serde_json::Value =
                serde_json::from_str(&data).context("parsing --data as JSON")?;
            let mode = output.unwrap_or(if cli.quiet {
                OutputMode::Quiet
            } else {
                OutputMode::Console
            });
            let handler = cli::create_handler(mode, cli.debug);

            cli::run_definition(
                &definition,
                data,
                &working_dir,
                &config,
                handler,
                cli::stdin_lines(),
            )
            .await?
        }

        Commands::Validate { definition } => {
            let handler = cli::create_handler(OutputMode::Console, cli.debug);
            cli::validate_definition(&definition, Some(&working_dir), &config, &*handler)
        }

        Commands::Config => {
            print!("{}", cli::show_config(&config)?);
            0
        }
    };

    if exit_code != 0 {
        // exit() skips destructors; flush the log file first
        drop(log_guard);
        std::process::exit(exit_code);
    }
    Ok(())
}
