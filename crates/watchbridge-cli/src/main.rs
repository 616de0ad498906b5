use clap::{ArgAction, Parser, Subcommand};
use commands::{config, daemon, sync, tasks};
use std::path::PathBuf;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "watchbridge")]
#[command(about = "watchbridge - keep watch state in step across Plex, Emby and Jellyfin")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every enabled task on its schedule until interrupted
    #[command(long_about = "Build all configured tasks, run the start-up full sync for tasks with isfirst set, seed the change watermarks and then run incremental cycles on each task's schedule. Ctrl-C cancels in-flight work and exits.")]
    Daemon {
        /// Skip the start-up full sync even for tasks with isfirst set
        #[arg(long, action = ArgAction::SetTrue)]
        no_startup_sync: bool,

        /// Also write logs to a daily-rotated file in the log directory
        #[arg(long, action = ArgAction::SetTrue)]
        log_file: bool,
    },
    /// Run one task once
    #[command(long_about = "Run a full library pass for one task, or a single incremental cycle with --incremental. An incremental run needs a starting point: pass --since-minutes to look back that far, otherwise the run only seeds the watermark.")]
    Sync {
        /// Task name from the configuration
        task: String,

        /// Run one incremental cycle instead of a full pass
        #[arg(long, action = ArgAction::SetTrue)]
        incremental: bool,

        /// With --incremental, treat activity from the last N minutes as new
        #[arg(long, value_name = "MINUTES", requires = "incremental")]
        since_minutes: Option<u64>,
    },
    /// List configured tasks with their servers and pairing
    Tasks,
    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration (masks sensitive data)
    Show {
        /// Show secrets unmasked
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
    },
    /// Check the configuration for errors
    Validate,
    /// Print the configuration file location
    Path,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let output = output::Output::new(cli.output, cli.quiet);
    let config_path = cli.config;

    match cli.command {
        Commands::Daemon {
            no_startup_sync,
            log_file,
        } => {
            daemon::run_daemon(config_path, no_startup_sync, log_file, cli.verbose, cli.quiet, &output).await
        }
        Commands::Sync {
            task,
            incremental,
            since_minutes,
        } => {
            logging::init_logging(cli.verbose, cli.quiet);
            sync::run_sync(config_path, &task, incremental, since_minutes, &output).await
        }
        Commands::Tasks => {
            logging::init_logging(cli.verbose, cli.quiet);
            tasks::run_tasks(config_path, &output)
        }
        Commands::Config { cmd } => {
            logging::init_logging(cli.verbose, cli.quiet);
            config::run_config(cmd, config_path, &output)
        }
    }
}
