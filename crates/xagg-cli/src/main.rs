//! xagg - keeps the directory catalog in sync with disk and writes XML
//! index artifacts for new datasets.

mod commands;

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;
use xagg_core::{EntryFilter, XaggError};

#[derive(Parser, Debug)]
#[command(name = "xagg")]
#[command(about = "Catalog climate-model data directories and generate XML index artifacts")]
struct Cli {
    /// JSON settings file (built-in defaults otherwise)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Catalog database, overriding the settings file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync paths with disk, generate pending artifacts and record statistics
    Run(RunArgs),
    /// Ignore retracted datasets and archive their artifacts
    Retract {
        /// File of dataset ids, one per line
        #[arg(long)]
        list: PathBuf,
    },
    /// Clear artifacts of matching entries so they are generated again
    Reset(FilterArgs),
    /// Clear artifacts of matching entries and stop scheduling them
    Ignore(FilterArgs),
    /// Delete matching entries and their artifacts
    Purge(FilterArgs),
    /// Show recent reconciliation runs
    Runs {
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Scan data directories and reconcile the catalog
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    update_paths: bool,

    /// Generate artifacts for directories that need them
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    update_scans: bool,

    /// Record catalog statistics
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    count_stats: bool,

    /// Base directory for XML artifacts
    #[arg(short, long)]
    output_directory: Option<PathBuf>,

    /// Worker count for scanning and artifact generation
    #[arg(short = 'n', long)]
    num_processors: Option<usize>,

    /// Comma-separated variables to generate artifacts for
    #[arg(long, value_delimiter = ',')]
    variable: Option<Vec<String>>,

    /// Comma-separated experiments to generate artifacts for
    #[arg(long, value_delimiter = ',')]
    experiment: Option<Vec<String>>,

    /// Comma-separated frequencies to generate artifacts for
    #[arg(long, value_delimiter = ',')]
    frequency: Option<Vec<String>>,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Only entries whose path starts with this prefix
    #[arg(long)]
    path_prefix: Option<String>,

    #[arg(long)]
    era: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    experiment: Option<String>,

    #[arg(long)]
    variable: Option<String>,

    #[arg(long)]
    frequency: Option<String>,

    /// Only entries with (true) or without (false) a recorded error
    #[arg(long)]
    has_error: Option<bool>,

    /// Only entries with (true) or without (false) an artifact
    #[arg(long)]
    has_artifact: Option<bool>,

    /// Allow an empty filter to match the whole catalog
    #[arg(long)]
    all: bool,
}

impl FilterArgs {
    fn to_filter(&self) -> EntryFilter {
        EntryFilter {
            path_prefix: self
                .path_prefix
                .as_ref()
                .map(|p| p.trim_end_matches('/').to_string()),
            mip_era: self.era.clone(),
            model: self.model.clone(),
            experiment: self.experiment.clone(),
            variable: self.variable.clone(),
            frequency: self.frequency.clone(),
            has_error: self.has_error,
            has_artifact: self.has_artifact,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match commands::dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            let code = e.downcast_ref::<XaggError>().map_or(1, XaggError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flags_default_true() {
        let cli = Cli::parse_from(["xagg", "run"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.update_paths && args.update_scans && args.count_stats);
    }

    #[test]
    fn test_run_overrides_parse() {
        let cli = Cli::parse_from([
            "xagg",
            "--debug",
            "run",
            "--update-paths",
            "false",
            "-n",
            "4",
            "--variable",
            "tas,pr",
        ]);
        assert!(cli.debug);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(!args.update_paths);
        assert_eq!(args.num_processors, Some(4));
        assert_eq!(args.variable, Some(vec!["tas".to_string(), "pr".to_string()]));
    }

    #[test]
    fn test_filter_args() {
        let cli = Cli::parse_from([
            "xagg",
            "purge",
            "--path-prefix",
            "/p/css03/scratch/",
            "--has-artifact",
            "true",
        ]);
        let Command::Purge(args) = cli.command else {
            panic!("expected purge");
        };
        let filter = args.to_filter();
        assert_eq!(filter.path_prefix.as_deref(), Some("/p/css03/scratch"));
        assert_eq!(filter.has_artifact, Some(true));
        assert!(!args.all);
    }
}
