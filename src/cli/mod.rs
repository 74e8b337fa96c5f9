pub mod init;
pub mod rates;
pub mod run;
pub mod status;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "eomfees",
    version,
    about = "End-of-month merchant processing fee reconciliation."
)]
pub struct Cli {
    /// Settings file (default: ~/.config/eomfees/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile an export against the rate card and write the EOM report.
    Run(RunArgs),
    /// Show the parsed rate card.
    Rates {
        /// Rate card file (default: newest match in the data directory)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Directory to search for the rate card
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Show settings and which inputs a run would pick up.
    Status {
        /// Directory to search for inputs
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Write a default settings file and create the data directory.
    Init {
        /// Path for input files and reports (default: ~/Documents/eomfees)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Transaction export (CSV or workbook)
    #[arg(long)]
    pub export: Option<PathBuf>,
    /// Rate card (CSV or workbook)
    #[arg(long)]
    pub rates: Option<PathBuf>,
    /// Directory to search for inputs (default: data_dir from settings)
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Report directory (default: <data_dir>/reports/EOM_Report-YYYY-MM-DD)
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Print the summary without writing a report
    #[arg(long = "no-write")]
    pub no_write: bool,
    /// Print the reconciliation as JSON instead of the text summary
    #[arg(long)]
    pub json: bool,
    /// Print the per-row fee table
    #[arg(long)]
    pub detail: bool,
    /// Chat channel requesting the run, checked against allowed_channels
    #[arg(long)]
    pub channel: Option<String>,
}

/// Directory inputs are searched in: explicit flag, else the configured data dir.
pub(crate) fn search_dir(dir: Option<PathBuf>, data_dir: &str) -> PathBuf {
    dir.unwrap_or_else(|| PathBuf::from(crate::settings::shellexpand_path(data_dir)))
}
