mod cli;
mod engine;
mod error;
mod fmt;
mod inputs;
mod models;
mod rates;
mod report;
mod settings;
mod summary;
mod table;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Commands};

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = settings::settings_path(cli.config.as_deref());
    let result = match cli.command {
        Commands::Run(args) => cli::run::run(&config, args),
        Commands::Rates { file, dir } => cli::rates::run(&config, file, dir),
        Commands::Status { dir } => cli::status::run(&config, dir),
        Commands::Init { data_dir } => cli::init::run(&config, data_dir),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
