pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod excel;
pub mod models;
pub mod services;
pub mod types;

use clap::Parser;

use cli::Cli;
use commands::AppState;
use config::AppConfig;

pub use error::{PayrollError, Result};

/// Parse arguments, set up logging and the database, then run one command.
pub fn run() -> std::result::Result<(), String> {
    let cli = Cli::parse();
    let config = AppConfig::load();
    config::init_tracing(&config.log_filter);
    tracing::debug!(data_dir = %config.data_dir.display(), "starting");

    let mut state = AppState::new(config)?;
    cli::execute(&mut state, cli.command)
}
