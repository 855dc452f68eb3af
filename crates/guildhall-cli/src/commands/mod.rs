use std::path::Path;

use guildhall_core::{Config, Ledger, ProgressionEngine};

pub mod achievements;
pub mod catalog;
pub mod config;
pub mod notify;
pub mod progress;
pub mod reward;
pub mod series;
pub mod tier;
pub mod user;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Open the engine on `--db` when given, otherwise on the configured ledger.
pub fn open_engine(db: Option<&Path>) -> Result<(ProgressionEngine, Config), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let ledger = match db {
        Some(path) => Ledger::open_path(path, config.busy_timeout())?,
        None => Ledger::open(&config)?,
    };
    let engine = ProgressionEngine::with_config(ledger, &config);
    Ok((engine, config))
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
