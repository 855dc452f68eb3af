use std::path::Path;

use clap::Subcommand;

use super::{open_engine, print_json, CliResult};

#[derive(Subcommand)]
pub enum SeriesAction {
    /// List active series with the user's tier cursor and next target
    List {
        /// User id
        user: String,
    },
}

pub fn run(action: SeriesAction, db: Option<&Path>) -> CliResult {
    let (engine, _) = open_engine(db)?;
    match action {
        SeriesAction::List { user } => print_json(&engine.list_series_progress(&user)?),
    }
}
