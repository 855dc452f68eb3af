use std::path::Path;

use clap::Subcommand;
use guildhall_core::{ProgressDelta, RequirementType};

use super::{open_engine, print_json, CliResult};

#[derive(Subcommand)]
pub enum ProgressAction {
    /// Record a counter change for a user
    Record {
        /// User id
        user: String,
        /// Requirement type (e.g. messages_sent, wallets_linked)
        requirement_type: RequirementType,
        /// Amount to add, or the absolute value with --set
        #[arg(allow_negative_numbers = true)]
        value: i64,
        /// Treat the value as an absolute counter
        #[arg(long)]
        set: bool,
        /// Apply at most once per key
        #[arg(long)]
        delivery_key: Option<String>,
    },
}

pub fn run(action: ProgressAction, db: Option<&Path>) -> CliResult {
    let (engine, _) = open_engine(db)?;
    match action {
        ProgressAction::Record {
            user,
            requirement_type,
            value,
            set,
            delivery_key,
        } => {
            let delta = if set {
                ProgressDelta::SetTo(value)
            } else {
                ProgressDelta::Increment(value)
            };
            let result = match delivery_key {
                Some(key) => engine.record_progress_once(&key, &user, requirement_type, delta)?,
                None => engine.record_progress(&user, requirement_type, delta)?,
            };
            print_json(&result)
        }
    }
}
