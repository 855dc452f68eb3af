use std::path::Path;

use clap::Subcommand;

use super::{open_engine, print_json, CliResult};

#[derive(Subcommand)]
pub enum UserAction {
    /// Create zeroed progress rows for entry-tier achievements
    Init {
        /// User id
        user: String,
    },
}

pub fn run(action: UserAction, db: Option<&Path>) -> CliResult {
    let (engine, _) = open_engine(db)?;
    match action {
        UserAction::Init { user } => {
            let created = engine.initialize_user(&user)?;
            print_json(&serde_json::json!({ "user_id": user, "created": created }))
        }
    }
}
