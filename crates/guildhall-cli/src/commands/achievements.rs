use std::path::Path;

use clap::Subcommand;

use super::{open_engine, print_json, CliResult};

#[derive(Subcommand)]
pub enum AchievementsAction {
    /// List active achievements with the user's progress
    List {
        /// User id
        user: String,
        /// Only completed achievements
        #[arg(long)]
        completed: bool,
    },
}

pub fn run(action: AchievementsAction, db: Option<&Path>) -> CliResult {
    let (engine, _) = open_engine(db)?;
    match action {
        AchievementsAction::List { user, completed } => {
            let mut listed = engine.list_achievements(&user)?;
            if completed {
                listed.retain(|a| a.progress.as_ref().is_some_and(|p| p.is_completed));
            }
            print_json(&listed)
        }
    }
}
