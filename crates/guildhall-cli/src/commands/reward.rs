use std::path::Path;

use clap::Subcommand;

use super::{open_engine, print_json, CliResult};

#[derive(Subcommand)]
pub enum RewardAction {
    /// Claim the reward of a completed achievement
    Claim {
        /// User id
        user: String,
        /// Achievement id
        achievement_id: i64,
    },
}

pub fn run(action: RewardAction, db: Option<&Path>) -> CliResult {
    let (engine, _) = open_engine(db)?;
    match action {
        RewardAction::Claim {
            user,
            achievement_id,
        } => {
            let reward = engine.claim_reward(&user, achievement_id)?;
            print_json(&serde_json::json!({
                "user_id": user,
                "achievement_id": achievement_id,
                "reward": reward,
            }))
        }
    }
}
