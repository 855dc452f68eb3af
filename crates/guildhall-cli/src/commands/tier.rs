use clap::Subcommand;
use guildhall_core::tier;

use super::{print_json, CliResult};

#[derive(Subcommand)]
pub enum TierAction {
    /// List all tiers in ascending order
    List,
    /// Show one tier
    Show {
        /// Tier id (1-6)
        id: u8,
    },
}

pub fn run(action: TierAction) -> CliResult {
    match action {
        TierAction::List => print_json(&tier::all_tiers()),
        TierAction::Show { id } => {
            let tier = tier::tier_by_id(id)?;
            print_json(&serde_json::json!({
                "tier": tier,
                "next": tier::next_tier(id).map(|t| t.id),
            }))
        }
    }
}
