mod config;
pub mod ledger;
pub mod migrations;

pub use config::{CatalogConfig, Config, NotificationsConfig, StoreConfig};
pub use ledger::{
    AchievementChain, AchievementSeries, AchievementWithProgress, CatalogSummary,
    CompletedAchievement, GuildAchievement, Ledger, SeriesWithProgress, UserAchievementProgress,
    UserSeriesProgress,
};

use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// Returns `~/.config/guildhall[-dev]/` based on GUILDHALL_ENV.
///
/// Set GUILDHALL_ENV=dev to use the development data directory, or
/// GUILDHALL_HOME to point at an explicit directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("GUILDHALL_HOME") {
        Some(home) => PathBuf::from(home),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("GUILDHALL_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("guildhall-dev")
            } else {
                base_dir.join("guildhall")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
