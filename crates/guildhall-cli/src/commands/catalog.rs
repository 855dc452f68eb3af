use std::path::{Path, PathBuf};

use clap::Subcommand;
use guildhall_core::{default_catalog, CatalogFile};

use super::{open_engine, print_json, CliResult};

#[derive(Subcommand)]
pub enum CatalogAction {
    /// Install the achievement catalog (built-in unless a file is given or configured)
    Install {
        /// Catalog TOML with [[series]] and [[standalone]] tables
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Show installed series and achievements
    Show,
}

pub fn run(action: CatalogAction, db: Option<&Path>) -> CliResult {
    let (engine, config) = open_engine(db)?;
    match action {
        CatalogAction::Install { file } => {
            let source = file.or_else(|| config.catalog.catalog_file.as_ref().map(PathBuf::from));
            let catalog = match &source {
                Some(path) => CatalogFile::load(path)?,
                None => default_catalog(),
            };
            let summary = engine.install_catalog(&catalog)?;
            print_json(&serde_json::json!({
                "source": source.map_or_else(|| "built-in".to_string(), |p| p.display().to_string()),
                "series": summary.series,
                "achievements": summary.achievements,
            }))
        }
        CatalogAction::Show => {
            let ledger = engine.ledger();
            print_json(&serde_json::json!({
                "series": ledger.list_series()?,
                "achievements": ledger.list_catalog_achievements()?,
            }))
        }
    }
}
