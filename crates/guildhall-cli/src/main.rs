use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "guildhall-cli", version, about = "Guildhall achievement CLI")]
struct Cli {
    /// Ledger database file (defaults to the configured one in the data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tier catalog
    Tier {
        #[command(subcommand)]
        action: commands::tier::TierAction,
    },
    /// Achievement catalog installation
    Catalog {
        #[command(subcommand)]
        action: commands::catalog::CatalogAction,
    },
    /// User setup
    User {
        #[command(subcommand)]
        action: commands::user::UserAction,
    },
    /// Record activity progress
    Progress {
        #[command(subcommand)]
        action: commands::progress::ProgressAction,
    },
    /// Reward claims
    Reward {
        #[command(subcommand)]
        action: commands::reward::RewardAction,
    },
    /// Achievement listings
    Achievements {
        #[command(subcommand)]
        action: commands::achievements::AchievementsAction,
    },
    /// Series listings
    Series {
        #[command(subcommand)]
        action: commands::series::SeriesAction,
    },
    /// Completion notifications
    Notify {
        #[command(subcommand)]
        action: commands::notify::NotifyAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging() {
    // stdout carries JSON output, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GUILDHALL_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let db = cli.db.as_deref();
    let result = match cli.command {
        Commands::Tier { action } => commands::tier::run(action),
        Commands::Catalog { action } => commands::catalog::run(action, db),
        Commands::User { action } => commands::user::run(action, db),
        Commands::Progress { action } => commands::progress::run(action, db),
        Commands::Reward { action } => commands::reward::run(action, db),
        Commands::Achievements { action } => commands::achievements::run(action, db),
        Commands::Series { action } => commands::series::run(action, db),
        Commands::Notify { action } => commands::notify::run(action, db),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
