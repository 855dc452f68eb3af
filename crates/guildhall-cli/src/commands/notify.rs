use std::path::Path;

use chrono::{DateTime, Utc};
use clap::Subcommand;
use guildhall_core::{Config, NotificationSurfacer, ProgressionEngine};

use super::{open_engine, print_json, CliResult};

#[derive(Subcommand)]
pub enum NotifyAction {
    /// List recent completions, most recent first
    Poll {
        /// User id
        user: String,
        /// Only completions strictly after this RFC 3339 time
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Maximum entries (clamped to 1-5; defaults to the configured limit)
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Poll on the configured cadence and print shown/dismissed notifications
    Watch {
        /// User id
        user: String,
        /// Stop after this many polls
        #[arg(long)]
        polls: Option<u64>,
        /// Override the poll interval in seconds
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

pub fn run(action: NotifyAction, db: Option<&Path>) -> CliResult {
    let (engine, config) = open_engine(db)?;
    match action {
        NotifyAction::Poll { user, since, limit } => {
            let limit = limit.unwrap_or(engine.recent_limit());
            print_json(&engine.poll_recent_completions(&user, since, limit)?)
        }
        NotifyAction::Watch {
            user,
            polls,
            interval_secs,
        } => {
            let interval = interval_secs
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| std::time::Duration::from_secs(config.notifications.poll_interval_secs));
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            runtime.block_on(watch(&engine, &config, user, interval, polls))
        }
    }
}

async fn watch(
    engine: &ProgressionEngine,
    config: &Config,
    user: String,
    interval: std::time::Duration,
    polls: Option<u64>,
) -> CliResult {
    let mut surfacer = NotificationSurfacer::from_config(user, Utc::now(), config);
    tracing::debug!(session_id = %surfacer.session_id(), ?interval, "watching completions");

    let mut poll_timer = tokio::time::interval(interval.max(std::time::Duration::from_millis(1)));
    let mut dismiss_timer = tokio::time::interval(std::time::Duration::from_millis(250));
    let mut done = 0u64;

    loop {
        tokio::select! {
            _ = poll_timer.tick() => {
                if polls.is_some_and(|limit| done >= limit) {
                    break;
                }
                done += 1;
                if let Some(shown) = surfacer.poll(engine, Utc::now()) {
                    print_json(&serde_json::json!({ "event": "shown", "notification": shown }))?;
                }
            }
            _ = dismiss_timer.tick() => {
                let before = surfacer.active().map(|n| n.achievement.achievement_id);
                surfacer.tick(Utc::now());
                if let (Some(id), None) = (before, surfacer.active()) {
                    print_json(&serde_json::json!({ "event": "dismissed", "achievement_id": id }))?;
                }
            }
        }
    }
    Ok(())
}
