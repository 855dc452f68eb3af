//! Completion notifications.
//!
//! Clients learn about completions by polling: a [`NotificationSurfacer`]
//! keeps a watermark and asks a [`CompletionSource`] for anything completed
//! since then. At most one notification is active at a time; a newer
//! completion replaces it (last-write-wins), and it dismisses itself after a
//! fixed delay.
//!
//! Delivery is best-effort. Completions that land between two polls may
//! be collapsed into one notification, and a poll that fails shows nothing.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{ProgressionEngine, MAX_RECENT_LIMIT};
use crate::error::Result;
use crate::storage::{CompletedAchievement, Config, Ledger};

/// Anything that can list a user's recent completions.
pub trait CompletionSource {
    /// Completions strictly after `since`, most recent first, at most `limit`.
    fn recent_completions(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<CompletedAchievement>>;
}

impl CompletionSource for Ledger {
    fn recent_completions(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<CompletedAchievement>> {
        Ledger::recent_completions(self, user_id, since.as_ref(), limit.clamp(1, MAX_RECENT_LIMIT))
    }
}

impl CompletionSource for ProgressionEngine {
    fn recent_completions(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<CompletedAchievement>> {
        self.poll_recent_completions(user_id, since, limit)
    }
}

/// A completion currently on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub achievement: CompletedAchievement,
    pub shown_at: DateTime<Utc>,
    pub dismiss_at: DateTime<Utc>,
}

/// Client-side poller for one user session.
#[derive(Debug, Clone)]
pub struct NotificationSurfacer {
    session_id: Uuid,
    user_id: String,
    watermark: DateTime<Utc>,
    active: Option<Notification>,
    auto_dismiss: Duration,
    limit: u32,
}

impl NotificationSurfacer {
    /// Start a session; completions before `now` are never shown.
    pub fn open(user_id: impl Into<String>, now: DateTime<Utc>, auto_dismiss: Duration) -> Self {
        let surfacer = Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            watermark: now,
            active: None,
            auto_dismiss,
            limit: MAX_RECENT_LIMIT,
        };
        tracing::debug!(
            session_id = %surfacer.session_id,
            user_id = %surfacer.user_id,
            "notification session opened"
        );
        surfacer
    }

    pub fn from_config(user_id: impl Into<String>, now: DateTime<Utc>, config: &Config) -> Self {
        let mut surfacer = Self::open(user_id, now, config.auto_dismiss());
        surfacer.limit = config.notifications.recent_limit.clamp(1, MAX_RECENT_LIMIT);
        surfacer
    }

    /// Start the watermark at an explicit point instead of session open.
    pub fn with_watermark(mut self, watermark: DateTime<Utc>) -> Self {
        self.watermark = watermark;
        self
    }

    /// Fetch completions newer than the watermark and surface the newest.
    ///
    /// Returns the notification shown by this poll, if any. Source errors
    /// are logged and treated as an empty poll.
    pub fn poll<S: CompletionSource + ?Sized>(
        &mut self,
        source: &S,
        now: DateTime<Utc>,
    ) -> Option<&Notification> {
        self.tick(now);
        let recent = match source.recent_completions(&self.user_id, Some(self.watermark), self.limit)
        {
            Ok(recent) => recent,
            Err(err) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    error = %err,
                    "completion poll failed"
                );
                return None;
            }
        };

        let newest = recent
            .into_iter()
            .max_by_key(|c| c.completed_at)
            .filter(|c| c.completed_at > self.watermark)?;
        self.watermark = now;
        self.active = Some(Notification {
            achievement: newest,
            shown_at: now,
            dismiss_at: now + self.auto_dismiss,
        });
        self.active.as_ref()
    }

    /// Dismiss the active notification once its time is up.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if self.active.as_ref().is_some_and(|n| now >= n.dismiss_at) {
            self.active = None;
        }
    }

    pub fn dismiss(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> Option<&Notification> {
        self.active.as_ref()
    }

    pub fn watermark(&self) -> DateTime<Utc> {
        self.watermark
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Category, Reward, RewardType};
    use crate::error::CoreError;
    use std::cell::RefCell;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::seconds(secs)
    }

    fn completion(id: i64, completed_at: DateTime<Utc>) -> CompletedAchievement {
        CompletedAchievement {
            achievement_id: id,
            series_id: None,
            name: format!("Achievement {id}"),
            description: String::new(),
            category: Category::Special,
            tier_id: 1,
            tier_name: "Bronze".into(),
            color_token: "#CD7F32".into(),
            reward: Reward {
                reward_type: RewardType::Xp,
                value: 100,
            },
            completed_at,
        }
    }

    /// In-memory source honoring `since` the way the ledger does.
    #[derive(Default)]
    struct FakeSource {
        items: RefCell<Vec<CompletedAchievement>>,
        fail: bool,
    }

    impl CompletionSource for FakeSource {
        fn recent_completions(
            &self,
            _user_id: &str,
            since: Option<DateTime<Utc>>,
            limit: u32,
        ) -> Result<Vec<CompletedAchievement>> {
            if self.fail {
                return Err(CoreError::Custom("offline".into()));
            }
            let mut items: Vec<_> = self
                .items
                .borrow()
                .iter()
                .filter(|c| since.map_or(true, |s| c.completed_at > s))
                .cloned()
                .collect();
            items.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
            items.truncate(limit as usize);
            Ok(items)
        }
    }

    #[test]
    fn shows_newest_completion_after_open() {
        let source = FakeSource::default();
        source.items.borrow_mut().push(completion(1, at(-10)));
        let mut surfacer = NotificationSurfacer::open("u1", at(0), Duration::seconds(5));

        assert!(surfacer.poll(&source, at(1)).is_none());

        source.items.borrow_mut().push(completion(2, at(2)));
        source.items.borrow_mut().push(completion(3, at(3)));
        let shown = surfacer.poll(&source, at(4)).unwrap();
        assert_eq!(shown.achievement.achievement_id, 3);
        assert_eq!(shown.dismiss_at, at(9));
        assert_eq!(surfacer.watermark(), at(4));
    }

    #[test]
    fn second_poll_in_same_window_sees_nothing_new() {
        let source = FakeSource::default();
        let mut surfacer = NotificationSurfacer::open("u1", at(0), Duration::seconds(5));
        source.items.borrow_mut().push(completion(1, at(1)));

        assert!(surfacer.poll(&source, at(2)).is_some());
        let observed = surfacer.watermark();
        assert!(surfacer.poll(&source, at(2)).is_none());
        assert_eq!(surfacer.watermark(), observed);
        // The earlier notification is still on screen.
        assert!(surfacer.active().is_some());
    }

    #[test]
    fn newer_completion_replaces_active() {
        let source = FakeSource::default();
        let mut surfacer = NotificationSurfacer::open("u1", at(0), Duration::seconds(5));
        source.items.borrow_mut().push(completion(1, at(1)));
        surfacer.poll(&source, at(2));

        source.items.borrow_mut().push(completion(2, at(3)));
        surfacer.poll(&source, at(4));
        assert_eq!(surfacer.active().unwrap().achievement.achievement_id, 2);
    }

    #[test]
    fn auto_dismisses_after_timeout() {
        let source = FakeSource::default();
        let mut surfacer = NotificationSurfacer::open("u1", at(0), Duration::seconds(5));
        source.items.borrow_mut().push(completion(1, at(1)));
        surfacer.poll(&source, at(2));

        surfacer.tick(at(6));
        assert!(surfacer.active().is_some());
        surfacer.tick(at(7));
        assert!(surfacer.active().is_none());
    }

    #[test]
    fn failed_poll_degrades_to_nothing() {
        let source = FakeSource {
            fail: true,
            ..FakeSource::default()
        };
        let mut surfacer = NotificationSurfacer::open("u1", at(0), Duration::seconds(5));
        assert!(surfacer.poll(&source, at(30)).is_none());
        assert_eq!(surfacer.watermark(), at(0));
    }

    #[test]
    fn config_sets_dismissal_and_limit() {
        let mut config = Config::default();
        config.notifications.auto_dismiss_secs = 8;
        config.notifications.recent_limit = 50;
        let surfacer = NotificationSurfacer::from_config("u1", at(0), &config);
        assert_eq!(surfacer.auto_dismiss, Duration::seconds(8));
        assert_eq!(surfacer.limit, MAX_RECENT_LIMIT);
        assert_ne!(surfacer.session_id(), NotificationSurfacer::open("u1", at(0), Duration::seconds(5)).session_id());
    }
}
