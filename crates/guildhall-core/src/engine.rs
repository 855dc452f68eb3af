//! Progression engine.
//!
//! Turns raw activity counters into achievement progress, completions,
//! series tier advancement and reward claims.
//!
//! ## Progress model
//!
//! - A requirement type resolves to a set of chains: one per active series
//!   tracking it, plus one single-tier chain per standalone achievement.
//! - Within a series only the *target tier* moves: the lowest tier above the
//!   user's cursor that is not completed. A target touched for the first time
//!   starts from the previous tier's counter, because series counters are
//!   cumulative.
//! - The cursor moves at most one tier per series per call. A tier completed
//!   ahead of the cursor is caught up on the next call for that series.
//! - Surplus carried past a completed tier completes the next tier on the
//!   next call, even when that call reports the same absolute value.
//!
//! Every call runs inside a single `BEGIN IMMEDIATE` transaction on the
//! ledger, so concurrent callers (threads or processes, each with their own
//! connection) are serialized by SQLite and never lose an increment.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = ProgressionEngine::new(Ledger::open(&config)?);
//! engine.install_catalog(&default_catalog())?;
//! let result = engine.record_progress("user-1", RequirementType::MessagesSent,
//!     ProgressDelta::Increment(1))?;
//! for done in &result.completions {
//!     println!("completed {} ({:?})", done.achievement_id, done.reward);
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::cache::{Cache, FallbackPolicy, Freshness};
use crate::catalog::{CatalogFile, RequirementType, Reward};
use crate::error::{AchievementError, Result, ValidationError};
use crate::events::Event;
use crate::storage::ledger::{self, AchievementChain, CatalogSummary};
use crate::storage::{
    AchievementWithProgress, CompletedAchievement, Config, GuildAchievement, Ledger,
    SeriesWithProgress, UserAchievementProgress,
};

/// Upper bound on completions returned by one notification poll.
pub const MAX_RECENT_LIMIT: u32 = 5;

/// Largest counter the ledger stores (SQLite INTEGER).
const MAX_COUNTER: u64 = i64::MAX as u64;

/// How a call changes a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ProgressDelta {
    /// Add to the current counter.
    Increment(i64),
    /// Raise the counter to an absolute value; lower values are ignored.
    SetTo(i64),
}

impl ProgressDelta {
    fn amount(self) -> i64 {
        match self {
            ProgressDelta::Increment(n) | ProgressDelta::SetTo(n) => n,
        }
    }

    fn validated(self) -> Result<u64> {
        let value = self.amount();
        u64::try_from(value).map_err(|_| {
            AchievementError::InvalidProgressValue {
                value,
                reason: "progress values must not be negative",
            }
            .into()
        })
    }

    /// The counter after this delta; stays within what the ledger can store.
    fn apply(self, current: u64, amount: u64) -> Result<u64> {
        match self {
            ProgressDelta::Increment(n) => current
                .checked_add(amount)
                .filter(|v| *v <= MAX_COUNTER)
                .ok_or_else(|| {
                    AchievementError::InvalidProgressValue {
                        value: n,
                        reason: "progress counter would overflow",
                    }
                    .into()
                }),
            ProgressDelta::SetTo(_) => Ok(current.max(amount)),
        }
    }
}

/// A false-to-true completion produced by one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub achievement_id: i64,
    pub user_id: String,
    pub series_id: Option<i64>,
    pub tier_id: u8,
    pub reward: Reward,
    pub completed_at: DateTime<Utc>,
}

/// Outcome of [`ProgressionEngine::record_progress`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressResult {
    pub user_id: String,
    pub requirement_type: RequirementType,
    pub completions: Vec<CompletionEvent>,
    pub events: Vec<Event>,
    /// The delivery key was already processed; nothing was applied.
    pub duplicate: bool,
    /// Provenance of the catalog lookup used for this call.
    pub catalog_freshness: Freshness,
}

impl ProgressResult {
    fn empty(user_id: &str, requirement_type: RequirementType, freshness: Freshness) -> Self {
        Self {
            user_id: user_id.to_string(),
            requirement_type,
            completions: Vec::new(),
            events: Vec::new(),
            duplicate: false,
            catalog_freshness: freshness,
        }
    }

    /// Whether the call changed nothing.
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}

/// Applies progress, completions, cursor movement and claims to a ledger.
#[derive(Debug)]
pub struct ProgressionEngine {
    ledger: Ledger,
    chains: Cache<RequirementType, Vec<AchievementChain>>,
    cache_ttl: Duration,
    recent_limit: u32,
}

impl ProgressionEngine {
    /// Create an engine with default settings.
    pub fn new(ledger: Ledger) -> Self {
        Self::with_config(ledger, &Config::default())
    }

    pub fn with_config(ledger: Ledger, config: &Config) -> Self {
        Self {
            ledger,
            chains: Cache::new(),
            cache_ttl: config.cache_ttl(),
            recent_limit: config.notifications.recent_limit.clamp(1, MAX_RECENT_LIMIT),
        }
    }

    /// Open the configured ledger and wrap it.
    ///
    /// # Errors
    /// Returns an error if the ledger cannot be opened.
    pub fn open(config: &Config) -> Result<Self> {
        Ok(Self::with_config(Ledger::open(config)?, config))
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Install a catalog and drop cached lookups.
    pub fn install_catalog(&self, catalog: &CatalogFile) -> Result<CatalogSummary> {
        let summary = self.ledger.install_catalog(catalog)?;
        self.invalidate_catalog();
        tracing::info!(
            series = summary.series,
            achievements = summary.achievements,
            "catalog installed"
        );
        Ok(summary)
    }

    /// Forget cached requirement-type lookups.
    pub fn invalidate_catalog(&self) {
        self.chains.clear();
    }

    /// Apply a counter change for `user_id`.
    ///
    /// # Errors
    /// - `InvalidProgressValue` for a negative amount (nothing is written)
    /// - `StoreConflict` when the write lock cannot be acquired in time or
    ///   a guarded update lost a race; the whole call is rolled back
    pub fn record_progress(
        &self,
        user_id: &str,
        requirement_type: RequirementType,
        delta: ProgressDelta,
    ) -> Result<ProgressResult> {
        self.record_progress_at(user_id, requirement_type, delta, Utc::now())
    }

    /// [`record_progress`](Self::record_progress) with an explicit clock.
    pub fn record_progress_at(
        &self,
        user_id: &str,
        requirement_type: RequirementType,
        delta: ProgressDelta,
        now: DateTime<Utc>,
    ) -> Result<ProgressResult> {
        self.apply(None, user_id, requirement_type, delta, now)
    }

    /// Apply a counter change at most once per `delivery_key`.
    ///
    /// A repeated key returns an empty result with `duplicate` set.
    pub fn record_progress_once(
        &self,
        delivery_key: &str,
        user_id: &str,
        requirement_type: RequirementType,
        delta: ProgressDelta,
    ) -> Result<ProgressResult> {
        if delivery_key.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "delivery_key".into(),
                message: "must not be blank".into(),
            }
            .into());
        }
        self.apply(Some(delivery_key), user_id, requirement_type, delta, Utc::now())
    }

    fn apply(
        &self,
        delivery_key: Option<&str>,
        user_id: &str,
        requirement_type: RequirementType,
        delta: ProgressDelta,
        now: DateTime<Utc>,
    ) -> Result<ProgressResult> {
        validate_user(user_id)?;
        let amount = delta.validated()?;

        let read = self.chains.get_or_refresh(
            &requirement_type,
            || self.ledger.chains_for_requirement(requirement_type),
            self.cache_ttl,
            &FallbackPolicy::LastKnownGood,
            now,
        )?;
        if read.is_degraded() {
            tracing::warn!(
                %requirement_type,
                freshness = ?read.freshness,
                "recording progress against a degraded catalog lookup"
            );
        }

        let result = self.ledger.immediate(|conn| {
            let mut result = ProgressResult::empty(user_id, requirement_type, read.freshness);
            if let Some(key) = delivery_key {
                if ledger::delivery_seen_in(conn, key)? {
                    result.duplicate = true;
                    return Ok(result);
                }
                ledger::record_delivery_in(conn, key, user_id, requirement_type, &now)?;
            }

            for chain in &read.value {
                ChainStep {
                    conn,
                    user_id,
                    requirement_type,
                    chain,
                    now,
                }
                .run(delta, amount, &mut result)?;
            }
            Ok(result)
        });
        let result = result.inspect_err(|err| {
            if err.is_retryable() {
                tracing::warn!(user_id, %requirement_type, error = %err, "progress rolled back");
            }
        })?;

        if result.duplicate {
            tracing::debug!(user_id, ?delivery_key, "duplicate delivery ignored");
        } else {
            tracing::debug!(
                user_id,
                %requirement_type,
                events = result.events.len(),
                completions = result.completions.len(),
                "progress recorded"
            );
        }
        Ok(result)
    }

    /// Mark a completed achievement's reward as paid and return it.
    ///
    /// # Errors
    /// `NotFound`, `NotCompleted` or `AlreadyClaimed`, checked in that order.
    pub fn claim_reward(&self, user_id: &str, achievement_id: i64) -> Result<Reward> {
        self.claim_reward_at(user_id, achievement_id, Utc::now())
    }

    pub fn claim_reward_at(
        &self,
        user_id: &str,
        achievement_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Reward> {
        validate_user(user_id)?;
        let reward = self.ledger.immediate(|conn| {
            let achievement = ledger::require_achievement(conn, achievement_id)?;
            if ledger::claim_in(conn, user_id, achievement_id, &now)? {
                return Ok(achievement.reward());
            }
            let claimed = ledger::progress_in(conn, user_id, achievement_id)?
                .is_some_and(|p| p.reward_claimed);
            let err = if claimed {
                AchievementError::AlreadyClaimed {
                    user_id: user_id.to_string(),
                    achievement_id,
                }
            } else {
                AchievementError::NotCompleted {
                    user_id: user_id.to_string(),
                    achievement_id,
                }
            };
            Err(err.into())
        });
        let reward = reward.inspect_err(|err| {
            if err.is_retryable() {
                tracing::warn!(user_id, achievement_id, error = %err, "claim rolled back");
            }
        })?;
        tracing::info!(user_id, achievement_id, ?reward, "reward claimed");
        Ok(reward)
    }

    /// Create zeroed progress rows for every active entry-tier achievement.
    pub fn initialize_user(&self, user_id: &str) -> Result<usize> {
        validate_user(user_id)?;
        let created = self.ledger.initialize_user(user_id, &Utc::now())?;
        tracing::debug!(user_id, created, "user initialized");
        Ok(created)
    }

    pub fn list_achievements(&self, user_id: &str) -> Result<Vec<AchievementWithProgress>> {
        self.ledger.list_user_achievements(user_id)
    }

    pub fn list_series_progress(&self, user_id: &str) -> Result<Vec<SeriesWithProgress>> {
        self.ledger.list_user_series(user_id)
    }

    pub fn get_progress(
        &self,
        user_id: &str,
        achievement_id: i64,
    ) -> Result<Option<UserAchievementProgress>> {
        self.ledger.get_progress(user_id, achievement_id)
    }

    /// Completions newer than `since`, most recent first.
    ///
    /// `limit` is clamped to `1..=5`.
    pub fn poll_recent_completions(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<CompletedAchievement>> {
        let limit = limit.clamp(1, MAX_RECENT_LIMIT);
        self.ledger.recent_completions(user_id, since.as_ref(), limit)
    }

    /// The configured display limit for recent completions.
    pub fn recent_limit(&self) -> u32 {
        self.recent_limit
    }
}

fn validate_user(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "user_id".into(),
            message: "must not be blank".into(),
        }
        .into());
    }
    Ok(())
}

/// One chain's share of a `record_progress` call, run inside the transaction.
struct ChainStep<'a> {
    conn: &'a Connection,
    user_id: &'a str,
    requirement_type: RequirementType,
    chain: &'a AchievementChain,
    now: DateTime<Utc>,
}

impl ChainStep<'_> {
    fn run(&self, delta: ProgressDelta, amount: u64, result: &mut ProgressResult) -> Result<()> {
        let max_tier = self.chain.max_tier();
        let mut cursor = match self.chain.series_id() {
            Some(series_id) => {
                ledger::series_progress_in(self.conn, self.user_id, series_id)?
                    .map_or(0, |p| p.current_tier)
            }
            None => 0,
        };
        let mut stepped = false;

        // Catch up a tier completed ahead of the cursor.
        if let Some(series_id) = self.chain.series_id() {
            if cursor < max_tier {
                if let Some(next) = self.chain.tier(cursor + 1) {
                    let done = ledger::progress_in(self.conn, self.user_id, next.id)?
                        .is_some_and(|p| p.is_completed);
                    if done {
                        self.advance(series_id, cursor, next, max_tier, result)?;
                        cursor += 1;
                        stepped = true;
                    }
                }
            }
        }

        let Some((target, row, seed)) = self.target(cursor, max_tier)? else {
            return Ok(());
        };
        let previous = row.as_ref().map_or(seed, |r| r.current_value);
        let new_value = delta.apply(previous, amount)?;
        // An untouched tier whose carried counter already meets it settles now.
        let carried = row.is_none() && previous >= target.requirement_value;
        if new_value <= previous && !carried {
            return Ok(());
        }

        let completed_at = (new_value >= target.requirement_value).then_some(self.now);
        match row {
            Some(_) => ledger::cas_update_progress(
                self.conn,
                self.user_id,
                target.id,
                previous,
                new_value,
                completed_at.as_ref(),
                &self.now,
            )?,
            None => ledger::insert_progress(
                self.conn,
                self.user_id,
                target.id,
                new_value,
                completed_at.as_ref(),
                &self.now,
            )?,
        }

        let Some(completed_at) = completed_at else {
            result.events.push(Event::ProgressRecorded {
                user_id: self.user_id.to_string(),
                achievement_id: target.id,
                requirement_type: self.requirement_type,
                previous_value: previous,
                current_value: new_value,
                at: self.now,
            });
            return Ok(());
        };

        let reward = target.reward();
        tracing::info!(
            user_id = self.user_id,
            achievement_id = target.id,
            tier_id = target.tier_id,
            "achievement completed"
        );
        result.completions.push(CompletionEvent {
            achievement_id: target.id,
            user_id: self.user_id.to_string(),
            series_id: target.series_id,
            tier_id: target.tier_id,
            reward,
            completed_at,
        });
        result.events.push(Event::AchievementCompleted {
            user_id: self.user_id.to_string(),
            achievement_id: target.id,
            series_id: target.series_id,
            tier_id: target.tier_id,
            reward,
            at: completed_at,
        });

        match self.chain.series_id() {
            None => {
                ledger::mark_next_tier_unlocked(self.conn, self.user_id, target.id, &self.now)?;
            }
            Some(series_id) if !stepped && target.tier_id == cursor + 1 => {
                self.advance(series_id, cursor, target, max_tier, result)?;
            }
            Some(series_id) => {
                tracing::warn!(
                    user_id = self.user_id,
                    series_id,
                    tier_id = target.tier_id,
                    cursor,
                    "tier completed ahead of cursor; cursor left in place"
                );
            }
        }
        Ok(())
    }

    /// Lowest tier above `cursor` that is not completed, its row (if any)
    /// and the counter a missing row starts from.
    fn target(
        &self,
        cursor: u8,
        max_tier: u8,
    ) -> Result<Option<(&GuildAchievement, Option<UserAchievementProgress>, u64)>> {
        let mut seed = 0;
        for achievement in &self.chain.tiers {
            if achievement.tier_id > max_tier {
                break;
            }
            let row = ledger::progress_in(self.conn, self.user_id, achievement.id)?;
            if achievement.tier_id > cursor && !row.as_ref().is_some_and(|r| r.is_completed) {
                return Ok(Some((achievement, row, seed)));
            }
            seed = row.map_or(seed, |r| r.current_value);
        }
        Ok(None)
    }

    fn advance(
        &self,
        series_id: i64,
        from_tier: u8,
        achievement: &GuildAchievement,
        max_tier: u8,
        result: &mut ProgressResult,
    ) -> Result<()> {
        let series_completed = achievement.tier_id >= max_tier;
        ledger::ensure_series_progress(self.conn, self.user_id, series_id, &self.now)?;
        ledger::cas_advance_cursor(
            self.conn,
            self.user_id,
            series_id,
            from_tier,
            achievement.id,
            series_completed,
            &self.now,
        )?;
        ledger::mark_next_tier_unlocked(self.conn, self.user_id, achievement.id, &self.now)?;

        result.events.push(Event::SeriesTierAdvanced {
            user_id: self.user_id.to_string(),
            series_id,
            from_tier,
            to_tier: from_tier + 1,
            at: self.now,
        });
        if series_completed {
            tracing::info!(user_id = self.user_id, series_id, "series completed");
            result.events.push(Event::SeriesCompleted {
                user_id: self.user_id.to_string(),
                series_id,
                at: self.now,
            });
        }
        Ok(())
    }
}
