//! SQLite-backed achievement catalog and progress ledger.
//!
//! Provides persistent storage for:
//! - Achievement series and their tier instances
//! - Per-user achievement counters and completion/claim flags
//! - Per-user series tier cursors
//! - Processed delivery keys
//!
//! The ledger is the only mutable state of the engine. Every write goes
//! through [`Ledger::immediate`], which holds the SQLite write lock for the
//! whole read-modify-write cycle, and every update is additionally guarded
//! by a compare-and-swap predicate.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{migrations, Config};
use crate::catalog::{CatalogFile, Category, RequirementType, Reward, RewardType};
use crate::error::{AchievementError, CoreError, DatabaseError, Result};
use crate::tier::{self, Tier, FIRST_TIER};

const ACHIEVEMENT_COLUMNS: &str = "a.id, a.series_id, a.tier_id, a.name, a.description, \
     a.category, a.requirement_type, a.requirement_value, a.reward_type, a.reward_value, a.is_active";
const ACHIEVEMENT_WIDTH: usize = 11;

const SERIES_COLUMNS: &str = "s.id, s.name, s.description, s.category, s.requirement_type, \
     s.base_requirement_value, s.base_reward_type, s.base_reward_value, s.max_tier, s.is_active";
const SERIES_WIDTH: usize = 10;

const PROGRESS_COLUMNS: &str = "p.user_id, p.achievement_id, p.current_value, p.is_completed, \
     p.completed_at, p.reward_claimed, p.claimed_at, p.next_tier_unlocked, p.updated_at";

const SERIES_PROGRESS_COLUMNS: &str = "sp.user_id, sp.series_id, sp.current_tier, \
     sp.highest_achievement_id, sp.is_completed, sp.completed_at, sp.updated_at";

/// A tiered series row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementSeries {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub requirement_type: RequirementType,
    pub base_requirement_value: u64,
    pub base_reward_type: RewardType,
    pub base_reward_value: u64,
    pub max_tier: u8,
    pub is_active: bool,
}

/// A tier instance (or a standalone achievement when `series_id` is `None`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildAchievement {
    pub id: i64,
    pub series_id: Option<i64>,
    pub tier_id: u8,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub requirement_type: RequirementType,
    pub requirement_value: u64,
    pub reward_type: RewardType,
    pub reward_value: u64,
    pub is_active: bool,
}

impl GuildAchievement {
    pub fn reward(&self) -> Reward {
        Reward {
            reward_type: self.reward_type,
            value: self.reward_value,
        }
    }

    pub fn tier(&self) -> Result<&'static Tier> {
        tier::tier_by_id(self.tier_id)
    }

    pub fn is_standalone(&self) -> bool {
        self.series_id.is_none()
    }
}

/// Per-user counter for one achievement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAchievementProgress {
    pub user_id: String,
    pub achievement_id: i64,
    pub current_value: u64,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub reward_claimed: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    pub next_tier_unlocked: bool,
    pub updated_at: DateTime<Utc>,
}

/// Per-user tier cursor for one series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSeriesProgress {
    pub user_id: String,
    pub series_id: i64,
    pub current_tier: u8,
    pub highest_achievement_id: Option<i64>,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// A completion as surfaced to notification consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedAchievement {
    pub achievement_id: i64,
    pub series_id: Option<i64>,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub tier_id: u8,
    pub tier_name: String,
    pub color_token: String,
    pub reward: Reward,
    pub completed_at: DateTime<Utc>,
}

/// Listing row: an achievement, its tier display data and the user's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementWithProgress {
    pub achievement: GuildAchievement,
    pub tier_name: String,
    pub color_token: String,
    pub progress: Option<UserAchievementProgress>,
}

/// Listing row: a series, the user's cursor and the next tier to earn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesWithProgress {
    pub series: AchievementSeries,
    pub progress: Option<UserSeriesProgress>,
    pub next_achievement: Option<GuildAchievement>,
}

/// An achievement chain tracking one requirement type.
///
/// Standalone achievements are chains of length one with no series row, so
/// the engine walks every chain the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchievementChain {
    pub series: Option<AchievementSeries>,
    /// Active tier instances ordered by tier id.
    pub tiers: Vec<GuildAchievement>,
}

impl AchievementChain {
    pub fn max_tier(&self) -> u8 {
        self.series.as_ref().map_or(FIRST_TIER, |s| s.max_tier)
    }

    pub fn series_id(&self) -> Option<i64> {
        self.series.as_ref().map(|s| s.id)
    }

    pub fn tier(&self, tier_id: u8) -> Option<&GuildAchievement> {
        self.tiers.iter().find(|a| a.tier_id == tier_id)
    }
}

/// Counts written by [`Ledger::install_catalog`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub series: usize,
    pub achievements: usize,
}

// === Helper Functions ===

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
pub(crate) fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_ts(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_opt_ts(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn parse_text<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn achievement_from_row(row: &Row, base: usize) -> rusqlite::Result<GuildAchievement> {
    Ok(GuildAchievement {
        id: row.get(base)?,
        series_id: row.get(base + 1)?,
        tier_id: row.get(base + 2)?,
        name: row.get(base + 3)?,
        description: row.get(base + 4)?,
        category: parse_text(row, base + 5)?,
        requirement_type: parse_text(row, base + 6)?,
        requirement_value: row.get(base + 7)?,
        reward_type: parse_text(row, base + 8)?,
        reward_value: row.get(base + 9)?,
        is_active: row.get(base + 10)?,
    })
}

fn series_from_row(row: &Row, base: usize) -> rusqlite::Result<AchievementSeries> {
    Ok(AchievementSeries {
        id: row.get(base)?,
        name: row.get(base + 1)?,
        description: row.get(base + 2)?,
        category: parse_text(row, base + 3)?,
        requirement_type: parse_text(row, base + 4)?,
        base_requirement_value: row.get(base + 5)?,
        base_reward_type: parse_text(row, base + 6)?,
        base_reward_value: row.get(base + 7)?,
        max_tier: row.get(base + 8)?,
        is_active: row.get(base + 9)?,
    })
}

/// Maps progress columns; `None` when a LEFT JOIN found no row.
fn progress_from_row(row: &Row, base: usize) -> rusqlite::Result<Option<UserAchievementProgress>> {
    let user_id: Option<String> = row.get(base)?;
    let Some(user_id) = user_id else {
        return Ok(None);
    };
    Ok(Some(UserAchievementProgress {
        user_id,
        achievement_id: row.get(base + 1)?,
        current_value: row.get(base + 2)?,
        is_completed: row.get(base + 3)?,
        completed_at: parse_opt_ts(row, base + 4)?,
        reward_claimed: row.get(base + 5)?,
        claimed_at: parse_opt_ts(row, base + 6)?,
        next_tier_unlocked: row.get(base + 7)?,
        updated_at: parse_ts(row, base + 8)?,
    }))
}

fn series_progress_from_row(row: &Row, base: usize) -> rusqlite::Result<Option<UserSeriesProgress>> {
    let user_id: Option<String> = row.get(base)?;
    let Some(user_id) = user_id else {
        return Ok(None);
    };
    Ok(Some(UserSeriesProgress {
        user_id,
        series_id: row.get(base + 1)?,
        current_tier: row.get(base + 2)?,
        highest_achievement_id: row.get(base + 3)?,
        is_completed: row.get(base + 4)?,
        completed_at: parse_opt_ts(row, base + 5)?,
        updated_at: parse_ts(row, base + 6)?,
    }))
}

// === Statements usable inside a transaction ===

pub(crate) fn achievement_in(conn: &Connection, id: i64) -> Result<Option<GuildAchievement>> {
    let sql = format!("SELECT {ACHIEVEMENT_COLUMNS} FROM guild_achievements a WHERE a.id = ?1");
    Ok(conn
        .query_row(&sql, params![id], |row| achievement_from_row(row, 0))
        .optional()?)
}

pub(crate) fn progress_in(
    conn: &Connection,
    user_id: &str,
    achievement_id: i64,
) -> Result<Option<UserAchievementProgress>> {
    let sql = format!(
        "SELECT {PROGRESS_COLUMNS} FROM user_achievement_progress p
         WHERE p.user_id = ?1 AND p.achievement_id = ?2"
    );
    let row = conn
        .query_row(&sql, params![user_id, achievement_id], |row| {
            progress_from_row(row, 0)
        })
        .optional()?;
    Ok(row.flatten())
}

pub(crate) fn series_progress_in(
    conn: &Connection,
    user_id: &str,
    series_id: i64,
) -> Result<Option<UserSeriesProgress>> {
    let sql = format!(
        "SELECT {SERIES_PROGRESS_COLUMNS} FROM user_series_progress sp
         WHERE sp.user_id = ?1 AND sp.series_id = ?2"
    );
    let row = conn
        .query_row(&sql, params![user_id, series_id], |row| {
            series_progress_from_row(row, 0)
        })
        .optional()?;
    Ok(row.flatten())
}

/// Insert a progress row that does not exist yet.
pub(crate) fn insert_progress(
    conn: &Connection,
    user_id: &str,
    achievement_id: i64,
    current_value: u64,
    completed_at: Option<&DateTime<Utc>>,
    now: &DateTime<Utc>,
) -> Result<()> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO user_achievement_progress
            (user_id, achievement_id, current_value, is_completed, completed_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user_id,
            achievement_id,
            current_value,
            completed_at.is_some(),
            completed_at.map(format_ts),
            format_ts(now),
        ],
    )?;
    if changed != 1 {
        return Err(AchievementError::StoreConflict(format!(
            "progress row ({user_id}, {achievement_id}) appeared concurrently"
        ))
        .into());
    }
    Ok(())
}

/// Conditional counter update for a row that is not yet completed.
///
/// Applies only if the row still holds `expected_value`; the completion flag
/// and timestamp flip together.
pub(crate) fn cas_update_progress(
    conn: &Connection,
    user_id: &str,
    achievement_id: i64,
    expected_value: u64,
    new_value: u64,
    completed_at: Option<&DateTime<Utc>>,
    now: &DateTime<Utc>,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE user_achievement_progress
         SET current_value = ?3, is_completed = ?4, completed_at = ?5, updated_at = ?6
         WHERE user_id = ?1 AND achievement_id = ?2
           AND current_value = ?7 AND is_completed = 0",
        params![
            user_id,
            achievement_id,
            new_value,
            completed_at.is_some(),
            completed_at.map(format_ts),
            format_ts(now),
            expected_value,
        ],
    )?;
    if changed != 1 {
        return Err(AchievementError::StoreConflict(format!(
            "progress row ({user_id}, {achievement_id}) changed underneath update"
        ))
        .into());
    }
    Ok(())
}

pub(crate) fn mark_next_tier_unlocked(
    conn: &Connection,
    user_id: &str,
    achievement_id: i64,
    now: &DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE user_achievement_progress SET next_tier_unlocked = 1, updated_at = ?3
         WHERE user_id = ?1 AND achievement_id = ?2 AND is_completed = 1",
        params![user_id, achievement_id, format_ts(now)],
    )?;
    Ok(())
}

pub(crate) fn ensure_series_progress(
    conn: &Connection,
    user_id: &str,
    series_id: i64,
    now: &DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO user_series_progress (user_id, series_id, current_tier, updated_at)
         VALUES (?1, ?2, 0, ?3)",
        params![user_id, series_id, format_ts(now)],
    )?;
    Ok(())
}

/// Move a series cursor from `expected_tier` to `expected_tier + 1`.
///
/// A series reopened by a raised `max_tier` loses its completed flag until
/// the cursor reaches the new top tier.
pub(crate) fn cas_advance_cursor(
    conn: &Connection,
    user_id: &str,
    series_id: i64,
    expected_tier: u8,
    achievement_id: i64,
    series_completed: bool,
    now: &DateTime<Utc>,
) -> Result<()> {
    let stamp = format_ts(now);
    let changed = conn.execute(
        "UPDATE user_series_progress
         SET current_tier = current_tier + 1,
             highest_achievement_id = ?4,
             is_completed = ?5,
             completed_at = CASE WHEN ?5 THEN ?6 ELSE NULL END,
             updated_at = ?6
         WHERE user_id = ?1 AND series_id = ?2 AND current_tier = ?3",
        params![
            user_id,
            series_id,
            expected_tier,
            achievement_id,
            series_completed,
            stamp
        ],
    )?;
    if changed != 1 {
        return Err(AchievementError::StoreConflict(format!(
            "series cursor ({user_id}, {series_id}) moved away from tier {expected_tier}"
        ))
        .into());
    }
    Ok(())
}

pub(crate) fn delivery_seen_in(conn: &Connection, delivery_key: &str) -> Result<bool> {
    let seen = conn
        .query_row(
            "SELECT 1 FROM processed_deliveries WHERE delivery_key = ?1",
            params![delivery_key],
            |_| Ok(()),
        )
        .optional()?;
    Ok(seen.is_some())
}

pub(crate) fn record_delivery_in(
    conn: &Connection,
    delivery_key: &str,
    user_id: &str,
    requirement_type: RequirementType,
    now: &DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO processed_deliveries (delivery_key, user_id, requirement_type, processed_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![delivery_key, user_id, requirement_type.as_str(), format_ts(now)],
    )?;
    Ok(())
}

/// Claim guarded by `reward_claimed = 0`; returns whether this call won.
pub(crate) fn claim_in(
    conn: &Connection,
    user_id: &str,
    achievement_id: i64,
    now: &DateTime<Utc>,
) -> Result<bool> {
    let stamp = format_ts(now);
    let changed = conn.execute(
        "UPDATE user_achievement_progress
         SET reward_claimed = 1, claimed_at = ?3, updated_at = ?3
         WHERE user_id = ?1 AND achievement_id = ?2 AND is_completed = 1 AND reward_claimed = 0",
        params![user_id, achievement_id, stamp],
    )?;
    Ok(changed == 1)
}

/// SQLite ledger for achievement catalog and progress.
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the ledger configured in `config` (inside the data directory).
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(config: &Config) -> Result<Self> {
        let path = config.database_path()?;
        Self::open_path(&path, config.busy_timeout())
    }

    /// Open a ledger file at an explicit path.
    pub fn open_path(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(busy_timeout)?;
        // WAL lets readers (notification polls) proceed while a writer holds the lock.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory ledger (for tests and dry runs).
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Run `f` inside `BEGIN IMMEDIATE`, committing on success and rolling
    /// back on any error.
    pub(crate) fn immediate<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        match f(&self.conn) {
            Ok(value) => match self.conn.execute_batch("COMMIT;") {
                Ok(()) => Ok(value),
                Err(err) => {
                    let _ = self.conn.execute_batch("ROLLBACK;");
                    Err(err.into())
                }
            },
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }

    // === Catalog ===

    /// Upsert series, their tier instances, and standalone achievements.
    ///
    /// Scaled requirement and reward values of already-issued achievements
    /// are never rewritten, so existing progress rows keep their meaning;
    /// a series' `max_tier` can only grow.
    pub fn install_catalog(&self, catalog: &CatalogFile) -> Result<CatalogSummary> {
        catalog.validate()?;
        self.immediate(|conn| {
            let mut summary = CatalogSummary::default();
            for def in &catalog.series {
                conn.execute(
                    "INSERT INTO achievement_series
                        (name, description, category, requirement_type, base_requirement_value,
                         base_reward_type, base_reward_value, max_tier, is_active)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(name) DO UPDATE SET
                        description = excluded.description,
                        max_tier = MAX(achievement_series.max_tier, excluded.max_tier),
                        is_active = excluded.is_active",
                    params![
                        def.name,
                        def.description,
                        def.category.as_str(),
                        def.requirement_type.as_str(),
                        def.base_requirement_value,
                        def.base_reward_type.as_str(),
                        def.base_reward_value,
                        def.max_tier,
                        def.is_active,
                    ],
                )?;
                let series_id: i64 = conn.query_row(
                    "SELECT id FROM achievement_series WHERE name = ?1",
                    params![def.name],
                    |row| row.get(0),
                )?;
                summary.series += 1;

                for draft in def.tier_instances()? {
                    conn.execute(
                        "INSERT INTO guild_achievements
                            (series_id, tier_id, name, description, category, requirement_type,
                             requirement_value, reward_type, reward_value, is_active)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                         ON CONFLICT(series_id, tier_id) DO UPDATE SET
                            description = excluded.description,
                            is_active = excluded.is_active",
                        params![
                            series_id,
                            draft.tier_id,
                            draft.name,
                            draft.description,
                            def.category.as_str(),
                            def.requirement_type.as_str(),
                            draft.requirement_value,
                            def.base_reward_type.as_str(),
                            draft.reward_value,
                            def.is_active,
                        ],
                    )?;
                    summary.achievements += 1;
                }
            }

            for def in &catalog.standalone {
                conn.execute(
                    "INSERT INTO guild_achievements
                        (series_id, tier_id, name, description, category, requirement_type,
                         requirement_value, reward_type, reward_value, is_active)
                     VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(name) DO UPDATE SET
                        description = excluded.description,
                        is_active = excluded.is_active
                     WHERE guild_achievements.series_id IS NULL",
                    params![
                        FIRST_TIER,
                        def.name,
                        def.description,
                        def.category.as_str(),
                        def.requirement_type.as_str(),
                        def.requirement_value,
                        def.reward_type.as_str(),
                        def.reward_value,
                        def.is_active,
                    ],
                )?;
                summary.achievements += 1;
            }
            Ok(summary)
        })
    }

    pub fn get_series(&self, id: i64) -> Result<Option<AchievementSeries>> {
        let sql = format!("SELECT {SERIES_COLUMNS} FROM achievement_series s WHERE s.id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], |row| series_from_row(row, 0))
            .optional()?)
    }

    pub fn list_series(&self) -> Result<Vec<AchievementSeries>> {
        let sql = format!("SELECT {SERIES_COLUMNS} FROM achievement_series s ORDER BY s.id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| series_from_row(row, 0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_achievement(&self, id: i64) -> Result<Option<GuildAchievement>> {
        achievement_in(&self.conn, id)
    }

    /// Every issued achievement, series tiers grouped in tier order.
    pub fn list_catalog_achievements(&self) -> Result<Vec<GuildAchievement>> {
        let sql = format!(
            "SELECT {ACHIEVEMENT_COLUMNS} FROM guild_achievements a
             ORDER BY COALESCE(a.series_id, 0), a.tier_id, a.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| achievement_from_row(row, 0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Active chains tracking `requirement_type`.
    ///
    /// Series achievements resolve through their (active) series; standalone
    /// achievements each form their own chain.
    pub fn chains_for_requirement(
        &self,
        requirement_type: RequirementType,
    ) -> Result<Vec<AchievementChain>> {
        let sql = format!(
            "SELECT {ACHIEVEMENT_COLUMNS}, {SERIES_COLUMNS}
             FROM guild_achievements a
             LEFT JOIN achievement_series s ON s.id = a.series_id
             WHERE a.is_active = 1
               AND (a.series_id IS NULL
                    OR (s.is_active = 1 AND s.requirement_type = ?1))
               AND a.requirement_type = ?1
             ORDER BY COALESCE(a.series_id, 0), a.tier_id, a.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![requirement_type.as_str()], |row| {
            let achievement = achievement_from_row(row, 0)?;
            let series = match achievement.series_id {
                Some(_) => Some(series_from_row(row, ACHIEVEMENT_WIDTH)?),
                None => None,
            };
            Ok((achievement, series))
        })?;

        let mut chains: Vec<AchievementChain> = Vec::new();
        for row in rows {
            let (achievement, series) = row?;
            match series {
                Some(series) => match chains.last_mut() {
                    Some(chain) if chain.series_id() == Some(series.id) => {
                        chain.tiers.push(achievement);
                    }
                    _ => chains.push(AchievementChain {
                        series: Some(series),
                        tiers: vec![achievement],
                    }),
                },
                None => chains.push(AchievementChain {
                    series: None,
                    tiers: vec![achievement],
                }),
            }
        }
        Ok(chains)
    }

    // === Progress reads ===

    pub fn get_progress(
        &self,
        user_id: &str,
        achievement_id: i64,
    ) -> Result<Option<UserAchievementProgress>> {
        progress_in(&self.conn, user_id, achievement_id)
    }

    pub fn get_series_progress(
        &self,
        user_id: &str,
        series_id: i64,
    ) -> Result<Option<UserSeriesProgress>> {
        series_progress_in(&self.conn, user_id, series_id)
    }

    /// Active achievements with the user's progress (if any).
    pub fn list_user_achievements(&self, user_id: &str) -> Result<Vec<AchievementWithProgress>> {
        let sql = format!(
            "SELECT {ACHIEVEMENT_COLUMNS}, t.display_name, t.color_token, {PROGRESS_COLUMNS}
             FROM guild_achievements a
             JOIN tiers t ON t.id = a.tier_id
             LEFT JOIN user_achievement_progress p
               ON p.achievement_id = a.id AND p.user_id = ?1
             WHERE a.is_active = 1
             ORDER BY a.category, COALESCE(a.series_id, 0), a.tier_id, a.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(AchievementWithProgress {
                achievement: achievement_from_row(row, 0)?,
                tier_name: row.get(ACHIEVEMENT_WIDTH)?,
                color_token: row.get(ACHIEVEMENT_WIDTH + 1)?,
                progress: progress_from_row(row, ACHIEVEMENT_WIDTH + 2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Active series with the user's cursor and the next tier to earn.
    pub fn list_user_series(&self, user_id: &str) -> Result<Vec<SeriesWithProgress>> {
        let sql = format!(
            "SELECT {SERIES_COLUMNS}, {SERIES_PROGRESS_COLUMNS}
             FROM achievement_series s
             LEFT JOIN user_series_progress sp
               ON sp.series_id = s.id AND sp.user_id = ?1
             WHERE s.is_active = 1
             ORDER BY s.id"
        );
        let listed = {
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params![user_id], |row| {
                Ok((
                    series_from_row(row, 0)?,
                    series_progress_from_row(row, SERIES_WIDTH)?,
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let next_sql = format!(
            "SELECT {ACHIEVEMENT_COLUMNS} FROM guild_achievements a
             WHERE a.series_id = ?1 AND a.tier_id = ?2"
        );
        let mut next_stmt = self.conn.prepare(&next_sql)?;
        let mut result = Vec::with_capacity(listed.len());
        for (series, progress) in listed {
            let current_tier = progress.as_ref().map_or(0, |p| p.current_tier);
            let next_achievement = if current_tier < series.max_tier {
                next_stmt
                    .query_row(params![series.id, current_tier + 1], |row| {
                        achievement_from_row(row, 0)
                    })
                    .optional()?
            } else {
                None
            };
            result.push(SeriesWithProgress {
                series,
                progress,
                next_achievement,
            });
        }
        Ok(result)
    }

    /// Completed achievements, most recent first, optionally strictly after `since`.
    pub fn recent_completions(
        &self,
        user_id: &str,
        since: Option<&DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<CompletedAchievement>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.series_id, a.name, a.description, a.category, a.tier_id,
                    t.display_name, t.color_token, a.reward_type, a.reward_value, p.completed_at
             FROM user_achievement_progress p
             JOIN guild_achievements a ON a.id = p.achievement_id
             JOIN tiers t ON t.id = a.tier_id
             WHERE p.user_id = ?1 AND p.is_completed = 1
               AND (?2 IS NULL OR p.completed_at > ?2)
             ORDER BY p.completed_at DESC, a.id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![user_id, since.map(format_ts), limit], |row| {
            Ok(CompletedAchievement {
                achievement_id: row.get(0)?,
                series_id: row.get(1)?,
                name: row.get(2)?,
                description: row.get(3)?,
                category: parse_text(row, 4)?,
                tier_id: row.get(5)?,
                tier_name: row.get(6)?,
                color_token: row.get(7)?,
                reward: Reward {
                    reward_type: parse_text(row, 8)?,
                    value: row.get(9)?,
                },
                completed_at: parse_ts(row, 10)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Create zeroed progress rows for every active entry-tier achievement.
    ///
    /// Returns how many rows were created; existing rows are untouched.
    pub fn initialize_user(&self, user_id: &str, now: &DateTime<Utc>) -> Result<usize> {
        self.immediate(|conn| {
            let created = conn.execute(
                "INSERT OR IGNORE INTO user_achievement_progress
                    (user_id, achievement_id, current_value, is_completed, updated_at)
                 SELECT ?1, a.id, 0, 0, ?2
                 FROM guild_achievements a
                 WHERE a.is_active = 1 AND a.tier_id = ?3",
                params![user_id, format_ts(now), FIRST_TIER],
            )?;
            Ok(created)
        })
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("path", &self.conn.path())
            .finish()
    }
}

/// Unknown achievement ids surface as `NotFound`.
pub(crate) fn require_achievement(conn: &Connection, id: i64) -> Result<GuildAchievement> {
    achievement_in(conn, id)?
        .ok_or_else(|| CoreError::from(AchievementError::achievement_not_found(id)))
}
