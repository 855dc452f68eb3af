//! Ledger schema migrations.
//!
//! Migrations are versioned and applied automatically when opening the ledger.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

use crate::tier;

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the ledger to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (fresh database).
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    match conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    }) {
        Ok(version) => Ok(version),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: catalog and progress tables, tiers seeded from the static catalog.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS tiers (
            id              INTEGER PRIMARY KEY,
            multiplier      INTEGER NOT NULL,
            reward_base_xp  INTEGER NOT NULL,
            display_name    TEXT NOT NULL,
            color_token     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS achievement_series (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            name                    TEXT NOT NULL UNIQUE,
            description             TEXT NOT NULL DEFAULT '',
            category                TEXT NOT NULL,
            requirement_type        TEXT NOT NULL,
            base_requirement_value  INTEGER NOT NULL,
            base_reward_type        TEXT NOT NULL,
            base_reward_value       INTEGER NOT NULL,
            max_tier                INTEGER NOT NULL CHECK (max_tier BETWEEN 1 AND 6),
            is_active               INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS guild_achievements (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            series_id          INTEGER REFERENCES achievement_series(id),
            tier_id            INTEGER NOT NULL REFERENCES tiers(id),
            name               TEXT NOT NULL UNIQUE,
            description        TEXT NOT NULL DEFAULT '',
            category           TEXT NOT NULL,
            requirement_type   TEXT NOT NULL,
            requirement_value  INTEGER NOT NULL CHECK (requirement_value > 0),
            reward_type        TEXT NOT NULL,
            reward_value       INTEGER NOT NULL,
            is_active          INTEGER NOT NULL DEFAULT 1,
            UNIQUE (series_id, tier_id)
        );

        CREATE TABLE IF NOT EXISTS user_achievement_progress (
            user_id             TEXT NOT NULL,
            achievement_id      INTEGER NOT NULL REFERENCES guild_achievements(id),
            current_value       INTEGER NOT NULL DEFAULT 0 CHECK (current_value >= 0),
            is_completed        INTEGER NOT NULL DEFAULT 0,
            completed_at        TEXT,
            reward_claimed      INTEGER NOT NULL DEFAULT 0,
            claimed_at          TEXT,
            next_tier_unlocked  INTEGER NOT NULL DEFAULT 0,
            updated_at          TEXT NOT NULL,
            PRIMARY KEY (user_id, achievement_id),
            CHECK ((is_completed = 1) = (completed_at IS NOT NULL)),
            CHECK (reward_claimed = 0 OR is_completed = 1)
        );

        CREATE TABLE IF NOT EXISTS user_series_progress (
            user_id                 TEXT NOT NULL,
            series_id               INTEGER NOT NULL REFERENCES achievement_series(id),
            current_tier            INTEGER NOT NULL DEFAULT 0 CHECK (current_tier BETWEEN 0 AND 6),
            highest_achievement_id  INTEGER REFERENCES guild_achievements(id),
            is_completed            INTEGER NOT NULL DEFAULT 0,
            completed_at            TEXT,
            updated_at              TEXT NOT NULL,
            PRIMARY KEY (user_id, series_id)
        );

        CREATE INDEX IF NOT EXISTS idx_achievements_requirement_type
            ON guild_achievements(requirement_type, is_active);",
    )?;

    for t in tier::all_tiers() {
        tx.execute(
            "INSERT OR REPLACE INTO tiers (id, multiplier, reward_base_xp, display_name, color_token)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![t.id, t.multiplier, t.reward_base_xp, t.display_name, t.color_token],
        )?;
    }

    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: delivery deduplication and the recent-completions index.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS processed_deliveries (
            delivery_key      TEXT PRIMARY KEY,
            user_id           TEXT NOT NULL,
            requirement_type  TEXT NOT NULL,
            processed_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_progress_user_completed_at
            ON user_achievement_progress(user_id, completed_at)
            WHERE is_completed = 1;",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()
}
