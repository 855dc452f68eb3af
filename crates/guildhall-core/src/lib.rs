//! # Guildhall Core Library
//!
//! This library provides the achievement progression engine for Guildhall
//! community servers. Raw activity counters (messages sent, wallets linked,
//! events attended, ...) drive tiered achievement series and standalone
//! achievements, complete them, advance series tiers and pay out rewards.
//! The CLI binary is a thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Tier Catalog**: Static Bronze..Master tiers that scale requirements
//!   and rewards
//! - **Catalog**: Series and standalone definitions, loadable from TOML
//! - **Ledger**: SQLite-backed catalog and per-user progress, with
//!   TOML-based configuration
//! - **Engine**: Progress application, completion detection, cursor
//!   advancement and reward claims, one serialized transaction per call
//! - **Notifications**: Poll-based completion surfacing with auto-dismiss
//!
//! ## Key Components
//!
//! - [`ProgressionEngine`]: Records progress and claims rewards
//! - [`Ledger`]: Catalog and progress persistence
//! - [`Config`]: Application configuration management
//! - [`NotificationSurfacer`]: Client-side completion poller

pub mod cache;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod events;
pub mod notify;
pub mod storage;
pub mod tier;

pub use cache::{Cache, CacheRead, FallbackPolicy, Freshness};
pub use catalog::{
    default_catalog, CatalogFile, Category, RequirementType, Reward, RewardType,
    SeriesDefinition, StandaloneDefinition,
};
pub use engine::{CompletionEvent, ProgressDelta, ProgressResult, ProgressionEngine};
pub use error::{AchievementError, ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::Event;
pub use notify::{CompletionSource, Notification, NotificationSurfacer};
pub use storage::{Config, Ledger};
pub use tier::{all_tiers, next_tier, scale_requirement, scale_reward, tier_by_id, Tier};
