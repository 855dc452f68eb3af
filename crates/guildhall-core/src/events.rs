use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{RequirementType, Reward};

/// Every state change made by the progression engine produces an Event.
/// Callers forward them to feeds, notification channels or audit logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A counter moved upward without completing.
    ProgressRecorded {
        user_id: String,
        achievement_id: i64,
        requirement_type: RequirementType,
        previous_value: u64,
        current_value: u64,
        at: DateTime<Utc>,
    },
    AchievementCompleted {
        user_id: String,
        achievement_id: i64,
        series_id: Option<i64>,
        tier_id: u8,
        reward: Reward,
        at: DateTime<Utc>,
    },
    /// A series cursor moved up one tier.
    SeriesTierAdvanced {
        user_id: String,
        series_id: i64,
        from_tier: u8,
        to_tier: u8,
        at: DateTime<Utc>,
    },
    /// The cursor reached the series' max tier.
    SeriesCompleted {
        user_id: String,
        series_id: i64,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::ProgressRecorded { at, .. }
            | Event::AchievementCompleted { at, .. }
            | Event::SeriesTierAdvanced { at, .. }
            | Event::SeriesCompleted { at, .. } => *at,
        }
    }
}
