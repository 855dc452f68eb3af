//! Series and achievement definitions.
//!
//! A series groups an ordered chain of tier-specific achievements sharing a
//! base requirement and reward that the tier catalog scales. Standalone
//! achievements have no series and behave as a chain of one.
//!
//! Definitions are plain serde types so a guild can ship its catalog as a
//! TOML file (`[[series]]` / `[[standalone]]` tables); [`default_catalog`]
//! provides the built-in one.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::tier::{self, FIRST_TIER, MAX_TIER};

/// Largest base value whose Master-tier scaling still fits an SQLite integer.
const MAX_BASE_VALUE: u64 = (i64::MAX as u64) / 12;

/// Achievement grouping shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Onboarding,
    Community,
    Web3,
    Gaming,
    Content,
    Special,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Onboarding => "onboarding",
            Category::Community => "community",
            Category::Web3 => "web3",
            Category::Gaming => "gaming",
            Category::Content => "content",
            Category::Special => "special",
        }
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onboarding" => Ok(Category::Onboarding),
            "community" => Ok(Category::Community),
            "web3" => Ok(Category::Web3),
            "gaming" => Ok(Category::Gaming),
            "content" => Ok(Category::Content),
            "special" => Ok(Category::Special),
            other => Err(ValidationError::InvalidValue {
                field: "category".into(),
                message: format!("unknown category '{other}'"),
            }),
        }
    }
}

/// The raw activity counter an achievement tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementType {
    ProfileCompleted,
    WalletsLinked,
    MessagesSent,
    NewsPosted,
    StreamsWatched,
    DaysActive,
    FriendsInvited,
    EventsAttended,
}

impl RequirementType {
    pub const ALL: [RequirementType; 8] = [
        RequirementType::ProfileCompleted,
        RequirementType::WalletsLinked,
        RequirementType::MessagesSent,
        RequirementType::NewsPosted,
        RequirementType::StreamsWatched,
        RequirementType::DaysActive,
        RequirementType::FriendsInvited,
        RequirementType::EventsAttended,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementType::ProfileCompleted => "profile_completed",
            RequirementType::WalletsLinked => "wallets_linked",
            RequirementType::MessagesSent => "messages_sent",
            RequirementType::NewsPosted => "news_posted",
            RequirementType::StreamsWatched => "streams_watched",
            RequirementType::DaysActive => "days_active",
            RequirementType::FriendsInvited => "friends_invited",
            RequirementType::EventsAttended => "events_attended",
        }
    }
}

impl fmt::Display for RequirementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequirementType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequirementType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "requirement_type".into(),
                message: format!("unknown requirement type '{s}'"),
            })
    }
}

/// What a completed achievement pays out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    Xp,
    Badge,
    Title,
    Token,
}

impl RewardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardType::Xp => "xp",
            RewardType::Badge => "badge",
            RewardType::Title => "title",
            RewardType::Token => "token",
        }
    }
}

impl FromStr for RewardType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xp" => Ok(RewardType::Xp),
            "badge" => Ok(RewardType::Badge),
            "title" => Ok(RewardType::Title),
            "token" => Ok(RewardType::Token),
            other => Err(ValidationError::InvalidValue {
                field: "reward_type".into(),
                message: format!("unknown reward type '{other}'"),
            }),
        }
    }
}

/// A payout: the reward type and its (tier-scaled) amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub reward_type: RewardType,
    pub value: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_tier() -> u8 {
    MAX_TIER
}

/// A tiered series as written in a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    pub requirement_type: RequirementType,
    pub base_requirement_value: u64,
    pub base_reward_type: RewardType,
    pub base_reward_value: u64,
    #[serde(default = "default_max_tier")]
    pub max_tier: u8,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// A single achievement outside any series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandaloneDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    pub requirement_type: RequirementType,
    pub requirement_value: u64,
    pub reward_type: RewardType,
    pub reward_value: u64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// A tier instance ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchievementDraft {
    pub name: String,
    pub description: String,
    pub tier_id: u8,
    pub requirement_value: u64,
    pub reward_value: u64,
}

impl SeriesDefinition {
    /// Check the definition before it reaches the ledger.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let reject = |message: String| ValidationError::InvalidDefinition {
            name: self.name.clone(),
            message,
        };
        if self.name.trim().is_empty() {
            return Err(reject("name must not be blank".into()));
        }
        if !(FIRST_TIER..=MAX_TIER).contains(&self.max_tier) {
            return Err(reject(format!(
                "max_tier {} outside {FIRST_TIER}..={MAX_TIER}",
                self.max_tier
            )));
        }
        if self.base_requirement_value == 0 {
            return Err(reject("base_requirement_value must be positive".into()));
        }
        if self.base_requirement_value > MAX_BASE_VALUE || self.base_reward_value > MAX_BASE_VALUE {
            return Err(reject("base values too large".into()));
        }
        Ok(())
    }

    /// Materialize one achievement per tier `1..=max_tier`.
    ///
    /// # Errors
    /// Returns a validation error for an invalid definition.
    pub fn tier_instances(&self) -> Result<Vec<AchievementDraft>> {
        self.validate()?;
        (FIRST_TIER..=self.max_tier)
            .map(|tier_id| {
                let tier = tier::tier_by_id(tier_id)?;
                Ok(AchievementDraft {
                    name: format!("{} {}", self.name, tier.display_name),
                    description: self.description.clone(),
                    tier_id,
                    requirement_value: tier::scale_requirement(self.base_requirement_value, tier_id)?,
                    reward_value: tier::scale_reward(self.base_reward_value, tier_id)?,
                })
            })
            .collect()
    }
}

impl StandaloneDefinition {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let reject = |message: &str| ValidationError::InvalidDefinition {
            name: self.name.clone(),
            message: message.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(reject("name must not be blank"));
        }
        if self.requirement_value == 0 {
            return Err(reject("requirement_value must be positive"));
        }
        if self.requirement_value > MAX_BASE_VALUE || self.reward_value > MAX_BASE_VALUE {
            return Err(reject("values too large"));
        }
        Ok(())
    }
}

/// Contents of an achievements catalog file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub series: Vec<SeriesDefinition>,
    #[serde(default)]
    pub standalone: Vec<StandaloneDefinition>,
}

impl CatalogFile {
    /// Parse a catalog from TOML text and validate every entry.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let catalog: CatalogFile = toml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load and validate a catalog file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut names = std::collections::HashSet::new();
        for series in &self.series {
            series.validate()?;
            if !names.insert(series.name.as_str()) {
                return Err(ValidationError::InvalidDefinition {
                    name: series.name.clone(),
                    message: "duplicate series name".into(),
                });
            }
        }
        let tier_names: std::collections::HashSet<String> = self
            .series
            .iter()
            .flat_map(|series| {
                tier::all_tiers()
                    .iter()
                    .map(move |t| format!("{} {}", series.name, t.display_name))
            })
            .collect();
        names.clear();
        for item in &self.standalone {
            item.validate()?;
            if tier_names.contains(&item.name) {
                return Err(ValidationError::InvalidDefinition {
                    name: item.name.clone(),
                    message: "name collides with a series tier".into(),
                });
            }
            if !names.insert(item.name.as_str()) {
                return Err(ValidationError::InvalidDefinition {
                    name: item.name.clone(),
                    message: "duplicate standalone name".into(),
                });
            }
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// The built-in guild catalog: one series per category plus a few
/// one-off achievements.
pub fn default_catalog() -> CatalogFile {
    let series = |name: &str,
                  description: &str,
                  category: Category,
                  requirement_type: RequirementType,
                  base_requirement_value: u64,
                  base_reward_type: RewardType,
                  base_reward_value: u64| SeriesDefinition {
        name: name.into(),
        description: description.into(),
        category,
        requirement_type,
        base_requirement_value,
        base_reward_type,
        base_reward_value,
        max_tier: MAX_TIER,
        is_active: true,
    };

    CatalogFile {
        series: vec![
            series(
                "Chatterbox",
                "Send messages in guild chat",
                Category::Community,
                RequirementType::MessagesSent,
                10,
                RewardType::Xp,
                50,
            ),
            series(
                "Wallet Wrangler",
                "Link wallets to your guild profile",
                Category::Web3,
                RequirementType::WalletsLinked,
                1,
                RewardType::Xp,
                100,
            ),
            series(
                "Stream Scout",
                "Watch guild member streams",
                Category::Gaming,
                RequirementType::StreamsWatched,
                5,
                RewardType::Xp,
                75,
            ),
            series(
                "Town Crier",
                "Publish guild news posts",
                Category::Content,
                RequirementType::NewsPosted,
                2,
                RewardType::Xp,
                120,
            ),
            series(
                "Regular",
                "Be active on distinct days",
                Category::Onboarding,
                RequirementType::DaysActive,
                3,
                RewardType::Xp,
                40,
            ),
            SeriesDefinition {
                max_tier: 3,
                ..series(
                    "Recruiter",
                    "Invite friends who join the guild",
                    Category::Special,
                    RequirementType::FriendsInvited,
                    1,
                    RewardType::Token,
                    10,
                )
            },
        ],
        standalone: vec![
            StandaloneDefinition {
                name: "Welcome Aboard".into(),
                description: "Complete your guild profile".into(),
                category: Category::Onboarding,
                requirement_type: RequirementType::ProfileCompleted,
                requirement_value: 1,
                reward_type: RewardType::Badge,
                reward_value: 1,
                is_active: true,
            },
            StandaloneDefinition {
                name: "First Words".into(),
                description: "Send your first chat message".into(),
                category: Category::Community,
                requirement_type: RequirementType::MessagesSent,
                requirement_value: 1,
                reward_type: RewardType::Xp,
                reward_value: 25,
                is_active: true,
            },
            StandaloneDefinition {
                name: "Party Goer".into(),
                description: "Attend a guild event".into(),
                category: Category::Special,
                requirement_type: RequirementType::EventsAttended,
                requirement_value: 1,
                reward_type: RewardType::Title,
                reward_value: 1,
                is_active: true,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_series() -> SeriesDefinition {
        default_catalog()
            .series
            .into_iter()
            .find(|s| s.name == "Chatterbox")
            .unwrap()
    }

    #[test]
    fn default_catalog_is_valid() {
        let catalog = default_catalog();
        catalog.validate().unwrap();
        assert!(!catalog.series.is_empty());
        assert!(!catalog.standalone.is_empty());
    }

    #[test]
    fn tier_instances_scale_with_multiplier() {
        let drafts = chat_series().tier_instances().unwrap();
        assert_eq!(drafts.len(), 6);
        assert_eq!(drafts[0].requirement_value, 10);
        assert_eq!(drafts[1].requirement_value, 20);
        assert_eq!(drafts[5].requirement_value, 120);
        assert_eq!(drafts[0].reward_value, 50);
        assert_eq!(drafts[0].name, "Chatterbox Bronze");
        assert_eq!(drafts[5].name, "Chatterbox Master");
        for pair in drafts.windows(2) {
            assert!(pair[0].requirement_value < pair[1].requirement_value);
            assert!(pair[0].reward_value < pair[1].reward_value);
        }
    }

    #[test]
    fn max_tier_limits_chain_length() {
        let mut def = chat_series();
        def.max_tier = 3;
        assert_eq!(def.tier_instances().unwrap().len(), 3);
        def.max_tier = 7;
        assert!(def.tier_instances().is_err());
        def.max_tier = 0;
        assert!(def.validate().is_err());
    }

    #[test]
    fn zero_requirement_is_rejected() {
        let mut def = chat_series();
        def.base_requirement_value = 0;
        assert!(def.validate().is_err());
    }

    #[test]
    fn parses_catalog_toml() {
        let catalog = CatalogFile::from_toml_str(
            r#"
[[series]]
name = "Lurker"
category = "community"
requirement_type = "messages_sent"
base_requirement_value = 4
base_reward_type = "xp"
base_reward_value = 10
max_tier = 2

[[standalone]]
name = "Hello"
category = "onboarding"
requirement_type = "profile_completed"
requirement_value = 1
reward_type = "badge"
reward_value = 1
"#,
        )
        .unwrap();
        assert_eq!(catalog.series[0].max_tier, 2);
        assert!(catalog.series[0].is_active);
        assert_eq!(catalog.standalone[0].requirement_type, RequirementType::ProfileCompleted);
    }

    #[test]
    fn duplicate_series_names_are_rejected() {
        let mut catalog = default_catalog();
        let dup = catalog.series[0].clone();
        catalog.series.push(dup);
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn requirement_type_parses_from_wire_name() {
        for t in RequirementType::ALL {
            assert_eq!(t.as_str().parse::<RequirementType>().unwrap(), t);
        }
        assert!("likes_given".parse::<RequirementType>().is_err());
    }
}
