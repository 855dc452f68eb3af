//! Static tier catalog.
//!
//! Six ordered tiers scale a series' base requirement and reward. The tier
//! id is both the storage key and the progression order: tier 1 is the only
//! entry point and tier 6 (Master) is terminal.

use serde::Serialize;

use crate::error::{AchievementError, Result};

/// Id of the entry tier.
pub const FIRST_TIER: u8 = 1;
/// Id of the terminal tier.
pub const MAX_TIER: u8 = 6;

/// One difficulty/reward level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tier {
    pub id: u8,
    pub multiplier: u32,
    pub reward_base_xp: u32,
    pub display_name: &'static str,
    pub color_token: &'static str,
}

static TIERS: [Tier; MAX_TIER as usize] = [
    Tier {
        id: 1,
        multiplier: 1,
        reward_base_xp: 100,
        display_name: "Bronze",
        color_token: "#CD7F32",
    },
    Tier {
        id: 2,
        multiplier: 2,
        reward_base_xp: 250,
        display_name: "Silver",
        color_token: "#C0C0C0",
    },
    Tier {
        id: 3,
        multiplier: 3,
        reward_base_xp: 500,
        display_name: "Gold",
        color_token: "#FFD700",
    },
    Tier {
        id: 4,
        multiplier: 5,
        reward_base_xp: 1000,
        display_name: "Platinum",
        color_token: "#E5E4E2",
    },
    Tier {
        id: 5,
        multiplier: 8,
        reward_base_xp: 2000,
        display_name: "Diamond",
        color_token: "#B9F2FF",
    },
    Tier {
        id: 6,
        multiplier: 12,
        reward_base_xp: 5000,
        display_name: "Master",
        color_token: "#9B30FF",
    },
];

/// All tiers in progression order.
pub fn all_tiers() -> &'static [Tier] {
    &TIERS
}

/// Look up a tier by id.
///
/// # Errors
/// Returns `NotFound` when `id` is outside `1..=6`.
pub fn tier_by_id(id: u8) -> Result<&'static Tier> {
    if !(FIRST_TIER..=MAX_TIER).contains(&id) {
        return Err(AchievementError::tier_not_found(id).into());
    }
    Ok(&TIERS[(id - 1) as usize])
}

/// The tier after `id`, or `None` for the terminal tier (or an unknown id).
pub fn next_tier(id: u8) -> Option<&'static Tier> {
    if id >= MAX_TIER {
        return None;
    }
    tier_by_id(id + 1).ok()
}

/// Scale a series' base requirement to the given tier.
///
/// Multipliers are integers, so the scaled value is exact; it saturates
/// rather than wrapping on absurd inputs.
pub fn scale_requirement(base: u64, tier_id: u8) -> Result<u64> {
    let tier = tier_by_id(tier_id)?;
    Ok(base.saturating_mul(u64::from(tier.multiplier)))
}

/// Scale a series' base reward to the given tier.
pub fn scale_reward(base: u64, tier_id: u8) -> Result<u64> {
    scale_requirement(base, tier_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tiers_are_ordered_by_id() {
        for (idx, tier) in all_tiers().iter().enumerate() {
            assert_eq!(tier.id as usize, idx + 1);
        }
        assert_eq!(tier_by_id(1).unwrap().display_name, "Bronze");
        assert_eq!(tier_by_id(6).unwrap().display_name, "Master");
    }

    #[test]
    fn multipliers_strictly_increase() {
        for pair in all_tiers().windows(2) {
            assert!(pair[0].multiplier < pair[1].multiplier);
            assert!(pair[0].reward_base_xp < pair[1].reward_base_xp);
        }
    }

    #[test]
    fn unknown_tier_is_not_found() {
        assert!(tier_by_id(0).is_err());
        assert!(tier_by_id(7).is_err());
        assert!(scale_requirement(10, 7).is_err());
    }

    #[test]
    fn next_tier_stops_at_master() {
        assert_eq!(next_tier(1).map(|t| t.id), Some(2));
        assert_eq!(next_tier(5).map(|t| t.id), Some(6));
        assert!(next_tier(6).is_none());
        assert!(next_tier(200).is_none());
    }

    #[test]
    fn scaling_uses_multiplier() {
        assert_eq!(scale_requirement(10, 1).unwrap(), 10);
        assert_eq!(scale_requirement(10, 2).unwrap(), 20);
        assert_eq!(scale_reward(50, 6).unwrap(), 600);
        assert_eq!(scale_requirement(u64::MAX, 6).unwrap(), u64::MAX);
    }

    proptest! {
        #[test]
        fn scaled_values_strictly_increase_across_tiers(base in 1u64..1_000_000) {
            for t in FIRST_TIER..MAX_TIER {
                let lower = scale_requirement(base, t).unwrap();
                let upper = scale_requirement(base, t + 1).unwrap();
                prop_assert!(lower < upper);
                prop_assert!(scale_reward(base, t).unwrap() < scale_reward(base, t + 1).unwrap());
            }
        }
    }
}
