//! Property tests over random progress sequences.

use guildhall_core::{
    CatalogFile, Category, Ledger, ProgressDelta, ProgressionEngine, RequirementType, RewardType,
    SeriesDefinition, StandaloneDefinition,
};
use proptest::prelude::*;

const KIND: RequirementType = RequirementType::DaysActive;
const MAX_TIER: u8 = 6;

fn engine() -> ProgressionEngine {
    let engine = ProgressionEngine::new(Ledger::open_memory().unwrap());
    engine
        .install_catalog(&CatalogFile {
            series: vec![SeriesDefinition {
                name: "Regular".into(),
                description: String::new(),
                category: Category::Community,
                requirement_type: KIND,
                base_requirement_value: 3,
                base_reward_type: RewardType::Xp,
                base_reward_value: 40,
                max_tier: MAX_TIER,
                is_active: true,
            }],
            standalone: vec![StandaloneDefinition {
                name: "Week One".into(),
                description: String::new(),
                category: Category::Community,
                requirement_type: KIND,
                requirement_value: 7,
                reward_type: RewardType::Badge,
                reward_value: 1,
                is_active: true,
            }],
        })
        .unwrap();
    engine
}

/// Every achievement whose requirement is at or below `value` is completed.
fn assert_settled(engine: &ProgressionEngine, value: i64) -> Result<(), TestCaseError> {
    let value = u64::try_from(value).unwrap();
    for item in engine.list_achievements("p").unwrap() {
        if item.achievement.requirement_value <= value {
            prop_assert!(
                item.progress.as_ref().is_some_and(|p| p.is_completed),
                "{} (requires {}) not completed at {}",
                item.achievement.name,
                item.achievement.requirement_value,
                value
            );
        }
    }
    Ok(())
}

fn delta_strategy() -> impl Strategy<Value = ProgressDelta> {
    prop_oneof![
        (0i64..8).prop_map(ProgressDelta::Increment),
        (0i64..60).prop_map(ProgressDelta::SetTo),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn counters_never_decrease_and_completion_is_consistent(
        deltas in prop::collection::vec(delta_strategy(), 1..30)
    ) {
        let engine = engine();
        let mut previous: Vec<Option<u64>> = Vec::new();

        for delta in deltas {
            let result = engine.record_progress("p", KIND, delta).unwrap();
            let listed = engine.list_achievements("p").unwrap();
            if previous.is_empty() {
                previous = vec![None; listed.len()];
            }

            for (item, before) in listed.iter().zip(previous.iter_mut()) {
                if let Some(row) = &item.progress {
                    if let Some(before) = *before {
                        prop_assert!(row.current_value >= before);
                    }
                    prop_assert_eq!(
                        row.is_completed,
                        row.current_value >= item.achievement.requirement_value
                    );
                    prop_assert_eq!(row.is_completed, row.completed_at.is_some());
                    *before = Some(row.current_value);
                }
            }

            // At most one completion per series chain plus the standalone.
            prop_assert!(result.completions.len() <= 2);
        }
    }

    #[test]
    fn cursor_never_skips_a_tier(
        deltas in prop::collection::vec(delta_strategy(), 1..30)
    ) {
        let engine = engine();
        let series_id = engine.ledger().list_series().unwrap()[0].id;
        let mut last_tier = 0u8;

        for delta in deltas {
            engine.record_progress("p", KIND, delta).unwrap();
            let progress = engine.ledger().get_series_progress("p", series_id).unwrap();
            let tier = progress.as_ref().map_or(0, |p| p.current_tier);
            prop_assert!(tier == last_tier || tier == last_tier + 1);

            // Every tier at or below the cursor is completed.
            let listed = engine.list_achievements("p").unwrap();
            for item in listed.iter().filter(|a| a.achievement.series_id == Some(series_id)) {
                if item.achievement.tier_id <= tier {
                    prop_assert!(item.progress.as_ref().is_some_and(|p| p.is_completed));
                }
            }
            last_tier = tier;
        }
    }

    #[test]
    fn repeated_set_to_settles_then_goes_quiet(value in 0i64..200) {
        let engine = engine();
        for _ in 0..=MAX_TIER {
            engine.record_progress("p", KIND, ProgressDelta::SetTo(value)).unwrap();
        }
        assert_settled(&engine, value)?;

        let before = engine.list_achievements("p").unwrap();
        let again = engine.record_progress("p", KIND, ProgressDelta::SetTo(value)).unwrap();
        prop_assert!(again.is_noop());
        let after = engine.list_achievements("p").unwrap();
        let before: Vec<_> = before.into_iter().map(|a| a.progress).collect();
        let after: Vec<_> = after.into_iter().map(|a| a.progress).collect();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn flat_set_to_after_any_history_completes_every_met_tier(
        deltas in prop::collection::vec(delta_strategy(), 0..20),
        value in 0i64..200
    ) {
        let engine = engine();
        for delta in deltas {
            engine.record_progress("p", KIND, delta).unwrap();
        }
        for _ in 0..=MAX_TIER {
            engine.record_progress("p", KIND, ProgressDelta::SetTo(value)).unwrap();
        }
        assert_settled(&engine, value)?;
    }
}
