//! Integration tests for the progression lifecycle: progress, completion,
//! cursor advancement, claims and notification polling.

use chrono::{Duration, Utc};
use guildhall_core::{
    AchievementError, CatalogFile, Category, Event, Ledger, NotificationSurfacer, ProgressDelta,
    ProgressionEngine, RequirementType, RewardType, SeriesDefinition,
};

const STREAMS: RequirementType = RequirementType::StreamsWatched;

fn streams_catalog() -> CatalogFile {
    CatalogFile {
        series: vec![SeriesDefinition {
            name: "Watcher".into(),
            description: "Watch guild streams".into(),
            category: Category::Content,
            requirement_type: STREAMS,
            base_requirement_value: 10,
            base_reward_type: RewardType::Xp,
            base_reward_value: 100,
            max_tier: 6,
            is_active: true,
        }],
        standalone: vec![],
    }
}

fn setup() -> (ProgressionEngine, i64) {
    let engine = ProgressionEngine::new(Ledger::open_memory().unwrap());
    engine.install_catalog(&streams_catalog()).unwrap();
    let series_id = engine.ledger().list_series().unwrap()[0].id;
    (engine, series_id)
}

fn achievement_id(engine: &ProgressionEngine, name: &str) -> i64 {
    engine
        .ledger()
        .list_catalog_achievements()
        .unwrap()
        .into_iter()
        .find(|a| a.name == name)
        .unwrap_or_else(|| panic!("missing achievement {name}"))
        .id
}

fn current_tier(engine: &ProgressionEngine, user: &str, series_id: i64) -> u8 {
    engine
        .ledger()
        .get_series_progress(user, series_id)
        .unwrap()
        .map_or(0, |p| p.current_tier)
}

#[test]
fn test_tier_progression_scenarios() {
    let (engine, series_id) = setup();
    let bronze = achievement_id(&engine, "Watcher Bronze");
    let silver = achievement_id(&engine, "Watcher Silver");

    // Tier 1 requires 10.
    let result = engine
        .record_progress("alice", STREAMS, ProgressDelta::Increment(10))
        .unwrap();
    assert_eq!(result.completions.len(), 1);
    assert_eq!(result.completions[0].achievement_id, bronze);
    assert_eq!(result.completions[0].tier_id, 1);
    assert_eq!(result.completions[0].reward.value, 100);
    assert_eq!(current_tier(&engine, "alice", series_id), 1);
    assert!(result.events.iter().any(|e| matches!(
        e,
        Event::SeriesTierAdvanced { from_tier: 0, to_tier: 1, .. }
    )));

    // 19 of 20 for silver.
    let result = engine
        .record_progress("alice", STREAMS, ProgressDelta::Increment(9))
        .unwrap();
    assert!(result.completions.is_empty());
    assert_eq!(result.events.len(), 1);
    assert_eq!(current_tier(&engine, "alice", series_id), 1);

    let result = engine
        .record_progress("alice", STREAMS, ProgressDelta::Increment(1))
        .unwrap();
    assert_eq!(result.completions.len(), 1);
    assert_eq!(result.completions[0].achievement_id, silver);
    assert_eq!(result.completions[0].reward.value, 200);
    assert_eq!(current_tier(&engine, "alice", series_id), 2);

    let series = engine.ledger().get_series_progress("alice", series_id).unwrap().unwrap();
    assert_eq!(series.highest_achievement_id, Some(silver));
    assert!(!series.is_completed);

    let bronze_row = engine.get_progress("alice", bronze).unwrap().unwrap();
    assert!(bronze_row.next_tier_unlocked);
}

#[test]
fn test_claim_exactly_once() {
    let (engine, _) = setup();
    let bronze = achievement_id(&engine, "Watcher Bronze");
    engine
        .record_progress("bob", STREAMS, ProgressDelta::Increment(10))
        .unwrap();

    let reward = engine.claim_reward("bob", bronze).unwrap();
    assert_eq!(reward.reward_type, RewardType::Xp);
    assert_eq!(reward.value, 100);

    let err = engine.claim_reward("bob", bronze).unwrap_err();
    assert_eq!(
        err.as_achievement(),
        Some(&AchievementError::AlreadyClaimed {
            user_id: "bob".into(),
            achievement_id: bronze,
        })
    );

    // Another user's claim is independent.
    let err = engine.claim_reward("carol", bronze).unwrap_err();
    assert!(matches!(
        err.as_achievement(),
        Some(AchievementError::NotCompleted { .. })
    ));
}

#[test]
fn test_poll_within_same_window_returns_nothing_new() {
    let (engine, _) = setup();
    let opened = Utc::now() - Duration::seconds(1);
    let mut surfacer = NotificationSurfacer::open("dana", opened, Duration::seconds(5));

    engine
        .record_progress("dana", STREAMS, ProgressDelta::Increment(10))
        .unwrap();

    let first_at = Utc::now();
    let shown = surfacer.poll(&engine, first_at).cloned();
    assert_eq!(shown.map(|n| n.achievement.name), Some("Watcher Bronze".to_string()));

    let observed = surfacer.watermark();
    assert_eq!(observed, first_at);
    let again = engine
        .poll_recent_completions("dana", Some(observed), 5)
        .unwrap();
    assert!(again.is_empty());
    assert!(surfacer.poll(&engine, first_at).is_none());
}

#[test]
fn test_recent_completions_order_and_since() {
    let (engine, _) = setup();
    let t0 = Utc::now();
    engine
        .record_progress_at("erin", STREAMS, ProgressDelta::SetTo(10), t0)
        .unwrap();
    engine
        .record_progress_at(
            "erin",
            STREAMS,
            ProgressDelta::SetTo(20),
            t0 + Duration::seconds(1),
        )
        .unwrap();

    let recent = engine.poll_recent_completions("erin", None, 5).unwrap();
    let tiers: Vec<u8> = recent.iter().map(|c| c.tier_id).collect();
    assert_eq!(tiers, vec![2, 1]);
    assert_eq!(recent[0].tier_name, "Silver");

    let newer = engine.poll_recent_completions("erin", Some(t0), 5).unwrap();
    assert_eq!(newer.len(), 1);
    assert_eq!(newer[0].tier_id, 2);
}

#[test]
fn test_delivery_dedup_survives_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("ledger.db");
    {
        let engine =
            ProgressionEngine::new(Ledger::open_path(&path, std::time::Duration::from_secs(5)).unwrap());
        engine.install_catalog(&streams_catalog()).unwrap();
        let first = engine
            .record_progress_once("delivery-1", "fay", STREAMS, ProgressDelta::Increment(4))
            .unwrap();
        assert!(!first.duplicate);
    }

    let engine =
        ProgressionEngine::new(Ledger::open_path(&path, std::time::Duration::from_secs(5)).unwrap());
    let retry = engine
        .record_progress_once("delivery-1", "fay", STREAMS, ProgressDelta::Increment(4))
        .unwrap();
    assert!(retry.duplicate);
    let bronze = achievement_id(&engine, "Watcher Bronze");
    assert_eq!(engine.get_progress("fay", bronze).unwrap().unwrap().current_value, 4);
}

#[test]
fn test_full_series_run_reaches_master() {
    let (engine, series_id) = setup();
    // Cumulative totals 10, 20, 30, 50, 80, 120.
    for total in [10, 20, 30, 50, 80, 120] {
        let result = engine
            .record_progress("gus", STREAMS, ProgressDelta::SetTo(total))
            .unwrap();
        assert_eq!(result.completions.len(), 1, "total {total}");
    }
    let progress = engine.ledger().get_series_progress("gus", series_id).unwrap().unwrap();
    assert_eq!(progress.current_tier, 6);
    assert!(progress.is_completed);

    let listed = engine.list_series_progress("gus").unwrap();
    assert!(listed[0].next_achievement.is_none());
    let listed = engine.list_series_progress("newcomer").unwrap();
    assert_eq!(listed[0].next_achievement.as_ref().map(|a| a.tier_id), Some(1));
}

#[test]
fn test_raised_max_tier_reopens_series() {
    let engine = ProgressionEngine::new(Ledger::open_memory().unwrap());
    let mut catalog = streams_catalog();
    catalog.series[0].max_tier = 2;
    engine.install_catalog(&catalog).unwrap();
    let series_id = engine.ledger().list_series().unwrap()[0].id;

    engine.record_progress("hal", STREAMS, ProgressDelta::SetTo(10)).unwrap();
    engine.record_progress("hal", STREAMS, ProgressDelta::SetTo(20)).unwrap();
    assert!(engine.ledger().get_series_progress("hal", series_id).unwrap().unwrap().is_completed);

    catalog.series[0].max_tier = 3;
    engine.install_catalog(&catalog).unwrap();
    let result = engine.record_progress("hal", STREAMS, ProgressDelta::SetTo(30)).unwrap();
    assert_eq!(result.completions[0].tier_id, 3);
    let progress = engine.ledger().get_series_progress("hal", series_id).unwrap().unwrap();
    assert_eq!(progress.current_tier, 3);
    assert!(progress.is_completed);
}

#[test]
fn test_initialize_user_then_list() {
    let (engine, _) = setup();
    assert_eq!(engine.initialize_user("ivy").unwrap(), 1);
    assert_eq!(engine.initialize_user("ivy").unwrap(), 0);

    let listed = engine.list_achievements("ivy").unwrap();
    assert_eq!(listed.len(), 6);
    let bronze = listed.iter().find(|a| a.achievement.tier_id == 1).unwrap();
    assert_eq!(bronze.tier_name, "Bronze");
    assert_eq!(bronze.color_token, "#CD7F32");
    assert_eq!(bronze.progress.as_ref().map(|p| p.current_value), Some(0));
    assert!(listed
        .iter()
        .filter(|a| a.achievement.tier_id > 1)
        .all(|a| a.progress.is_none()));
}

#[test]
fn test_plateau_counter_settles_one_tier_per_report() {
    let (engine, series_id) = setup();
    let silver = achievement_id(&engine, "Watcher Silver");
    let gold = achievement_id(&engine, "Watcher Gold");

    // 35 clears Bronze (10), Silver (20) and Gold (30) but only one per call.
    let mut tiers = Vec::new();
    for _ in 0..5 {
        let result = engine
            .record_progress("ivy", STREAMS, ProgressDelta::SetTo(35))
            .unwrap();
        tiers.extend(result.completions.iter().map(|c| c.tier_id));
    }
    assert_eq!(tiers, vec![1, 2, 3]);
    assert_eq!(current_tier(&engine, "ivy", series_id), 3);
    assert_eq!(engine.get_progress("ivy", silver).unwrap().unwrap().current_value, 35);
    assert!(engine.get_progress("ivy", gold).unwrap().unwrap().is_completed);
    let platinum = achievement_id(&engine, "Watcher Platinum");
    assert!(engine.get_progress("ivy", platinum).unwrap().is_none());
}
