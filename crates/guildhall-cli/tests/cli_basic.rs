//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary against a temporary data directory and
//! ledger, and verify JSON outputs.

use std::process::Command;

use tempfile::TempDir;

struct Sandbox {
    home: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            home: TempDir::new().unwrap(),
        }
    }

    /// Run a CLI command and return (stdout, stderr, exit code).
    fn run(&self, args: &[&str]) -> (String, String, i32) {
        let db = self.home.path().join("test.db");
        let output = Command::new(env!("CARGO_BIN_EXE_guildhall-cli"))
            .env("GUILDHALL_HOME", self.home.path())
            .arg("--db")
            .arg(&db)
            .args(args)
            .output()
            .expect("Failed to execute CLI command");

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);
        (stdout, stderr, code)
    }

    fn run_json(&self, args: &[&str]) -> serde_json::Value {
        let (stdout, stderr, code) = self.run(args);
        assert_eq!(code, 0, "{args:?} failed: {stderr}");
        serde_json::from_str(&stdout).expect("Failed to parse JSON output")
    }
}

#[test]
fn test_tier_list() {
    let sandbox = Sandbox::new();
    let tiers = sandbox.run_json(&["tier", "list"]);
    let tiers = tiers.as_array().unwrap();
    assert_eq!(tiers.len(), 6);
    assert_eq!(tiers[0]["display_name"], "Bronze");
    assert_eq!(tiers[5]["multiplier"], 12);
}

#[test]
fn test_tier_show_unknown_fails() {
    let sandbox = Sandbox::new();
    let (_, stderr, code) = sandbox.run(&["tier", "show", "9"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_progress_and_claim_flow() {
    let sandbox = Sandbox::new();
    let installed = sandbox.run_json(&["catalog", "install"]);
    assert_eq!(installed["source"], "built-in");

    let result = sandbox.run_json(&["progress", "record", "u1", "wallets_linked", "1"]);
    let completions = result["completions"].as_array().unwrap();
    assert_eq!(completions.len(), 1);
    let id = completions[0]["achievement_id"].as_i64().unwrap().to_string();

    let claimed = sandbox.run_json(&["reward", "claim", "u1", &id]);
    assert_eq!(claimed["reward"]["reward_type"], "xp");

    let (_, stderr, code) = sandbox.run(&["reward", "claim", "u1", &id]);
    assert_eq!(code, 1);
    assert!(stderr.contains("already claimed"));

    let series = sandbox.run_json(&["series", "list", "u1"]);
    let wallet = series
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["series"]["requirement_type"] == "wallets_linked")
        .unwrap();
    assert_eq!(wallet["progress"]["current_tier"], 1);
    assert_eq!(wallet["next_achievement"]["tier_id"], 2);
}

#[test]
fn test_negative_progress_is_rejected() {
    let sandbox = Sandbox::new();
    sandbox.run_json(&["catalog", "install"]);
    let (_, stderr, code) = sandbox.run(&["progress", "record", "u1", "messages_sent", "-3"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("invalid progress value"));
}

#[test]
fn test_delivery_key_dedup() {
    let sandbox = Sandbox::new();
    sandbox.run_json(&["catalog", "install"]);
    let args = [
        "progress",
        "record",
        "u1",
        "messages_sent",
        "2",
        "--delivery-key",
        "msg-7",
    ];
    assert_eq!(sandbox.run_json(&args)["duplicate"], false);
    assert_eq!(sandbox.run_json(&args)["duplicate"], true);
}

#[test]
fn test_notify_poll_lists_completions() {
    let sandbox = Sandbox::new();
    sandbox.run_json(&["catalog", "install"]);
    sandbox.run_json(&["user", "init", "u1"]);
    sandbox.run_json(&["progress", "record", "u1", "profile_completed", "1"]);

    let recent = sandbox.run_json(&["notify", "poll", "u1", "--limit", "10"]);
    let recent = recent.as_array().unwrap();
    assert!(!recent.is_empty() && recent.len() <= 5);
    assert_eq!(recent[0]["name"], "Welcome Aboard");

    let since = recent[0]["completed_at"].as_str().unwrap().to_string();
    let newer = sandbox.run_json(&["notify", "poll", "u1", "--since", &since]);
    assert!(newer.as_array().unwrap().is_empty());
}

#[test]
fn test_config_get_set() {
    let sandbox = Sandbox::new();
    let (stdout, _, code) = sandbox.run(&["config", "get", "notifications.poll_interval_secs"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "30");

    let (_, _, code) = sandbox.run(&["config", "set", "notifications.poll_interval_secs", "10"]);
    assert_eq!(code, 0);
    let shown = sandbox.run_json(&["config", "show"]);
    assert_eq!(shown["notifications"]["poll_interval_secs"], 10);

    let (_, _, code) = sandbox.run(&["config", "get", "nope.nothing"]);
    assert_eq!(code, 1);
}
