use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

fn tally(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tally").expect("binary");
    cmd.env_remove("TALLY_USER")
        .env_remove("TALLY_DATA_DIR")
        .env_remove("RUST_LOG")
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

fn json(data_dir: &Path, user: &str, args: &[&str]) -> (Value, i32) {
    let output = tally(data_dir)
        .args(["--json", "--user", user])
        .args(args)
        .output()
        .expect("run tally");
    let value: Value = serde_json::from_slice(&output.stdout).expect("json envelope");
    (value, output.status.code().unwrap_or(-1))
}

fn post(data_dir: &Path, user: &str, link: &str) -> String {
    let (value, code) = json(
        data_dir,
        user,
        &["task", "create", "--platform", "youtube", "--action", "like", "--link", link],
    );
    assert_eq!(code, 0, "{value}");
    value["data"]["id"].as_str().expect("task id").to_string()
}

#[test]
fn tally_help_works() {
    Command::cargo_bin("tally")
        .expect("binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("reward ledger"));
}

#[test]
fn subcommand_help_works() {
    let subcommands = ["init", "task", "account", "view", "recover", "batch"];

    for cmd in subcommands {
        Command::cargo_bin("tally")
            .expect("binary")
            .arg(cmd)
            .arg("--help")
            .assert()
            .success();
    }
}

#[test]
fn init_creates_layout() {
    let dir = TempDir::new().unwrap();
    tally(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(contains("initialized data directory"));

    assert!(dir.path().join("tally.toml").exists());
    assert!(dir.path().join("tasks").is_dir());
    assert!(dir.path().join("accounts").is_dir());

    tally(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(contains("nothing to do"));
}

#[test]
fn complete_flow_moves_points() {
    let dir = TempDir::new().unwrap();
    for user in ["alice", "bob"] {
        let (value, code) = json(dir.path(), user, &["account", "open"]);
        assert_eq!(code, 0);
        assert_eq!(value["data"]["points"], 50);
    }

    let task_id = post(dir.path(), "alice", "HTTP://YouTube.com/x/");

    let (value, code) = json(dir.path(), "bob", &["task", "complete", &task_id]);
    assert_eq!(code, 0);
    assert_eq!(value["schema_version"], "tally.v1");
    assert_eq!(value["command"], "task complete");
    assert_eq!(value["status"], "success");
    assert_eq!(value["data"]["success"], true);
    assert_eq!(value["data"]["points_earned"], 2);
    assert_eq!(value["data"]["new_balance"], 52);

    let (value, code) = json(dir.path(), "bob", &["task", "complete", &task_id]);
    assert_eq!(code, 3);
    assert_eq!(value["status"], "error");
    assert_eq!(value["error"]["kind"], "already_completed");

    let (value, _) = json(dir.path(), "alice", &["view"]);
    assert_eq!(value["data"]["current_points"], 48);
    assert_eq!(value["data"]["own_tasks"][0]["link"], "https://youtube.com/x");
}

#[test]
fn self_completion_and_duplicates_are_rejected() {
    let dir = TempDir::new().unwrap();
    json(dir.path(), "alice", &["account", "open"]);
    let task_id = post(dir.path(), "alice", "https://youtube.com/x");

    let (value, code) = json(dir.path(), "alice", &["task", "complete", &task_id]);
    assert_eq!(code, 3);
    assert_eq!(value["error"]["kind"], "self_completion");

    let (value, code) = json(
        dir.path(),
        "alice",
        &["task", "create", "--platform", "YouTube", "--action", "Like", "--link", "http://youtube.com/x/"],
    );
    assert_eq!(code, 3);
    assert_eq!(value["error"]["kind"], "duplicate_error");
}

#[test]
fn validation_errors_exit_two() {
    let dir = TempDir::new().unwrap();
    json(dir.path(), "alice", &["account", "open"]);

    let (value, code) = json(
        dir.path(),
        "alice",
        &["task", "create", "--platform", "tiktok", "--action", "like", "--link", "https://x.io/1"],
    );
    assert_eq!(code, 2);
    assert_eq!(value["error"]["kind"], "validation_error");

    let (value, code) = json(dir.path(), "alice", &["account", "set", "alice", "-5", "--admin"]);
    assert_eq!(code, 2);
    assert_eq!(value["error"]["kind"], "validation_error");
}

#[test]
fn missing_user_is_reported() {
    let dir = TempDir::new().unwrap();
    tally(dir.path())
        .arg("view")
        .assert()
        .code(2)
        .stderr(contains("no acting user"));
}

#[test]
fn rm_requires_ownership_unless_admin() {
    let dir = TempDir::new().unwrap();
    json(dir.path(), "alice", &["account", "open"]);
    json(dir.path(), "bob", &["account", "open"]);
    let task_id = post(dir.path(), "alice", "https://youtu.be/owned");

    let (value, code) = json(dir.path(), "bob", &["task", "rm", &task_id]);
    assert_eq!(code, 3);
    assert_eq!(value["error"]["kind"], "forbidden");

    let (value, code) = json(dir.path(), "bob", &["task", "rm", &task_id, "--admin"]);
    assert_eq!(code, 0);
    assert_eq!(value["data"]["success"], true);
    assert_eq!(value["data"]["task"]["is_active"], false);

    let (value, _) = json(dir.path(), "bob", &["task", "list", "--available"]);
    assert_eq!(value["data"].as_array().map(|a| a.len()), Some(0));
}

#[test]
fn balance_overrides_require_admin() {
    let dir = TempDir::new().unwrap();
    json(dir.path(), "alice", &["account", "open"]);
    json(dir.path(), "bob", &["account", "open"]);

    let (value, code) = json(dir.path(), "bob", &["account", "set", "bob", "1000"]);
    assert_eq!(code, 3);
    assert_eq!(value["error"]["kind"], "forbidden");

    let (value, code) = json(dir.path(), "bob", &["account", "adjust", "alice", "-20"]);
    assert_eq!(code, 3);
    assert_eq!(value["error"]["kind"], "forbidden");

    let (value, _) = json(dir.path(), "bob", &["account", "show"]);
    assert_eq!(value["data"]["points"], 50);

    let (value, code) = json(dir.path(), "bob", &["account", "set", "bob", "70", "--admin"]);
    assert_eq!(code, 0);
    assert_eq!(value["data"]["points"], 70);

    let (value, code) = json(dir.path(), "bob", &["account", "adjust", "alice", "-60", "--admin"]);
    assert_eq!(code, 0);
    assert_eq!(value["command"], "account adjust");
    assert_eq!(value["data"]["points"], -10);
}

#[test]
fn batch_runs_requests_concurrently() {
    let dir = TempDir::new().unwrap();
    for user in ["alice", "bob", "carol", "dave"] {
        json(dir.path(), user, &["account", "open"]);
    }
    let task_id = post(dir.path(), "alice", "https://youtu.be/batch");

    let batch = dir.path().join("requests.jsonl");
    let lines = [
        format!(r#"{{"op":"complete","task_id":"{task_id}","user_id":"bob"}}"#),
        format!(r#"{{"op":"complete","task_id":"{task_id}","user_id":"carol"}}"#),
        format!(r#"{{"op":"complete","task_id":"{task_id}","user_id":"dave"}}"#),
        format!(r#"{{"op":"complete","task_id":"{task_id}","user_id":"alice"}}"#),
    ];
    fs::write(&batch, lines.join("\n")).unwrap();

    let (value, code) = json(dir.path(), "alice", &["batch", batch.to_str().unwrap()]);
    assert_eq!(code, 0);
    let results = value["data"].as_array().expect("results");
    assert_eq!(results.len(), 4);
    for (idx, result) in results.iter().enumerate() {
        assert_eq!(result["index"], idx);
    }
    assert_eq!(results[0]["status"], "completed");
    assert_eq!(results[3]["status"], "failed");
    assert_eq!(results[3]["error"]["kind"], "self_completion");

    let (value, _) = json(dir.path(), "alice", &["account", "show"]);
    assert_eq!(value["data"]["points"], 44);
}

#[test]
fn recover_reports_clean_state() {
    let dir = TempDir::new().unwrap();
    let (value, code) = json(dir.path(), "alice", &["recover"]);
    assert_eq!(code, 0);
    assert_eq!(value["data"]["rolled_back"].as_array().map(|a| a.len()), Some(0));
    assert_eq!(value["data"]["skipped"], 0);
    assert_eq!(value["data"]["conflicts"].as_array().map(|a| a.len()), Some(0));
}
