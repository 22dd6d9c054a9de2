use std::fs;

use tally::config::{Config, CONFIG_FILE};
use tally::error::Error;
use tally::Ledger;
use tempfile::TempDir;

#[test]
fn ledger_uses_tally_toml_policy() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(CONFIG_FILE),
        r#"
[ledger]
signup_bonus = 10
allow_negative_balance = false
"#,
    )
    .unwrap();

    let ledger = Ledger::open(dir.path()).unwrap();
    assert_eq!(ledger.config().ledger.signup_bonus, 10);
    ledger.open_account("alice").unwrap();
    ledger.open_account("bob").unwrap();

    let task = ledger
        .create_task(tally::task::NewTask {
            creator_id: "alice".to_string(),
            platform: tally::platform::Platform::YouTube,
            action: tally::platform::Action::Subscribe,
            link: "https://youtube.com/@alice".to_string(),
            points: Some(11),
        })
        .unwrap();

    let err = ledger.complete_task(&task.id, "bob").unwrap_err();
    assert!(matches!(err, Error::InsufficientPoints { balance: 10, required: 11, .. }));
    assert_eq!(ledger.get_balance("bob").unwrap(), 10);
}

#[test]
fn invalid_config_blocks_open() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CONFIG_FILE), "[engine]\nlock_timeout_ms = 0\n").unwrap();

    assert!(matches!(Ledger::open(dir.path()), Err(Error::InvalidConfig(_))));
}

#[test]
fn malformed_config_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CONFIG_FILE), "[ledger\nsignup_bonus = ").unwrap();

    assert!(matches!(Ledger::open(dir.path()), Err(Error::TomlParse(_))));
}

#[test]
fn init_then_load_roundtrips_defaults() {
    let dir = TempDir::new().unwrap();
    Ledger::init(dir.path()).unwrap();

    let cfg = Config::load(&dir.path().join(CONFIG_FILE)).unwrap();
    assert_eq!(cfg.ledger.signup_bonus, 50);
    assert_eq!(cfg.ledger.default_task_points, 2);
    assert_eq!(cfg.engine.commit_retries, 1);
}
