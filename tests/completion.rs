mod support;

use tally::error::{exit_codes, Error};
use tally::platform::{Action, Platform};
use tally::task::NewTask;

use support::TestLedger;

#[test]
fn completion_transfers_points_once() {
    let t = TestLedger::open();
    t.users(&["alice", "bob"]);
    let task = t.post("alice", "https://youtu.be/first", 2);

    let receipt = t.ledger.complete_task(&task.id, "bob").unwrap();
    assert_eq!(receipt.task_id, task.id);
    assert_eq!(receipt.user_id, "bob");
    assert_eq!(receipt.points_earned, 2);
    assert_eq!(receipt.new_balance, 52);
    assert_eq!(t.balance("alice"), 48);
    assert_eq!(t.balance("bob"), 52);

    let err = t.ledger.complete_task(&task.id, "bob").unwrap_err();
    assert!(matches!(err, Error::AlreadyCompleted { .. }));
    assert_eq!(err.exit_code(), exit_codes::RULE_REJECTED);
    assert_eq!(t.balance("alice"), 48);
    assert_eq!(t.balance("bob"), 52);

    let stored = t.ledger.task(&task.id).unwrap();
    assert_eq!(stored.completions.len(), 1);
    let completion = stored.completions.get("bob").unwrap();
    assert_eq!(completion.points_earned, 2);
    assert_eq!(completion.completed_at, receipt.completed_at);
}

#[test]
fn creator_cannot_complete_own_task() {
    let t = TestLedger::open();
    t.users(&["alice"]);
    let task = t.post("alice", "https://youtu.be/mine", 5);

    let err = t.ledger.complete_task(&task.id, "alice").unwrap_err();
    assert!(matches!(err, Error::SelfCompletion { .. }));
    assert_eq!(err.kind(), "self_completion");
    assert_eq!(t.balance("alice"), 50);
    assert!(t.ledger.task(&task.id).unwrap().completions.is_empty());
}

#[test]
fn unknown_or_deleted_task_is_not_found() {
    let t = TestLedger::open();
    t.users(&["alice", "bob"]);

    assert!(matches!(
        t.ledger.complete_task("01hzzzzzzzzzzzzzzzzzzzzzzz", "bob"),
        Err(Error::NotFound(_))
    ));

    let task = t.post("alice", "https://youtu.be/gone", 2);
    t.ledger.soft_delete_task(&task.id, "alice", false).unwrap();
    assert!(matches!(
        t.ledger.complete_task(&task.id, "bob"),
        Err(Error::NotFound(_))
    ));
    assert_eq!(t.balance("bob"), 50);
}

#[test]
fn points_earned_is_a_snapshot() {
    let t = TestLedger::open();
    t.users(&["alice", "bob", "carol"]);
    let task = t.post("alice", "https://youtu.be/snap", 3);

    t.ledger.complete_task(&task.id, "bob").unwrap();
    t.ledger.complete_task(&task.id, "carol").unwrap();

    let stored = t.ledger.task(&task.id).unwrap();
    let users: Vec<&str> = stored.completions.iter().map(|c| c.user_id.as_str()).collect();
    assert_eq!(users, vec!["bob", "carol"]);
    assert!(stored.completions.iter().all(|c| c.points_earned == 3));
    assert_eq!(t.balance("alice"), 44);
}

#[test]
fn creator_may_go_negative_by_default() {
    let t = TestLedger::open();
    t.users(&["alice", "bob", "carol"]);
    t.ledger.set_balance("alice", 3, true).unwrap();
    let task = t.post("alice", "https://youtu.be/costly", 2);

    t.ledger.complete_task(&task.id, "bob").unwrap();
    t.ledger.complete_task(&task.id, "carol").unwrap();
    assert_eq!(t.balance("alice"), -1);
}

#[test]
fn view_reflects_completion() {
    let t = TestLedger::open();
    t.users(&["alice", "bob"]);
    let low = t.post("alice", "https://youtu.be/low", 2);
    let high = t
        .ledger
        .create_task(NewTask {
            creator_id: "alice".to_string(),
            platform: Platform::Instagram,
            action: Action::Follow,
            link: "https://instagram.com/alice".to_string(),
            points: Some(9),
        })
        .unwrap();

    let before = t.ledger.get_user_view("bob").unwrap();
    let ids: Vec<&str> = before.available_tasks.iter().map(|task| task.id.as_str()).collect();
    assert_eq!(ids, vec![high.id.as_str(), low.id.as_str()]);
    assert_eq!(before.current_points, 50);

    t.ledger.complete_task(&high.id, "bob").unwrap();

    let after = t.ledger.get_user_view("bob").unwrap();
    assert_eq!(after.available_tasks.len(), 1);
    assert_eq!(after.available_tasks[0].id, low.id);
    assert_eq!(after.current_points, 59);

    let alice = t.ledger.get_user_view("alice").unwrap();
    assert!(alice.available_tasks.is_empty());
    assert_eq!(alice.own_tasks.len(), 2);
    assert_eq!(alice.current_points, 41);
}
