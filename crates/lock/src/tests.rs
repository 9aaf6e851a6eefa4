use super::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn table(id: u64) -> LockTarget {
    LockTarget::Table(TableId(id))
}

#[test]
fn shared_locks_are_compatible() {
    let lm = LockManager::new();
    lm.acquire(TxnId(1), table(1), LockMode::Shared).unwrap();
    lm.acquire(TxnId(2), table(1), LockMode::Shared).unwrap();
}

#[test]
fn exclusive_excludes_everyone_else() {
    let lm = Arc::new(LockManager::new());
    lm.acquire(TxnId(5), table(1), LockMode::Exclusive).unwrap();

    let lm2 = lm.clone();
    let handle = thread::spawn(move || {
        // Txn 10 is younger than the holder (5), so it must wait, not wound.
        lm2.acquire(TxnId(10), table(1), LockMode::Shared).unwrap();
    });

    thread::sleep(Duration::from_millis(20));
    assert!(!handle.is_finished());

    lm.release_all(TxnId(5));
    handle.join().unwrap();
}

#[test]
fn older_requester_wounds_younger_holder() {
    let lm = LockManager::new();
    // Younger transaction grabs the lock first.
    lm.acquire(TxnId(20), table(1), LockMode::Exclusive).unwrap();

    // Older transaction requests a conflicting lock: it wounds txn 20.
    lm.acquire(TxnId(5), table(1), LockMode::Exclusive).unwrap();

    assert!(lm.is_wounded(TxnId(20)));
    let err = lm
        .acquire(TxnId(20), table(2), LockMode::Shared)
        .unwrap_err();
    assert!(matches!(err, DbError::UpgradeConflict(_)));
}

#[test]
fn release_all_clears_wounded_state() {
    let lm = LockManager::new();
    lm.acquire(TxnId(20), table(1), LockMode::Exclusive).unwrap();
    lm.acquire(TxnId(5), table(1), LockMode::Exclusive).unwrap();
    assert!(lm.is_wounded(TxnId(20)));

    lm.release_all(TxnId(20));
    assert!(!lm.is_wounded(TxnId(20)));
    // Txn 20 can now begin again (new id would be issued in practice) and acquire cleanly.
    lm.acquire(TxnId(30), table(3), LockMode::Shared).unwrap();
}

#[test]
fn intention_locks_compose_with_row_locks() {
    let lm = LockManager::new();
    lm.acquire(TxnId(1), table(1), LockMode::IX).unwrap();
    lm.acquire(
        TxnId(1),
        LockTarget::Key(TableId(1), b"k1".to_vec()),
        LockMode::Exclusive,
    )
    .unwrap();
    // A second IX holder on the same table is fine (row locks serialize access).
    lm.acquire(TxnId(2), table(1), LockMode::IX).unwrap();
}

#[test]
fn repeated_acquire_of_covered_mode_is_a_no_op() {
    let lm = LockManager::new();
    lm.acquire(TxnId(1), table(1), LockMode::Exclusive).unwrap();
    lm.acquire(TxnId(1), table(1), LockMode::Shared).unwrap();
    lm.acquire(TxnId(1), table(1), LockMode::Exclusive).unwrap();
}
