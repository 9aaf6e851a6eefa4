//! Lock Manager: table/key-granularity 2PL with a wound-wait deadlock policy.
//!
//! Lock identity is `(table, optional key bytes)`. Requests join a FIFO
//! waiters queue per target and block on a condvar until granted or until
//! the manager wounds them. A transaction in GROWING never releases a lock;
//! release only happens in bulk, via [`LockManager::release_all`], at
//! commit/abort.

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex};

use common::{DbError, DbResult, TableId, TxnId};

/// A lock mode, ordered by strength for the purpose of the hierarchical
/// compatibility matrix below.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Intention-shared: a table-level lock announcing a key-level S lock below.
    IS,
    /// Intention-exclusive: a table-level lock announcing a key-level X lock below.
    IX,
    Shared,
    Exclusive,
}

impl LockMode {
    fn compatible_with(self, other: LockMode) -> bool {
        use LockMode::*;
        matches!(
            (self, other),
            (IS, IS) | (IS, IX) | (IS, Shared) | (IX, IS) | (IX, IX) | (Shared, IS) | (Shared, Shared)
        )
    }

    /// Whether a held lock of this mode already satisfies a request for `requested`.
    fn covers(self, requested: LockMode) -> bool {
        use LockMode::*;
        match self {
            Exclusive => true,
            IX => matches!(requested, IS | IX),
            Shared => matches!(requested, IS | Shared),
            IS => matches!(requested, IS),
        }
    }
}

/// Identity of a lockable resource: a whole table, or a single key within it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LockTarget {
    Table(TableId),
    Key(TableId, Vec<u8>),
}

struct Holder {
    txn: TxnId,
    mode: LockMode,
}

struct Waiter {
    txn: TxnId,
    mode: LockMode,
}

#[derive(Default)]
struct LockQueue {
    holders: Vec<Holder>,
    waiters: VecDeque<Waiter>,
}

struct LockTable {
    queues: HashMap<LockTarget, LockQueue>,
    held_by_txn: HashMap<TxnId, Vec<LockTarget>>,
    wounded: HashSet<TxnId>,
}

/// The lock manager. Always shared via `Arc` across client session threads.
pub struct LockManager {
    state: Mutex<LockTable>,
    cv: Condvar,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockTable {
                queues: HashMap::new(),
                held_by_txn: HashMap::new(),
                wounded: HashSet::new(),
            }),
            cv: Condvar::new(),
        }
    }

    /// Acquires `mode` on `target` for `txn`, blocking under strict 2PL until
    /// granted. Returns `upgrade-conflict` if `txn` has been wounded by an
    /// older transaction, either before this call or while waiting.
    #[tracing::instrument(skip(self), fields(txn = txn.0, mode = ?mode))]
    pub fn acquire(&self, txn: TxnId, target: LockTarget, mode: LockMode) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.wounded.contains(&txn) {
                return Err(DbError::UpgradeConflict(format!(
                    "txn {} was wounded and must abort",
                    txn.0
                )));
            }

            let already_held = state
                .queues
                .get(&target)
                .and_then(|q| q.holders.iter().find(|h| h.txn == txn).map(|h| h.mode));
            if let Some(held) = already_held {
                if held.covers(mode) {
                    return Ok(());
                }
            }

            let conflict: Vec<TxnId> = state
                .queues
                .get(&target)
                .map(|q| {
                    q.holders
                        .iter()
                        .filter(|h| h.txn != txn && !mode.compatible_with(h.mode))
                        .map(|h| h.txn)
                        .collect()
                })
                .unwrap_or_default();

            if conflict.is_empty() {
                let queue = state.queues.entry(target.clone()).or_default();
                queue.holders.retain(|h| h.txn != txn);
                queue.holders.push(Holder { txn, mode });
                state
                    .held_by_txn
                    .entry(txn)
                    .or_default()
                    .push(target.clone());
                return Ok(());
            }

            // Wound-wait: an older (lower id) requester wounds every younger
            // conflicting holder; a younger requester waits instead.
            let younger_holders: Vec<TxnId> =
                conflict.iter().copied().filter(|h| *h > txn).collect();
            if !younger_holders.is_empty() {
                for victim in younger_holders {
                    self.wound_locked(&mut state, victim);
                }
                self.cv.notify_all();
                continue;
            }

            let queue = state.queues.entry(target.clone()).or_default();
            queue.waiters.push_back(Waiter { txn, mode });
            state = self.cv.wait(state).unwrap();
            if let Some(q) = state.queues.get_mut(&target) {
                q.waiters.retain(|w| w.txn != txn);
            }
        }
    }

    fn wound_locked(&self, state: &mut LockTable, victim: TxnId) {
        if !state.wounded.insert(victim) {
            return;
        }
        tracing::warn!(txn = victim.0, "wounded by an older transaction");
        self.release_all_locked(state, victim);
    }

    fn release_all_locked(&self, state: &mut LockTable, txn: TxnId) {
        if let Some(targets) = state.held_by_txn.remove(&txn) {
            for target in targets {
                if let Some(queue) = state.queues.get_mut(&target) {
                    queue.holders.retain(|h| h.txn != txn);
                }
            }
        }
    }

    /// Releases every lock `txn` holds, transitioning it out of GROWING.
    /// Called once, at commit or abort.
    #[tracing::instrument(skip(self), fields(txn = txn.0))]
    pub fn release_all(&self, txn: TxnId) {
        let mut state = self.state.lock().unwrap();
        self.release_all_locked(&mut state, txn);
        state.wounded.remove(&txn);
        drop(state);
        self.cv.notify_all();
    }

    /// Whether `txn` has been wounded and must abort at its next lock request.
    pub fn is_wounded(&self, txn: TxnId) -> bool {
        self.state.lock().unwrap().wounded.contains(&txn)
    }
}
