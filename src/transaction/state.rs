// ============================================================================
// Transaction Scope State
// ============================================================================
//
// Each `with_transaction` invocation walks this state machine once:
//
// ```text
// NoAmbientTx ──ambient tx, not requires_new──> JoinedAmbientTx
//     │
//     └──open session + begin──> OwnedTxOpen ──work ok, commit──> Committed
//                                     │
//                                     └──work failed, rollback──> RolledBack
// ```
//
// Joined scopes end where they started: the owning level settles the
// transaction.
//
// ============================================================================

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// No transaction in the caller's context yet.
    NoAmbientTx,

    /// Running inside a transaction owned by an outer scope.
    JoinedAmbientTx,

    /// This scope opened the session and transaction and must settle them.
    OwnedTxOpen,

    Committed,

    RolledBack,
}

impl TxState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxState::Committed | TxState::RolledBack)
    }

    /// Whether this scope is responsible for commit/rollback.
    pub fn owns_transaction(&self) -> bool {
        matches!(self, TxState::OwnedTxOpen)
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxState::NoAmbientTx => write!(f, "NO_AMBIENT_TX"),
            TxState::JoinedAmbientTx => write!(f, "JOINED"),
            TxState::OwnedTxOpen => write!(f, "OWNED_OPEN"),
            TxState::Committed => write!(f, "COMMITTED"),
            TxState::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// Running counters kept by the transaction manager.
#[derive(Debug, Default)]
pub(crate) struct TxCounters {
    owned: AtomicU64,
    joined: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    failed: AtomicU64,
    leaked: AtomicU64,
}

impl TxCounters {
    pub(crate) fn record(&self, state: TxState) {
        let counter = match state {
            TxState::NoAmbientTx => return,
            TxState::JoinedAmbientTx => &self.joined,
            TxState::OwnedTxOpen => &self.owned,
            TxState::Committed => &self.committed,
            TxState::RolledBack => &self.rolled_back,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Commit or rollback itself failed.
    pub(crate) fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_leak(&self) {
        self.leaked.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn snapshot(&self) -> TxStats {
        TxStats {
            owned: self.owned.load(Ordering::SeqCst),
            joined: self.joined.load(Ordering::SeqCst),
            committed: self.committed.load(Ordering::SeqCst),
            rolled_back: self.rolled_back.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            leaked: self.leaked.load(Ordering::SeqCst),
        }
    }
}

/// Transaction manager statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TxStats {
    /// Scopes that opened their own transaction
    pub owned: u64,
    /// Scopes that joined an ambient transaction
    pub joined: u64,
    pub committed: u64,
    pub rolled_back: u64,
    /// Commit or rollback calls that returned an error
    pub failed: u64,
    /// Scopes dropped before their transaction could be released
    pub leaked: u64,
}

impl fmt::Display for TxStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tx Stats: {} owned, {} joined, {} committed, {} rolled back, {} failed, {} leaked",
            self.owned, self.joined, self.committed, self.rolled_back, self.failed, self.leaked
        )
    }
}
