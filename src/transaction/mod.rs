// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Ambient transactions threaded through an explicit call context.
//
// - Context: carries the open transaction (if any) and a deadline
// - TransactionManager: opens, joins, commits and rolls back
// - TxState: lifecycle of a single with_transaction scope
//
// ============================================================================

pub mod context;
pub mod manager;
pub mod state;

pub use context::Context;
pub use manager::TransactionManager;
pub use state::{TxState, TxStats};
