// ============================================================================
// Graph Client Seam
// ============================================================================
//
// The network client is an external collaborator. These traits are the
// whole surface the transaction layer needs from it: connect, verify,
// open sessions, run queries, and drive explicit transactions. Every call
// receives the caller's Context so deadlines reach the wire.
//
// `memory` provides an in-process implementation used by the tests.
//
// ============================================================================

pub mod memory;

use crate::connection::config::{ConnectionConfig, SessionConfig};
use crate::core::{Params, Record, Result};
use crate::transaction::Context;
use async_trait::async_trait;
use std::sync::Arc;

/// Opens drivers. Called once at startup and again on every reconnect.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn GraphDriver>>;
}

/// A long-lived client handle. Pooling happens behind this trait.
#[async_trait]
pub trait GraphDriver: Send + Sync {
    async fn verify_connectivity(&self, ctx: &Context) -> Result<()>;

    async fn new_session(
        &self,
        ctx: &Context,
        config: SessionConfig,
    ) -> Result<Box<dyn GraphSession>>;

    async fn close(&self, ctx: &Context) -> Result<()>;
}

#[async_trait]
pub trait GraphSession: Send + Sync {
    async fn begin_transaction(&self, ctx: &Context) -> Result<Arc<dyn GraphTransaction>>;

    /// Runs a query outside any explicit transaction.
    async fn run(
        &self,
        ctx: &Context,
        query: &str,
        params: Params,
    ) -> Result<Box<dyn RowCursor>>;

    async fn close(&self, ctx: &Context) -> Result<()>;
}

/// An explicit transaction. Shared by reference between every call that
/// joins it, so all methods take `&self`.
#[async_trait]
pub trait GraphTransaction: Send + Sync {
    fn id(&self) -> &str;

    async fn run(
        &self,
        ctx: &Context,
        query: &str,
        params: Params,
    ) -> Result<Box<dyn RowCursor>>;

    async fn commit(&self, ctx: &Context) -> Result<()>;

    async fn rollback(&self, ctx: &Context) -> Result<()>;

    /// Releases the transaction. Rolls back if neither committed nor rolled back.
    async fn close(&self, ctx: &Context) -> Result<()>;
}

/// Forward-only, one-shot stream of result rows.
#[async_trait]
pub trait RowCursor: Send {
    async fn next(&mut self, ctx: &Context) -> Result<Option<Record>>;
}

/// Drains a cursor into memory, preserving row order.
pub async fn collect_rows(ctx: &Context, cursor: &mut dyn RowCursor) -> Result<Vec<Record>> {
    let mut rows = Vec::new();
    while let Some(record) = cursor.next(ctx).await? {
        rows.push(record);
    }
    Ok(rows)
}
