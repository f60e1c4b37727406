// ============================================================================
// Query Execution Gateway
// ============================================================================
//
// Runs a single query against the ambient transaction if the context carries
// one, otherwise against a throwaway session. The caller receives a Disposer
// alongside the cursor and must dispose it once the cursor is drained.
//
// ============================================================================

use crate::client::{GraphSession, RowCursor, collect_rows};
use crate::connection::DriverHandle;
use crate::connection::config::SessionConfig;
use crate::connection::retry::guard;
use crate::core::{Params, Record, Result, normalize_params};
use crate::result::{GraphRecord, decode_rows};
use crate::transaction::Context;
use log::{debug, error, warn};
use std::sync::Arc;
use tracing::instrument;

/// Releases the session a query was run on, if the gateway opened one.
///
/// Queries run against an ambient transaction get a no-op disposer; the
/// transaction owner releases that session.
#[must_use = "a disposer must be disposed, or the session it holds leaks"]
pub struct Disposer {
    session: Option<Box<dyn GraphSession>>,
}

impl Disposer {
    fn noop() -> Self {
        Self { session: None }
    }

    fn session(session: Box<dyn GraphSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// Whether disposing will close a session.
    pub fn owns_session(&self) -> bool {
        self.session.is_some()
    }

    pub async fn dispose(mut self, ctx: &Context) {
        if let Some(session) = self.session.take() {
            if let Err(err) = session.close(ctx).await {
                error!("Failed to close session: {}", err);
            }
        }
    }
}

impl Drop for Disposer {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("Disposer dropped without dispose(); ad-hoc session leaked");
        }
    }
}

#[derive(Clone)]
pub struct QueryGateway {
    driver: Arc<DriverHandle>,
    session_config: SessionConfig,
}

impl QueryGateway {
    pub fn new(driver: Arc<DriverHandle>) -> Self {
        let session_config = driver.session_config().clone();
        Self {
            driver,
            session_config,
        }
    }

    /// Submit `query` with normalized `params`.
    ///
    /// The disposer is returned on every path, failed ones included.
    #[instrument(
        name = "graph.run",
        skip_all,
        fields(db.system = "neo4j", db.statement = %query, ambient = ctx.has_transaction())
    )]
    pub async fn run(
        &self,
        ctx: &Context,
        query: &str,
        params: &Params,
    ) -> (Disposer, Result<Box<dyn RowCursor>>) {
        let params = normalize_params(params);

        if let Some(transaction) = ctx.transaction() {
            debug!("Running query in transaction {}", transaction.id());
            let cursor = ctx.bounded(transaction.run(ctx, query, params)).await;
            return (Disposer::noop(), cursor);
        }

        let driver = self.driver.current().await;
        let session = match ctx
            .bounded(driver.new_session(ctx, self.session_config.clone()))
            .await
        {
            Ok(session) => session,
            Err(err) => return (Disposer::noop(), Err(err)),
        };

        debug!("Running query in ad-hoc session");
        let cursor = ctx.bounded(session.run(ctx, query, params)).await;
        (Disposer::session(session), cursor)
    }

    /// Run `query` and collect every row before the session is released.
    pub async fn execute(
        &self,
        ctx: &Context,
        query: &str,
        params: &Params,
    ) -> Result<Vec<Record>> {
        guard(ctx, &self.driver, || async move {
            let (disposer, cursor) = self.run(ctx, query, params).await;
            let rows = match cursor {
                Ok(mut cursor) => collect_rows(ctx, cursor.as_mut()).await,
                Err(err) => Err(err),
            };
            disposer.dispose(ctx).await;
            rows
        })
        .await
    }

    /// Run `query` and decode the first column of every row into `T`.
    ///
    /// Fails fast: a row that does not fit `T` aborts the whole result.
    pub async fn execute_with_mapping<T: GraphRecord>(
        &self,
        ctx: &Context,
        query: &str,
        params: &Params,
    ) -> Result<Vec<T>> {
        guard(ctx, &self.driver, || async move {
            let (disposer, cursor) = self.run(ctx, query, params).await;
            let records = match cursor {
                Ok(mut cursor) => decode_rows::<T>(ctx, cursor.as_mut()).await,
                Err(err) => Err(err),
            };
            disposer.dispose(ctx).await;
            records
        })
        .await
    }
}
