// ============================================================================
// Ambient Transaction Manager
// ============================================================================

use super::state::{TxCounters, TxState, TxStats};
use super::Context;
use crate::client::{GraphSession, GraphTransaction};
use crate::connection::DriverHandle;
use crate::connection::config::{SessionConfig, TransactionOptions};
use crate::connection::retry::guard;
use crate::core::{GraphError, Result};
use log::{debug, error, warn};
use std::future::Future;
use std::sync::Arc;
use tracing::{Span, instrument};

/// Runs units of work inside a transaction carried by the call context.
///
/// The outermost call opens a session and transaction, hands the work a
/// context carrying it, and commits or rolls back depending on the outcome.
/// Nested calls that find a transaction in their context join it instead,
/// unless they ask for `requires_new`.
#[derive(Clone)]
pub struct TransactionManager {
    driver: Arc<DriverHandle>,
    session_config: SessionConfig,
    counters: Arc<TxCounters>,
}

impl TransactionManager {
    pub fn new(driver: Arc<DriverHandle>) -> Self {
        let session_config = driver.session_config().clone();
        Self {
            driver,
            session_config,
            counters: Arc::new(TxCounters::default()),
        }
    }

    pub fn stats(&self) -> TxStats {
        self.counters.snapshot()
    }

    /// Run `work` in the ambient transaction, or in a new one if there is
    /// none or `options.requires_new` is set.
    ///
    /// A connectivity failure anywhere inside triggers one reconnect and one
    /// full retry, transaction open included. `work` may therefore run twice.
    pub async fn with_transaction<T, F, Fut>(
        &self,
        ctx: &Context,
        options: TransactionOptions,
        work: F,
    ) -> Result<T>
    where
        F: Fn(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let work = &work;
        guard(ctx, &self.driver, || self.run_scope(ctx, options, work)).await
    }

    #[instrument(
        name = "graph.transaction",
        skip_all,
        fields(
            db.system = "neo4j",
            requires_new = options.requires_new,
            joined = ctx.has_transaction() && !options.requires_new,
            tx.id = tracing::field::Empty,
        )
    )]
    async fn run_scope<T, F, Fut>(
        &self,
        ctx: &Context,
        options: TransactionOptions,
        work: &F,
    ) -> Result<T>
    where
        F: Fn(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if ctx.has_transaction() && !options.requires_new {
            self.counters.record(TxState::JoinedAmbientTx);
            debug!("{} -> {}", TxState::NoAmbientTx, TxState::JoinedAmbientTx);
            return work(ctx.clone()).await;
        }

        let driver = self.driver.current().await;
        let session = ctx
            .bounded(driver.new_session(ctx, self.session_config.clone()))
            .await?;

        let transaction = match ctx.bounded(session.begin_transaction(ctx)).await {
            Ok(transaction) => transaction,
            Err(err) => {
                close_session(ctx, session.as_ref()).await;
                return Err(GraphError::begin(err));
            }
        };

        let mut scope = TxScope::new(session, transaction, Arc::clone(&self.counters));
        Span::current().record("tx.id", scope.transaction.id());
        self.counters.record(TxState::OwnedTxOpen);
        debug!(
            "{} -> {} ({})",
            TxState::NoAmbientTx,
            TxState::OwnedTxOpen,
            scope.transaction.id()
        );

        let outcome = work(ctx.with_transaction(Arc::clone(&scope.transaction))).await;
        let settled = self.settle(ctx, scope.transaction.as_ref(), outcome).await;

        scope.release(ctx).await;
        settled
    }

    /// Commit on success, roll back on failure.
    #[instrument(
        name = "graph.settle",
        skip_all,
        fields(
            db.system = "neo4j",
            tx.id = %transaction.id(),
            commit = outcome.is_ok(),
        )
    )]
    async fn settle<T>(
        &self,
        ctx: &Context,
        transaction: &dyn GraphTransaction,
        outcome: Result<T>,
    ) -> Result<T> {
        match outcome {
            Ok(value) => match ctx.bounded(transaction.commit(ctx)).await {
                Ok(()) => {
                    self.counters.record(TxState::Committed);
                    debug!(
                        "{} -> {} ({})",
                        TxState::OwnedTxOpen,
                        TxState::Committed,
                        transaction.id()
                    );
                    Ok(value)
                }
                Err(err) => {
                    self.counters.record_failure();
                    Err(GraphError::commit(err))
                }
            },
            Err(work_err) => match ctx.bounded(transaction.rollback(ctx)).await {
                Ok(()) => {
                    self.counters.record(TxState::RolledBack);
                    debug!(
                        "{} -> {} ({}): {}",
                        TxState::OwnedTxOpen,
                        TxState::RolledBack,
                        transaction.id(),
                        work_err
                    );
                    Err(work_err)
                }
                Err(rollback_err) => {
                    self.counters.record_failure();
                    Err(GraphError::rollback(rollback_err, work_err))
                }
            },
        }
    }
}

/// Session and transaction owned by one `with_transaction` scope.
///
/// Must be released with [`TxScope::release`]; closing needs to await, which
/// `Drop` cannot do. A scope dropped unreleased (its task was cancelled) is
/// logged and counted as leaked.
struct TxScope {
    session: Box<dyn GraphSession>,
    transaction: Arc<dyn GraphTransaction>,
    counters: Arc<TxCounters>,
    released: bool,
}

impl TxScope {
    fn new(
        session: Box<dyn GraphSession>,
        transaction: Arc<dyn GraphTransaction>,
        counters: Arc<TxCounters>,
    ) -> Self {
        Self {
            session,
            transaction,
            counters,
            released: false,
        }
    }

    async fn release(&mut self, ctx: &Context) {
        if let Err(err) = self.transaction.close(ctx).await {
            error!("Failed to close transaction {}: {}", self.transaction.id(), err);
        }
        close_session(ctx, self.session.as_ref()).await;
        self.released = true;
    }
}

impl Drop for TxScope {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                "Transaction {} dropped before release; session and transaction leaked",
                self.transaction.id()
            );
            self.counters.record_leak();
        }
    }
}

async fn close_session(ctx: &Context, session: &dyn GraphSession) {
    if let Err(err) = session.close(ctx).await {
        error!("Failed to close session: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::{Fault, MemoryGraph};
    use crate::core::Params;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing::span::{Attributes, Id, Record};
    use tracing::{Event, Metadata};

    /// Collects the names of opened spans.
    struct SpanNames {
        names: Arc<parking_lot::Mutex<Vec<&'static str>>>,
        next_id: AtomicU64,
    }

    impl tracing::Subscriber for SpanNames {
        fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
            true
        }

        fn new_span(&self, span: &Attributes<'_>) -> Id {
            self.names.lock().push(span.metadata().name());
            Id::from_u64(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
        }

        fn record(&self, _span: &Id, _values: &Record<'_>) {}

        fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

        fn event(&self, _event: &Event<'_>) {}

        fn enter(&self, _span: &Id) {}

        fn exit(&self, _span: &Id) {}
    }

    async fn manager(graph: &MemoryGraph) -> TransactionManager {
        let driver = DriverHandle::connect(graph.connector(), "bolt://memory", "neo4j", "pw")
            .await
            .unwrap();
        TransactionManager::new(Arc::new(driver))
    }

    async fn write(ctx: &Context, query: &str) -> Result<()> {
        let transaction = ctx
            .transaction()
            .ok_or_else(|| GraphError::Client("no ambient transaction".into()))?;
        transaction.run(ctx, query, Params::new()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_on_success() {
        let graph = MemoryGraph::new();
        let tm = manager(&graph).await;

        let value = tm
            .with_transaction(
                &Context::background(),
                TransactionOptions::default(),
                |ctx| async move {
                    write(&ctx, "CREATE (:A)").await?;
                    Ok("done")
                },
            )
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(graph.commits(), 1);
        assert_eq!(graph.rollbacks(), 0);
        assert_eq!(graph.committed_queries(), vec!["CREATE (:A)".to_string()]);
        assert_eq!(tm.stats().committed, 1);
    }

    #[tokio::test]
    async fn test_rollback_on_failure() {
        let graph = MemoryGraph::new();
        let tm = manager(&graph).await;

        let result: Result<()> = tm
            .with_transaction(
                &Context::background(),
                TransactionOptions::default(),
                |ctx| async move {
                    write(&ctx, "CREATE (:A)").await?;
                    Err(GraphError::Client("business rule".into()))
                },
            )
            .await;

        assert!(matches!(result, Err(GraphError::Client(_))));
        assert_eq!(graph.commits(), 0);
        assert_eq!(graph.rollbacks(), 1);
        assert!(graph.committed_queries().is_empty());
        assert_eq!(tm.stats().rolled_back, 1);
    }

    #[tokio::test]
    async fn test_begin_failure_closes_session() {
        let graph = MemoryGraph::new();
        let tm = manager(&graph).await;
        graph.fail_next_begin(Fault::Query("database unavailable".into()));

        let result: Result<()> = tm
            .with_transaction(
                &Context::background(),
                TransactionOptions::default(),
                |_ctx| async { Ok(()) },
            )
            .await;

        assert!(matches!(result, Err(GraphError::TransactionBegin(_))));
        assert_eq!(graph.sessions_opened(), graph.sessions_closed());
        assert_eq!(graph.transactions_begun(), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_discards_result() {
        let graph = MemoryGraph::new();
        let tm = manager(&graph).await;
        graph.fail_next_commit(Fault::Query("constraint violated".into()));

        let result = tm
            .with_transaction(
                &Context::background(),
                TransactionOptions::default(),
                |ctx| async move {
                    write(&ctx, "CREATE (:A)").await?;
                    Ok(1)
                },
            )
            .await;

        assert!(matches!(result, Err(GraphError::Commit(_))));
        assert!(graph.committed_queries().is_empty());
        assert_eq!(graph.transactions_closed(), 1);
        assert_eq!(tm.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_rollback_failure_keeps_work_error() {
        let graph = MemoryGraph::new();
        let tm = manager(&graph).await;
        graph.fail_next_rollback(Fault::Query("rollback refused".into()));

        let result: Result<()> = tm
            .with_transaction(
                &Context::background(),
                TransactionOptions::default(),
                |_ctx| async { Err(GraphError::Client("work failed".into())) },
            )
            .await;

        match result {
            Err(GraphError::Rollback { source, cause }) => {
                assert!(matches!(*source, GraphError::Query(_)));
                assert!(matches!(*cause, GraphError::Client(_)));
            }
            other => panic!("expected rollback error, got {:?}", other),
        }
        assert_eq!(graph.sessions_opened(), graph.sessions_closed());
        assert_eq!(graph.transactions_begun(), graph.transactions_closed());
    }

    #[tokio::test]
    async fn test_owned_transaction_opens_spans() {
        let graph = MemoryGraph::new();
        let tm = manager(&graph).await;
        let names = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let _default = tracing::subscriber::set_default(SpanNames {
            names: Arc::clone(&names),
            next_id: AtomicU64::new(0),
        });

        tm.with_transaction(
            &Context::background(),
            TransactionOptions::default(),
            |ctx| async move { write(&ctx, "CREATE (:A)").await },
        )
        .await
        .unwrap();

        let names = names.lock().clone();
        assert!(names.contains(&"graph.transaction"));
        assert!(names.contains(&"graph.settle"));
    }
}
