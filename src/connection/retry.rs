//! Connectivity-retry guard.
//!
//! Runs a unit of work once. On a connectivity-class failure it asks the
//! driver handle to make sure the connection is alive (reconnecting if not)
//! and runs the work exactly one more time. Any other failure is returned
//! untouched.

use super::DriverHandle;
use crate::core::Result;
use crate::transaction::Context;
use log::warn;
use std::future::Future;

pub async fn guard<T, F, Fut>(ctx: &Context, driver: &DriverHandle, mut work: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match work().await {
        Err(err) if err.is_connectivity() => {
            warn!("Connectivity failure, retrying once after reconnect: {}", err);
            driver.ensure_alive(ctx).await?;
            work().await
        }
        outcome => outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::MemoryGraph;
    use crate::core::GraphError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn handle(graph: &MemoryGraph) -> DriverHandle {
        DriverHandle::connect(graph.connector(), "bolt://memory", "neo4j", "pw")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_runs_once() {
        let graph = MemoryGraph::new();
        let driver = handle(&graph).await;
        let calls = AtomicUsize::new(0);

        let value = guard(&Context::background(), &driver, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_query_error_is_not_retried() {
        let graph = MemoryGraph::new();
        let driver = handle(&graph).await;
        let calls = AtomicUsize::new(0);

        let result: Result<()> = guard(&Context::background(), &driver, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GraphError::Query("syntax error".into()))
        })
        .await;

        assert!(matches!(result, Err(GraphError::Query(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(driver.reconnects(), 0);
    }

    #[tokio::test]
    async fn test_connectivity_error_retried_exactly_once() {
        let graph = MemoryGraph::new();
        let driver = handle(&graph).await;
        let calls = AtomicUsize::new(0);

        graph.drop_connections();
        let result: Result<()> = guard(&Context::background(), &driver, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GraphError::Connectivity("connection reset".into()))
        })
        .await;

        assert!(matches!(result, Err(GraphError::Connectivity(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(driver.reconnects(), 1);
    }

    #[tokio::test]
    async fn test_failed_reconnect_is_returned() {
        let graph = MemoryGraph::new();
        let driver = handle(&graph).await;
        let calls = AtomicUsize::new(0);

        graph.set_online(false);
        let result: Result<()> = guard(&Context::background(), &driver, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GraphError::Connectivity("connection refused".into()))
        })
        .await;

        assert!(matches!(result, Err(GraphError::Connection { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
