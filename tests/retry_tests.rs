/// Connectivity retry tests
///
/// Tests that connectivity failures trigger one reconnect and one retry,
/// and that every other failure propagates untouched.
/// Run with: cargo test --test retry_tests

use graphtx::client::memory::{Fault, MemoryGraph};
use graphtx::{Client, Context, GraphError, Params, Record};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

async fn connect(graph: &MemoryGraph) -> Client {
    Client::connect(graph.connector(), "bolt://localhost:7687", "neo4j", "secret")
        .await
        .unwrap()
}

#[tokio::test]
async fn test_dropped_connection_reconnects_and_retries_query() {
    let graph = MemoryGraph::new();
    let client = connect(&graph).await;
    graph.respond("RETURN 1 AS n", vec![Record::single("n", 1)]);

    graph.drop_connections();

    let rows = client
        .execute(&Context::background(), "RETURN 1 AS n", &Params::new())
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(client.driver().reconnects(), 1);
    assert_eq!(graph.connects(), 2);
    assert_eq!(graph.drivers_closed(), 1);
    assert_eq!(graph.queries(), 1);
    assert_eq!(graph.sessions_opened(), graph.sessions_closed());
}

#[tokio::test]
async fn test_connectivity_fault_on_live_driver_retries_without_reconnect() {
    let graph = MemoryGraph::new();
    let client = connect(&graph).await;
    graph.fail_query("CREATE (:A)", Fault::Connectivity("connection reset".into()));

    client
        .execute(&Context::background(), "CREATE (:A)", &Params::new())
        .await
        .unwrap();

    assert_eq!(client.driver().reconnects(), 0);
    assert_eq!(graph.committed_queries(), vec!["CREATE (:A)".to_string()]);
    assert_eq!(graph.sessions_opened(), 2);
    assert_eq!(graph.sessions_opened(), graph.sessions_closed());
}

#[tokio::test]
async fn test_query_error_is_not_retried() {
    let graph = MemoryGraph::new();
    let client = connect(&graph).await;
    graph.fail_query("CREATE (:A)", Fault::Query("syntax error".into()));

    let result = client
        .execute(&Context::background(), "CREATE (:A)", &Params::new())
        .await;

    assert!(matches!(result, Err(GraphError::Query(_))));
    assert_eq!(graph.connect_attempts(), 1);
    assert_eq!(graph.sessions_opened(), 1);
    assert_eq!(client.driver().reconnects(), 0);
}

#[tokio::test]
async fn test_retry_happens_only_once() {
    let graph = MemoryGraph::new();
    let client = connect(&graph).await;
    graph.fail_query("CREATE (:A)", Fault::Connectivity("reset".into()));
    graph.fail_query("CREATE (:A)", Fault::Connectivity("reset again".into()));
    graph.fail_query("CREATE (:A)", Fault::Connectivity("still down".into()));

    let result = client
        .execute(&Context::background(), "CREATE (:A)", &Params::new())
        .await;

    match result {
        Err(GraphError::Connectivity(msg)) => assert_eq!(msg, "reset again"),
        other => panic!("expected connectivity error, got {:?}", other),
    }
    assert_eq!(graph.sessions_opened(), 2);
}

#[tokio::test]
async fn test_failed_reconnect_is_reported() {
    let graph = MemoryGraph::new();
    let client = connect(&graph).await;
    graph.set_online(false);

    let result = client
        .execute(&Context::background(), "CREATE (:A)", &Params::new())
        .await;

    assert!(matches!(result, Err(GraphError::Connection { .. })));
    assert_eq!(graph.connect_attempts(), 2);
    assert_eq!(client.driver().reconnects(), 0);

    // server comes back: the next call reconnects on its own
    graph.set_online(true);
    graph.drop_connections();
    client
        .execute(&Context::background(), "CREATE (:A)", &Params::new())
        .await
        .unwrap();
    assert_eq!(client.driver().reconnects(), 1);
}

#[tokio::test]
async fn test_transaction_begin_on_dead_driver_is_retried() {
    let graph = MemoryGraph::new();
    let client = connect(&graph).await;
    let runs = Arc::new(AtomicUsize::new(0));

    graph.drop_connections();

    client
        .with_transaction(&Context::background(), |ctx| {
            let client = client.clone();
            let runs = Arc::clone(&runs);
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                client.execute(&ctx, "CREATE (:A)", &Params::new()).await?;
                Ok(())
            }
        })
        .await
        .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(client.driver().reconnects(), 1);
    assert_eq!(graph.commits(), 1);
    assert_eq!(graph.sessions_opened(), graph.sessions_closed());
}

#[tokio::test]
async fn test_connection_lost_mid_transaction_reruns_whole_unit() {
    let graph = MemoryGraph::new();
    let client = connect(&graph).await;
    let runs = Arc::new(AtomicUsize::new(0));

    client
        .with_transaction(&Context::background(), |ctx| {
            let client = client.clone();
            let graph = graph.clone();
            let runs = Arc::clone(&runs);
            async move {
                if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                    graph.drop_connections();
                }
                client.execute(&ctx, "CREATE (:A)", &Params::new()).await?;
                Ok(())
            }
        })
        .await
        .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(client.driver().reconnects(), 1);
    assert_eq!(graph.committed_queries(), vec!["CREATE (:A)".to_string()]);
    assert_eq!(graph.commits(), 1);
    assert_eq!(graph.sessions_opened(), graph.sessions_closed());
    assert_eq!(graph.transactions_begun(), graph.transactions_closed());
}
