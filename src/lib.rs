// ============================================================================
// graphtx Library
// ============================================================================

pub mod client;
pub mod connection;
pub mod core;
pub mod prelude;
pub mod query;
pub mod result;
pub mod transaction;

// Re-export main types for convenience
pub use crate::core::{GraphError, Node, Params, Record, Result, Value};
pub use crate::result::{FromValue, GraphRecord};
pub use crate::transaction::{Context, TransactionManager, TxState, TxStats};

// Re-export connection API
pub use crate::connection::{
    DriverHandle,
    config::{AccessMode, ConfigSource, ConnectionConfig, SessionConfig, TransactionOptions},
};
pub use crate::query::{Disposer, QueryGateway};

use crate::client::{Connector, RowCursor};
use std::future::Future;
use std::sync::Arc;

// ============================================================================
// High-level Client API
// ============================================================================

/// Graph database client with ambient transactions and automatic reconnect.
///
/// Cheap to clone; clones share the driver handle and transaction stats.
///
/// # Examples
///
/// ```
/// use graphtx::client::memory::MemoryGraph;
/// use graphtx::{Client, Context, Params};
///
/// # #[tokio::main]
/// # async fn main() -> graphtx::Result<()> {
/// let graph = MemoryGraph::new();
/// let client =
///     Client::connect(graph.connector(), "bolt://localhost:7687", "neo4j", "secret").await?;
///
/// client
///     .with_transaction(&Context::background(), |ctx| {
///         let client = client.clone();
///         async move {
///             client.execute(&ctx, "CREATE (:Person {name: 'Alice'})", &Params::new()).await?;
///             Ok(())
///         }
///     })
///     .await?;
///
/// assert_eq!(graph.commits(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    driver: Arc<DriverHandle>,
    transactions: TransactionManager,
    gateway: QueryGateway,
}

impl Client {
    /// Connect with the default database and verify connectivity.
    pub async fn connect(
        connector: Arc<dyn Connector>,
        uri: &str,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let driver = DriverHandle::connect(connector, uri, username, password).await?;
        Ok(Self::from_driver(Arc::new(driver)))
    }

    /// Connect with custom configuration
    ///
    /// # Examples
    ///
    /// ```
    /// # use graphtx::client::memory::MemoryGraph;
    /// # use graphtx::{Client, ConnectionConfig};
    /// # #[tokio::main]
    /// # async fn main() -> graphtx::Result<()> {
    /// # let graph = MemoryGraph::new();
    /// let config = ConnectionConfig::new("neo4j://db.internal:7687", "app", "secret")
    ///     .database("movies");
    ///
    /// let client = Client::connect_with_config(graph.connector(), config).await?;
    /// assert_eq!(client.driver().session_config().database, "movies");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect_with_config(
        connector: Arc<dyn Connector>,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let driver = DriverHandle::connect_with_source(connector, config.into()).await?;
        Ok(Self::from_driver(Arc::new(driver)))
    }

    /// Connect with parameters read from `{prefix}_URI`, `{prefix}_USERNAME`,
    /// `{prefix}_PASSWORD` and `{prefix}_DATABASE`.
    ///
    /// The variables are read again on every reconnect.
    pub async fn from_env(connector: Arc<dyn Connector>, prefix: &str) -> Result<Self> {
        let driver =
            DriverHandle::connect_with_source(connector, ConfigSource::env(prefix)).await?;
        Ok(Self::from_driver(Arc::new(driver)))
    }

    /// Build a client around an existing driver handle.
    pub fn from_driver(driver: Arc<DriverHandle>) -> Self {
        Self {
            transactions: TransactionManager::new(Arc::clone(&driver)),
            gateway: QueryGateway::new(Arc::clone(&driver)),
            driver,
        }
    }

    /// Run `work` in the ambient transaction of `ctx`, or in a new one.
    ///
    /// See [`TransactionManager::with_transaction`].
    pub async fn with_transaction<T, F, Fut>(&self, ctx: &Context, work: F) -> Result<T>
    where
        F: Fn(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.transactions
            .with_transaction(ctx, TransactionOptions::default(), work)
            .await
    }

    /// Like [`Client::with_transaction`], with explicit options.
    pub async fn with_transaction_opts<T, F, Fut>(
        &self,
        ctx: &Context,
        options: TransactionOptions,
        work: F,
    ) -> Result<T>
    where
        F: Fn(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.transactions.with_transaction(ctx, options, work).await
    }

    /// Run a query and collect its rows.
    pub async fn execute(
        &self,
        ctx: &Context,
        query: &str,
        params: &Params,
    ) -> Result<Vec<Record>> {
        self.gateway.execute(ctx, query, params).await
    }

    /// Run a query and decode the first column of every row into `T`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use graphtx::client::memory::MemoryGraph;
    /// # use graphtx::{Client, Context, Params, Record, Value};
    /// # use std::collections::HashMap;
    /// graphtx::graph_record! {
    ///     #[derive(Debug)]
    ///     pub struct Person {
    ///         pub name: String,
    ///         pub age: i64,
    ///     }
    /// }
    ///
    /// # #[tokio::main]
    /// # async fn main() -> graphtx::Result<()> {
    /// # let graph = MemoryGraph::new();
    /// # let mut row = HashMap::new();
    /// # row.insert("name".to_string(), Value::from("Alice"));
    /// # row.insert("age".to_string(), Value::from(30));
    /// # graph.respond("MATCH (p:Person) RETURN p", vec![Record::single("p", row)]);
    /// # let client =
    /// #     Client::connect(graph.connector(), "bolt://localhost", "neo4j", "pw").await?;
    /// let people: Vec<Person> = client
    ///     .execute_with_mapping(
    ///         &Context::background(),
    ///         "MATCH (p:Person) RETURN p",
    ///         &Params::new(),
    ///     )
    ///     .await?;
    /// assert_eq!(people[0].name, "Alice");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute_with_mapping<T: GraphRecord>(
        &self,
        ctx: &Context,
        query: &str,
        params: &Params,
    ) -> Result<Vec<T>> {
        self.gateway.execute_with_mapping(ctx, query, params).await
    }

    /// Start a query and hand back the open cursor.
    ///
    /// The disposer must be disposed once the cursor is drained. No retry is
    /// attempted at this level.
    pub async fn start_query(
        &self,
        ctx: &Context,
        query: &str,
        params: &Params,
    ) -> (Disposer, Result<Box<dyn RowCursor>>) {
        self.gateway.run(ctx, query, params).await
    }

    pub fn driver(&self) -> &Arc<DriverHandle> {
        &self.driver
    }

    /// Transaction outcome counters
    pub fn stats(&self) -> TxStats {
        self.transactions.stats()
    }

    /// Close the underlying driver. Clones of this client stop working too.
    pub async fn close(&self, ctx: &Context) -> Result<()> {
        self.driver.close(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::collect_rows;
    use crate::client::memory::MemoryGraph;

    async fn connect(graph: &MemoryGraph) -> Client {
        Client::connect(graph.connector(), "bolt://localhost:7687", "neo4j", "pw")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_client_connect() {
        let graph = MemoryGraph::new();
        let client = connect(&graph).await;

        assert_eq!(graph.connects(), 1);
        assert_eq!(client.driver().reconnects(), 0);
        assert_eq!(client.stats(), TxStats::default());
    }

    #[tokio::test]
    async fn test_client_rejects_bad_scheme() {
        let graph = MemoryGraph::new();
        let result = Client::connect(graph.connector(), "http://localhost", "neo4j", "pw").await;

        assert!(result.is_err());
        assert_eq!(graph.connect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_client_execute() {
        let graph = MemoryGraph::new();
        let client = connect(&graph).await;
        graph.respond("RETURN 1 AS n", vec![Record::single("n", 1)]);

        let rows = client
            .execute(&Context::background(), "RETURN 1 AS n", &Params::new())
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("n"), Some(&Value::Integer(1)));
    }

    #[tokio::test]
    async fn test_client_transaction() {
        let graph = MemoryGraph::new();
        let client = connect(&graph).await;

        client
            .with_transaction(&Context::background(), |ctx| {
                let client = client.clone();
                async move {
                    client.execute(&ctx, "CREATE (:A {id: 1})", &Params::new()).await?;
                    client.execute(&ctx, "CREATE (:A {id: 2})", &Params::new()).await?;
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(graph.committed_queries().len(), 2);
        assert_eq!(graph.transactions_begun(), 1);
        assert_eq!(client.stats().committed, 1);
    }

    #[tokio::test]
    async fn test_client_start_query() {
        let graph = MemoryGraph::new();
        let client = connect(&graph).await;
        graph.respond(
            "MATCH (n) RETURN n",
            vec![Record::single("n", 1), Record::single("n", 2)],
        );

        let ctx = Context::background();
        let (disposer, cursor) = client
            .start_query(&ctx, "MATCH (n) RETURN n", &Params::new())
            .await;
        let rows = collect_rows(&ctx, cursor.unwrap().as_mut()).await.unwrap();
        disposer.dispose(&ctx).await;

        assert_eq!(rows.len(), 2);
        assert_eq!(graph.sessions_opened(), graph.sessions_closed());
    }

    #[tokio::test]
    async fn test_client_close() {
        let graph = MemoryGraph::new();
        let client = connect(&graph).await;

        client.close(&Context::background()).await.unwrap();
        assert_eq!(graph.drivers_closed(), 1);
    }
}
