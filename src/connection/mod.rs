pub mod config;
pub mod retry;

use crate::client::{Connector, GraphDriver};
use crate::core::{GraphError, Result};
use crate::transaction::Context;
use config::{ConfigSource, ConnectionConfig, SessionConfig};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Process-wide handle to the live driver.
///
/// The driver inside is replaced in place when connectivity is lost; holders
/// of the handle pick up the fresh driver on their next call. Only one
/// replacement runs at a time.
pub struct DriverHandle {
    /// Current driver. Read on every operation, written only on reconnect.
    slot: RwLock<Arc<dyn GraphDriver>>,
    /// Serializes reconnects.
    reconnect_lock: Mutex<()>,
    connector: Arc<dyn Connector>,
    source: ConfigSource,
    session_config: SessionConfig,
    reconnects: AtomicU64,
}

impl DriverHandle {
    /// Connect and verify connectivity before returning.
    pub async fn connect(
        connector: Arc<dyn Connector>,
        uri: &str,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let config = ConnectionConfig::new(uri, username, password);
        Self::connect_with_source(connector, config.into()).await
    }

    /// Connect with parameters read from `source`. The same source is
    /// re-read on every reconnect.
    pub async fn connect_with_source(
        connector: Arc<dyn Connector>,
        source: ConfigSource,
    ) -> Result<Self> {
        let config = source.load()?;
        let driver = open_driver(&Context::background(), connector.as_ref(), &config).await?;

        Ok(Self {
            slot: RwLock::new(driver),
            reconnect_lock: Mutex::new(()),
            connector,
            session_config: config.session_config(),
            source,
            reconnects: AtomicU64::new(0),
        })
    }

    /// The live driver.
    pub async fn current(&self) -> Arc<dyn GraphDriver> {
        Arc::clone(&*self.slot.read().await)
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    /// Number of completed reconnects since construction.
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Make sure the driver is usable, reconnecting if it is not.
    ///
    /// The fast path never touches the reconnect lock. Callers that observe a
    /// dead driver queue on the lock; the first one reconnects and the rest
    /// find the fresh driver on their second check. If the reconnect fails the
    /// slot keeps the old driver so a later call can try again.
    ///
    /// Only a connectivity-class failure counts as a dead driver. Any other
    /// failure of the check, `DeadlineExceeded` included, is returned as is
    /// and the driver stays in place. Every step runs under `ctx`'s deadline.
    #[instrument(name = "graph.ensure_alive", skip_all, fields(db.system = "neo4j"))]
    pub async fn ensure_alive(&self, ctx: &Context) -> Result<()> {
        let driver = self.current().await;
        if check_alive(ctx, driver.as_ref()).await? {
            return Ok(());
        }

        let _guard = ctx
            .bounded(async { Ok(self.reconnect_lock.lock().await) })
            .await?;

        let stale = self.current().await;
        if check_alive(ctx, stale.as_ref()).await? {
            return Ok(());
        }

        warn!("Graph driver is unreachable, reconnecting");

        if let Err(err) = ctx.bounded(stale.close(ctx)).await {
            error!("Failed to close dead graph driver: {}", err);
        }

        let config = self.source.load().map_err(|err| {
            error!("Error while reading connection parameters: {}", err);
            GraphError::connection(self.source.describe(), err)
        })?;

        let fresh = open_driver(ctx, self.connector.as_ref(), &config)
            .await
            .inspect_err(|err| {
                error!("Error while reconnecting to {}: {}", config.redacted_url(), err);
            })?;

        *self.slot.write().await = fresh;
        let count = self.reconnects.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Reconnected to {} (reconnect #{})", config.redacted_url(), count);

        Ok(())
    }

    /// Close the live driver. Intended for process shutdown.
    pub async fn close(&self, ctx: &Context) -> Result<()> {
        self.current().await.close(ctx).await
    }
}

/// `Ok(true)` if the driver answered, `Ok(false)` if it is unreachable.
async fn check_alive(ctx: &Context, driver: &dyn GraphDriver) -> Result<bool> {
    match ctx.bounded(driver.verify_connectivity(ctx)).await {
        Ok(()) => Ok(true),
        Err(err) if err.is_connectivity() => {
            debug!("Connectivity check failed: {}", err);
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// Connect and verify under `ctx`'s deadline, capped by the liveness timeout.
async fn open_driver(
    ctx: &Context,
    connector: &dyn Connector,
    config: &ConnectionConfig,
) -> Result<Arc<dyn GraphDriver>> {
    config.validate()?;

    let url = config.redacted_url();
    let driver = ctx
        .bounded(connector.connect(config))
        .await
        .map_err(|err| GraphError::connection(url.clone(), err))?;

    let verify_ctx = ctx.with_timeout(config.liveness_check_timeout());
    let verified = verify_ctx
        .bounded(driver.verify_connectivity(&verify_ctx))
        .await;
    if let Err(err) = verified {
        let cleanup = Context::background().with_timeout(config.liveness_check_timeout());
        if let Err(close_err) = cleanup.bounded(driver.close(&cleanup)).await {
            error!("Failed to close unverified graph driver: {}", close_err);
        }
        return Err(GraphError::connection(url, err));
    }

    info!("Connected to {}", url);
    Ok(driver)
}
