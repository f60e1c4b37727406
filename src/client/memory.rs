//! In-process graph client.
//!
//! Does not interpret queries: rows are scripted per query text with
//! [`MemoryGraph::respond`], and every query run inside a committed
//! transaction (or auto-committed on a session) is appended to the
//! committed log. Counters for every open/close/commit/rollback make it
//! usable as a spy, and faults can be injected at each step.
//!
//! Connection loss is modelled with epochs: [`MemoryGraph::drop_connections`]
//! kills every driver opened so far while new connects still succeed, and
//! [`MemoryGraph::set_online`] takes the whole server away.

use super::{Connector, GraphDriver, GraphSession, GraphTransaction, RowCursor};
use crate::connection::config::{ConnectionConfig, SessionConfig};
use crate::core::{GraphError, Params, Record, Result};
use crate::transaction::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// A failure to inject into the next matching call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    Connectivity(String),
    Query(String),
    Session(String),
}

impl Fault {
    fn into_error(self) -> GraphError {
        match self {
            Fault::Connectivity(msg) => GraphError::Connectivity(msg),
            Fault::Query(msg) => GraphError::Query(msg),
            Fault::Session(msg) => GraphError::Session(msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTxStatus {
    Open,
    Committed,
    RolledBack,
}

/// What happened to one transaction, recorded when it is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReport {
    pub id: String,
    pub queries: Vec<String>,
    pub status: MemoryTxStatus,
}

#[derive(Default)]
struct Counters {
    connect_attempts: AtomicUsize,
    connects: AtomicUsize,
    drivers_closed: AtomicUsize,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
    transactions_begun: AtomicUsize,
    transactions_closed: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    queries: AtomicUsize,
}

#[derive(Default)]
struct Faults {
    begin: Option<Fault>,
    commit: Option<Fault>,
    rollback: Option<Fault>,
    queries: HashMap<String, VecDeque<Fault>>,
}

struct Shared {
    online: AtomicBool,
    epoch: AtomicU64,
    connect_delay: Mutex<Option<Duration>>,
    counters: Counters,
    faults: Mutex<Faults>,
    responses: Mutex<HashMap<String, Vec<Record>>>,
    committed: Mutex<Vec<String>>,
    submitted: Mutex<Vec<(String, Params)>>,
    reports: Mutex<Vec<TxReport>>,
}

impl Shared {
    fn is_alive(&self, epoch: u64) -> bool {
        self.online.load(Ordering::SeqCst) && self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn check_alive(&self, epoch: u64) -> Result<()> {
        if self.is_alive(epoch) {
            Ok(())
        } else {
            Err(GraphError::Connectivity("connection to graph server lost".into()))
        }
    }

    fn take_query_fault(&self, query: &str) -> Option<Fault> {
        self.faults
            .lock()
            .queries
            .get_mut(query.trim())
            .and_then(VecDeque::pop_front)
    }

    fn rows_for(&self, query: &str) -> Vec<Record> {
        self.responses
            .lock()
            .get(query.trim())
            .cloned()
            .unwrap_or_default()
    }

    fn record_submission(&self, query: &str, params: Params) {
        self.submitted.lock().push((query.trim().to_string(), params));
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handle to an in-memory graph server. Cheap to clone.
#[derive(Clone)]
pub struct MemoryGraph {
    shared: Arc<Shared>,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                online: AtomicBool::new(true),
                epoch: AtomicU64::new(0),
                connect_delay: Mutex::new(None),
                counters: Counters::default(),
                faults: Mutex::new(Faults::default()),
                responses: Mutex::new(HashMap::new()),
                committed: Mutex::new(Vec::new()),
                submitted: Mutex::new(Vec::new()),
                reports: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MemoryConnector {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Take the server offline (connects refused, live drivers broken) or back.
    pub fn set_online(&self, online: bool) {
        self.shared.online.store(online, Ordering::SeqCst);
    }

    /// Break every driver opened so far. New connects still succeed.
    pub fn drop_connections(&self) {
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Make every connect take `delay`.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.shared.connect_delay.lock() = Some(delay);
    }

    /// Script the rows returned for `query`.
    pub fn respond(&self, query: &str, rows: Vec<Record>) {
        self.shared
            .responses
            .lock()
            .insert(query.trim().to_string(), rows);
    }

    /// Fail the next run of `query` with `fault`. Calls stack up.
    pub fn fail_query(&self, query: &str, fault: Fault) {
        self.shared
            .faults
            .lock()
            .queries
            .entry(query.trim().to_string())
            .or_default()
            .push_back(fault);
    }

    pub fn fail_next_begin(&self, fault: Fault) {
        self.shared.faults.lock().begin = Some(fault);
    }

    pub fn fail_next_commit(&self, fault: Fault) {
        self.shared.faults.lock().commit = Some(fault);
    }

    pub fn fail_next_rollback(&self, fault: Fault) {
        self.shared.faults.lock().rollback = Some(fault);
    }

    /// Queries made durable, in commit order.
    pub fn committed_queries(&self) -> Vec<String> {
        self.shared.committed.lock().clone()
    }

    /// Every query that reached the server, with the parameters it carried,
    /// in submission order. Failed submissions included.
    pub fn submitted_params(&self) -> Vec<(String, Params)> {
        self.shared.submitted.lock().clone()
    }

    /// Reports of every closed transaction, in close order.
    pub fn transaction_log(&self) -> Vec<TxReport> {
        self.shared.reports.lock().clone()
    }

    pub fn connect_attempts(&self) -> usize {
        self.shared.counters.connect_attempts.load(Ordering::SeqCst)
    }

    /// Successful connects.
    pub fn connects(&self) -> usize {
        self.shared.counters.connects.load(Ordering::SeqCst)
    }

    pub fn drivers_closed(&self) -> usize {
        self.shared.counters.drivers_closed.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.shared.counters.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.shared.counters.sessions_closed.load(Ordering::SeqCst)
    }

    pub fn transactions_begun(&self) -> usize {
        self.shared.counters.transactions_begun.load(Ordering::SeqCst)
    }

    pub fn transactions_closed(&self) -> usize {
        self.shared.counters.transactions_closed.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.shared.counters.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.shared.counters.rollbacks.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.shared.counters.queries.load(Ordering::SeqCst)
    }
}

struct MemoryConnector {
    shared: Arc<Shared>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Arc<dyn GraphDriver>> {
        Shared::bump(&self.shared.counters.connect_attempts);

        let delay = *self.shared.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if !self.shared.online.load(Ordering::SeqCst) {
            return Err(GraphError::Connectivity("connection refused".into()));
        }

        Shared::bump(&self.shared.counters.connects);
        Ok(Arc::new(MemoryDriver {
            epoch: self.shared.epoch.load(Ordering::SeqCst),
            closed: AtomicBool::new(false),
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MemoryDriver {
    epoch: u64,
    closed: AtomicBool,
    shared: Arc<Shared>,
}

#[async_trait]
impl GraphDriver for MemoryDriver {
    async fn verify_connectivity(&self, _ctx: &Context) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GraphError::Connectivity("driver is closed".into()));
        }
        self.shared.check_alive(self.epoch)
    }

    async fn new_session(
        &self,
        _ctx: &Context,
        _config: SessionConfig,
    ) -> Result<Box<dyn GraphSession>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GraphError::Connectivity("driver is closed".into()));
        }
        Shared::bump(&self.shared.counters.sessions_opened);
        Ok(Box::new(MemorySession {
            epoch: self.epoch,
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn close(&self, _ctx: &Context) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Shared::bump(&self.shared.counters.drivers_closed);
        Ok(())
    }
}

struct MemorySession {
    epoch: u64,
    shared: Arc<Shared>,
}

#[async_trait]
impl GraphSession for MemorySession {
    async fn begin_transaction(&self, _ctx: &Context) -> Result<Arc<dyn GraphTransaction>> {
        self.shared.check_alive(self.epoch)?;
        if let Some(fault) = self.shared.faults.lock().begin.take() {
            return Err(fault.into_error());
        }

        Shared::bump(&self.shared.counters.transactions_begun);
        Ok(Arc::new(MemoryTransaction {
            id: format!("tx-{}", Uuid::new_v4()),
            epoch: self.epoch,
            shared: Arc::clone(&self.shared),
            inner: Mutex::new(TxInner {
                status: MemoryTxStatus::Open,
                queries: Vec::new(),
            }),
        }))
    }

    async fn run(
        &self,
        _ctx: &Context,
        query: &str,
        params: Params,
    ) -> Result<Box<dyn RowCursor>> {
        self.shared.check_alive(self.epoch)?;
        self.shared.record_submission(query, params);
        if let Some(fault) = self.shared.take_query_fault(query) {
            return Err(fault.into_error());
        }

        Shared::bump(&self.shared.counters.queries);
        self.shared.committed.lock().push(query.trim().to_string());
        Ok(Box::new(MemoryCursor::new(self.shared.rows_for(query))))
    }

    async fn close(&self, _ctx: &Context) -> Result<()> {
        Shared::bump(&self.shared.counters.sessions_closed);
        Ok(())
    }
}

struct TxInner {
    status: MemoryTxStatus,
    queries: Vec<String>,
}

struct MemoryTransaction {
    id: String,
    epoch: u64,
    shared: Arc<Shared>,
    inner: Mutex<TxInner>,
}

impl MemoryTransaction {
    fn ensure_open(&self, inner: &TxInner) -> Result<()> {
        if inner.status == MemoryTxStatus::Open {
            Ok(())
        } else {
            Err(GraphError::Query(format!(
                "transaction {} is no longer open",
                self.id
            )))
        }
    }
}

#[async_trait]
impl GraphTransaction for MemoryTransaction {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(
        &self,
        _ctx: &Context,
        query: &str,
        params: Params,
    ) -> Result<Box<dyn RowCursor>> {
        self.shared.check_alive(self.epoch)?;
        let mut inner = self.inner.lock();
        self.ensure_open(&inner)?;
        self.shared.record_submission(query, params);
        if let Some(fault) = self.shared.take_query_fault(query) {
            return Err(fault.into_error());
        }

        Shared::bump(&self.shared.counters.queries);
        inner.queries.push(query.trim().to_string());
        Ok(Box::new(MemoryCursor::new(self.shared.rows_for(query))))
    }

    async fn commit(&self, _ctx: &Context) -> Result<()> {
        self.shared.check_alive(self.epoch)?;
        let mut inner = self.inner.lock();
        self.ensure_open(&inner)?;
        if let Some(fault) = self.shared.faults.lock().commit.take() {
            return Err(fault.into_error());
        }

        inner.status = MemoryTxStatus::Committed;
        self.shared
            .committed
            .lock()
            .extend(inner.queries.iter().cloned());
        Shared::bump(&self.shared.counters.commits);
        Ok(())
    }

    async fn rollback(&self, _ctx: &Context) -> Result<()> {
        self.shared.check_alive(self.epoch)?;
        let mut inner = self.inner.lock();
        self.ensure_open(&inner)?;
        if let Some(fault) = self.shared.faults.lock().rollback.take() {
            return Err(fault.into_error());
        }

        inner.status = MemoryTxStatus::RolledBack;
        Shared::bump(&self.shared.counters.rollbacks);
        Ok(())
    }

    async fn close(&self, _ctx: &Context) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.status == MemoryTxStatus::Open {
            inner.status = MemoryTxStatus::RolledBack;
        }

        Shared::bump(&self.shared.counters.transactions_closed);
        self.shared.reports.lock().push(TxReport {
            id: self.id.clone(),
            queries: inner.queries.clone(),
            status: inner.status,
        });
        Ok(())
    }
}

struct MemoryCursor {
    rows: VecDeque<Record>,
}

impl MemoryCursor {
    fn new(rows: Vec<Record>) -> Self {
        Self { rows: rows.into() }
    }
}

#[async_trait]
impl RowCursor for MemoryCursor {
    async fn next(&mut self, _ctx: &Context) -> Result<Option<Record>> {
        Ok(self.rows.pop_front())
    }
}
