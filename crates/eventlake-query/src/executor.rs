//! Asynchronous query execution handles.
//!
//! [`QueryExecutor`] is the seam between the query core and whatever engine
//! actually runs SQL. `submit` returns immediately with a [`QueryExecution`]
//! handle; the engine side drives the paired [`ExecutionContext`], delivering
//! exactly one result and observing cancellation through a watch channel.
//! Cancellation is cooperative: flipping the flag asks the engine to stop,
//! the result (usually [`ExecutionError::Canceled`]) still arrives through
//! the normal path.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{oneshot, watch};

use eventlake_metadata::SchemaField;

/// Terminal failure states of a submitted query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Query failed: {0}")]
    Failed(String),

    #[error("Query was canceled")]
    Canceled,

    /// The engine dropped the execution without reporting a result.
    #[error("Query was aborted by the execution engine")]
    Aborted,
}

/// A completed query result: ordered typed columns and row-major values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<SchemaField>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryResult {
    pub fn new(columns: Vec<SchemaField>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self { columns, rows }
    }
}

/// Clonable handle that requests cancellation of one execution.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // Ignore send errors: the engine side may already be gone.
        let _ = self.cancel.send(true);
    }
}

/// Caller-side handle for an in-flight query.
#[derive(Debug)]
pub struct QueryExecution {
    result_rx: oneshot::Receiver<Result<QueryResult, ExecutionError>>,
    cancel: Arc<watch::Sender<bool>>,
}

impl QueryExecution {
    /// Create a linked handle pair: the caller keeps the `QueryExecution`,
    /// the engine drives the `ExecutionContext`.
    pub fn channel() -> (QueryExecution, ExecutionContext) {
        let (result_tx, result_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let execution = QueryExecution {
            result_rx,
            cancel: Arc::new(cancel_tx),
        };
        let context = ExecutionContext {
            result_tx,
            cancel_rx,
        };
        (execution, context)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Wait for the terminal result. If the engine drops its context without
    /// reporting, the execution counts as aborted.
    pub async fn wait(self) -> Result<QueryResult, ExecutionError> {
        match self.result_rx.await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Aborted),
        }
    }
}

/// Engine-side handle for one execution.
#[derive(Debug)]
pub struct ExecutionContext {
    result_tx: oneshot::Sender<Result<QueryResult, ExecutionError>>,
    cancel_rx: watch::Receiver<bool>,
}

impl ExecutionContext {
    /// Deliver the terminal result, consuming the context.
    pub fn finish(self, result: Result<QueryResult, ExecutionError>) {
        let _ = self.result_tx.send(result);
    }

    /// Whether cancellation has been requested.
    pub fn is_canceled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Resolves once cancellation is requested. Also resolves if every
    /// caller-side handle is gone, since nobody is waiting for the result.
    pub async fn canceled(&mut self) {
        let _ = self.cancel_rx.wait_for(|canceled| *canceled).await;
    }
}

/// Submits SQL to an execution engine.
///
/// `submit` must not block: implementations hand the statement off and
/// return the caller-side handle immediately.
pub trait QueryExecutor: Send + Sync {
    fn submit(&self, statement: &str) -> QueryExecution;
}
