//! Shared test fixtures: a scriptable in-process query executor.

use std::sync::Mutex;
use std::time::Duration;

use eventlake_query::{ExecutionError, QueryExecution, QueryExecutor, QueryResult};

/// What the mock engine does with a matching statement.
#[derive(Clone)]
pub enum MockBehavior {
    Succeed(QueryResult),
    Fail(String),
    /// Park until the caller cancels, then report `Canceled`.
    HangUntilCanceled,
}

/// Engine double scripted by statement prefix. Unmatched statements succeed
/// with an empty result.
#[derive(Default)]
pub struct MockQueryExecutor {
    behaviors: Mutex<Vec<(String, MockBehavior)>>,
    submitted: Mutex<Vec<String>>,
}

impl MockQueryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a behavior for statements starting with `prefix`, replacing
    /// any earlier script for the same prefix.
    pub fn set(&self, prefix: &str, behavior: MockBehavior) {
        let mut behaviors = self.behaviors.lock().unwrap();
        behaviors.retain(|(p, _)| p != prefix);
        behaviors.push((prefix.to_string(), behavior));
    }

    /// Every statement submitted so far, in order.
    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

impl QueryExecutor for MockQueryExecutor {
    fn submit(&self, statement: &str) -> QueryExecution {
        self.submitted.lock().unwrap().push(statement.to_string());
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| statement.starts_with(prefix.as_str()))
            .map(|(_, behavior)| behavior.clone())
            .unwrap_or(MockBehavior::Succeed(QueryResult::default()));

        let (execution, mut context) = QueryExecution::channel();
        tokio::spawn(async move {
            match behavior {
                MockBehavior::Succeed(result) => context.finish(Ok(result)),
                MockBehavior::Fail(message) => {
                    context.finish(Err(ExecutionError::Failed(message)))
                }
                MockBehavior::HangUntilCanceled => {
                    let outcome = tokio::select! {
                        _ = context.canceled() => Err(ExecutionError::Canceled),
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {
                            Err(ExecutionError::Failed("mock hang timed out".to_string()))
                        }
                    };
                    context.finish(outcome);
                }
            }
        });
        execution
    }
}
