//! Retention query execution facade.
//!
//! Thin orchestration over the planner in `eventlake-sql`: resolve the
//! project's schemas, check the actions against real collections, plan,
//! submit, and densify the engine's sparse result on the way out.

use std::sync::Arc;

use eventlake_metadata::EventSchemaMetastore;
use eventlake_sql::retention::{plan, RetentionPlan, RetentionRequest};

use crate::error::{QueryError, Result};
use crate::executor::{CancelHandle, QueryExecution, QueryExecutor, QueryResult};

pub struct RetentionQueryService {
    executor: Arc<dyn QueryExecutor>,
    metastore: Arc<dyn EventSchemaMetastore>,
}

/// An in-flight retention query plus the plan needed to shape its result.
#[derive(Debug)]
pub struct RetentionExecution {
    execution: QueryExecution,
    plan: RetentionPlan,
}

impl RetentionExecution {
    pub fn plan(&self) -> &RetentionPlan {
        &self.plan
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.execution.cancel_handle()
    }

    /// Wait for the engine result and expand it to the dense cohort grid.
    pub async fn wait(self) -> Result<QueryResult> {
        let result = self.execution.wait().await?;
        let rows = self.plan.zero_fill(&result.rows);
        Ok(QueryResult::new(self.plan.columns, rows))
    }
}

impl RetentionQueryService {
    pub fn new(executor: Arc<dyn QueryExecutor>, metastore: Arc<dyn EventSchemaMetastore>) -> Self {
        Self { executor, metastore }
    }

    /// Validate and submit a retention query.
    ///
    /// Validation failures surface here before anything reaches the engine:
    /// unknown project, unknown collections, unknown dimension, inverted
    /// date range, or a missing first action.
    pub async fn query(&self, request: &RetentionRequest) -> Result<RetentionExecution> {
        let schemas = self
            .metastore
            .get_schemas(&request.project)
            .await?
            .ok_or_else(|| QueryError::ProjectNotFound(request.project.clone()))?;

        for action in request
            .first_action
            .iter()
            .chain(request.returning_action.iter())
        {
            if !schemas.contains_key(&action.collection) {
                return Err(QueryError::CollectionNotFound {
                    project: request.project.clone(),
                    collection: action.collection.clone(),
                });
            }
        }

        let first_fields = request
            .first_action
            .as_ref()
            .and_then(|action| schemas.get(&action.collection))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let plan = plan(request, first_fields)?;

        tracing::debug!(
            project = %request.project,
            unit = %request.date_unit,
            buckets = plan.buckets.len(),
            "submitting retention query"
        );
        let execution = self.executor.submit(&plan.statement);
        Ok(RetentionExecution { execution, plan })
    }
}
