//! Continuous query lifecycle orchestration.
//!
//! A continuous query is a named `SELECT` whose result the engine keeps
//! materialized as a table named `_cq_<name>`. Creation validates the name
//! and statement, registers the definition as `Pending`, persists it, and
//! kicks off materialization in the background; the returned [`CreateHandle`]
//! resolves once the definition settles as `Active` or `Failed`. Deletion
//! cancels any in-flight materialization, drops the backing table, and only
//! then removes the definition.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

use eventlake_metadata::{
    CollectionSchema, ContinuousQueryDefinition, EventSchemaMetastore, QueryMetadataStore,
    SchemaField,
};
use eventlake_sql::{check_collection, validate_statement};

use crate::error::{QueryError, Result};
use crate::executor::{CancelHandle, ExecutionError, QueryExecutor};
use crate::registry::ContinuousQueryRegistry;

/// Tunables for the continuous query service.
#[derive(Debug, Clone)]
pub struct QueryServiceConfig {
    /// Upper bound on concurrently running materializations, across projects.
    pub max_concurrent_materializations: usize,
    /// How long a materialization may run before it is canceled and the
    /// definition marked failed.
    pub materialization_timeout: Duration,
}

impl Default for QueryServiceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_materializations: 32,
            materialization_timeout: Duration::from_secs(300),
        }
    }
}

/// Resolves when a created query's materialization settles.
#[derive(Debug)]
pub struct CreateHandle {
    done_rx: oneshot::Receiver<Result<ContinuousQueryDefinition>>,
}

impl CreateHandle {
    /// The settled definition: `Active` on success, `Failed` with an error
    /// message when materialization failed or timed out. Errors out if the
    /// query was deleted before settling.
    pub async fn wait(self) -> Result<ContinuousQueryDefinition> {
        match self.done_rx.await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Execution(ExecutionError::Aborted)),
        }
    }
}

pub struct ContinuousQueryService {
    registry: Arc<ContinuousQueryRegistry>,
    executor: Arc<dyn QueryExecutor>,
    metastore: Arc<dyn EventSchemaMetastore>,
    store: Arc<dyn QueryMetadataStore>,
    /// In-flight materializations by `(project, name)`.
    jobs: Arc<Mutex<HashMap<(String, String), CancelHandle>>>,
    config: QueryServiceConfig,
}

impl ContinuousQueryService {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        metastore: Arc<dyn EventSchemaMetastore>,
        store: Arc<dyn QueryMetadataStore>,
        config: QueryServiceConfig,
    ) -> Self {
        Self {
            registry: Arc::new(ContinuousQueryRegistry::new()),
            executor,
            metastore,
            store,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Load a project's persisted definitions into the registry. Definitions
    /// that were `Pending` when the previous process stopped come back as
    /// `Failed`, since their materialization did not survive the restart.
    pub async fn hydrate(&self, project: &str) -> Result<()> {
        let definitions = self.store.get_all(project).await?;
        tracing::info!(
            project = %project,
            count = definitions.len(),
            "hydrating continuous query registry"
        );
        self.registry.restore(project, definitions).await;
        Ok(())
    }

    /// Register a continuous query and start materializing it.
    pub async fn create(&self, project: &str, name: &str, query: &str) -> Result<CreateHandle> {
        check_collection(name)?;
        validate_statement(query)?;
        self.project_schemas(project).await?;

        let definition = ContinuousQueryDefinition::new(project, name, query);
        let statement = format!(
            "CREATE TABLE \"{}\" AS {}",
            definition.target_table(),
            query
        );
        let key = (project.to_string(), name.to_string());

        // Slot check, registration, persistence and submission happen under
        // one jobs lock so concurrent creates cannot overshoot the limit.
        let execution = {
            let mut jobs = self.jobs.lock().await;
            if jobs.len() >= self.config.max_concurrent_materializations {
                return Err(QueryError::TooManyMaterializations(
                    self.config.max_concurrent_materializations,
                ));
            }
            if !self.registry.insert_pending(definition.clone()).await {
                return Err(QueryError::DuplicateQuery {
                    project: project.to_string(),
                    name: name.to_string(),
                });
            }
            if let Err(err) = self.store.save(definition).await {
                // Nothing was submitted; the registration must not outlive
                // the failed persist.
                self.registry.remove(project, name).await;
                return Err(err.into());
            }
            let execution = self.executor.submit(&statement);
            jobs.insert(key.clone(), execution.cancel_handle());
            execution
        };
        let cancel = execution.cancel_handle();
        tracing::info!(project = %project, name = %name, "materializing continuous query");

        let (done_tx, done_rx) = oneshot::channel();
        let registry = Arc::clone(&self.registry);
        let store = Arc::clone(&self.store);
        let jobs = Arc::clone(&self.jobs);
        let materialization_timeout = self.config.materialization_timeout;
        tokio::spawn(async move {
            let (project, name) = &key;
            let outcome = match tokio::time::timeout(materialization_timeout, execution.wait())
                .await
            {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(err)) => Err(err.to_string()),
                Err(_) => {
                    cancel.cancel();
                    Err(format!(
                        "materialization timed out after {}s",
                        materialization_timeout.as_secs()
                    ))
                }
            };
            jobs.lock().await.remove(&key);

            let settled = match outcome {
                Ok(result) => {
                    let settled = registry.mark_active(project, name, result.columns).await;
                    if settled.is_some() {
                        tracing::info!(project = %project, name = %name, "continuous query is active");
                    }
                    settled
                }
                Err(message) => {
                    tracing::warn!(
                        project = %project,
                        name = %name,
                        error = %message,
                        "continuous query materialization failed"
                    );
                    registry.mark_failed(project, name, message).await
                }
            };

            let result = match settled {
                // A delete won the race; there is nothing left to persist.
                None => Err(QueryError::QueryNotFound {
                    project: project.clone(),
                    name: name.clone(),
                }),
                Some(definition) => match store.save(definition.clone()).await {
                    Ok(()) => Ok(definition),
                    Err(err) => Err(err.into()),
                },
            };
            let _ = done_tx.send(result);
        });

        Ok(CreateHandle { done_rx })
    }

    /// A project's continuous queries, in creation order. System-internal
    /// entries (underscore-prefixed names) are not exposed.
    pub async fn list(&self, project: &str) -> Result<Vec<ContinuousQueryDefinition>> {
        self.project_schemas(project).await?;
        let definitions = self.registry.list(project).await;
        Ok(definitions
            .into_iter()
            .filter(|d| !d.name.starts_with('_'))
            .collect())
    }

    /// A single definition, regardless of state.
    pub async fn get(&self, project: &str, name: &str) -> Result<ContinuousQueryDefinition> {
        self.project_schemas(project).await?;
        self.registry
            .get(project, name)
            .await
            .ok_or_else(|| QueryError::QueryNotFound {
                project: project.to_string(),
                name: name.to_string(),
            })
    }

    /// The materialized schema of an active query. Empty until the query
    /// settles as `Active`.
    pub async fn schema(&self, project: &str, name: &str) -> Result<Vec<SchemaField>> {
        Ok(self.get(project, name).await?.schema)
    }

    /// Event collections visible in a project, sorted. System-internal
    /// collections (underscore-prefixed) are not exposed.
    pub async fn collections(&self, project: &str) -> Result<Vec<String>> {
        let schemas = self.project_schemas(project).await?;
        let mut collections: Vec<String> = schemas
            .into_keys()
            .filter(|name| !name.starts_with('_'))
            .collect();
        collections.sort();
        Ok(collections)
    }

    /// Visible event collections with their fields, sorted by name.
    pub async fn event_schemas(&self, project: &str) -> Result<Vec<CollectionSchema>> {
        let schemas = self.project_schemas(project).await?;
        let mut listing: Vec<CollectionSchema> = schemas
            .into_iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .map(|(name, fields)| CollectionSchema { name, fields })
            .collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    /// Delete a continuous query and its backing table.
    ///
    /// If the drop statement fails the definition stays in `Deleting` state
    /// and the call errors; retrying resumes from the drop.
    pub async fn delete(&self, project: &str, name: &str) -> Result<()> {
        let key = (project.to_string(), name.to_string());
        if let Some(cancel) = self.jobs.lock().await.remove(&key) {
            tracing::debug!(project = %project, name = %name, "canceling in-flight materialization");
            cancel.cancel();
        }

        let definition = self.registry.begin_delete(project, name).await.ok_or_else(|| {
            QueryError::QueryNotFound {
                project: project.to_string(),
                name: name.to_string(),
            }
        })?;

        let statement = format!("DROP TABLE IF EXISTS \"{}\"", definition.target_table());
        if let Err(err) = self.executor.submit(&statement).wait().await {
            tracing::warn!(
                project = %project,
                name = %name,
                error = %err,
                "failed to drop continuous query table"
            );
            return Err(QueryError::DropFailed {
                project: project.to_string(),
                name: name.to_string(),
                message: err.to_string(),
            });
        }

        self.store.delete(project, name).await?;
        self.registry.remove(project, name).await;
        tracing::info!(project = %project, name = %name, "continuous query deleted");
        Ok(())
    }

    async fn project_schemas(
        &self,
        project: &str,
    ) -> Result<HashMap<String, Vec<SchemaField>>> {
        self.metastore
            .get_schemas(project)
            .await?
            .ok_or_else(|| QueryError::ProjectNotFound(project.to_string()))
    }
}
