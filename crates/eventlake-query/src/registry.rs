//! In-memory continuous query registry.
//!
//! The registry is the live, authoritative view of continuous query state;
//! the metadata store trails it as the durable copy. Definitions move through
//! a small state machine:
//!
//! ```text
//! (insert) -> Pending -> Active   -> Deleting -> (removed)
//!                     \-> Failed  -/
//! ```
//!
//! `mark_active` / `mark_failed` only apply to `Pending` entries. A delete
//! can race the materialization continuation; when it wins, the late
//! transition reports "not applied" and the continuation stands down.

use std::collections::HashMap;

use tokio::sync::RwLock;

use eventlake_metadata::{ContinuousQueryDefinition, QueryStatus, SchemaField};

#[derive(Default)]
pub struct ContinuousQueryRegistry {
    /// Project -> definitions, in insertion order.
    queries: RwLock<HashMap<String, Vec<ContinuousQueryDefinition>>>,
}

impl ContinuousQueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new definition in `Pending` state. Returns `false` without
    /// modifying anything if the `(project, name)` pair is already taken.
    pub async fn insert_pending(&self, definition: ContinuousQueryDefinition) -> bool {
        let mut queries = self.queries.write().await;
        let entries = queries.entry(definition.project.clone()).or_default();
        if entries.iter().any(|d| d.name == definition.name) {
            return false;
        }
        entries.push(definition);
        true
    }

    /// Re-register definitions loaded from durable storage, replacing the
    /// project's current entries. Definitions that were mid-materialization
    /// when the process stopped come back as `Failed`.
    pub async fn restore(&self, project: &str, definitions: Vec<ContinuousQueryDefinition>) {
        let mut restored = definitions;
        for definition in &mut restored {
            if definition.status == QueryStatus::Pending {
                definition.status = QueryStatus::Failed;
                definition.error_message =
                    Some("materialization was interrupted by a restart".to_string());
            }
        }
        let mut queries = self.queries.write().await;
        queries.insert(project.to_string(), restored);
    }

    /// Promote a `Pending` definition to `Active`, recording the schema of
    /// the materialized table. Returns the updated definition, or `None` when
    /// the entry is missing or no longer `Pending`.
    pub async fn mark_active(
        &self,
        project: &str,
        name: &str,
        schema: Vec<SchemaField>,
    ) -> Option<ContinuousQueryDefinition> {
        self.transition(project, name, |definition| {
            definition.status = QueryStatus::Active;
            definition.schema = schema;
            definition.error_message = None;
        })
        .await
    }

    /// Move a `Pending` definition to `Failed`. Returns the updated
    /// definition, or `None` when the entry is missing or no longer `Pending`.
    pub async fn mark_failed(
        &self,
        project: &str,
        name: &str,
        message: String,
    ) -> Option<ContinuousQueryDefinition> {
        self.transition(project, name, |definition| {
            definition.status = QueryStatus::Failed;
            definition.error_message = Some(message);
        })
        .await
    }

    async fn transition(
        &self,
        project: &str,
        name: &str,
        apply: impl FnOnce(&mut ContinuousQueryDefinition),
    ) -> Option<ContinuousQueryDefinition> {
        let mut queries = self.queries.write().await;
        let definition = queries
            .get_mut(project)?
            .iter_mut()
            .find(|d| d.name == name && d.status == QueryStatus::Pending)?;
        apply(definition);
        Some(definition.clone())
    }

    /// Move a definition into `Deleting` from any state, returning it. The
    /// transition is idempotent: a definition already `Deleting` is returned
    /// as-is, so a retried delete can pick up where a failed drop left off.
    pub async fn begin_delete(
        &self,
        project: &str,
        name: &str,
    ) -> Option<ContinuousQueryDefinition> {
        let mut queries = self.queries.write().await;
        let definition = queries.get_mut(project)?.iter_mut().find(|d| d.name == name)?;
        definition.status = QueryStatus::Deleting;
        Some(definition.clone())
    }

    /// Remove a definition outright: after its backing table is gone, or to
    /// roll back a registration whose materialization never started.
    pub async fn remove(&self, project: &str, name: &str) {
        let mut queries = self.queries.write().await;
        if let Some(entries) = queries.get_mut(project) {
            entries.retain(|d| d.name != name);
        }
    }

    pub async fn get(&self, project: &str, name: &str) -> Option<ContinuousQueryDefinition> {
        let queries = self.queries.read().await;
        queries
            .get(project)?
            .iter()
            .find(|d| d.name == name)
            .cloned()
    }

    /// All definitions for a project, in insertion order.
    pub async fn list(&self, project: &str) -> Vec<ContinuousQueryDefinition> {
        let queries = self.queries.read().await;
        queries.get(project).cloned().unwrap_or_default()
    }
}
