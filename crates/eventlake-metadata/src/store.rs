//! In-memory metadata storage.
//!
//! HashMap-backed implementations of the two metadata capabilities, protected
//! by `tokio::sync::RwLock`. Suitable for development, testing, and
//! single-node deployments; durable backends implement the same traits.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::{ContinuousQueryDefinition, SchemaField};
use crate::{EventSchemaMetastore, QueryMetadataStore};

/// In-memory continuous query definition store.
#[derive(Default)]
pub struct MemoryQueryMetadataStore {
    /// Project -> definitions, in insertion order.
    definitions: RwLock<HashMap<String, Vec<ContinuousQueryDefinition>>>,
}

impl MemoryQueryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueryMetadataStore for MemoryQueryMetadataStore {
    async fn save(&self, definition: ContinuousQueryDefinition) -> Result<()> {
        let mut definitions = self.definitions.write().await;
        let entries = definitions.entry(definition.project.clone()).or_default();
        if let Some(existing) = entries.iter_mut().find(|d| d.name == definition.name) {
            *existing = definition;
        } else {
            tracing::debug!(
                project = %definition.project,
                name = %definition.name,
                "continuous query definition persisted"
            );
            entries.push(definition);
        }
        Ok(())
    }

    async fn get_all(&self, project: &str) -> Result<Vec<ContinuousQueryDefinition>> {
        let definitions = self.definitions.read().await;
        Ok(definitions.get(project).cloned().unwrap_or_default())
    }

    async fn delete(&self, project: &str, name: &str) -> Result<bool> {
        let mut definitions = self.definitions.write().await;
        let Some(entries) = definitions.get_mut(project) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|d| d.name != name);
        Ok(entries.len() < before)
    }
}

/// In-memory event schema catalog.
///
/// Projects must be registered explicitly; `get_schemas` distinguishes an
/// unknown project (`None`) from a known project with no collections.
#[derive(Default)]
pub struct MemorySchemaMetastore {
    /// Project -> collection -> ordered fields.
    schemas: RwLock<HashMap<String, HashMap<String, Vec<SchemaField>>>>,
}

impl MemorySchemaMetastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a project with no collections yet.
    pub async fn add_project(&self, project: impl Into<String>) {
        let mut schemas = self.schemas.write().await;
        schemas.entry(project.into()).or_default();
    }

    /// Register (or replace) a collection's schema under a project.
    pub async fn put_collection(
        &self,
        project: impl Into<String>,
        collection: impl Into<String>,
        fields: Vec<SchemaField>,
    ) {
        let mut schemas = self.schemas.write().await;
        schemas
            .entry(project.into())
            .or_default()
            .insert(collection.into(), fields);
    }
}

#[async_trait]
impl EventSchemaMetastore for MemorySchemaMetastore {
    async fn get_schemas(&self, project: &str) -> Result<Option<HashMap<String, Vec<SchemaField>>>> {
        let schemas = self.schemas.read().await;
        Ok(schemas.get(project).cloned())
    }
}
