//! Eventlake Metadata
//!
//! Shared data model and storage capabilities for the query core.
//!
//! ## Purpose
//!
//! While the execution engine owns the actual event data and materialized
//! tables, this crate tracks what the query core needs to know about them:
//! - **Event schemas**: which collections exist per project and their typed
//!   fields (the [`EventSchemaMetastore`] capability)
//! - **Continuous query definitions**: named analytic statements and their
//!   lifecycle state (the [`QueryMetadataStore`] capability)
//!
//! Both capabilities are traits; the durable backends live with the storage
//! collaborator. The in-memory implementations in [`store`] back tests and
//! single-node deployments.
//!
//! ## Thread Safety
//!
//! All implementations must be Send + Sync, allowing safe sharing across
//! async tasks via `Arc<dyn QueryMetadataStore>` / `Arc<dyn EventSchemaMetastore>`.

pub mod error;
pub mod store;
pub mod types;

pub use error::{MetadataError, Result};
pub use store::{MemoryQueryMetadataStore, MemorySchemaMetastore};
pub use types::*;

use std::collections::HashMap;

use async_trait::async_trait;

/// Persistent store for continuous query definitions, partitioned by project.
///
/// The registry treats this as the durable side of its state: definitions are
/// saved on creation and on every status transition, and removed once the
/// underlying materialized state has been dropped.
#[async_trait]
pub trait QueryMetadataStore: Send + Sync {
    /// Persist a definition, replacing any previous version of the same
    /// `(project, name)`.
    async fn save(&self, definition: ContinuousQueryDefinition) -> Result<()>;

    /// All persisted definitions for a project, in insertion order. Unknown
    /// projects yield an empty list.
    async fn get_all(&self, project: &str) -> Result<Vec<ContinuousQueryDefinition>>;

    /// Remove a persisted definition. Returns `true` if an entry was removed.
    async fn delete(&self, project: &str, name: &str) -> Result<bool>;
}

/// Read-only view of the event schema catalog, partitioned by project.
#[async_trait]
pub trait EventSchemaMetastore: Send + Sync {
    /// Collections and their ordered fields for a project, or `None` if the
    /// project is unknown.
    async fn get_schemas(&self, project: &str) -> Result<Option<HashMap<String, Vec<SchemaField>>>>;
}
