//! Query service error types.

use thiserror::Error;

use eventlake_metadata::MetadataError;
use eventlake_sql::SqlError;

use crate::executor::ExecutionError;

pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors surfaced by the continuous query and retention services.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] SqlError),

    #[error("Project {0} does not exist")]
    ProjectNotFound(String),

    #[error("Collection {collection} does not exist in project {project}")]
    CollectionNotFound { project: String, collection: String },

    #[error("Continuous query {name} does not exist in project {project}")]
    QueryNotFound { project: String, name: String },

    #[error("Continuous query {name} already exists in project {project}")]
    DuplicateQuery { project: String, name: String },

    #[error("Too many concurrent materializations (limit {0})")]
    TooManyMaterializations(usize),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Failed to drop table for continuous query {name} in project {project}: {message}")]
    DropFailed {
        project: String,
        name: String,
        message: String,
    },

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}
