//! Metadata Type Definitions
//!
//! This module defines the data structures shared across the query core.
//!
//! ## Types Overview
//!
//! ### SchemaField / FieldType
//! A named, typed column of an event collection or of a continuous query's
//! output table. Field lists are always ordered; column order is part of the
//! execution engine contract.
//!
//! ### ContinuousQueryDefinition
//! Everything the registry knows about one continuous query: the analytic
//! statement, the output schema (filled in after the first materialization),
//! and the lifecycle status.
//!
//! ### QueryStatus
//! The lifecycle state machine for a continuous query:
//! `Pending -> {Active, Failed}`, and any of those `-> Deleting` until the
//! underlying materialized state has been dropped.
//!
//! ### CollectionSchema
//! The `{name, fields}` shape returned by schema listings, for both event
//! collections and continuous query output tables.
//!
//! ## Design Decisions
//!
//! - All types are Serialize/Deserialize for storage and API responses
//! - Timestamps are i64 (milliseconds since epoch) for simplicity
//! - Materialized state lives in a system table named `_cq_<name>`; the
//!   leading underscore keeps it out of user-visible collection listings

use serde::{Deserialize, Serialize};

/// Data type of an event field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Long,
    Double,
    Boolean,
    Date,
    Timestamp,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "STRING",
            FieldType::Long => "LONG",
            FieldType::Double => "DOUBLE",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Date => "DATE",
            FieldType::Timestamp => "TIMESTAMP",
        }
    }
}

/// A named, typed field of an event collection or query output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Field name
    pub name: String,

    /// Field data type
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Lifecycle status of a continuous query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryStatus {
    /// Registered; first materialization is in flight.
    Pending,
    /// Materialized and incrementally maintained.
    Active,
    /// Materialization failed; the definition is retained for inspection.
    Failed,
    /// Deletion requested; the external drop has not succeeded yet.
    Deleting,
}

/// A registered continuous query.
///
/// Owned by the registry for its project; the execution engine owns the
/// actual materialized data, referenced by `(project, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousQueryDefinition {
    /// Tenant/project identifier
    pub project: String,

    /// Query name (unique per project)
    pub name: String,

    /// The analytic statement being materialized
    pub query: String,

    /// Ordered output schema (empty until the first materialization completes)
    pub schema: Vec<SchemaField>,

    /// Current lifecycle status
    pub status: QueryStatus,

    /// Error recorded on materialization failure
    pub error_message: Option<String>,

    /// Creation timestamp (milliseconds since Unix epoch)
    pub created_at: i64,
}

impl ContinuousQueryDefinition {
    /// Create a fresh Pending definition.
    pub fn new(project: impl Into<String>, name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
            query: query.into(),
            schema: Vec::new(),
            status: QueryStatus::Pending,
            error_message: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Name of the system table holding this query's materialized state.
    pub fn target_table(&self) -> String {
        format!("_cq_{}", self.name)
    }
}

/// `{name, fields}` schema listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: Vec<SchemaField>,
}
