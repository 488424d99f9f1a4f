//! Retention cohort planning.
//!
//! A retention request names a first action (the cohort-defining event) and
//! an optional returning action, a date grain, an inclusive date range and an
//! optional dimension to segment cohorts by. Planning validates the request
//! against the first action's collection schema and produces a single SQL
//! statement: two common table expressions bucket each action's actors by
//! truncated event time, then a self-join counts distinct actors per
//! `(cohort bucket, period offset)` cell.
//!
//! The engine only returns cells with at least one actor; [`RetentionPlan::zero_fill`]
//! expands the result to the full bucket/offset grid so consumers get a dense
//! matrix.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use eventlake_metadata::{FieldType, SchemaField};

use crate::error::{Result, SqlError};
use crate::expression::{parse_filter, FilterExpr};
use crate::ident::{check_collection, check_field};

/// System field holding the acting user's identity on every event.
pub const ACTOR_FIELD: &str = "_actor";
/// System field holding the event timestamp.
pub const TIME_FIELD: &str = "_time";

/// Cohort bucketing grain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DateUnit {
    #[serde(alias = "day")]
    Day,
    #[serde(alias = "week")]
    Week,
    #[serde(alias = "month")]
    Month,
}

impl DateUnit {
    /// The unit name as passed to `date_trunc` / `date_diff`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DateUnit::Day => "day",
            DateUnit::Week => "week",
            DateUnit::Month => "month",
        }
    }

    /// First date of the bucket containing `date`. Weeks start on Monday.
    pub fn truncate(&self, date: NaiveDate) -> NaiveDate {
        match self {
            DateUnit::Day => date,
            DateUnit::Week => date - Days::new(u64::from(date.weekday().num_days_from_monday())),
            DateUnit::Month => date.with_day(1).unwrap_or(date),
        }
    }

    /// First date of the bucket following the one starting at `date`.
    pub fn step(&self, date: NaiveDate) -> NaiveDate {
        match self {
            DateUnit::Day => date + Days::new(1),
            DateUnit::Week => date + Days::new(7),
            DateUnit::Month => date + Months::new(1),
        }
    }
}

impl fmt::Display for DateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a retention query: a collection and an optional row filter.
///
/// Construction validates both parts together, so an action that exists is
/// always safe to plan against.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionAction {
    pub collection: String,
    pub filter: Option<FilterExpr>,
}

impl RetentionAction {
    pub fn new(collection: impl Into<String>, filter: Option<&str>) -> Result<Self> {
        let collection = collection.into();
        check_collection(&collection)?;
        let filter = filter.map(parse_filter).transpose()?;
        Ok(Self { collection, filter })
    }
}

/// A validated-at-the-edges retention request.
///
/// `returning_action` defaults to the first action when absent, which yields
/// self-retention: how many actors who did the action in a bucket did it
/// again in later buckets.
#[derive(Debug, Clone)]
pub struct RetentionRequest {
    pub project: String,
    pub first_action: Option<RetentionAction>,
    pub returning_action: Option<RetentionAction>,
    pub date_unit: DateUnit,
    pub dimension: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// The executable output of planning: the statement to run plus everything
/// needed to interpret and densify its result.
#[derive(Debug, Clone)]
pub struct RetentionPlan {
    pub statement: String,
    /// Bucket start dates covering the request range, ascending.
    pub buckets: Vec<NaiveDate>,
    pub dimension: Option<String>,
    /// Result columns, in output order.
    pub columns: Vec<SchemaField>,
}

/// Build a retention plan from a request and the first action's schema.
///
/// `first_collection_fields` is consulted only for the dimension; the actor
/// and time fields are system fields present on every collection.
pub fn plan(request: &RetentionRequest, first_collection_fields: &[SchemaField]) -> Result<RetentionPlan> {
    let first = request.first_action.as_ref().ok_or_else(|| {
        SqlError::InvalidRequest("a first action is required".to_string())
    })?;
    let returning = request.returning_action.as_ref().unwrap_or(first);

    if request.start_date > request.end_date {
        return Err(SqlError::InvalidDateRange {
            start: request.start_date,
            end: request.end_date,
        });
    }

    let mut dimension_field = None;
    if let Some(dimension) = &request.dimension {
        check_field(dimension)?;
        dimension_field = Some(
            first_collection_fields
                .iter()
                .find(|f| &f.name == dimension)
                .ok_or_else(|| SqlError::UnknownField {
                    collection: first.collection.clone(),
                    field: dimension.clone(),
                })?
                .clone(),
        );
    }

    let buckets = bucket_domain(request.date_unit, request.start_date, request.end_date);
    let statement = build_statement(request, first, returning);

    let mut columns = vec![SchemaField::new("bucket", FieldType::Date)];
    if let Some(field) = dimension_field {
        columns.push(SchemaField::new("dimension", field.field_type));
    }
    columns.push(SchemaField::new("period", FieldType::Long));
    columns.push(SchemaField::new("actors", FieldType::Long));

    Ok(RetentionPlan {
        statement,
        buckets,
        dimension: request.dimension.clone(),
        columns,
    })
}

/// Bucket start dates from the bucket containing `start` through the bucket
/// containing `end`, ascending.
pub fn bucket_domain(unit: DateUnit, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let last = unit.truncate(end);
    let mut current = unit.truncate(start);
    let mut buckets = Vec::new();
    while current <= last {
        buckets.push(current);
        current = unit.step(current);
    }
    buckets
}

fn build_statement(
    request: &RetentionRequest,
    first: &RetentionAction,
    returning: &RetentionAction,
) -> String {
    let unit = request.date_unit;
    // Exclusive upper bound: the range is inclusive of end_date's events.
    let end_exclusive = request.end_date + Days::new(1);

    let first_cte = action_subquery(
        first,
        unit,
        request.dimension.as_deref(),
        request.start_date,
        end_exclusive,
    );
    let returning_cte = action_subquery(returning, unit, None, request.start_date, end_exclusive);

    let (projection, tail) = if request.dimension.is_some() {
        ("f.bucket AS bucket, f.dimension AS dimension", "GROUP BY 1, 2, 3\nORDER BY 1, 2, 3")
    } else {
        ("f.bucket AS bucket", "GROUP BY 1, 2\nORDER BY 1, 2")
    };

    format!(
        "WITH first_action AS (\n  {first_cte}\n), returning_action AS (\n  {returning_cte}\n)\n\
         SELECT {projection}, date_diff('{unit}', f.bucket, r.bucket) AS period, count(DISTINCT f.actor) AS actors\n\
         FROM first_action f\n\
         JOIN returning_action r ON f.actor = r.actor AND r.bucket >= f.bucket\n\
         {tail}"
    )
}

fn action_subquery(
    action: &RetentionAction,
    unit: DateUnit,
    dimension: Option<&str>,
    start: NaiveDate,
    end_exclusive: NaiveDate,
) -> String {
    let mut sql = format!(
        "SELECT \"{ACTOR_FIELD}\" AS actor, CAST(date_trunc('{unit}', \"{TIME_FIELD}\") AS DATE) AS bucket"
    );
    if let Some(dimension) = dimension {
        sql.push_str(&format!(", \"{dimension}\" AS dimension"));
    }
    sql.push_str(&format!(
        " FROM \"{}\" WHERE \"{TIME_FIELD}\" >= DATE '{start}' AND \"{TIME_FIELD}\" < DATE '{end_exclusive}'",
        action.collection
    ));
    if let Some(filter) = &action.filter {
        sql.push_str(&format!(" AND ({filter})"));
    }
    sql.push_str(if dimension.is_some() {
        " GROUP BY 1, 2, 3"
    } else {
        " GROUP BY 1, 2"
    });
    sql
}

impl RetentionPlan {
    /// Largest period offset in the dense grid.
    pub fn max_offset(&self) -> i64 {
        self.buckets.len() as i64 - 1
    }

    /// Expand a sparse engine result to the full `bucket x offset` grid,
    /// filling missing cells with zero actor counts.
    ///
    /// Rows are keyed by their bucket, period and (if segmented) dimension
    /// value; rows whose bucket or period cannot be read are dropped. When a
    /// dimension is present the grid is repeated per dimension value observed
    /// in the result, so a result with no rows stays empty. Output is ordered
    /// by bucket, then period, then dimension value.
    pub fn zero_fill(&self, rows: &[Vec<Value>]) -> Vec<Vec<Value>> {
        let has_dimension = self.dimension.is_some();
        let (dim_idx, period_idx, actors_idx) = if has_dimension { (1, 2, 3) } else { (0, 1, 2) };

        let mut present: HashMap<(NaiveDate, Option<String>, i64), Value> = HashMap::new();
        // Dimension key -> original value, ordered for deterministic output.
        let mut dimensions: BTreeMap<Option<String>, Value> = BTreeMap::new();
        if !has_dimension {
            dimensions.insert(None, Value::Null);
        }

        for row in rows {
            let Some(bucket) = row.first().and_then(parse_bucket) else {
                continue;
            };
            let Some(period) = row.get(period_idx).and_then(Value::as_i64) else {
                continue;
            };
            let dimension = if has_dimension {
                let value = row.get(dim_idx).cloned().unwrap_or(Value::Null);
                let key = Some(dimension_key(&value));
                dimensions.insert(key.clone(), value);
                key
            } else {
                None
            };
            let actors = row
                .get(actors_idx)
                .cloned()
                .unwrap_or_else(|| Value::from(0));
            present.insert((bucket, dimension, period), actors);
        }

        let max_offset = self.max_offset();
        let mut grid = Vec::with_capacity(self.buckets.len() * dimensions.len() * (max_offset as usize + 1));
        for &bucket in &self.buckets {
            for period in 0..=max_offset {
                for (key, value) in &dimensions {
                    let actors = present
                        .get(&(bucket, key.clone(), period))
                        .cloned()
                        .unwrap_or_else(|| Value::from(0));
                    let mut row = Vec::with_capacity(self.columns.len());
                    row.push(Value::String(bucket.to_string()));
                    if has_dimension {
                        row.push(value.clone());
                    }
                    row.push(Value::from(period));
                    row.push(actors);
                    grid.push(row);
                }
            }
        }
        grid
    }
}

fn parse_bucket(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?;
    // Engines may return a timestamp rendering; the date is the first 10 bytes.
    let date_part = text.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn dimension_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
