//! Lifecycle tests for the continuous query service against a scripted
//! execution engine.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{MockBehavior, MockQueryExecutor};
use eventlake_metadata::{
    ContinuousQueryDefinition, FieldType, MemoryQueryMetadataStore, MemorySchemaMetastore,
    MetadataError, QueryMetadataStore, QueryStatus, SchemaField,
};
use eventlake_query::{
    ContinuousQueryService, QueryError, QueryResult, QueryServiceConfig,
};

struct Fixture {
    executor: Arc<MockQueryExecutor>,
    metastore: Arc<MemorySchemaMetastore>,
    store: Arc<MemoryQueryMetadataStore>,
    service: ContinuousQueryService,
}

async fn fixture(config: QueryServiceConfig) -> Fixture {
    let executor = Arc::new(MockQueryExecutor::new());
    let metastore = Arc::new(MemorySchemaMetastore::new());
    metastore
        .put_collection(
            "demo",
            "signup",
            vec![
                SchemaField::new("_actor", FieldType::String),
                SchemaField::new("_time", FieldType::Timestamp),
            ],
        )
        .await;
    let store = Arc::new(MemoryQueryMetadataStore::new());
    let service = ContinuousQueryService::new(
        executor.clone(),
        metastore.clone(),
        store.clone(),
        config,
    );
    Fixture {
        executor,
        metastore,
        store,
        service,
    }
}

/// Store whose writes always fail, for exercising persistence error paths.
struct FailingQueryMetadataStore;

#[async_trait]
impl QueryMetadataStore for FailingQueryMetadataStore {
    async fn save(
        &self,
        _definition: ContinuousQueryDefinition,
    ) -> eventlake_metadata::Result<()> {
        Err(MetadataError::Storage(
            "metadata backend unavailable".to_string(),
        ))
    }

    async fn get_all(
        &self,
        _project: &str,
    ) -> eventlake_metadata::Result<Vec<ContinuousQueryDefinition>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _project: &str, _name: &str) -> eventlake_metadata::Result<bool> {
        Ok(false)
    }
}

fn materialized_result() -> QueryResult {
    QueryResult::new(
        vec![
            SchemaField::new("source", FieldType::String),
            SchemaField::new("total", FieldType::Long),
        ],
        vec![],
    )
}

#[tokio::test]
async fn test_create_materializes_and_activates() {
    let fx = fixture(QueryServiceConfig::default()).await;
    fx.executor
        .set("CREATE TABLE", MockBehavior::Succeed(materialized_result()));

    let handle = fx
        .service
        .create("demo", "daily_visits", "SELECT source, count(*) AS total FROM signup GROUP BY 1")
        .await
        .unwrap();
    let definition = handle.wait().await.unwrap();

    assert_eq!(definition.status, QueryStatus::Active);
    assert_eq!(definition.schema.len(), 2);
    assert_eq!(definition.schema[1].name, "total");

    let submitted = fx.executor.submitted();
    assert!(
        submitted[0].starts_with("CREATE TABLE \"_cq_daily_visits\" AS SELECT"),
        "{}",
        submitted[0]
    );

    // The durable copy settled too.
    let persisted = fx.store.get_all("demo").await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].status, QueryStatus::Active);
}

#[tokio::test]
async fn test_failed_materialization_keeps_definition_with_error() {
    let fx = fixture(QueryServiceConfig::default()).await;
    fx.executor.set(
        "CREATE TABLE",
        MockBehavior::Fail("table already exists".to_string()),
    );

    let handle = fx
        .service
        .create("demo", "daily_visits", "SELECT count(*) FROM signup")
        .await
        .unwrap();
    let definition = handle.wait().await.unwrap();

    assert_eq!(definition.status, QueryStatus::Failed);
    assert!(definition
        .error_message
        .as_deref()
        .unwrap()
        .contains("table already exists"));

    // Failed queries stay listed so the failure is observable.
    let listed = fx.service.list("demo").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, QueryStatus::Failed);
}

#[tokio::test]
async fn test_create_rejects_duplicates_and_bad_input() {
    let fx = fixture(QueryServiceConfig::default()).await;

    let handle = fx
        .service
        .create("demo", "daily_visits", "SELECT count(*) FROM signup")
        .await
        .unwrap();
    handle.wait().await.unwrap();

    let err = fx
        .service
        .create("demo", "daily_visits", "SELECT count(*) FROM signup")
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::DuplicateQuery { .. }), "{err}");

    let err = fx
        .service
        .create("demo", "_reserved", "SELECT 1")
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)), "{err}");

    let err = fx
        .service
        .create("demo", "bad_body", "DROP TABLE signup")
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)), "{err}");

    let err = fx
        .service
        .create("nope", "x", "SELECT 1")
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::ProjectNotFound(_)), "{err}");
}

#[tokio::test]
async fn test_delete_drops_table_then_removes_definition() {
    let fx = fixture(QueryServiceConfig::default()).await;
    let handle = fx
        .service
        .create("demo", "daily_visits", "SELECT count(*) FROM signup")
        .await
        .unwrap();
    handle.wait().await.unwrap();

    fx.service.delete("demo", "daily_visits").await.unwrap();

    let submitted = fx.executor.submitted();
    assert_eq!(
        submitted[1],
        "DROP TABLE IF EXISTS \"_cq_daily_visits\""
    );
    assert!(fx.service.list("demo").await.unwrap().is_empty());
    assert!(fx.store.get_all("demo").await.unwrap().is_empty());

    let err = fx.service.delete("demo", "daily_visits").await.unwrap_err();
    assert!(matches!(err, QueryError::QueryNotFound { .. }), "{err}");
}

#[tokio::test]
async fn test_failed_persist_rolls_back_registration() {
    let executor = Arc::new(MockQueryExecutor::new());
    let metastore = Arc::new(MemorySchemaMetastore::new());
    metastore.put_collection("demo", "signup", vec![]).await;
    let service = ContinuousQueryService::new(
        executor.clone(),
        metastore,
        Arc::new(FailingQueryMetadataStore),
        QueryServiceConfig::default(),
    );

    let err = service
        .create("demo", "daily_visits", "SELECT count(*) FROM signup")
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Metadata(_)), "{err}");
    assert!(executor.submitted().is_empty());

    // The name is free again, not held by a registration that can never
    // settle.
    let err = service
        .create("demo", "daily_visits", "SELECT count(*) FROM signup")
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Metadata(_)), "{err}");
    assert!(service.list("demo").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_hides_underscore_named_definitions() {
    let fx = fixture(QueryServiceConfig::default()).await;
    let mut visible = ContinuousQueryDefinition::new("demo", "daily_visits", "SELECT 1");
    visible.status = QueryStatus::Active;
    let mut hidden = ContinuousQueryDefinition::new("demo", "_cq_rollup", "SELECT 2");
    hidden.status = QueryStatus::Active;
    fx.store.save(visible).await.unwrap();
    fx.store.save(hidden).await.unwrap();

    fx.service.hydrate("demo").await.unwrap();

    let listed = fx.service.list("demo").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "daily_visits");

    // Still registered; only the listing filters it.
    let registered = fx.service.get("demo", "_cq_rollup").await.unwrap();
    assert_eq!(registered.status, QueryStatus::Active);
}

#[tokio::test]
async fn test_concurrent_creates_have_one_winner() {
    let fx = fixture(QueryServiceConfig::default()).await;

    let (a, b) = tokio::join!(
        fx.service
            .create("demo", "daily_visits", "SELECT count(*) FROM signup"),
        fx.service
            .create("demo", "daily_visits", "SELECT count(*) FROM signup"),
    );
    let losers = [a, b]
        .into_iter()
        .filter(|r| matches!(r, Err(QueryError::DuplicateQuery { .. })))
        .count();
    assert_eq!(losers, 1);
    assert_eq!(fx.service.list("demo").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_recreate_after_delete() {
    let fx = fixture(QueryServiceConfig::default()).await;
    let handle = fx
        .service
        .create("demo", "daily_visits", "SELECT count(*) FROM signup")
        .await
        .unwrap();
    handle.wait().await.unwrap();
    fx.service.delete("demo", "daily_visits").await.unwrap();

    let handle = fx
        .service
        .create("demo", "daily_visits", "SELECT source FROM signup")
        .await
        .unwrap();
    let definition = handle.wait().await.unwrap();
    assert_eq!(definition.status, QueryStatus::Active);
    assert_eq!(definition.query, "SELECT source FROM signup");
}

#[tokio::test]
async fn test_delete_cancels_inflight_materialization() {
    let fx = fixture(QueryServiceConfig::default()).await;
    fx.executor
        .set("CREATE TABLE", MockBehavior::HangUntilCanceled);

    let handle = fx
        .service
        .create("demo", "daily_visits", "SELECT count(*) FROM signup")
        .await
        .unwrap();
    fx.service.delete("demo", "daily_visits").await.unwrap();

    // The continuation lost the race and has nothing to report.
    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, QueryError::QueryNotFound { .. }), "{err}");
    assert!(fx.service.list("demo").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_drop_leaves_deleting_state_and_is_retryable() {
    let fx = fixture(QueryServiceConfig::default()).await;
    let handle = fx
        .service
        .create("demo", "daily_visits", "SELECT count(*) FROM signup")
        .await
        .unwrap();
    handle.wait().await.unwrap();

    fx.executor.set(
        "DROP TABLE",
        MockBehavior::Fail("engine unavailable".to_string()),
    );
    let err = fx.service.delete("demo", "daily_visits").await.unwrap_err();
    assert!(matches!(err, QueryError::DropFailed { .. }), "{err}");

    let stuck = fx.service.get("demo", "daily_visits").await.unwrap();
    assert_eq!(stuck.status, QueryStatus::Deleting);

    fx.executor
        .set("DROP TABLE", MockBehavior::Succeed(QueryResult::default()));
    fx.service.delete("demo", "daily_visits").await.unwrap();
    assert!(fx.service.list("demo").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_materialization_timeout_fails_the_query() {
    let config = QueryServiceConfig {
        materialization_timeout: Duration::from_millis(50),
        ..QueryServiceConfig::default()
    };
    let fx = fixture(config).await;
    fx.executor
        .set("CREATE TABLE", MockBehavior::HangUntilCanceled);

    let handle = fx
        .service
        .create("demo", "daily_visits", "SELECT count(*) FROM signup")
        .await
        .unwrap();
    let definition = handle.wait().await.unwrap();

    assert_eq!(definition.status, QueryStatus::Failed);
    assert!(definition
        .error_message
        .as_deref()
        .unwrap()
        .contains("timed out"));
}

#[tokio::test]
async fn test_concurrent_materialization_limit() {
    let config = QueryServiceConfig {
        max_concurrent_materializations: 1,
        ..QueryServiceConfig::default()
    };
    let fx = fixture(config).await;
    fx.executor
        .set("CREATE TABLE", MockBehavior::HangUntilCanceled);

    let _handle = fx
        .service
        .create("demo", "first", "SELECT count(*) FROM signup")
        .await
        .unwrap();
    let err = fx
        .service
        .create("demo", "second", "SELECT count(*) FROM signup")
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::TooManyMaterializations(1)), "{err}");

    // Freeing the slot makes room again.
    fx.service.delete("demo", "first").await.unwrap();
    let handle = fx
        .service
        .create("demo", "second", "SELECT count(*) FROM signup")
        .await
        .unwrap();
    drop(handle);
}

#[tokio::test]
async fn test_hydrate_restores_definitions_and_fails_interrupted_ones() {
    let fx = fixture(QueryServiceConfig::default()).await;

    let mut active = ContinuousQueryDefinition::new("demo", "settled", "SELECT 1");
    active.status = QueryStatus::Active;
    fx.store.save(active).await.unwrap();
    fx.store
        .save(ContinuousQueryDefinition::new("demo", "in_flight", "SELECT 2"))
        .await
        .unwrap();

    fx.service.hydrate("demo").await.unwrap();

    let listed = fx.service.list("demo").await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].status, QueryStatus::Active);
    assert_eq!(listed[1].status, QueryStatus::Failed);
}

#[tokio::test]
async fn test_collections_sorts_and_hides_system_tables() {
    let fx = fixture(QueryServiceConfig::default()).await;
    fx.metastore.put_collection("demo", "page_view", vec![]).await;
    fx.metastore.put_collection("demo", "_cq_internal", vec![]).await;

    let collections = fx.service.collections("demo").await.unwrap();
    assert_eq!(
        collections,
        vec!["page_view".to_string(), "signup".to_string()]
    );

    let schemas = fx.service.event_schemas("demo").await.unwrap();
    assert_eq!(schemas.len(), 2);
    assert_eq!(schemas[0].name, "page_view");
    assert_eq!(schemas[1].name, "signup");
    assert_eq!(schemas[1].fields.len(), 2);

    let err = fx.service.collections("nope").await.unwrap_err();
    assert!(matches!(err, QueryError::ProjectNotFound(_)), "{err}");
}
