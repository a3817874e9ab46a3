//! Generic entity query engine
//!
//! Translates an entity name plus filter/sort/pagination options into SQL
//! against the table named by the entity's spec. Storage errors are wrapped
//! as [`afw_common::Error::Database`] tagged with the operation and entity.

use afw_common::config::QueryLimits;
use afw_common::spec::{EntitySpec, SpecRegistry, STATUS_DELETED, SYSTEM_COLUMNS};
use afw_common::time::now_ms;
use afw_common::uuid_utils::new_record_id;
use afw_common::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::pagination::clamp_window;

mod row;
mod sql;

pub use row::row_to_record;
pub use sql::{parse_bool, parse_sort, SortField, SqlValue};

/// Options for [`QueryEngine::list`]
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Column → value equality predicates
    pub filters: BTreeMap<String, Value>,
    pub sort: Vec<SortField>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// One page of records
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub data: Vec<Value>,
    /// Matching rows before pagination
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Entity CRUD over the shared pool
#[derive(Clone)]
pub struct QueryEngine {
    pool: SqlitePool,
    registry: Arc<SpecRegistry>,
    limits: QueryLimits,
}

impl QueryEngine {
    pub fn new(pool: SqlitePool, registry: Arc<SpecRegistry>, limits: QueryLimits) -> Self {
        Self {
            pool,
            registry,
            limits,
        }
    }

    pub fn registry(&self) -> &Arc<SpecRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Resolve an entity name, `NotFound` for unknown entities
    pub fn spec(&self, entity: &str) -> Result<&EntitySpec> {
        self.registry
            .get(entity)
            .ok_or_else(|| Error::NotFound(format!("Unknown entity: {}", entity)))
    }

    /// Filtered, sorted, paginated listing
    pub async fn list(&self, entity: &str, options: &ListOptions) -> Result<Page> {
        let spec = self.spec(entity)?;
        let window = clamp_window(&self.limits, options.limit, options.offset);

        let mut count_qb = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", spec.table));
        sql::push_where(&mut count_qb, spec, &options.filters)?;
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::database("list", entity, e))?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT * FROM {}", spec.table));
        sql::push_where(&mut qb, spec, &options.filters)?;
        sql::push_order_by(&mut qb, spec, &options.sort)?;
        qb.push(" LIMIT ").push_bind(window.limit);
        qb.push(" OFFSET ").push_bind(window.offset);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::database("list", entity, e))?;

        debug!(
            "list {}: {} of {} rows (limit {}, offset {})",
            entity,
            rows.len(),
            total,
            window.limit,
            window.offset
        );

        Ok(Page {
            data: rows.iter().map(|r| row_to_record(r, spec)).collect(),
            total,
            limit: window.limit,
            offset: window.offset,
        })
    }

    /// Every matching record, unpaginated. For internal fan-in such as chat
    /// threads where the caller needs the whole set.
    pub async fn find_all(
        &self,
        entity: &str,
        filters: &BTreeMap<String, Value>,
        sort: &[SortField],
    ) -> Result<Vec<Value>> {
        let spec = self.spec(entity)?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT * FROM {}", spec.table));
        sql::push_where(&mut qb, spec, filters)?;
        sql::push_order_by(&mut qb, spec, sort)?;

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::database("find", entity, e))?;

        Ok(rows.iter().map(|r| row_to_record(r, spec)).collect())
    }

    /// Single live record; soft-deleted records read as absent
    pub async fn get(&self, entity: &str, id: &str) -> Result<Option<Value>> {
        let spec = self.spec(entity)?;
        self.fetch_by_id(spec, id, true, "get").await
    }

    async fn fetch_by_id(
        &self,
        spec: &EntitySpec,
        id: &str,
        live_only: bool,
        operation: &'static str,
    ) -> Result<Option<Value>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT * FROM {}", spec.table));
        qb.push(" WHERE id = ").push_bind(id.to_string());
        if live_only {
            push_live_guard(&mut qb, spec);
        }

        let row = qb
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::database(operation, &spec.name, e))?;

        Ok(row.map(|r| row_to_record(&r, spec)))
    }

    /// Insert a record built from `data`; returns the stored record
    ///
    /// System columns in `data` are ignored. An omitted `status` defaults to
    /// the first option of the spec's status enum.
    pub async fn create(
        &self,
        entity: &str,
        data: &Map<String, Value>,
        created_by: Option<&str>,
    ) -> Result<Value> {
        let spec = self.spec(entity)?;
        let id = new_record_id();
        let now = now_ms();

        let mut columns: Vec<&str> = vec!["id", "created_at", "updated_at", "created_by"];
        let mut values = vec![
            SqlValue::Text(id.clone()),
            SqlValue::Int(now),
            SqlValue::Int(now),
            created_by.map(|u| SqlValue::Text(u.to_string())).unwrap_or(SqlValue::Null),
        ];

        for (key, value) in data.iter().filter(|(k, _)| !SYSTEM_COLUMNS.contains(&k.as_str())) {
            values.push(sql::column_value(spec, key, value)?);
            columns.push(key.as_str());
        }

        if spec.has_status() && !data.contains_key("status") {
            if let Some(default) = spec.get_field("status").and_then(|f| f.options.first()) {
                columns.push("status");
                values.push(SqlValue::Text(default.clone()));
            }
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!("INSERT INTO {} (", spec.table));
        qb.push(columns.join(", ")).push(") VALUES (");
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            value.push_bind(&mut qb);
        }
        qb.push(")");

        qb.build()
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database("create", entity, e))?;

        debug!("created {} {}", entity, id);

        self.fetch_by_id(spec, &id, false, "create")
            .await?
            .ok_or_else(|| Error::Internal(format!("Created {} {} could not be read back", entity, id)))
    }

    /// Apply `data` to a live record; returns the updated record
    pub async fn update(&self, entity: &str, id: &str, data: &Map<String, Value>) -> Result<Value> {
        let spec = self.spec(entity)?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET updated_at = ", spec.table));
        qb.push_bind(now_ms());
        for (key, value) in data.iter().filter(|(k, _)| !SYSTEM_COLUMNS.contains(&k.as_str())) {
            let bound = sql::column_value(spec, key, value)?;
            qb.push(", ").push(key.as_str()).push(" = ");
            bound.push_bind(&mut qb);
        }
        qb.push(" WHERE id = ").push_bind(id.to_string());
        push_live_guard(&mut qb, spec);

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database("update", entity, e))?;

        if result.rows_affected() == 0 {
            return Err(not_found(entity, id));
        }

        debug!("updated {} {}", entity, id);

        // The update itself may have set `status = deleted`
        self.fetch_by_id(spec, id, false, "update")
            .await?
            .ok_or_else(|| not_found(entity, id))
    }

    /// Soft-delete when the entity spec has `status`, otherwise delete the row
    pub async fn remove(&self, entity: &str, id: &str) -> Result<()> {
        let spec = self.spec(entity)?;

        let mut qb = if spec.has_status() {
            let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET status = ", spec.table));
            qb.push_bind(STATUS_DELETED)
                .push(", updated_at = ")
                .push_bind(now_ms());
            qb
        } else {
            QueryBuilder::<Sqlite>::new(format!("DELETE FROM {}", spec.table))
        };
        qb.push(" WHERE id = ").push_bind(id.to_string());
        push_live_guard(&mut qb, spec);

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database("remove", entity, e))?;

        if result.rows_affected() == 0 {
            return Err(not_found(entity, id));
        }

        debug!("removed {} {} (soft: {})", entity, id, spec.has_status());
        Ok(())
    }

    /// Raw stored text of one column of a live record
    ///
    /// Outer `None`: no such live record. Inner `None`: column is NULL.
    pub async fn read_text(&self, entity: &str, id: &str, column: &str) -> Result<Option<Option<String>>> {
        let spec = self.spec(entity)?;
        check_field(spec, column)?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM {}", column, spec.table));
        qb.push(" WHERE id = ").push_bind(id.to_string());
        push_live_guard(&mut qb, spec);

        qb.build_query_scalar::<Option<String>>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::database("read", entity, e))
    }

    /// Set `column` to `new` only if it still holds `expected`
    ///
    /// Returns `false` when another writer changed the column first.
    pub async fn compare_and_swap_text(
        &self,
        entity: &str,
        id: &str,
        column: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool> {
        let spec = self.spec(entity)?;
        check_field(spec, column)?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET ", spec.table));
        qb.push(column).push(" = ").push_bind(new.to_string());
        qb.push(", updated_at = ").push_bind(now_ms());
        qb.push(" WHERE id = ").push_bind(id.to_string());
        // IS compares NULL as a value
        qb.push(" AND ").push(column).push(" IS ").push_bind(expected.map(str::to_string));
        push_live_guard(&mut qb, spec);

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database("compare_and_swap", entity, e))?;

        Ok(result.rows_affected() == 1)
    }
}

fn push_live_guard(qb: &mut QueryBuilder<'_, Sqlite>, spec: &EntitySpec) {
    if spec.has_status() {
        qb.push(" AND (status IS NULL OR status != ")
            .push_bind(STATUS_DELETED)
            .push(")");
    }
}

fn check_field(spec: &EntitySpec, column: &str) -> Result<()> {
    if spec.has_field(column) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "Unknown field '{}' for {}",
            column, spec.name
        )))
    }
}

fn not_found(entity: &str, id: &str) -> Error {
    Error::NotFound(format!("{} {} not found", entity, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use afw_common::db::init_memory_database;
    use serde_json::json;

    async fn setup_engine() -> QueryEngine {
        let registry = SpecRegistry::builtin().unwrap();
        let pool = init_memory_database(&registry).await.unwrap();
        QueryEngine::new(
            pool,
            Arc::new(registry),
            QueryLimits {
                default_limit: 2,
                max_limit: 3,
                max_offset: 100,
            },
        )
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    async fn create_client(engine: &QueryEngine, name: &str) -> Value {
        engine
            .create("client", &obj(json!({"name": name})), Some("u1"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_stamps_system_columns_and_default_status() {
        let engine = setup_engine().await;
        let record = create_client(&engine, "Acme").await;

        assert!(record["id"].as_str().unwrap().len() >= 32);
        assert!(record["created_at"].as_i64().unwrap() > 0);
        assert_eq!(record["created_at"], record["updated_at"]);
        assert_eq!(record["created_by"], "u1");
        assert_eq!(record["status"], "active");
        assert_eq!(record["name"], "Acme");
    }

    #[tokio::test]
    async fn test_create_ignores_client_supplied_id() {
        let engine = setup_engine().await;
        let record = engine
            .create("client", &obj(json!({"id": "forged", "name": "X"})), None)
            .await
            .unwrap();
        assert_ne!(record["id"], "forged");
        assert!(record["created_by"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_entity_is_not_found() {
        let engine = setup_engine().await;
        let err = engine.list("invoice", &ListOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_excludes_soft_deleted_by_default() {
        let engine = setup_engine().await;
        let keep = create_client(&engine, "Keep").await;
        let gone = create_client(&engine, "Gone").await;
        engine.remove("client", gone["id"].as_str().unwrap()).await.unwrap();

        let page = engine.list("client", &ListOptions::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0]["id"], keep["id"]);
        assert!(page.data.iter().all(|r| r["status"] != "deleted"));
    }

    #[tokio::test]
    async fn test_list_with_explicit_deleted_status() {
        let engine = setup_engine().await;
        create_client(&engine, "Keep").await;
        let gone = create_client(&engine, "Gone").await;
        engine.remove("client", gone["id"].as_str().unwrap()).await.unwrap();

        let mut options = ListOptions::default();
        options.filters.insert("status".into(), json!("deleted"));
        let page = engine.list("client", &options).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0]["id"], gone["id"]);
        assert_eq!(page.data[0]["status"], "deleted");
    }

    #[tokio::test]
    async fn test_list_pagination_is_clamped() {
        let engine = setup_engine().await;
        for name in ["a", "b", "c", "d"] {
            create_client(&engine, name).await;
        }

        let page = engine.list("client", &ListOptions::default()).await.unwrap();
        assert_eq!((page.data.len(), page.limit, page.total), (2, 2, 4));

        let options = ListOptions {
            limit: Some(1000),
            offset: Some(-5),
            ..ListOptions::default()
        };
        let page = engine.list("client", &options).await.unwrap();
        assert_eq!((page.data.len(), page.limit, page.offset), (3, 3, 0));
    }

    #[tokio::test]
    async fn test_list_sort_and_filter() {
        let engine = setup_engine().await;
        for (name, industry) in [("b", "retail"), ("a", "retail"), ("c", "mining")] {
            engine
                .create("client", &obj(json!({"name": name, "industry": industry})), None)
                .await
                .unwrap();
        }

        let mut options = ListOptions {
            sort: parse_sort("name:asc").unwrap(),
            ..ListOptions::default()
        };
        options.filters.insert("industry".into(), json!("retail"));
        let page = engine.list("client", &options).await.unwrap();
        let names: Vec<&str> = page.data.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_sort_and_filter() {
        let engine = setup_engine().await;
        let options = ListOptions {
            sort: vec![SortField::asc("password")],
            ..ListOptions::default()
        };
        assert!(matches!(
            engine.list("client", &options).await.unwrap_err(),
            Error::InvalidInput(_)
        ));

        let mut options = ListOptions::default();
        options.filters.insert("password".into(), json!("x"));
        assert!(matches!(
            engine.list("client", &options).await.unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_filter_value_with_sql_is_inert() {
        let engine = setup_engine().await;
        create_client(&engine, "Acme").await;

        let mut options = ListOptions::default();
        options.filters.insert("name".into(), json!("x' OR '1'='1"));
        let page = engine.list("client", &options).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_typed_columns_round_trip() {
        let engine = setup_engine().await;
        let record = engine
            .create(
                "message",
                &obj(json!({
                    "entity_type": "review",
                    "entity_id": "r1",
                    "content": "hi",
                    "is_team_only": true,
                    "reactions": {"👍": ["u1"]}
                })),
                Some("u1"),
            )
            .await
            .unwrap();
        assert_eq!(record["is_team_only"], true);
        assert_eq!(record["reactions"], json!({"👍": ["u1"]}));

        let mut options = ListOptions::default();
        options.filters.insert("is_team_only".into(), json!("true"));
        assert_eq!(engine.list("message", &options).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_get_update_remove_lifecycle() {
        let engine = setup_engine().await;
        let record = create_client(&engine, "Acme").await;
        let id = record["id"].as_str().unwrap();

        let updated = engine
            .update("client", id, &obj(json!({"industry": "audit"})))
            .await
            .unwrap();
        assert_eq!(updated["industry"], "audit");
        assert_eq!(updated["name"], "Acme");
        assert!(updated["updated_at"].as_i64() >= record["updated_at"].as_i64());

        engine.remove("client", id).await.unwrap();
        assert!(engine.get("client", id).await.unwrap().is_none());
        assert!(matches!(
            engine.remove("client", id).await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            engine.update("client", id, &Map::new()).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_update_to_deleted_status_returns_record() {
        let engine = setup_engine().await;
        let record = create_client(&engine, "Acme").await;
        let id = record["id"].as_str().unwrap();

        let updated = engine
            .update("client", id, &obj(json!({"status": "deleted"})))
            .await
            .unwrap();
        assert_eq!(updated["status"], "deleted");
        assert!(engine.get("client", id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_without_status_field_hard_deletes() {
        let registry = SpecRegistry::from_specs(vec![EntitySpec::new("tag", "tags").field(
            afw_common::spec::FieldSpec::new("label", afw_common::spec::FieldType::Text),
        )])
        .unwrap();
        let pool = init_memory_database(&registry).await.unwrap();
        let engine = QueryEngine::new(pool.clone(), Arc::new(registry), QueryLimits::default());

        let record = engine
            .create("tag", &obj(json!({"label": "x"})), None)
            .await
            .unwrap();
        engine.remove("tag", record["id"].as_str().unwrap()).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let engine = setup_engine().await;
        let record = engine
            .create(
                "message",
                &obj(json!({"entity_type": "rfi", "entity_id": "x", "content": "c"})),
                None,
            )
            .await
            .unwrap();
        let id = record["id"].as_str().unwrap();

        assert_eq!(engine.read_text("message", id, "reactions").await.unwrap(), Some(None));
        assert!(engine
            .compare_and_swap_text("message", id, "reactions", None, "{\"a\":[\"u\"]}")
            .await
            .unwrap());
        // Stale expectation loses
        assert!(!engine
            .compare_and_swap_text("message", id, "reactions", None, "{}")
            .await
            .unwrap());
        assert_eq!(
            engine.read_text("message", id, "reactions").await.unwrap(),
            Some(Some("{\"a\":[\"u\"]}".to_string()))
        );
        assert_eq!(engine.read_text("message", "missing", "reactions").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_storage_errors_are_wrapped() {
        let engine = setup_engine().await;
        sqlx::query("DROP TABLE clients")
            .execute(engine.pool())
            .await
            .unwrap();

        let err = engine.list("client", &ListOptions::default()).await.unwrap_err();
        match err {
            Error::Database { operation, entity, .. } => {
                assert_eq!(operation, "list");
                assert_eq!(entity, "client");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
