//! Spec-driven table creation and column synchronization
//!
//! Every entity table is derived from its [`EntitySpec`]:
//! 1. **CREATE TABLE IF NOT EXISTS** with system columns plus declared fields
//! 2. **Auto-Sync** adds declared fields missing from an existing table via
//!    `ALTER TABLE ADD COLUMN`
//!
//! Type drift is reported but never auto-fixed; SQLite cannot
//! alter column types in place.

use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::spec::{EntitySpec, FieldType};
use crate::Result;

/// Column definition with SQL constraints
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    /// SQL type (e.g., "TEXT", "INTEGER", "REAL")
    pub sql_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            primary_key: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    fn ddl(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type);
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if self.not_null {
            sql.push_str(" NOT NULL");
        }
        sql
    }
}

/// Expected layout of one entity table
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    /// Columns that get a secondary index
    pub indexed: Vec<String>,
}

impl TableDefinition {
    /// Derive the table layout from an entity spec
    pub fn from_spec(spec: &EntitySpec) -> Self {
        let mut columns = vec![
            ColumnDefinition::new("id", "TEXT").primary_key(),
            ColumnDefinition::new("created_at", "INTEGER").not_null(),
            ColumnDefinition::new("updated_at", "INTEGER").not_null(),
            ColumnDefinition::new("created_by", "TEXT"),
        ];
        // Required-ness is enforced by validation, not the schema, so partial
        // updates and added columns stay possible.
        columns.extend(
            spec.fields
                .iter()
                .map(|f| ColumnDefinition::new(f.name.clone(), f.field_type.sql_type())),
        );

        let indexed = spec
            .fields
            .iter()
            .filter(|f| f.field_type == FieldType::Reference || f.name == "status")
            .map(|f| f.name.clone())
            .collect();

        Self {
            name: spec.table.clone(),
            columns,
            indexed,
        }
    }

    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(ColumnDefinition::ddl).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.name,
            columns.join(", ")
        )
    }

    pub fn index_sql(&self) -> Vec<String> {
        self.indexed
            .iter()
            .map(|col| {
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_{col} ON {table}({col})",
                    table = self.name,
                    col = col
                )
            })
            .collect()
    }
}

/// Actual column from database introspection (PRAGMA table_info result)
#[derive(Debug, Clone)]
pub struct ActualColumn {
    pub cid: i32,
    pub name: String,
    pub type_name: String,
}

/// Schema drift detected between expected and actual schema
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaDrift {
    /// Column missing from database
    MissingColumn { column: ColumnDefinition },
    /// Column type mismatch (cannot auto-fix)
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },
}

/// Read actual schema via PRAGMA table_info
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    pub async fn introspect_table(pool: &SqlitePool, table_name: &str) -> Result<Vec<ActualColumn>> {
        let query = format!("PRAGMA table_info({})", table_name);
        let rows = sqlx::query(&query).fetch_all(pool).await?;

        let mut columns: Vec<ActualColumn> = rows
            .iter()
            .map(|row| ActualColumn {
                cid: row.get("cid"),
                name: row.get("name"),
                type_name: row.get("type"),
            })
            .collect();

        columns.sort_by_key(|c| c.cid);
        Ok(columns)
    }

    pub async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM sqlite_master
                WHERE type='table' AND name = ?
            )
            "#,
        )
        .bind(table_name)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }
}

/// Compare expected columns to the introspected table
pub fn diff_columns(expected: &[ColumnDefinition], actual: &[ActualColumn]) -> Vec<SchemaDrift> {
    expected
        .iter()
        .filter_map(|col| match actual.iter().find(|a| a.name == col.name) {
            None => Some(SchemaDrift::MissingColumn { column: col.clone() }),
            Some(a) if !types_compatible(&col.sql_type, &a.type_name) => {
                Some(SchemaDrift::TypeMismatch {
                    column: col.name.clone(),
                    expected: col.sql_type.clone(),
                    actual: a.type_name.clone(),
                })
            }
            Some(_) => None,
        })
        .collect()
}

/// SQLite type affinity comparison
fn types_compatible(expected: &str, actual: &str) -> bool {
    fn affinity(t: &str) -> &'static str {
        let t = t.to_uppercase();
        if t.contains("INT") {
            "INTEGER"
        } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
            "TEXT"
        } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
            "REAL"
        } else {
            "NUMERIC"
        }
    }
    affinity(expected) == affinity(actual)
}

/// Create or synchronize the table backing an entity spec
pub async fn sync_entity_table(pool: &SqlitePool, spec: &EntitySpec) -> Result<()> {
    let table = TableDefinition::from_spec(spec);

    if !SchemaIntrospector::table_exists(pool, &table.name).await? {
        sqlx::query(&table.create_sql()).execute(pool).await?;
        info!("Created table '{}' for entity '{}'", table.name, spec.name);
    } else {
        let actual = SchemaIntrospector::introspect_table(pool, &table.name).await?;
        let drift = diff_columns(&table.columns, &actual);
        if drift.is_empty() {
            debug!("Schema up to date for '{}'", table.name);
        }
        for change in drift {
            match change {
                SchemaDrift::MissingColumn { column } => {
                    add_column(pool, &table.name, &column).await?;
                }
                SchemaDrift::TypeMismatch {
                    column,
                    expected,
                    actual,
                } => {
                    warn!(
                        "Type mismatch in {}.{}: expected '{}', found '{}'. Manual migration required.",
                        table.name, column, expected, actual
                    );
                }
            }
        }
    }

    for sql in table.index_sql() {
        sqlx::query(&sql).execute(pool).await?;
    }

    Ok(())
}

async fn add_column(pool: &SqlitePool, table: &str, column: &ColumnDefinition) -> Result<()> {
    // PRIMARY KEY / NOT NULL cannot be added without a default; entity
    // fields never carry either.
    let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column.name, column.sql_type);
    info!("Adding column: {}.{} ({})", table, column.name, column.sql_type);

    match sqlx::query(&sql).execute(pool).await {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            // Concurrent initialization added it first
            debug!("Column {}.{} already present", table, column.name);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{EntitySpec, FieldSpec, FieldType};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    fn widget_spec() -> EntitySpec {
        EntitySpec::new("widget", "widgets")
            .field(FieldSpec::new("name", FieldType::Text).required())
            .field(FieldSpec::new("count", FieldType::Int))
            .field(FieldSpec::new("owner_id", FieldType::Reference))
    }

    async fn column_names(pool: &SqlitePool, table: &str) -> Vec<String> {
        SchemaIntrospector::introspect_table(pool, table)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect()
    }

    #[test]
    fn test_table_definition_from_spec() {
        let table = TableDefinition::from_spec(&widget_spec());
        assert_eq!(table.name, "widgets");
        assert!(table.columns[0].primary_key);
        assert_eq!(table.columns.len(), 7);
        assert_eq!(table.indexed, vec!["owner_id".to_string()]);
        assert_eq!(
            table.create_sql(),
            "CREATE TABLE IF NOT EXISTS widgets (id TEXT PRIMARY KEY, created_at INTEGER NOT NULL, \
             updated_at INTEGER NOT NULL, created_by TEXT, name TEXT, count INTEGER, owner_id TEXT)"
        );
    }

    #[tokio::test]
    async fn test_sync_creates_missing_table() {
        let pool = setup_test_db().await;
        sync_entity_table(&pool, &widget_spec()).await.unwrap();

        assert!(SchemaIntrospector::table_exists(&pool, "widgets").await.unwrap());
        assert_eq!(
            column_names(&pool, "widgets").await,
            vec!["id", "created_at", "updated_at", "created_by", "name", "count", "owner_id"]
        );
    }

    #[tokio::test]
    async fn test_sync_adds_new_field_to_existing_table() {
        let pool = setup_test_db().await;
        sqlx::query(
            "CREATE TABLE widgets (id TEXT PRIMARY KEY, created_at INTEGER NOT NULL, \
             updated_at INTEGER NOT NULL, created_by TEXT, name TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();

        sync_entity_table(&pool, &widget_spec()).await.unwrap();

        let names = column_names(&pool, "widgets").await;
        assert!(names.contains(&"count".to_string()));
        assert!(names.contains(&"owner_id".to_string()));
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let pool = setup_test_db().await;
        sync_entity_table(&pool, &widget_spec()).await.unwrap();
        sync_entity_table(&pool, &widget_spec()).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info('widgets')")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 7);
    }

    #[test]
    fn test_diff_reports_type_mismatch() {
        let expected = vec![ColumnDefinition::new("count", "INTEGER")];
        let actual = vec![ActualColumn {
            cid: 0,
            name: "count".to_string(),
            type_name: "TEXT".to_string(),
        }];
        assert!(matches!(
            diff_columns(&expected, &actual)[0],
            SchemaDrift::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_types_compatible_by_affinity() {
        assert!(types_compatible("INTEGER", "BIGINT"));
        assert!(types_compatible("TEXT", "VARCHAR(20)"));
        assert!(!types_compatible("REAL", "TEXT"));
    }
}
