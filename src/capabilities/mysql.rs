//! MySQL capability: query execution and schema metadata discovery.
//!
//! One connection pool backs both roles. Execution decodes rows into JSON
//! values by inspecting the column's declared type name; binary columns are
//! decoded lossily to text so the result guardrail can detect raw identifier
//! bytes that escaped a `HEX()` wrap. Schema discovery reads
//! `information_schema` for the connected database only.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row, TypeInfo};

use super::{with_timeout, CapabilityError, QueryRows, SchemaProvider, SqlExecutor};
use crate::config::ServerConfig;
use crate::schema_catalog::{ColumnMeta, ForeignKeyMeta, SchemaMetadata, TableMeta};

pub struct MySqlCapability {
    pool: MySqlPool,
    timeout_secs: u64,
}

impl MySqlCapability {
    pub async fn connect(config: &ServerConfig) -> Result<Self, CapabilityError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url())
            .await
            .map_err(|e| CapabilityError::Database {
                detail: format!("connection failed: {}", e),
            })?;
        Ok(Self {
            pool,
            timeout_secs: config.capability_timeout_secs,
        })
    }
}

fn database_error(e: sqlx::Error) -> CapabilityError {
    CapabilityError::Database {
        detail: e.to_string(),
    }
}

/// Decode one cell into a JSON value by declared column type. Unknown types
/// fall through a chain of decodes ending in lossy text.
fn decode_cell(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    match type_name {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
            .try_get::<i64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row
            .try_get::<u64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "FLOAT" | "DOUBLE" => row
            .try_get::<f64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "DECIMAL" | "NEWDECIMAL" => row
            .try_get::<sqlx::types::BigDecimal, _>(index)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        "BOOLEAN" => row
            .try_get::<bool, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(index)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        // Raw binary comes through as lossy text on purpose: unreadable
        // identifier bytes must survive into the result so the anomaly
        // check can flag a missing HEX() wrap.
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(index)
            .map(Value::String)
            .or_else(|_| row.try_get::<i64, _>(index).map(Value::from))
            .or_else(|_| row.try_get::<f64, _>(index).map(Value::from))
            .or_else(|_| {
                row.try_get::<Vec<u8>, _>(index)
                    .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            })
            .unwrap_or(Value::Null),
    }
}

#[async_trait]
impl SqlExecutor for MySqlCapability {
    async fn execute(&self, sql: &str) -> Result<QueryRows, CapabilityError> {
        let rows = with_timeout("execution", self.timeout_secs, async {
            sqlx::query(sql)
                .fetch_all(&self.pool)
                .await
                .map_err(database_error)
        })
        .await?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut cells = Vec::with_capacity(row.columns().len());
            for (index, column) in row.columns().iter().enumerate() {
                cells.push(decode_cell(row, index, column.type_info().name()));
            }
            out.push(cells);
        }
        Ok(QueryRows { columns, rows: out })
    }

    async fn ping(&self) -> Result<(), CapabilityError> {
        with_timeout("ping", self.timeout_secs, async {
            sqlx::query("SELECT 1")
                .fetch_one(&self.pool)
                .await
                .map(|_| ())
                .map_err(database_error)
        })
        .await
    }
}

const COLUMNS_QUERY: &str = "\
SELECT TABLE_NAME, COLUMN_NAME, COLUMN_TYPE, DATA_TYPE, IS_NULLABLE \
FROM information_schema.COLUMNS \
WHERE TABLE_SCHEMA = DATABASE() \
ORDER BY TABLE_NAME, ORDINAL_POSITION";

const FOREIGN_KEYS_QUERY: &str = "\
SELECT TABLE_NAME, COLUMN_NAME, REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME \
FROM information_schema.KEY_COLUMN_USAGE \
WHERE TABLE_SCHEMA = DATABASE() AND REFERENCED_TABLE_NAME IS NOT NULL \
ORDER BY TABLE_NAME, COLUMN_NAME";

#[async_trait]
impl SchemaProvider for MySqlCapability {
    async fn fetch(&self) -> Result<SchemaMetadata, CapabilityError> {
        let (column_rows, fk_rows) = with_timeout("schema discovery", self.timeout_secs, async {
            let columns = sqlx::query(COLUMNS_QUERY)
                .fetch_all(&self.pool)
                .await
                .map_err(database_error)?;
            let fks = sqlx::query(FOREIGN_KEYS_QUERY)
                .fetch_all(&self.pool)
                .await
                .map_err(database_error)?;
            Ok((columns, fks))
        })
        .await?;

        let mut tables: Vec<TableMeta> = Vec::new();
        for row in &column_rows {
            let table_name: String = row.try_get("TABLE_NAME").map_err(database_error)?;
            let column_name: String = row.try_get("COLUMN_NAME").map_err(database_error)?;
            let column_type: String = row.try_get("COLUMN_TYPE").map_err(database_error)?;
            let data_type: String = row.try_get("DATA_TYPE").map_err(database_error)?;
            let is_nullable: String = row.try_get("IS_NULLABLE").map_err(database_error)?;

            let column = ColumnMeta {
                name: column_name,
                sql_type: column_type.clone(),
                nullable: is_nullable.eq_ignore_ascii_case("YES"),
                // UUID primary and foreign keys are stored as BINARY(16).
                binary_id: data_type.eq_ignore_ascii_case("binary")
                    && column_type.eq_ignore_ascii_case("binary(16)"),
            };

            match tables.last_mut() {
                Some(table) if table.name == table_name => table.columns.push(column),
                _ => tables.push(TableMeta {
                    name: table_name,
                    columns: vec![column],
                    context: Vec::new(),
                }),
            }
        }

        let mut foreign_keys = Vec::with_capacity(fk_rows.len());
        for row in &fk_rows {
            foreign_keys.push(ForeignKeyMeta {
                table: row.try_get("TABLE_NAME").map_err(database_error)?,
                column: row.try_get("COLUMN_NAME").map_err(database_error)?,
                referenced_table: row
                    .try_get("REFERENCED_TABLE_NAME")
                    .map_err(database_error)?,
                referenced_column: row
                    .try_get("REFERENCED_COLUMN_NAME")
                    .map_err(database_error)?,
                weight: 1,
            });
        }

        log::info!(
            "Discovered {} tables and {} foreign keys from information_schema",
            tables.len(),
            foreign_keys.len()
        );
        Ok(SchemaMetadata {
            tables,
            foreign_keys,
        })
    }
}
