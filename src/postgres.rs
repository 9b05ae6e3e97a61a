use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row, TypeInfo};

use crate::frame::{Cell, Frame};
use crate::traits::{quote_ident, TableHandle, Warehouse, WarehouseError, WarehouseResult};

/// PostgreSQL implementation of the warehouse interface. Datasets map to
/// schemas, tables to tables.
pub struct PostgresWarehouse {
    pool: PgPool,
}

impl PostgresWarehouse {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    async fn list_tables(&self, dataset: &str) -> WarehouseResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT table_name FROM information_schema.tables
            WHERE table_schema = $1
            ORDER BY table_name
            "#,
        )
        .bind(dataset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("table_name"))
            .collect())
    }

    async fn list_columns(&self, dataset: &str, table: &str) -> WarehouseResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT column_name FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(dataset)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(WarehouseError::TableNotFound(format!("{dataset}.{table}")));
        }
        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("column_name"))
            .collect())
    }

    async fn open(&self, dataset: &str, table: &str) -> WarehouseResult<Box<dyn TableHandle>> {
        // existence check up front so a bad table fails the opening request,
        // not every later fetch
        self.list_columns(dataset, table).await?;
        Ok(Box::new(PostgresTableHandle {
            pool: self.pool.clone(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        }))
    }

    async fn query(&self, sql: &str, timeout: Duration) -> WarehouseResult<Frame> {
        let rows = tokio::time::timeout(timeout, sqlx::query(sql).fetch_all(&self.pool))
            .await
            .map_err(|_| WarehouseError::Timeout(timeout))??;
        frame_from_rows(&rows)
    }

    async fn execute_update(&self, statement: &str) -> WarehouseResult<()> {
        sqlx::query(statement).execute(&self.pool).await?;
        Ok(())
    }
}

/// An open fetch handle for one schema-qualified table.
struct PostgresTableHandle {
    pool: PgPool,
    dataset: String,
    table: String,
}

#[async_trait]
impl TableHandle for PostgresTableHandle {
    async fn fetch(&self, columns: &[String], row_cap: usize) -> WarehouseResult<Frame> {
        let select = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "SELECT {select} FROM {}.{}",
            quote_ident(&self.dataset),
            quote_ident(&self.table)
        );
        if row_cap > 0 {
            sql.push_str(&format!(" LIMIT {row_cap}"));
        }

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        frame_from_rows(&rows)
    }
}

/// Transpose a row set into a column-major frame. An empty row set produces
/// an empty frame, since the wire carries no column metadata for it anyway.
fn frame_from_rows(rows: &[PgRow]) -> WarehouseResult<Frame> {
    let mut frame = Frame::new();
    let Some(first) = rows.first() else {
        return Ok(frame);
    };
    for (idx, column) in first.columns().iter().enumerate() {
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            values.push(decode_cell(row, idx)?);
        }
        frame.push_column(column.name(), values);
    }
    Ok(frame)
}

/// Map one Postgres value to a typed cell. Integer and float widths collapse
/// to f64; character types to text; timestamps keep their instant. Anything
/// else is tried as text and surfaces a decode error if it is not.
fn decode_cell(row: &PgRow, idx: usize) -> WarehouseResult<Cell> {
    let type_name = row.columns()[idx].type_info().name().to_string();
    let cell = match type_name.as_str() {
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(Cell::Number),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|v| Cell::Number(f64::from(v))),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)?
            .map(|v| Cell::Number(v as f64)),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)?
            .map(|v| Cell::Number(f64::from(v))),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)?
            .map(|v| Cell::Number(f64::from(v))),
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Cell::Bool),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(Cell::Timestamp),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|v| Cell::Timestamp(DateTime::from_naive_utc_and_offset(v, Utc))),
        _ => row.try_get::<Option<String>, _>(idx)?.map(Cell::Text),
    };
    Ok(cell.unwrap_or(Cell::Null))
}
