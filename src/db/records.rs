//! SQLite storage for records

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{AppError, Result};
use crate::records::{Record, RecordBackend};

/// Record persistence over a SQLite pool
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordBackend for SqliteBackend {
    async fn get(&self, id: &str) -> Result<Option<Record>> {
        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, title, value, computed_result, version, created_at, updated_at
            FROM records
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RecordRow::into_record).transpose()
    }

    async fn put(&self, record: &Record) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO records (id, title, value, computed_result, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                value = excluded.value,
                computed_result = excluded.computed_result,
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(record.value)
        .bind(record.computed_result)
        .bind(record.version)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_all(&self) -> Result<Vec<Record>> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, title, value, computed_result, version, created_at, updated_at
            FROM records
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RecordRow::into_record).collect()
    }
}

/// Internal row type for SQLite queries
#[derive(sqlx::FromRow)]
struct RecordRow {
    id: String,
    title: Option<String>,
    value: f64,
    computed_result: Option<f64>,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl RecordRow {
    fn into_record(self) -> Result<Record> {
        Ok(Record {
            id: self.id,
            title: self.title,
            value: self.value,
            computed_result: self.computed_result,
            version: self.version,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("Corrupt timestamp {:?}: {}", raw, e)))
}
