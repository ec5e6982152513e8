//! [`BatchStore`] over a single PostgreSQL table.
//!
//! Every request in a batch runs as its own statement. Statements that fail
//! with a transient error (serialization failure, deadlock, lock timeout,
//! exhausted pool) are handed back as unprocessed so the batch layer retries
//! them; any other error is returned as is.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use accord_core::config::is_identifier;

use crate::batch::{BatchStore, GetOutput, Record, RecordKey, WriteRequest};
use crate::error::StoreError;

#[derive(Debug, FromRow)]
struct RecordRow {
    partition_key: String,
    sort_key: String,
    value: serde_json::Value,
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        Record {
            key: RecordKey::new(row.partition_key, row.sort_key),
            value: row.value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    table: String,
}

impl PgStore {
    pub fn new(pool: PgPool, table: &str) -> Result<Self, StoreError> {
        if !is_identifier(table) {
            return Err(StoreError::Malformed {
                partition: String::new(),
                sort: String::new(),
                reason: format!("invalid table name {:?}", table),
            });
        }
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn table_exists(&self) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )
            "#,
        )
        .bind(&self.table)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn create_table(&self) -> Result<(), StoreError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                partition_key TEXT NOT NULL,
                sort_key TEXT NOT NULL,
                value JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (partition_key, sort_key)
            )
            "#,
            self.table
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn apply(&self, request: &WriteRequest) -> Result<(), sqlx::Error> {
        match request {
            WriteRequest::Put(record) => {
                sqlx::query(&format!(
                    r#"
                    INSERT INTO {} (partition_key, sort_key, value)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (partition_key, sort_key)
                    DO UPDATE SET value = EXCLUDED.value, updated_at = now()
                    "#,
                    self.table
                ))
                .bind(&record.key.partition)
                .bind(&record.key.sort)
                .bind(&record.value)
                .execute(&self.pool)
                .await?;
            }
            WriteRequest::Delete(key) => {
                sqlx::query(&format!(
                    r#"
                    DELETE FROM {}
                    WHERE partition_key = $1 AND sort_key = $2
                    "#,
                    self.table
                ))
                .bind(&key.partition)
                .bind(&key.sort)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BatchStore for PgStore {
    async fn batch_write(
        &self,
        requests: Vec<WriteRequest>,
    ) -> Result<Vec<WriteRequest>, StoreError> {
        let mut unprocessed = Vec::new();
        for request in requests {
            match self.apply(&request).await {
                Ok(()) => {}
                Err(err) if is_transient(&err) => {
                    debug!(error = %err, key = ?request.key(), "write deferred");
                    unprocessed.push(request);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(unprocessed)
    }

    async fn batch_get(&self, keys: Vec<RecordKey>) -> Result<GetOutput, StoreError> {
        let partitions: Vec<String> = keys.iter().map(|k| k.partition.clone()).collect();
        let sorts: Vec<String> = keys.iter().map(|k| k.sort.clone()).collect();

        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            r#"
            SELECT partition_key, sort_key, value
            FROM {}
            WHERE (partition_key, sort_key) IN (
                SELECT * FROM UNNEST($1::text[], $2::text[])
            )
            "#,
            self.table
        ))
        .bind(&partitions)
        .bind(&sorts)
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) => Ok(GetOutput {
                records: rows.into_iter().map(Record::from).collect(),
                unprocessed: Vec::new(),
            }),
            Err(err) if is_transient(&err) => {
                debug!(error = %err, keys = keys.len(), "read deferred");
                Ok(GetOutput {
                    records: Vec::new(),
                    unprocessed: keys,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn scan(&self) -> Result<Vec<Record>, StoreError> {
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            r#"
            SELECT partition_key, sort_key, value
            FROM {}
            ORDER BY partition_key, sort_key
            "#,
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Record::from).collect())
    }
}

/// Errors worth resubmitting the statement for.
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            // serialization_failure, deadlock_detected, lock_not_available, too_many_connections
            Some("40001" | "40P01" | "55P03" | "53300")
        ),
        _ => false,
    }
}
