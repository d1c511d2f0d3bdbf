//! Run persistence behind a narrow save/load contract.
//!
//! The agent never touches storage. The HTTP layer saves a `RunRecord` when a run
//! is accepted and again when it finishes or fails.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::agent::record::RunRecord;
use crate::models::run::RunRow;

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Inserts or replaces the record with the same `run_id`.
    async fn save(&self, record: &RunRecord) -> Result<()>;
    async fn load(&self, run_id: Uuid) -> Result<Option<RunRecord>>;
    /// Newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<RunRecord>>;
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory
// ────────────────────────────────────────────────────────────────────────────

/// Used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<Uuid, RunRecord>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn save(&self, record: &RunRecord) -> Result<()> {
        self.runs
            .write()
            .await
            .insert(record.run_id, record.clone());
        Ok(())
    }

    async fn load(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let runs = self.runs.read().await;
        let mut records: Vec<RunRecord> = runs.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL
// ────────────────────────────────────────────────────────────────────────────

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS optimization_runs (
    id              UUID PRIMARY KEY,
    status          TEXT NOT NULL,
    job_description TEXT NOT NULL,
    error_message   TEXT,
    record          JSONB NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL,
    completed_at    TIMESTAMPTZ
)
"#;

pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates `optimization_runs` if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .context("Failed to create optimization_runs table")?;
        info!("optimization_runs table ready");
        Ok(())
    }
}

fn from_row(row: RunRow) -> Result<RunRecord> {
    RunRecord::from_value(row.record)
        .with_context(|| format!("Stored run {} has an unreadable record", row.id))
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn save(&self, record: &RunRecord) -> Result<()> {
        let value = record.to_value().context("Failed to serialize run record")?;

        sqlx::query(
            r#"
            INSERT INTO optimization_runs
                (id, status, job_description, error_message, record, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                status        = EXCLUDED.status,
                error_message = EXCLUDED.error_message,
                record        = EXCLUDED.record,
                completed_at  = EXCLUDED.completed_at
            "#,
        )
        .bind(record.run_id)
        .bind(record.status.as_str())
        .bind(&record.job_description)
        .bind(record.error_message.as_deref())
        .bind(&value)
        .bind(record.created_at)
        .bind(record.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        let row = sqlx::query_as::<_, RunRow>("SELECT * FROM optimization_runs WHERE id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(from_row).transpose()
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query_as::<_, RunRow>(
            "SELECT * FROM optimization_runs ORDER BY created_at DESC LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::agent::state::RunStatus;

    fn record(minutes_ago: i64) -> RunRecord {
        RunRecord::failed(
            Uuid::new_v4(),
            "Backend engineer".to_string(),
            "upstream down".to_string(),
            Utc::now() - Duration::minutes(minutes_ago),
        )
    }

    #[tokio::test]
    async fn test_memory_store_save_and_load() {
        let store = MemoryRunStore::new();
        let saved = record(0);
        store.save(&saved).await.unwrap();

        assert_eq!(store.load(saved.run_id).await.unwrap(), Some(saved));
        assert_eq!(store.load(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_save_replaces_existing() {
        let store = MemoryRunStore::new();
        let mut saved = record(0);
        store.save(&saved).await.unwrap();
        saved.status = RunStatus::Completed;
        store.save(&saved).await.unwrap();

        let loaded = store.load(saved.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Completed);
        assert_eq!(store.list_recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_lists_newest_first() {
        let store = MemoryRunStore::new();
        let oldest = record(30);
        let newest = record(1);
        let middle = record(10);
        for r in [&oldest, &newest, &middle] {
            store.save(r).await.unwrap();
        }

        let ids: Vec<Uuid> = store
            .list_recent(2)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.run_id)
            .collect();
        assert_eq!(ids, vec![newest.run_id, middle.run_id]);
    }
}
