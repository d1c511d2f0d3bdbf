#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// One row of `optimization_runs`. `record` holds the full serialized `RunRecord`;
/// the other columns duplicate what listing and filtering need.
#[derive(Debug, Clone, FromRow)]
pub struct RunRow {
    pub id: Uuid,
    pub status: String,
    pub job_description: String,
    pub error_message: Option<String>,
    pub record: Value,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
