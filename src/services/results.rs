// src/services/results.rs

use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;

use super::{ResultSink, ServiceError};
use crate::models::result::DuelRecord;

/// Writes duel results into `duel_results`.
pub struct PgResultSink {
    pool: PgPool,
}

impl PgResultSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultSink for PgResultSink {
    async fn record(&self, record: &DuelRecord) -> Result<(), ServiceError> {
        // A redelivered result must not count twice.
        sqlx::query(
            r#"
            INSERT INTO duel_results
                (user_id, course_id, room_id, score, correct_count, total_questions, won, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (room_id, user_id) DO NOTHING
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.course_id)
        .bind(&record.room_id)
        .bind(record.score)
        .bind(record.correct_count)
        .bind(record.total_questions)
        .bind(record.won)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert duel result: {:?}", e);
            ServiceError::from(e)
        })?;

        Ok(())
    }
}

/// Keeps results in memory. Used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryResultSink {
    records: Mutex<Vec<DuelRecord>>,
    fail_with: Option<String>,
}

impl MemoryResultSink {
    /// A sink whose every write fails, for exercising the warning path.
    pub fn failing(message: &str) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
        }
    }

    pub fn records(&self) -> Vec<DuelRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResultSink for MemoryResultSink {
    async fn record(&self, record: &DuelRecord) -> Result<(), ServiceError> {
        if let Some(message) = &self.fail_with {
            return Err(ServiceError::Database(message.clone()));
        }
        let mut records = self
            .records
            .lock()
            .map_err(|e| ServiceError::Database(e.to_string()))?;
        let duplicate = records
            .iter()
            .any(|r| r.room_id == record.room_id && r.user_id == record.user_id);
        if !duplicate {
            records.push(record.clone());
        }
        Ok(())
    }
}
