//! AuditLog Repository
//!
//! Append-only `audit_log` table

use super::AuditEntry;
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

/// Column width of `audit_log.event`
const EVENT_MAX_CHARS: usize = 255;

/// Audit repository for database operations
#[derive(Clone)]
pub struct AuditRepository {
    pool: MySqlPool,
}

impl AuditRepository {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Append an event, returning its id
    pub async fn insert(&self, event: &str, created_at: DateTime<Utc>) -> Result<u64> {
        let event: String = event.chars().take(EVENT_MAX_CHARS).collect();

        let result = sqlx::query("INSERT INTO audit_log (event, created_at) VALUES (?, ?)")
            .bind(event)
            .bind(created_at)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_id())
    }

    /// Newest entries first
    pub async fn latest(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            "SELECT id, event, created_at FROM audit_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit as u64)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
