//! AuditLog - Append-only event trail
//!
//! ## Responsibilities
//!
//! - Record one timestamped free-text entry per state-changing operation
//! - Keep the most recent entries in a ring buffer for fast queries
//! - Persist to MySQL when a repository is configured
//!
//! Entries are never mutated or deleted here; retention is external.

mod repository;

pub use repository::AuditRepository;

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Audit log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: u64,
    pub event: String,
    pub created_at: DateTime<Utc>,
}

/// Ring buffer for recent entries
struct AuditRingBuffer {
    entries: VecDeque<AuditEntry>,
    capacity: usize,
    next_id: u64,
}

impl AuditRingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    fn push(&mut self, entry: AuditEntry) {
        self.next_id = self.next_id.max(entry.id + 1);

        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn get_latest(&self, count: usize) -> Vec<AuditEntry> {
        self.entries.iter().rev().take(count).cloned().collect()
    }
}

/// AuditLog instance
pub struct AuditLog {
    buffer: RwLock<AuditRingBuffer>,
    repo: Option<AuditRepository>,
}

impl AuditLog {
    /// In-memory audit log
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(AuditRingBuffer::new(capacity)),
            repo: None,
        }
    }

    /// Audit log persisted to the `audit_log` table
    pub fn with_repository(capacity: usize, repo: AuditRepository) -> Self {
        Self {
            buffer: RwLock::new(AuditRingBuffer::new(capacity)),
            repo: Some(repo),
        }
    }

    /// Append an entry
    pub async fn record(&self, event: impl Into<String>) -> Result<AuditEntry> {
        let event = event.into();
        let created_at = Utc::now();

        // Holding the write lock across the insert keeps ids in buffer order
        let mut buffer = self.buffer.write().await;
        let id = match self.repo {
            Some(ref repo) => repo.insert(&event, created_at).await?,
            None => buffer.next_id,
        };

        let entry = AuditEntry {
            id,
            event,
            created_at,
        };
        buffer.push(entry.clone());

        tracing::debug!(audit_id = id, event = %entry.event, "Audit entry recorded");
        Ok(entry)
    }

    /// Append an entry; a failure is traced instead of returned
    ///
    /// For side-effect reporting (device failures, rejected readings) where
    /// the caller's own outcome must not depend on the audit write.
    pub async fn record_best_effort(&self, event: impl Into<String>) {
        let event = event.into();
        if let Err(e) = self.record(event.clone()).await {
            tracing::error!(error = %e, event = %event, "Failed to record audit entry");
        }
    }

    /// Newest entries first
    pub async fn latest(&self, count: usize) -> Result<Vec<AuditEntry>> {
        if let Some(ref repo) = self.repo {
            return repo.latest(count).await;
        }
        Ok(self.buffer.read().await.get_latest(count))
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(2000)
    }
}
