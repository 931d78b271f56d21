//! CredentialStore Repository
//!
//! MySQL-backed identity table

use super::types::*;
use super::CredentialStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

/// Identity repository for database operations
#[derive(Clone)]
pub struct IdentityRepository {
    pool: MySqlPool,
}

impl IdentityRepository {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn get_by_id(&self, id: u64) -> Result<Option<Identity>> {
        let identity = sqlx::query_as::<_, Identity>(
            "SELECT id, name, rfid, created_at FROM identities WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(identity)
    }
}

#[async_trait]
impl CredentialStore for IdentityRepository {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>> {
        let identity = sqlx::query_as::<_, Identity>(
            "SELECT id, name, rfid, created_at FROM identities WHERE rfid = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(identity)
    }

    async fn enroll(&self, req: EnrollRequest) -> Result<Identity> {
        let req = req.validated()?;
        let now = chrono::Utc::now();

        let result = sqlx::query("INSERT INTO identities (name, rfid, created_at) VALUES (?, ?, ?)")
            .bind(&req.name)
            .bind(&req.rfid)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    Error::Conflict(format!("rfid {} already enrolled", req.rfid))
                }
                other => Error::Sqlx(other),
            })?;

        self.get_by_id(result.last_insert_id())
            .await?
            .ok_or(Error::NotFound("Identity not found after insert".to_string()))
    }

    async fn list(&self) -> Result<Vec<Identity>> {
        let identities = sqlx::query_as::<_, Identity>(
            "SELECT id, name, rfid, created_at FROM identities ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(identities)
    }
}
