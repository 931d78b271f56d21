//! CredentialStore - Enrolled identities and their tokens
//!
//! ## Responsibilities
//!
//! - `resolve(token)`: pure lookup, no side effects, no retries
//! - Enrollment (the only write path)
//!
//! A store failure is an infrastructure error (`Err`), never "not found".

mod repository;
mod types;

pub use repository::IdentityRepository;
pub use types::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

/// Identity lookup capability
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolve a token to its identity; `Ok(None)` when not enrolled
    async fn resolve(&self, token: &str) -> Result<Option<Identity>>;

    /// Enroll a new identity; duplicate tokens are a conflict
    async fn enroll(&self, req: EnrollRequest) -> Result<Identity>;

    /// All enrolled identities
    async fn list(&self) -> Result<Vec<Identity>>;
}

/// In-memory credential store
#[derive(Default)]
pub struct InMemoryCredentialStore {
    identities: RwLock<Vec<Identity>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `(name, rfid)` pairs
    pub fn with_identities<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let now = Utc::now();
        let identities = entries
            .into_iter()
            .enumerate()
            .map(|(i, (name, rfid))| Identity {
                id: i as u64 + 1,
                name: name.to_string(),
                rfid: rfid.to_string(),
                created_at: now,
            })
            .collect();

        Self {
            identities: RwLock::new(identities),
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>> {
        let identities = self.identities.read().await;
        Ok(identities.iter().find(|i| i.rfid == token).cloned())
    }

    async fn enroll(&self, req: EnrollRequest) -> Result<Identity> {
        let req = req.validated()?;
        let mut identities = self.identities.write().await;

        if identities.iter().any(|i| i.rfid == req.rfid) {
            return Err(Error::Conflict(format!("rfid {} already enrolled", req.rfid)));
        }

        let identity = Identity {
            id: identities.iter().map(|i| i.id).max().unwrap_or(0) + 1,
            name: req.name,
            rfid: req.rfid,
            created_at: Utc::now(),
        };
        identities.push(identity.clone());

        tracing::info!(name = %identity.name, "Identity enrolled");
        Ok(identity)
    }

    async fn list(&self) -> Result<Vec<Identity>> {
        let mut identities = self.identities.read().await.clone();
        identities.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(identities)
    }
}
