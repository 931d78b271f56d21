//! CredentialStore types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest token that can be enrolled (`identities.rfid` column width)
pub const MAX_TOKEN_CHARS: usize = 50;

/// Enrolled principal with exactly one credential token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Identity {
    pub id: u64,
    pub name: String,
    pub rfid: String,
    pub created_at: DateTime<Utc>,
}

/// Enrollment request
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollRequest {
    pub name: String,
    pub rfid: String,
}

impl EnrollRequest {
    /// Trim and validate the request
    pub fn validated(self) -> crate::Result<Self> {
        let name = self.name.trim().to_string();
        let rfid = self.rfid.trim().to_string();

        if name.is_empty() || name.len() > 100 {
            return Err(crate::Error::Validation(
                "name must be 1-100 characters".to_string(),
            ));
        }
        if rfid.is_empty() || rfid.chars().count() > MAX_TOKEN_CHARS {
            return Err(crate::Error::Validation(format!(
                "rfid must be 1-{} characters",
                MAX_TOKEN_CHARS
            )));
        }

        Ok(Self { name, rfid })
    }
}
