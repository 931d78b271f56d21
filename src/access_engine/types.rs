//! AccessEngine types

use crate::credential_store::Identity;
use crate::detector::MatchPolicy;
use crate::device_proxy::DeliveryOutcome;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Final verdict of one access check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Granted,
    Denied,
}

impl Verdict {
    pub fn is_granted(&self) -> bool {
        matches!(self, Verdict::Granted)
    }
}

/// Why a verdict was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    IdentityConfirmed,
    CredentialRejected,
    VisionUnavailable,
    IdentityNotConfirmed,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::IdentityConfirmed => "identity_confirmed",
            ReasonCode::CredentialRejected => "credential_rejected",
            ReasonCode::VisionUnavailable => "vision_unavailable",
            ReasonCode::IdentityNotConfirmed => "identity_not_confirmed",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the CredentialCheck phase
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CredentialOutcome {
    /// Token resolved and admitted by the policy
    Accepted { label: String },
    /// Token unknown, empty, or not admitted by the policy
    Rejected,
}

/// Outcome of the VisionConfirm phase
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VisionOutcome {
    /// CredentialCheck short-circuited; the detector was not called
    NotAttempted,
    Unavailable { reason: String },
    NotConfirmed { persons: usize },
    Confirmed { label: String, distance: f64 },
}

/// Result of one access check
///
/// Not persisted; only its side effects (room LEDs, audit entry, device
/// command) outlive the request.
#[derive(Debug, Clone, Serialize)]
pub struct AccessDecision {
    pub decision_id: Uuid,
    pub token: String,
    pub identity: Option<Identity>,
    pub credential: CredentialOutcome,
    pub vision: VisionOutcome,
    pub verdict: Verdict,
    pub reason: ReasonCode,
    /// Delivery of the verdict to the remote device
    pub device: DeliveryOutcome,
    pub decided_at: DateTime<Utc>,
}

impl AccessDecision {
    /// Identity name, only when access was granted
    pub fn granted_name(&self) -> Option<&str> {
        if self.verdict.is_granted() {
            self.identity.as_ref().map(|i| i.name.as_str())
        } else {
            None
        }
    }

    /// One-line summary for the audit log
    pub fn summary(&self) -> String {
        format!(
            "Access {} token={} identity={} reason={}",
            match self.verdict {
                Verdict::Granted => "granted",
                Verdict::Denied => "denied",
            },
            if self.token.is_empty() { "<empty>" } else { &self.token },
            self.identity
                .as_ref()
                .map(|i| i.name.as_str())
                .unwrap_or("<none>"),
            self.reason
        )
    }
}

/// Which identities may pass CredentialCheck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Only the single configured token, confirmed against the configured name
    Fixed,
    /// Any enrolled identity, confirmed against its own name
    Enrolled,
}

impl std::str::FromStr for PolicyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(PolicyMode::Fixed),
            "enrolled" => Ok(PolicyMode::Enrolled),
            other => Err(Error::Config(format!(
                "unknown access policy mode '{}' (expected fixed or enrolled)",
                other
            ))),
        }
    }
}

/// Access policy
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPolicy {
    pub mode: PolicyMode,
    pub authorized_name: String,
    pub authorized_token: String,
    pub matching: MatchPolicy,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            mode: PolicyMode::Fixed,
            authorized_name: "Israel".to_string(),
            authorized_token: "6C3ACB33".to_string(),
            matching: MatchPolicy::default(),
        }
    }
}

impl AccessPolicy {
    /// Recognition label the holder of `token` must be confirmed as, if admitted at all
    ///
    /// `identity` is what the store resolved `token` to. The presented token
    /// must equal the stored one byte for byte, whatever the store's own
    /// matching rules are.
    pub fn claimed_label(&self, token: &str, identity: &Identity) -> Option<String> {
        if identity.rfid != token {
            return None;
        }

        match self.mode {
            PolicyMode::Fixed
                if token == self.authorized_token && identity.name == self.authorized_name =>
            {
                Some(self.authorized_name.clone())
            }
            PolicyMode::Fixed => None,
            PolicyMode::Enrolled => Some(identity.name.clone()),
        }
    }
}
