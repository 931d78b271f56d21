//! AccessEngine - Fail-closed access decisions
//!
//! ## Responsibilities
//!
//! - CredentialCheck: resolve the token and apply the access policy
//! - VisionConfirm: require the detector to confirm the claimed identity
//! - Report every verdict to Room State, the Audit Log and the device
//!
//! ## Flow
//!
//! ```text
//! Idle -> CredentialCheck -> VisionConfirm -> Decided{Granted|Denied} -> Reported -> Idle
//! ```
//!
//! A rejected credential skips VisionConfirm entirely. A detector that cannot
//! answer always yields `Denied/vision_unavailable`, never a grant.

mod types;

pub use types::*;

use crate::audit_log::AuditLog;
use crate::credential_store::{CredentialStore, Identity, MAX_TOKEN_CHARS};
use crate::detector::{DetectionReport, DetectorError, DetectorHandle};
use crate::device_proxy::{DeliveryOutcome, DeviceCommand, DeviceProxy};
use crate::error::{Error, Result};
use crate::room_state::RoomStateStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Default bound on one credential lookup (2 seconds)
const DEFAULT_CREDENTIAL_TIMEOUT_MS: u64 = 2000;

/// AccessDecisionEngine instance
pub struct AccessDecisionEngine {
    credentials: Arc<dyn CredentialStore>,
    detector: Arc<DetectorHandle>,
    room: Arc<RoomStateStore>,
    device: Arc<DeviceProxy>,
    audit: Arc<AuditLog>,
    policy: AccessPolicy,
    credential_timeout: Duration,
}

impl AccessDecisionEngine {
    /// Create new AccessDecisionEngine
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        detector: Arc<DetectorHandle>,
        room: Arc<RoomStateStore>,
        device: Arc<DeviceProxy>,
        audit: Arc<AuditLog>,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            credentials,
            detector,
            room,
            device,
            audit,
            policy,
            credential_timeout: Duration::from_millis(DEFAULT_CREDENTIAL_TIMEOUT_MS),
        }
    }

    pub fn with_credential_timeout(mut self, timeout: Duration) -> Self {
        self.credential_timeout = timeout;
        self
    }

    /// Evaluate one presented token
    ///
    /// Security outcomes come back as `Ok` with a reason code. `Err` is only
    /// returned when the credential store fails or times out; once a verdict
    /// exists, reporting failures are logged and audited but never lose it.
    pub async fn evaluate(&self, token: &str) -> Result<AccessDecision> {
        let token = token.trim().to_string();
        let decision_id = Uuid::new_v4();

        tracing::debug!(decision_id = %decision_id, token = %token, "Access check started");

        // CredentialCheck
        let (identity, credential) = self.check_credential(&token).await?;

        // VisionConfirm
        let (vision, verdict, reason) = match credential {
            CredentialOutcome::Accepted { ref label } => {
                let vision = self.confirm_identity(label).await;
                let (verdict, reason) = match vision {
                    VisionOutcome::Confirmed { .. } => (Verdict::Granted, ReasonCode::IdentityConfirmed),
                    VisionOutcome::Unavailable { .. } => (Verdict::Denied, ReasonCode::VisionUnavailable),
                    _ => (Verdict::Denied, ReasonCode::IdentityNotConfirmed),
                };
                (vision, verdict, reason)
            }
            CredentialOutcome::Rejected => (
                VisionOutcome::NotAttempted,
                Verdict::Denied,
                ReasonCode::CredentialRejected,
            ),
        };

        // `device` is filled in once the verdict has been dispatched
        let mut decision = AccessDecision {
            decision_id,
            token,
            identity,
            credential,
            vision,
            verdict,
            reason,
            device: DeliveryOutcome::Delivered,
            decided_at: Utc::now(),
        };

        // Reported
        decision.device = self.report(&decision).await;

        tracing::info!(
            decision_id = %decision.decision_id,
            token = %decision.token,
            verdict = ?decision.verdict,
            reason = %decision.reason,
            device_delivered = decision.device.is_delivered(),
            "Access decided"
        );

        Ok(decision)
    }

    async fn check_credential(&self, token: &str) -> Result<(Option<Identity>, CredentialOutcome)> {
        if !is_well_formed(token) {
            return Ok((None, CredentialOutcome::Rejected));
        }

        let identity = tokio::time::timeout(self.credential_timeout, self.credentials.resolve(token))
            .await
            .map_err(|_| {
                Error::Database(format!(
                    "credential lookup timed out after {:?}",
                    self.credential_timeout
                ))
            })??;

        let outcome = match identity.as_ref().and_then(|i| self.policy.claimed_label(token, i)) {
            Some(label) => CredentialOutcome::Accepted { label },
            None => CredentialOutcome::Rejected,
        };
        Ok((identity, outcome))
    }

    async fn confirm_identity(&self, label: &str) -> VisionOutcome {
        match self.detector.capture().await {
            Ok(report) => self.judge_report(&report, label),
            Err(e) => VisionOutcome::Unavailable {
                reason: e.to_string(),
            },
        }
    }

    fn judge_report(&self, report: &DetectionReport, label: &str) -> VisionOutcome {
        if report.recognition_failed {
            return VisionOutcome::Unavailable {
                reason: DetectorError::Model("face recognition failed for frame".to_string())
                    .to_string(),
            };
        }

        match report.confirms(label, &self.policy.matching) {
            Some(distance) => VisionOutcome::Confirmed {
                label: label.to_string(),
                distance,
            },
            None => VisionOutcome::NotConfirmed {
                persons: report.qualifying_persons(&self.policy.matching).count(),
            },
        }
    }

    async fn report(&self, decision: &AccessDecision) -> DeliveryOutcome {
        let granted = decision.verdict.is_granted();
        let token = decision.token.clone();
        let record_swipe = is_well_formed(&token);

        let applied = self
            .room
            .update(move |state| {
                if record_swipe {
                    state.last_rfid = token;
                }
                state.apply_verdict(granted);
            })
            .await;

        if let Err(e) = applied {
            tracing::error!(
                decision_id = %decision.decision_id,
                error = %e,
                "Failed to apply verdict to room state"
            );
            self.audit
                .record_best_effort(format!(
                    "Room state not updated for decision {}: {}",
                    decision.decision_id, e
                ))
                .await;
        }

        self.audit.record_best_effort(decision.summary()).await;

        let cmd = DeviceCommand::AccessResult {
            granted,
            name: decision.granted_name().map(str::to_string),
        };
        self.device.dispatch(cmd, &self.audit).await
    }
}

/// Non-empty and no longer than any enrollable token
fn is_well_formed(token: &str) -> bool {
    !token.is_empty() && token.chars().count() <= MAX_TOKEN_CHARS
}
