//! API Routes

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::access_engine::{AccessDecision, ReasonCode, Verdict};
use crate::credential_store::EnrollRequest;
use crate::device_proxy::{DeliveryOutcome, DeviceCommand};
use crate::error::{Error, Result};
use crate::models::ApiResponse;
use crate::presence_aggregator::PresenceUpdate;
use crate::room_state::{LedKind, SensorPush};
use crate::state::AppState;

/// Default number of audit entries returned by `/logs`
const DEFAULT_LOG_LIMIT: usize = 100;
const MAX_LOG_LIMIT: usize = 1000;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Room state
        .route("/environment", get(get_environment))
        .route("/last-rfid", get(get_last_rfid))
        // Access & presence
        .route("/access-check", post(access_check))
        .route("/people-detection", post(people_detection))
        // Actuators
        .route("/leds/:which", patch(set_led))
        // Device proxy
        .route("/device-status", get(device_status))
        .route("/device-status/rfid", get(device_rfid_status))
        // Identities
        .route("/users", get(list_users).post(enroll_user))
        // Audit
        .route("/logs", get(list_logs))
        .with_state(state)
}

// ========================================
// Room state
// ========================================

async fn get_environment(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.room.read().await?))
}

async fn get_last_rfid(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let room = state.room.read().await?;
    Ok(Json(json!({
        "last_rfid": room.last_rfid,
        "last_update": room.last_update,
    })))
}

// ========================================
// Access & presence
// ========================================

/// Token from an access-check body
///
/// Accepts `{"token": ..}`, `{"rfid": ..}`, a bare JSON string or number, or
/// plain text. Anything else yields an empty token, which is rejected.
fn token_from_body(body: &[u8]) -> String {
    fn text(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        }
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => fields
            .get("token")
            .or_else(|| fields.get("rfid"))
            .map(text)
            .unwrap_or_default(),
        Ok(value) => text(&value),
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    }
}

#[derive(Debug, Serialize)]
struct AccessCheckResponse {
    decision_id: Uuid,
    verdict: Verdict,
    reason: ReasonCode,
    /// Present only when access was granted
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    device: DeliveryOutcome,
}

impl From<AccessDecision> for AccessCheckResponse {
    fn from(decision: AccessDecision) -> Self {
        Self {
            decision_id: decision.decision_id,
            verdict: decision.verdict,
            reason: decision.reason,
            name: decision.granted_name().map(str::to_string),
            device: decision.device,
        }
    }
}

/// Evaluate a presented credential
///
/// Always 200 with a verdict and reason unless the infrastructure failed.
async fn access_check(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse> {
    let token = token_from_body(&body);
    let decision = state.access.evaluate(&token).await?;
    Ok(Json(AccessCheckResponse::from(decision)))
}

/// Sensor push from the device; triggers a presence tick
async fn people_detection(
    State(state): State<AppState>,
    body: Option<Json<SensorPush>>,
) -> Result<impl IntoResponse> {
    let readings = match body {
        Some(Json(push)) => {
            let (readings, rejected) = push.into_readings();
            for (field, raw) in rejected {
                tracing::warn!(field = field, value = %raw, "Ignoring non-numeric sensor reading");
                state
                    .audit
                    .record_best_effort(format!("Sensor reading ignored: {}={}", field, raw))
                    .await;
            }
            Some(readings)
        }
        None => None,
    };

    match state.presence.tick(readings).await? {
        PresenceUpdate::Updated { state, .. } => Ok(Json(state)),
        PresenceUpdate::Unavailable { reason, .. } => Err(Error::VisionUnavailable(reason)),
    }
}

// ========================================
// Actuators
// ========================================

#[derive(Debug, Deserialize)]
struct LedRequest {
    #[serde(alias = "status")]
    on: bool,
}

async fn set_led(
    State(state): State<AppState>,
    Path(which): Path<String>,
    Json(req): Json<LedRequest>,
) -> Result<impl IntoResponse> {
    let kind = LedKind::parse(&which)
        .ok_or_else(|| Error::NotFound(format!("unknown led '{}'", which)))?;

    let room = state.room.update(|s| s.set_led(kind, req.on)).await?;
    state
        .audit
        .record_best_effort(format!(
            "LED {} set {}",
            kind,
            if req.on { "on" } else { "off" }
        ))
        .await;

    let device = state
        .device
        .dispatch(DeviceCommand::Led { kind, on: req.on }, &state.audit)
        .await;

    Ok(Json(json!({
        "led": kind,
        "on": room.led(kind),
        "device": device,
    })))
}

// ========================================
// Device proxy
// ========================================

async fn device_status(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.device.fetch_status().await?))
}

async fn device_rfid_status(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.device.fetch_rfid_status().await?))
}

// ========================================
// Identities
// ========================================

async fn list_users(State(state): State<AppState>) -> impl IntoResponse {
    match state.credentials.list().await {
        Ok(identities) => Json(ApiResponse::success(identities)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn enroll_user(
    State(state): State<AppState>,
    Json(req): Json<EnrollRequest>,
) -> Result<impl IntoResponse> {
    let identity = state.credentials.enroll(req).await?;
    state
        .audit
        .record_best_effort(format!("Identity enrolled: {} ({})", identity.name, identity.rfid))
        .await;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(identity))))
}

// ========================================
// Audit
// ========================================

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);
    let entries = state.audit.latest(limit).await?;
    Ok(Json(ApiResponse::success(entries)))
}
