//! DeviceProxy - Remote microcontroller adapter
//!
//! ## Responsibilities
//!
//! - Send actuator commands (LEDs, access result, presence flag)
//! - Fetch the device's own status documents
//! - Audit failed deliveries
//!
//! Each exchange is one bounded-timeout HTTP request. Commands are
//! fire-and-forget for the caller: a failure is reported, never retried
//! beyond the configured attempts, and never rolls back local state.

mod types;

pub use types::*;

use crate::audit_log::AuditLog;
use crate::error::{Error, Result};
use std::time::Duration;

/// Default per-exchange timeout (1.5 seconds)
pub const DEFAULT_DEVICE_TIMEOUT_MS: u64 = 1500;

/// DeviceProxy instance
pub struct DeviceProxy {
    client: reqwest::Client,
    base_url: String,
    /// Extra attempts after the first failure
    retries: u32,
    backoff: Duration,
}

impl DeviceProxy {
    /// Create new DeviceProxy
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retries: 0,
            backoff: Duration::from_millis(200),
        })
    }

    /// Retry failed commands up to `retries` more times with linear backoff
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    /// Send one command
    pub async fn send_command(&self, cmd: &DeviceCommand) -> DeliveryOutcome {
        let mut last_error = String::new();

        for attempt in 0..=self.retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff * attempt).await;
            }

            match self.send_once(cmd).await {
                Ok(()) => {
                    tracing::debug!(command = %cmd.describe(), attempt = attempt, "Device command delivered");
                    return DeliveryOutcome::Delivered;
                }
                Err(e) => {
                    tracing::warn!(
                        command = %cmd.describe(),
                        attempt = attempt,
                        error = %e,
                        "Device command failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        DeliveryOutcome::Failed(last_error)
    }

    /// Send one command and audit a failed delivery
    pub async fn dispatch(&self, cmd: DeviceCommand, audit: &AuditLog) -> DeliveryOutcome {
        let outcome = self.send_command(&cmd).await;
        if let DeliveryOutcome::Failed(ref reason) = outcome {
            audit
                .record_best_effort(format!(
                    "Device command {} failed: {}",
                    cmd.describe(),
                    reason
                ))
                .await;
        }
        outcome
    }

    async fn send_once(&self, cmd: &DeviceCommand) -> Result<()> {
        let url = format!("{}{}", self.base_url, cmd.path());
        let resp = self.client.post(&url).query(&cmd.query()).send().await?;

        if !resp.status().is_success() {
            return Err(Error::Network(format!("device returned {}", resp.status())));
        }
        Ok(())
    }

    /// Device status document (`GET /status`), verbatim
    pub async fn fetch_status(&self) -> Result<serde_json::Value> {
        self.fetch_json("/status").await
    }

    /// Device RFID status document (`GET /status_rfid`), verbatim
    pub async fn fetch_rfid_status(&self) -> Result<serde_json::Value> {
        self.fetch_json("/status_rfid").await
    }

    /// Whether the device answers its status endpoint
    pub async fn health_check(&self) -> bool {
        self.fetch_status().await.is_ok()
    }

    async fn fetch_json(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("device {} unreachable: {}", path, e)))?;

        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "device {} returned {}",
                path,
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| Error::Network(format!("device {} sent invalid JSON: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room_state::LedKind;
    use axum::{extract::State, http::Uri, routing::get, Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Requests = Arc<Mutex<Vec<String>>>;

    async fn record(State(requests): State<Requests>, uri: Uri) -> &'static str {
        requests.lock().unwrap().push(uri.to_string());
        "ok"
    }

    async fn spawn_device() -> (String, Requests) {
        let requests: Requests = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/status", get(|| async { Json(json!({"rfid": "6C3ACB33", "uptime": 12})) }))
            .fallback(record)
            .with_state(requests.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), requests)
    }

    #[tokio::test]
    async fn test_send_command_delivered() {
        let (base_url, requests) = spawn_device().await;
        let proxy = DeviceProxy::new(base_url, Duration::from_secs(1)).unwrap();

        let outcome = proxy
            .send_command(&DeviceCommand::Led {
                kind: LedKind::Accent,
                on: true,
            })
            .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(*requests.lock().unwrap(), vec!["/led_blue?status=on".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_status_verbatim() {
        let (base_url, _requests) = spawn_device().await;
        let proxy = DeviceProxy::new(base_url, Duration::from_secs(1)).unwrap();

        let status = proxy.fetch_status().await.unwrap();
        assert_eq!(status, json!({"rfid": "6C3ACB33", "uptime": 12}));
        assert!(proxy.health_check().await);
    }

    #[tokio::test]
    async fn test_unreachable_device_fails_and_is_audited() {
        let proxy = DeviceProxy::new("http://127.0.0.1:9", Duration::from_millis(500))
            .unwrap()
            .with_retries(1, Duration::from_millis(10));
        let audit = AuditLog::new(10);

        let outcome = proxy
            .dispatch(DeviceCommand::Presence { present: true }, &audit)
            .await;

        assert!(!outcome.is_delivered());
        let entries = audit.latest(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].event.contains("/presenca?tem_presenca=yes"));
    }

    #[tokio::test]
    async fn test_fetch_status_unreachable_is_network_error() {
        let proxy = DeviceProxy::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(matches!(proxy.fetch_status().await, Err(Error::Network(_))));
        assert!(!proxy.health_check().await);
    }
}
