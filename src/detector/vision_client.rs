//! VisionClient - HTTP vision backend adapter
//!
//! ## Responsibilities
//!
//! - Open/release the capture device on the vision service
//! - Send capture-and-identify requests
//! - Map service failures onto `DetectorError`
//!
//! Wire contract (`POST {base}/v1/detect`):
//!
//! ```text
//! request:  {"capture_device": "0", "person_confidence": 0.5}
//! response: {"persons": [{"bbox": [x1, y1, x2, y2], "confidence": 0.91,
//!             "label": "Israel", "distance": 41.0}],
//!            "recognition_error": null}
//! 503:      {"kind": "camera" | "model" | "frame", "error": "..."}
//! ```

use super::{BoundingBox, DetectedPerson, DetectionReport, Detector, DetectorError, Recognition};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Vision backend configuration
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub base_url: String,
    /// Capture-device selector understood by the service
    pub capture_device: String,
    pub person_confidence: f32,
    pub request_timeout: Duration,
}

/// HTTP vision client
pub struct VisionClient {
    client: reqwest::Client,
    config: VisionConfig,
}

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    capture_device: &'a str,
    person_confidence: f32,
}

#[derive(Debug, Serialize)]
struct CameraRequest<'a> {
    capture_device: &'a str,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    persons: Vec<WirePerson>,
    #[serde(default)]
    recognition_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePerson {
    #[serde(default)]
    bbox: Option<[i32; 4]>,
    confidence: f32,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    distance: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl From<WirePerson> for DetectedPerson {
    fn from(p: WirePerson) -> Self {
        let bbox = p
            .bbox
            .map(|[x1, y1, x2, y2]| BoundingBox { x1, y1, x2, y2 })
            .unwrap_or_default();

        let recognition = match (p.label, p.distance) {
            (Some(label), Some(distance)) if !label.is_empty() => Some(Recognition { label, distance }),
            _ => None,
        };

        DetectedPerson {
            bbox,
            confidence: p.confidence,
            recognition,
        }
    }
}

impl VisionClient {
    /// Create new vision client
    pub fn new(config: VisionConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Ask the service to open the capture device
    pub async fn open(&self) -> Result<(), DetectorError> {
        let url = format!("{}/v1/camera/open", self.config.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&CameraRequest {
                capture_device: &self.config.capture_device,
            })
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !resp.status().is_success() {
            return Err(Self::map_status_error(resp).await);
        }

        tracing::info!(
            base_url = %self.config.base_url,
            capture_device = %self.config.capture_device,
            "Vision capture device opened"
        );
        Ok(())
    }

    fn map_transport_error(&self, e: reqwest::Error) -> DetectorError {
        if e.is_timeout() {
            DetectorError::Timeout(self.config.request_timeout)
        } else {
            DetectorError::Backend(e.to_string())
        }
    }

    async fn map_status_error(resp: reqwest::Response) -> DetectorError {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = body.error.unwrap_or(text);

        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return match body.kind.as_deref() {
                Some("model") => DetectorError::Model(message),
                Some("frame") => DetectorError::FrameRead(message),
                _ => DetectorError::Camera(message),
            };
        }

        DetectorError::Backend(format!("{} - {}", status, message))
    }
}

#[async_trait]
impl Detector for VisionClient {
    fn name(&self) -> &str {
        "vision-http"
    }

    async fn capture_and_identify(&self) -> Result<DetectionReport, DetectorError> {
        let url = format!("{}/v1/detect", self.config.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&DetectRequest {
                capture_device: &self.config.capture_device,
                person_confidence: self.config.person_confidence,
            })
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !resp.status().is_success() {
            return Err(Self::map_status_error(resp).await);
        }

        let body: DetectResponse = resp
            .json()
            .await
            .map_err(|e| DetectorError::Backend(format!("invalid detect response: {}", e)))?;

        if let Some(ref reason) = body.recognition_error {
            tracing::warn!(reason = %reason, "Vision service reported recognition failure");
        }

        Ok(DetectionReport {
            recognition_failed: body.recognition_error.is_some(),
            persons: body.persons.into_iter().map(DetectedPerson::from).collect(),
            captured_at: Utc::now(),
        })
    }

    async fn release(&self) {
        let url = format!("{}/v1/camera/release", self.config.base_url);
        let result = self
            .client
            .post(&url)
            .json(&CameraRequest {
                capture_device: &self.config.capture_device,
            })
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!("Vision capture device released");
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "Vision capture release rejected");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Vision capture release failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::json;

    async fn spawn_service(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base_url: String) -> VisionClient {
        VisionClient::new(VisionConfig {
            base_url,
            capture_device: "0".to_string(),
            person_confidence: 0.5,
            request_timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_detect_parses_persons() {
        let app = Router::new().route(
            "/v1/detect",
            post(|| async {
                Json(json!({
                    "persons": [
                        {"bbox": [1, 2, 30, 40], "confidence": 0.91, "label": "Israel", "distance": 41.0},
                        {"confidence": 0.7}
                    ],
                    "recognition_error": null
                }))
            }),
        );
        let vision = client(spawn_service(app).await);

        let report = vision.capture_and_identify().await.unwrap();
        assert_eq!(report.persons.len(), 2);
        assert!(!report.recognition_failed);
        assert_eq!(
            report.persons[0].recognition,
            Some(Recognition {
                label: "Israel".to_string(),
                distance: 41.0
            })
        );
        assert_eq!(report.persons[0].bbox.x2, 30);
        assert!(report.persons[1].recognition.is_none());
    }

    #[tokio::test]
    async fn test_camera_closed_maps_to_camera_error() {
        let app = Router::new().route(
            "/v1/detect",
            post(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"kind": "camera", "error": "camera not opened"})),
                )
            }),
        );
        let vision = client(spawn_service(app).await);

        let result = vision.capture_and_identify().await;
        assert_eq!(result, Err(DetectorError::Camera("camera not opened".to_string())));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_backend_error() {
        let vision = client("http://127.0.0.1:9".to_string());
        assert!(matches!(
            vision.capture_and_identify().await,
            Err(DetectorError::Backend(_))
        ));
    }
}
