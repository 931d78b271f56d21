//! Detector - Person detection and face recognition capability
//!
//! ## Responsibilities
//!
//! - `Detector` trait: one capture-and-identify per call
//! - `DetectorHandle`: owns the backend, manages init/teardown, and
//!   serializes captures so only one frame read is in flight at a time
//!
//! The capture device is exclusive. Callers queue on the handle for at most
//! `wait_timeout`; a capture runs for at most `capture_timeout`. Both limits
//! surface as `DetectorError`, i.e. "unavailable", never as "nobody there".

mod scripted;
mod types;
mod vision_client;

pub use scripted::ScriptedDetector;
pub use types::*;
pub use vision_client::{VisionClient, VisionConfig};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Default wait for the exclusive camera (5 seconds)
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5000;

/// Default bound on one capture-and-identify (5 seconds)
const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 5000;

/// Capture-and-identify capability
#[async_trait]
pub trait Detector: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Grab one frame and return the persons found in it
    async fn capture_and_identify(&self) -> Result<DetectionReport, DetectorError>;

    /// Release the capture device; called once on teardown
    async fn release(&self) {}
}

/// Owned, lifecycle-managed detector handle
pub struct DetectorHandle {
    /// Held for the whole capture
    slot: Mutex<Option<Arc<dyn Detector>>>,
    lifecycle: AtomicU8,
    wait_timeout: Duration,
    capture_timeout: Duration,
}

impl DetectorHandle {
    /// Uninitialized handle with default timeouts
    pub fn new() -> Self {
        Self::with_timeouts(
            Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
            Duration::from_millis(DEFAULT_CAPTURE_TIMEOUT_MS),
        )
    }

    /// Uninitialized handle with explicit timeouts
    pub fn with_timeouts(wait_timeout: Duration, capture_timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            lifecycle: AtomicU8::new(lifecycle_to_u8(DetectorLifecycle::Uninitialized)),
            wait_timeout,
            capture_timeout,
        }
    }

    /// Attach a backend; replaces any previous one
    pub async fn init(&self, detector: Arc<dyn Detector>) {
        let mut slot = self.slot.lock().await;
        tracing::info!(backend = detector.name(), "Detector initialized");
        *slot = Some(detector);
        self.set_lifecycle(DetectorLifecycle::Ready);
    }

    /// Detach and release the backend
    ///
    /// Waits for an in-flight capture to finish first.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(detector) = slot.take() {
            detector.release().await;
            tracing::info!(backend = detector.name(), "Detector shut down");
        }
        self.set_lifecycle(DetectorLifecycle::ShutDown);
    }

    pub fn lifecycle(&self) -> DetectorLifecycle {
        lifecycle_from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    /// Run one exclusive capture-and-identify
    pub async fn capture(&self) -> Result<DetectionReport, DetectorError> {
        let slot = match timeout(self.wait_timeout, self.slot.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.wait_timeout.as_millis() as u64,
                    "Camera busy - capture not started"
                );
                return Err(DetectorError::Busy(self.wait_timeout));
            }
        };

        let detector = match slot.as_ref() {
            Some(detector) => detector,
            None => {
                return Err(match self.lifecycle() {
                    DetectorLifecycle::ShutDown => DetectorError::ShutDown,
                    _ => DetectorError::NotInitialized,
                });
            }
        };

        let started = std::time::Instant::now();
        let result = match timeout(self.capture_timeout, detector.capture_and_identify()).await {
            Ok(result) => result,
            Err(_) => Err(DetectorError::Timeout(self.capture_timeout)),
        };

        match &result {
            Ok(report) => tracing::debug!(
                backend = detector.name(),
                persons = report.persons.len(),
                recognition_failed = report.recognition_failed,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Capture completed"
            ),
            Err(e) => tracing::warn!(
                backend = detector.name(),
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Capture failed"
            ),
        }

        result
    }

    fn set_lifecycle(&self, lifecycle: DetectorLifecycle) {
        self.lifecycle
            .store(lifecycle_to_u8(lifecycle), Ordering::Release);
    }
}

impl Default for DetectorHandle {
    fn default() -> Self {
        Self::new()
    }
}

fn lifecycle_to_u8(lifecycle: DetectorLifecycle) -> u8 {
    match lifecycle {
        DetectorLifecycle::Uninitialized => 0,
        DetectorLifecycle::Ready => 1,
        DetectorLifecycle::ShutDown => 2,
    }
}

fn lifecycle_from_u8(value: u8) -> DetectorLifecycle {
    match value {
        1 => DetectorLifecycle::Ready,
        2 => DetectorLifecycle::ShutDown,
        _ => DetectorLifecycle::Uninitialized,
    }
}
