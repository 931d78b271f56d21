//! ScriptedDetector - Deterministic detector backend
//!
//! Returns queued results in order, then repeats a fallback result. Used to
//! drive every vision branch without camera hardware.

use super::{DetectionReport, Detector, DetectorError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted detector backend
pub struct ScriptedDetector {
    script: Mutex<VecDeque<Result<DetectionReport, DetectorError>>>,
    fallback: Result<DetectionReport, DetectorError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_concurrent: AtomicUsize,
    released: AtomicBool,
}

impl ScriptedDetector {
    /// Return `script` results in order, then `fallback` forever
    pub fn new(
        script: Vec<Result<DetectionReport, DetectorError>>,
        fallback: Result<DetectionReport, DetectorError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        }
    }

    /// Return `result` on every call
    pub fn always(result: Result<DetectionReport, DetectorError>) -> Self {
        Self::new(Vec::new(), result)
    }

    /// Simulate a slow frame read
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of captures started
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of captures observed running at once
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn capture_and_identify(&self) -> Result<DetectionReport, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        next.unwrap_or_else(|| self.fallback.clone())
    }

    async fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let detector = ScriptedDetector::new(
            vec![Err(DetectorError::FrameRead("no frame".into()))],
            Ok(DetectionReport::empty()),
        );

        assert!(detector.capture_and_identify().await.is_err());
        assert!(detector.capture_and_identify().await.is_ok());
        assert!(detector.capture_and_identify().await.is_ok());
        assert_eq!(detector.calls(), 3);
    }
}
