//! PresenceAggregator - Room presence from detector frames
//!
//! ## Responsibilities
//!
//! - One tick = one capture, full-frame replace of the presence set
//! - Apply pushed sensor readings in the same Room State update
//! - Tell the device whether anyone is present
//! - Optional periodic ticking
//!
//! Presence degrades instead of failing closed: when the detector cannot
//! answer, the presence fields are left as they were and the next tick
//! retries naturally.

use crate::audit_log::AuditLog;
use crate::detector::{DetectorHandle, MatchPolicy};
use crate::device_proxy::{DeliveryOutcome, DeviceCommand, DeviceProxy};
use crate::error::Result;
use crate::room_state::{RoomState, RoomStateStore, SensorReadings};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Result of one tick
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PresenceUpdate {
    /// Presence set replaced from the current frame
    Updated {
        state: RoomState,
        device: DeliveryOutcome,
    },
    /// Detector unavailable; presence untouched, readings still applied
    Unavailable { reason: String, state: RoomState },
}

impl PresenceUpdate {
    pub fn state(&self) -> &RoomState {
        match self {
            PresenceUpdate::Updated { state, .. } => state,
            PresenceUpdate::Unavailable { state, .. } => state,
        }
    }
}

/// PresenceAggregator instance
pub struct PresenceAggregator {
    detector: Arc<DetectorHandle>,
    room: Arc<RoomStateStore>,
    device: Arc<DeviceProxy>,
    audit: Arc<AuditLog>,
    matching: MatchPolicy,
    running: Arc<RwLock<bool>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceAggregator {
    /// Create new PresenceAggregator
    pub fn new(
        detector: Arc<DetectorHandle>,
        room: Arc<RoomStateStore>,
        device: Arc<DeviceProxy>,
        audit: Arc<AuditLog>,
        matching: MatchPolicy,
    ) -> Self {
        Self {
            detector,
            room,
            device,
            audit,
            matching,
            running: Arc::new(RwLock::new(false)),
            ticker: Mutex::new(None),
        }
    }

    /// Run one capture and reconcile Room State with it
    pub async fn tick(&self, readings: Option<SensorReadings>) -> Result<PresenceUpdate> {
        let readings = readings.filter(|r| !r.is_empty());

        let report = match self.detector.capture().await {
            Ok(report) => report,
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(error = %reason, "Presence tick skipped - detector unavailable");
                self.audit
                    .record_best_effort(format!("Presence tick skipped: {}", reason))
                    .await;

                let state = match readings {
                    Some(readings) => self.room.update(move |s| s.apply_readings(&readings)).await?,
                    None => self.room.read().await?,
                };
                return Ok(PresenceUpdate::Unavailable { reason, state });
            }
        };

        let labels = report.presence_labels(&self.matching);
        if report.recognition_failed {
            tracing::warn!(
                persons = labels.len(),
                "Face recognition failed - counting generic persons"
            );
        }

        let state = self
            .room
            .update(move |s| {
                s.set_presence(labels);
                if let Some(ref readings) = readings {
                    s.apply_readings(readings);
                }
            })
            .await?;

        self.audit
            .record_best_effort(format!(
                "Presence updated: count={} people=[{}]",
                state.people_count(),
                state.detected_people().to_vec().join(", ")
            ))
            .await;

        let device = self
            .device
            .dispatch(
                DeviceCommand::Presence {
                    present: state.has_presence(),
                },
                &self.audit,
            )
            .await;

        tracing::debug!(
            people_count = state.people_count(),
            has_presence = state.has_presence(),
            "Presence tick completed"
        );

        Ok(PresenceUpdate::Updated { state, device })
    }

    /// Start periodic ticking
    pub async fn start(self: &Arc<Self>, period: Duration) {
        let mut slot = self.ticker.lock().await;
        {
            let mut running = self.running.write().await;
            if *running {
                tracing::warn!("Presence ticker already running");
                return;
            }
            *running = true;
        }

        tracing::info!(period_secs = period.as_secs_f64(), "Presence ticker started");

        let this = self.clone();
        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;

                if !*this.running.read().await {
                    break;
                }

                if let Err(e) = this.tick(None).await {
                    tracing::error!(error = %e, "Presence tick failed");
                }
            }
        }));
    }

    /// Stop periodic ticking
    ///
    /// Returns once the ticker task has ended; an in-flight tick is cancelled.
    pub async fn stop(&self) {
        let mut slot = self.ticker.lock().await;
        *self.running.write().await = false;

        if let Some(handle) = slot.take() {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "Presence ticker task failed");
                }
            }
            tracing::info!("Presence ticker stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{DetectedPerson, DetectionReport, DetectorError, ScriptedDetector};
    use crate::room_state::{PERSON_LABEL, UNKNOWN_LABEL};

    async fn aggregator(detector: ScriptedDetector) -> (Arc<PresenceAggregator>, Arc<ScriptedDetector>) {
        let detector = Arc::new(detector);
        let handle = Arc::new(DetectorHandle::new());
        handle.init(detector.clone()).await;

        let device = Arc::new(
            DeviceProxy::new("http://127.0.0.1:9", Duration::from_millis(300)).unwrap(),
        );
        let aggregator = PresenceAggregator::new(
            handle,
            Arc::new(RoomStateStore::new()),
            device,
            Arc::new(AuditLog::new(100)),
            MatchPolicy::default(),
        );
        (Arc::new(aggregator), detector)
    }

    #[tokio::test]
    async fn test_unmatched_persons_count_as_unknown() {
        let (aggregator, _) = aggregator(ScriptedDetector::always(Ok(DetectionReport::new(vec![
            DetectedPerson::recognized("Israel", 95.0),
            DetectedPerson::unrecognized(),
        ]))))
        .await;

        let update = aggregator.tick(None).await.unwrap();
        let state = update.state();
        assert!(matches!(update, PresenceUpdate::Updated { .. }));
        assert_eq!(state.people_count(), 2);
        assert!(state.has_presence());
        assert_eq!(state.detected_people().occurrences(UNKNOWN_LABEL), 2);
    }

    #[tokio::test]
    async fn test_full_frame_replace() {
        let (aggregator, _) = aggregator(ScriptedDetector::new(
            vec![Ok(DetectionReport::new(vec![
                DetectedPerson::recognized("Israel", 20.0),
                DetectedPerson::recognized("Maria", 30.0),
            ]))],
            Ok(DetectionReport::empty()),
        ))
        .await;

        let first = aggregator.tick(None).await.unwrap();
        assert_eq!(first.state().people_count(), 2);
        assert!(first.state().detected_people().contains("Maria"));

        let second = aggregator.tick(None).await.unwrap();
        assert_eq!(second.state().people_count(), 0);
        assert!(!second.state().has_presence());
    }

    #[tokio::test]
    async fn test_unavailable_leaves_presence_but_applies_readings() {
        let (aggregator, detector) = aggregator(ScriptedDetector::new(
            vec![Ok(DetectionReport::new(vec![DetectedPerson::recognized("Israel", 20.0)]))],
            Err(DetectorError::FrameRead("empty frame".into())),
        ))
        .await;
        aggregator.tick(None).await.unwrap();

        let readings = SensorReadings {
            temperature: Some(24.5),
            humidity: Some(55.0),
            last_rfid: None,
        };
        let update = aggregator.tick(Some(readings)).await.unwrap();

        assert!(matches!(update, PresenceUpdate::Unavailable { .. }));
        let state = update.state();
        assert_eq!(state.people_count(), 1);
        assert!(state.detected_people().contains("Israel"));
        assert_eq!(state.temperature, 24.5);
        assert_eq!(state.humidity, 55.0);
        assert_eq!(detector.calls(), 2);
    }

    #[tokio::test]
    async fn test_recognition_failure_counts_generic_persons() {
        let (aggregator, _) = aggregator(ScriptedDetector::always(Ok(
            DetectionReport::with_failed_recognition(vec![
                DetectedPerson::unrecognized(),
                DetectedPerson::unrecognized(),
                DetectedPerson::unrecognized(),
            ]),
        )))
        .await;

        let update = aggregator.tick(None).await.unwrap();
        assert_eq!(update.state().people_count(), 3);
        assert_eq!(update.state().detected_people().occurrences(PERSON_LABEL), 3);
    }

    #[tokio::test]
    async fn test_unreachable_device_does_not_fail_tick() {
        let (aggregator, _) = aggregator(ScriptedDetector::always(Ok(DetectionReport::new(vec![
            DetectedPerson::recognized("Israel", 10.0),
        ]))))
        .await;

        match aggregator.tick(None).await.unwrap() {
            PresenceUpdate::Updated { state, device } => {
                assert!(state.has_presence());
                assert!(!device.is_delivered());
            }
            other => panic!("unexpected update: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_stop() {
        let (aggregator, detector) =
            aggregator(ScriptedDetector::always(Ok(DetectionReport::empty()))).await;

        aggregator.start(Duration::from_millis(20)).await;
        assert!(aggregator.is_running().await);
        tokio::time::sleep(Duration::from_millis(200)).await;
        aggregator.stop().await;
        assert!(!aggregator.is_running().await);

        assert!(detector.calls() >= 1);
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_tick() {
        let (aggregator, _) = aggregator(ScriptedDetector::always(Ok(DetectionReport::new(vec![
            DetectedPerson::recognized("Israel", 10.0),
        ]))))
        .await;
        let pool = sqlx::mysql::MySqlPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("mysql://roomgate@127.0.0.1:9/roomgate")
            .unwrap();
        let aggregator = PresenceAggregator {
            audit: Arc::new(AuditLog::with_repository(
                100,
                crate::audit_log::AuditRepository::new(pool),
            )),
            ..Arc::try_unwrap(aggregator).ok().unwrap()
        };

        let update = aggregator.tick(None).await.unwrap();
        assert!(matches!(update, PresenceUpdate::Updated { .. }));
        assert!(update.state().has_presence());
    }

    #[tokio::test]
    async fn test_restart_leaves_no_orphan_ticker() {
        let (aggregator, detector) =
            aggregator(ScriptedDetector::always(Ok(DetectionReport::empty()))).await;

        aggregator.start(Duration::from_millis(20)).await;
        aggregator.stop().await;
        aggregator.start(Duration::from_millis(20)).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        aggregator.stop().await;

        let after_stop = detector.calls();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(detector.calls(), after_stop);
    }
}
