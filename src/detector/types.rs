//! Detector types

use crate::room_state::{PresenceSet, PERSON_LABEL, UNKNOWN_LABEL};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Person bounding box in frame pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// Face match for a detected person
///
/// `distance` is a nearest-neighbour style score: lower is a closer match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub label: String,
    pub distance: f64,
}

/// One region classified as "person"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPerson {
    #[serde(default)]
    pub bbox: BoundingBox,
    /// Person-class confidence (0.0-1.0)
    pub confidence: f32,
    #[serde(default)]
    pub recognition: Option<Recognition>,
}

impl DetectedPerson {
    /// Person whose face matched `label` at `distance`
    pub fn recognized(label: impl Into<String>, distance: f64) -> Self {
        Self {
            bbox: BoundingBox::default(),
            confidence: 0.9,
            recognition: Some(Recognition {
                label: label.into(),
                distance,
            }),
        }
    }

    /// Person with no face match
    pub fn unrecognized() -> Self {
        Self {
            bbox: BoundingBox::default(),
            confidence: 0.9,
            recognition: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Label this person counts as, if the match clears `policy`
    pub fn confirmed_label(&self, policy: &MatchPolicy) -> Option<&str> {
        self.recognition
            .as_ref()
            .filter(|r| r.distance <= policy.acceptance_distance)
            .map(|r| r.label.as_str())
    }
}

/// Thresholds applied to a detection report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    /// Minimum person-class confidence; regions at or below are ignored
    pub person_confidence: f32,
    /// Maximum recognition distance counted as a positive match
    pub acceptance_distance: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            person_confidence: 0.5,
            acceptance_distance: 80.0,
        }
    }
}

/// Result of one capture-and-identify
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub persons: Vec<DetectedPerson>,
    /// Person detection worked but face recognition failed for the frame
    #[serde(default)]
    pub recognition_failed: bool,
    pub captured_at: DateTime<Utc>,
}

impl DetectionReport {
    pub fn new(persons: Vec<DetectedPerson>) -> Self {
        Self {
            persons,
            recognition_failed: false,
            captured_at: Utc::now(),
        }
    }

    /// Frame with nobody in it
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Persons detected but recognition failed
    pub fn with_failed_recognition(persons: Vec<DetectedPerson>) -> Self {
        Self {
            recognition_failed: true,
            ..Self::new(persons)
        }
    }

    /// Regions above the person-confidence threshold
    pub fn qualifying_persons<'a>(&'a self, policy: &'a MatchPolicy) -> impl Iterator<Item = &'a DetectedPerson> {
        self.persons
            .iter()
            .filter(move |p| p.confidence > policy.person_confidence)
    }

    /// Distance of the first qualifying person matching `label`
    ///
    /// Any single person clearing the threshold is enough; the others are
    /// not required to match.
    pub fn confirms(&self, label: &str, policy: &MatchPolicy) -> Option<f64> {
        self.qualifying_persons(policy)
            .filter_map(|p| p.recognition.as_ref())
            .find(|r| r.label == label && r.distance <= policy.acceptance_distance)
            .map(|r| r.distance)
    }

    /// Presence labels for this frame, one entry per qualifying person
    pub fn presence_labels(&self, policy: &MatchPolicy) -> PresenceSet {
        self.qualifying_persons(policy)
            .map(|p| {
                if self.recognition_failed {
                    PERSON_LABEL
                } else {
                    p.confirmed_label(policy).unwrap_or(UNKNOWN_LABEL)
                }
            })
            .collect()
    }
}

/// Reasons a capture produced no report
///
/// Every variant means "unavailable"; none of them means "nobody there".
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectorError {
    #[error("detector not initialized")]
    NotInitialized,

    #[error("detector shut down")]
    ShutDown,

    #[error("camera busy (waited {0:?})")]
    Busy(Duration),

    #[error("capture timed out after {0:?}")]
    Timeout(Duration),

    #[error("camera unavailable: {0}")]
    Camera(String),

    #[error("model unavailable: {0}")]
    Model(String),

    #[error("frame read failed: {0}")]
    FrameRead(String),

    #[error("detector backend error: {0}")]
    Backend(String),
}

/// Lifecycle of the detector handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorLifecycle {
    /// No backend attached yet; every capture is unavailable
    Uninitialized,
    Ready,
    /// Torn down; captures stay unavailable until re-initialized
    ShutDown,
}
