use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which ear/shoulder pair the horizontal distance is measured on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarSide {
    Left,
    Right,
}

/// Scalar measurements taken from one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostureMetrics {
    /// Vertical distance from the nose to the shoulder midpoint
    pub vertical_dist: f32,
    /// Horizontal distance from the ear to the shoulder on the same side
    pub horizontal_dist: f32,
    /// Signed bearing of the left->right shoulder line in degrees
    pub shoulder_angle: f32,
}

/// Calibration-time reference measurements for the current session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineMetrics {
    pub vertical_dist: f32,
    pub horizontal_dist: f32,
    pub shoulder_angle: f32,
    pub ear_side: EarSide,
    pub calibrated_at: DateTime<Utc>,
}

/// Reason attached to a bad posture classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadPosture {
    Slouch,
    ForwardHead,
    ShoulderTiltedLeft,
    ShoulderTiltedRight,
}

impl BadPosture {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Slouch => "Slouch Detected",
            Self::ForwardHead => "Forward Head Detected",
            Self::ShoulderTiltedLeft => "Shoulder Tilted to Left",
            Self::ShoulderTiltedRight => "Shoulder Tilted to Right",
        }
    }
}

impl fmt::Display for BadPosture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Per-frame posture classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostureClassification {
    /// Warm-up window before calibration; zero once calibration is being attempted
    Calibrating { seconds_remaining: u32 },
    /// Calibration has not been attempted yet
    Calibrate,
    Good,
    Bad(BadPosture),
    Unknown,
}

impl PostureClassification {
    pub fn tag(&self) -> StatusTag {
        match self {
            Self::Calibrating { .. } => StatusTag::Calibrating,
            Self::Calibrate => StatusTag::Calibrate,
            Self::Good => StatusTag::Good,
            Self::Bad(_) => StatusTag::Bad,
            Self::Unknown => StatusTag::Unknown,
        }
    }

    /// Human readable reason shown on the overlay and in status records
    pub fn reason(&self) -> String {
        match self {
            Self::Calibrating { seconds_remaining: 0 } => {
                "Calibrating: sit upright and face the camera".to_string()
            }
            Self::Calibrating { seconds_remaining } => {
                format!("Calibrating in {}s, sit upright", seconds_remaining)
            }
            Self::Calibrate => "Please calibrate first.".to_string(),
            Self::Good => "Excellent Posture".to_string(),
            Self::Bad(reason) => reason.message().to_string(),
            Self::Unknown => "Landmarks not visible".to_string(),
        }
    }

    pub fn bad_posture(&self) -> Option<BadPosture> {
        match self {
            Self::Bad(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Status tag as exposed to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusTag {
    Calibrating,
    Calibrate,
    Good,
    Bad,
    Unknown,
}

impl StatusTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calibrating => "CALIBRATING",
            Self::Calibrate => "CALIBRATE",
            Self::Good => "GOOD",
            Self::Bad => "BAD",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Classification together with the metrics it was derived from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub classification: PostureClassification,
    pub metrics: Option<PostureMetrics>,
}

impl Assessment {
    pub fn without_metrics(classification: PostureClassification) -> Self {
        Self {
            classification,
            metrics: None,
        }
    }
}

/// Point-in-time record returned to status pollers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureStatusRecord {
    pub status: StatusTag,
    pub reason: Option<String>,
    /// Current shoulder-line angle in degrees, when measured
    pub angle: Option<f32>,
    /// Sequence number of the frame this status belongs to
    pub frame: u64,
    pub timestamp: DateTime<Utc>,
}

impl PostureStatusRecord {
    pub fn new(assessment: &Assessment, frame: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            status: assessment.classification.tag(),
            reason: Some(assessment.classification.reason()),
            angle: assessment.metrics.map(|m| m.shoulder_angle),
            frame,
            timestamp,
        }
    }
}
