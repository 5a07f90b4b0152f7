/// Posture Analyzer
///
/// Pure, stateful classifier. A single qualifying frame fixes the personal
/// baseline; every later frame is compared against it with three rules
/// checked in a fixed order (slouch, forward head, shoulder tilt). The first
/// rule that trips decides the result.
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::CalibrationError;
use crate::models::{
    Assessment, BadPosture, BaselineMetrics, BodyPoint, EarSide, Landmark, LandmarkSet,
    PostureClassification, PostureMetrics,
};

/// Reference distances below this make relative metrics unbounded
pub const MIN_BASELINE_DISTANCE: f32 = 1e-3;

/// Classification thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostureThresholds {
    /// Percentage drop of the nose-to-shoulder distance that counts as slouching
    pub slouch_pct: f32,
    /// Percentage growth of the ear-to-shoulder distance that counts as forward head
    pub forward_head_pct: f32,
    /// Shoulder-line deviation in degrees that counts as a tilt
    pub tilt_deg: f32,
    /// Minimum landmark visibility for a point to be used
    pub min_visibility: f32,
}

impl Default for PostureThresholds {
    fn default() -> Self {
        Self {
            slouch_pct: 15.0,
            forward_head_pct: 20.0,
            tilt_deg: 5.0,
            min_visibility: 0.5,
        }
    }
}

/// Signed bearing of the line p1 -> p2 in degrees, in (-180, 180]
pub fn line_angle(p1: &Landmark, p2: &Landmark) -> f32 {
    let degrees = (p2.y - p1.y).atan2(p2.x - p1.x).to_degrees();
    if degrees <= -180.0 {
        degrees + 360.0
    } else {
        degrees
    }
}

/// Fold an angle difference back into (-180, 180]
fn wrap_degrees(degrees: f32) -> f32 {
    let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Baseline-relative posture classifier
#[derive(Debug, Clone)]
pub struct PostureAnalyzer {
    thresholds: PostureThresholds,
    baseline: Option<BaselineMetrics>,
}

impl PostureAnalyzer {
    pub fn new() -> Self {
        Self::with_thresholds(PostureThresholds::default())
    }

    pub fn with_thresholds(thresholds: PostureThresholds) -> Self {
        Self {
            thresholds,
            baseline: None,
        }
    }

    pub fn thresholds(&self) -> &PostureThresholds {
        &self.thresholds
    }

    pub fn baseline(&self) -> Option<&BaselineMetrics> {
        self.baseline.as_ref()
    }

    pub fn is_calibrated(&self) -> bool {
        self.baseline.is_some()
    }

    /// Capture the baseline from one frame
    ///
    /// Once calibrated this is a no-op returning the existing baseline; call
    /// [`PostureAnalyzer::reset`] first to take a new one.
    pub fn calibrate(&mut self, landmarks: &LandmarkSet) -> Result<BaselineMetrics, CalibrationError> {
        if let Some(baseline) = self.baseline {
            return Ok(baseline);
        }

        let ear_side = self
            .pick_ear_side(landmarks)
            .ok_or(CalibrationError::LandmarksUnavailable)?;
        let metrics = self
            .measure_side(landmarks, ear_side)
            .ok_or(CalibrationError::LandmarksUnavailable)?;

        if metrics.vertical_dist < MIN_BASELINE_DISTANCE
            || metrics.horizontal_dist < MIN_BASELINE_DISTANCE
        {
            return Err(CalibrationError::DegenerateBaseline);
        }

        let baseline = BaselineMetrics {
            vertical_dist: metrics.vertical_dist,
            horizontal_dist: metrics.horizontal_dist,
            shoulder_angle: metrics.shoulder_angle,
            ear_side,
            calibrated_at: Utc::now(),
        };
        self.baseline = Some(baseline);

        tracing::info!(
            vertical_dist = baseline.vertical_dist,
            horizontal_dist = baseline.horizontal_dist,
            shoulder_angle = baseline.shoulder_angle,
            "Calibration successful"
        );

        Ok(baseline)
    }

    /// Drop the baseline so the next calibration starts fresh
    pub fn reset(&mut self) {
        self.baseline = None;
    }

    pub fn classify(&self, landmarks: &LandmarkSet) -> PostureClassification {
        self.assess(landmarks).classification
    }

    /// Classify and return the metrics the verdict was based on
    pub fn assess(&self, landmarks: &LandmarkSet) -> Assessment {
        let Some(baseline) = self.baseline.as_ref() else {
            return Assessment::without_metrics(PostureClassification::Calibrate);
        };

        let Some(current) = self.measure_side(landmarks, baseline.ear_side) else {
            return Assessment::without_metrics(PostureClassification::Unknown);
        };

        Assessment {
            classification: self.apply_rules(baseline, &current),
            metrics: Some(current),
        }
    }

    /// Measure the current frame using the baseline's ear side, or the
    /// preferred visible side when uncalibrated
    pub fn measure(&self, landmarks: &LandmarkSet) -> Option<PostureMetrics> {
        let side = match self.baseline.as_ref() {
            Some(baseline) => baseline.ear_side,
            None => self.pick_ear_side(landmarks)?,
        };
        self.measure_side(landmarks, side)
    }

    fn apply_rules(&self, baseline: &BaselineMetrics, current: &PostureMetrics) -> PostureClassification {
        let slouch_pct =
            (baseline.vertical_dist - current.vertical_dist) / baseline.vertical_dist * 100.0;
        if slouch_pct > self.thresholds.slouch_pct {
            return PostureClassification::Bad(BadPosture::Slouch);
        }

        let forward_head_pct =
            (current.horizontal_dist - baseline.horizontal_dist) / baseline.horizontal_dist * 100.0;
        if forward_head_pct > self.thresholds.forward_head_pct {
            return PostureClassification::Bad(BadPosture::ForwardHead);
        }

        let tilt_diff = wrap_degrees(current.shoulder_angle - baseline.shoulder_angle);
        if tilt_diff > self.thresholds.tilt_deg {
            return PostureClassification::Bad(BadPosture::ShoulderTiltedRight);
        }
        if tilt_diff < -self.thresholds.tilt_deg {
            return PostureClassification::Bad(BadPosture::ShoulderTiltedLeft);
        }

        PostureClassification::Good
    }

    fn pick_ear_side(&self, landmarks: &LandmarkSet) -> Option<EarSide> {
        let min = self.thresholds.min_visibility;
        if landmarks.visible(BodyPoint::LeftEar, min).is_some() {
            Some(EarSide::Left)
        } else if landmarks.visible(BodyPoint::RightEar, min).is_some() {
            Some(EarSide::Right)
        } else {
            None
        }
    }

    fn measure_side(&self, landmarks: &LandmarkSet, side: EarSide) -> Option<PostureMetrics> {
        let min = self.thresholds.min_visibility;
        let nose = landmarks.visible(BodyPoint::Nose, min)?;
        let left_shoulder = landmarks.visible(BodyPoint::LeftShoulder, min)?;
        let right_shoulder = landmarks.visible(BodyPoint::RightShoulder, min)?;

        let (ear, shoulder) = match side {
            EarSide::Left => (landmarks.visible(BodyPoint::LeftEar, min)?, left_shoulder),
            EarSide::Right => (landmarks.visible(BodyPoint::RightEar, min)?, right_shoulder),
        };

        let shoulder_mid_y = (left_shoulder.y + right_shoulder.y) / 2.0;

        Some(PostureMetrics {
            vertical_dist: (nose.y - shoulder_mid_y).abs(),
            horizontal_dist: (ear.x - shoulder.x).abs(),
            shoulder_angle: line_angle(left_shoulder, right_shoulder),
        })
    }
}

impl Default for PostureAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
