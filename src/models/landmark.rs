/// Body landmark models
///
/// A `LandmarkSet` is the per-frame output of the external pose estimator:
/// named 2D points in normalized image coordinates with a visibility score.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of landmarks in a MediaPipe Pose result
pub const MEDIAPIPE_POSE_LANDMARKS: usize = 33;

/// Single landmark in normalized coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// X coordinate (normalized 0-1)
    pub x: f32,
    /// Y coordinate (normalized 0-1)
    pub y: f32,
    /// Detection visibility/confidence (0-1)
    #[serde(default = "default_visibility")]
    pub visibility: f32,
}

fn default_visibility() -> f32 {
    1.0
}

impl Landmark {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }

    /// Check if the landmark is confident enough and inside the frame
    pub fn is_visible(&self, min_visibility: f32) -> bool {
        self.visibility >= min_visibility
            && self.x.is_finite()
            && self.y.is_finite()
            && (0.0..=1.0).contains(&self.x)
            && (0.0..=1.0).contains(&self.y)
    }

    /// Calculate Euclidean distance to another landmark
    pub fn distance_to(&self, other: &Landmark) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Pixel position for a frame of the given size
    pub fn to_pixel(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

/// Body points the posture pipeline knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPoint {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
}

impl BodyPoint {
    /// Get point name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
        }
    }

    /// Index of this point in a MediaPipe Pose landmark list
    pub fn mediapipe_index(&self) -> usize {
        match self {
            Self::Nose => 0,
            Self::LeftEye => 2,
            Self::RightEye => 5,
            Self::LeftEar => 7,
            Self::RightEar => 8,
            Self::LeftShoulder => 11,
            Self::RightShoulder => 12,
            Self::LeftElbow => 13,
            Self::RightElbow => 14,
            Self::LeftWrist => 15,
            Self::RightWrist => 16,
            Self::LeftHip => 23,
            Self::RightHip => 24,
        }
    }

    /// Get all body points
    pub fn all() -> [Self; 13] {
        [
            Self::Nose,
            Self::LeftEye,
            Self::RightEye,
            Self::LeftEar,
            Self::RightEar,
            Self::LeftShoulder,
            Self::RightShoulder,
            Self::LeftElbow,
            Self::RightElbow,
            Self::LeftWrist,
            Self::RightWrist,
            Self::LeftHip,
            Self::RightHip,
        ]
    }
}

/// Point pairs drawn as the overlay skeleton
pub const SKELETON_CONNECTIONS: [(BodyPoint, BodyPoint); 10] = [
    (BodyPoint::LeftEar, BodyPoint::LeftEye),
    (BodyPoint::LeftEye, BodyPoint::Nose),
    (BodyPoint::Nose, BodyPoint::RightEye),
    (BodyPoint::RightEye, BodyPoint::RightEar),
    (BodyPoint::LeftShoulder, BodyPoint::RightShoulder),
    (BodyPoint::LeftShoulder, BodyPoint::LeftElbow),
    (BodyPoint::RightShoulder, BodyPoint::RightElbow),
    (BodyPoint::LeftShoulder, BodyPoint::LeftHip),
    (BodyPoint::RightShoulder, BodyPoint::RightHip),
    (BodyPoint::LeftHip, BodyPoint::RightHip),
];

/// Landmarks detected on one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    points: BTreeMap<BodyPoint, Landmark>,
}

impl LandmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion used when assembling a detection
    pub fn with(mut self, point: BodyPoint, landmark: Landmark) -> Self {
        self.points.insert(point, landmark);
        self
    }

    /// Build from a full MediaPipe Pose landmark list
    ///
    /// Returns `None` when the list is shorter than the 33 MediaPipe landmarks.
    pub fn from_mediapipe(landmarks: &[Landmark]) -> Option<Self> {
        if landmarks.len() < MEDIAPIPE_POSE_LANDMARKS {
            return None;
        }

        let points = BodyPoint::all()
            .into_iter()
            .map(|point| (point, landmarks[point.mediapipe_index()]))
            .collect();

        Some(Self { points })
    }

    pub fn get(&self, point: BodyPoint) -> Option<&Landmark> {
        self.points.get(&point)
    }

    /// Get a landmark only if it is present and confident enough
    pub fn visible(&self, point: BodyPoint, min_visibility: f32) -> Option<&Landmark> {
        self.get(point).filter(|lm| lm.is_visible(min_visibility))
    }

    pub fn iter(&self) -> impl Iterator<Item = (BodyPoint, &Landmark)> {
        self.points.iter().map(|(point, lm)| (*point, lm))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl FromIterator<(BodyPoint, Landmark)> for LandmarkSet {
    fn from_iter<I: IntoIterator<Item = (BodyPoint, Landmark)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}
