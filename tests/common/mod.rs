// Shared fixtures for unit and integration tests

#![allow(dead_code)]

use image::RgbImage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use posture_coach::config::PipelineConfig;
use posture_coach::errors::{CaptureError, DeviceError, LandmarkSourceError};
use posture_coach::models::{BodyPoint, Landmark, LandmarkSet, SessionId};
use posture_coach::services::{CaptureBackend, CaptureDevice, LandmarkSource, SessionDevices};

/// Landmark builders in the mirrored image convention
pub struct PoseFixtures;

impl PoseFixtures {
    /// Upright seated pose facing the camera, level shoulders
    pub fn upright() -> LandmarkSet {
        Self::pose(0.30, 0.45, 0.0)
    }

    /// Pose with the given nose height, left ear x and shoulder-line angle
    ///
    /// The left shoulder sits at (0.40, 0.50); the right one 0.2 away along
    /// the requested bearing.
    pub fn pose(nose_y: f32, left_ear_x: f32, shoulder_angle_deg: f32) -> LandmarkSet {
        let radians = shoulder_angle_deg.to_radians();
        let right_x = 0.40 + 0.2 * radians.cos();
        let right_y = 0.50 + 0.2 * radians.sin();

        LandmarkSet::new()
            .with(BodyPoint::Nose, Landmark::new(0.50, nose_y, 0.99))
            .with(BodyPoint::LeftEar, Landmark::new(left_ear_x, nose_y - 0.01, 0.95))
            .with(BodyPoint::RightEar, Landmark::new(0.55, nose_y - 0.01, 0.95))
            .with(BodyPoint::LeftShoulder, Landmark::new(0.40, 0.50, 0.98))
            .with(BodyPoint::RightShoulder, Landmark::new(right_x, right_y, 0.98))
    }

    /// Only the face is visible
    pub fn face_only() -> LandmarkSet {
        LandmarkSet::new()
            .with(BodyPoint::Nose, Landmark::new(0.50, 0.30, 0.99))
            .with(BodyPoint::LeftEar, Landmark::new(0.45, 0.29, 0.95))
    }
}

pub fn fast_pipeline(calibration_frames: u32) -> PipelineConfig {
    PipelineConfig {
        calibration_frames,
        nominal_fps: 30,
        read_retry_delay: Duration::from_millis(1),
        max_read_retry_delay: Duration::from_millis(4),
        stop_timeout: Duration::from_secs(2),
        mirror_frames: false,
        ..PipelineConfig::default()
    }
}

/// Camera that fails a number of reads before delivering blank frames
pub struct ScriptedCamera {
    failures_left: usize,
    pub reads: Arc<AtomicUsize>,
}

impl CaptureDevice for ScriptedCamera {
    fn read_frame(&mut self) -> Result<RgbImage, CaptureError> {
        std::thread::sleep(Duration::from_millis(2));
        self.reads.fetch_add(1, Ordering::SeqCst);

        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(CaptureError::Transient("scripted failure".to_string()));
        }
        Ok(RgbImage::new(64, 48))
    }
}

/// Landmark source that always reports the same pose
pub struct FixedLandmarks(pub Option<LandmarkSet>);

impl LandmarkSource for FixedLandmarks {
    fn detect(&mut self, _image: &RgbImage) -> Result<Option<LandmarkSet>, LandmarkSourceError> {
        Ok(self.0.clone())
    }
}

/// Backend handing every session a scripted camera and a fixed pose
pub struct ScriptedBackend {
    pub pose: Option<LandmarkSet>,
    pub read_failures: usize,
    pub opened: Arc<AtomicUsize>,
    pub reads: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new(pose: Option<LandmarkSet>) -> Self {
        Self {
            pose,
            read_failures: 0,
            opened: Arc::new(AtomicUsize::new(0)),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_read_failures(mut self, failures: usize) -> Self {
        self.read_failures = failures;
        self
    }
}

impl CaptureBackend for ScriptedBackend {
    fn open(&self, _session_id: &SessionId) -> Result<SessionDevices, DeviceError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDevices {
            camera: Box::new(ScriptedCamera {
                failures_left: self.read_failures,
                reads: Arc::clone(&self.reads),
            }),
            landmarks: Box::new(FixedLandmarks(self.pose.clone())),
        })
    }
}

/// Backend whose device can never be opened
pub fn unavailable_backend() -> impl CaptureBackend {
    |_: &SessionId| -> Result<SessionDevices, DeviceError> {
        Err(DeviceError::Unavailable("no camera attached".to_string()))
    }
}

/// Backend giving each session its own fixed pose
pub struct PerSessionBackend {
    poses: HashMap<String, LandmarkSet>,
}

impl PerSessionBackend {
    pub fn new(poses: impl IntoIterator<Item = (&'static str, LandmarkSet)>) -> Self {
        Self {
            poses: poses
                .into_iter()
                .map(|(id, pose)| (id.to_string(), pose))
                .collect(),
        }
    }
}

impl CaptureBackend for PerSessionBackend {
    fn open(&self, session_id: &SessionId) -> Result<SessionDevices, DeviceError> {
        let pose = self.poses.get(session_id.as_str()).cloned();
        Ok(SessionDevices {
            camera: Box::new(ScriptedCamera {
                failures_left: 0,
                reads: Arc::new(AtomicUsize::new(0)),
            }),
            landmarks: Box::new(FixedLandmarks(pose)),
        })
    }
}

/// Camera whose every read blocks; tracks how many are open at once
pub struct BlockingCamera {
    read_delay: Duration,
    live: Arc<AtomicUsize>,
}

impl CaptureDevice for BlockingCamera {
    fn read_frame(&mut self) -> Result<RgbImage, CaptureError> {
        std::thread::sleep(self.read_delay);
        Ok(RgbImage::new(64, 48))
    }
}

impl Drop for BlockingCamera {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct BlockingBackend {
    pub read_delay: Duration,
    pub live: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub opened: Arc<AtomicUsize>,
}

impl BlockingBackend {
    pub fn new(read_delay: Duration) -> Self {
        Self {
            read_delay,
            live: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl CaptureBackend for BlockingBackend {
    fn open(&self, _session_id: &SessionId) -> Result<SessionDevices, DeviceError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        Ok(SessionDevices {
            camera: Box::new(BlockingCamera {
                read_delay: self.read_delay,
                live: Arc::clone(&self.live),
            }),
            landmarks: Box::new(FixedLandmarks(Some(PoseFixtures::upright()))),
        })
    }
}

/// Backend whose open takes `open_delay` for one session id
pub struct SlowOpenBackend {
    pub slow_session: &'static str,
    pub open_delay: Duration,
    pub inner: ScriptedBackend,
}

impl CaptureBackend for SlowOpenBackend {
    fn open(&self, session_id: &SessionId) -> Result<SessionDevices, DeviceError> {
        if session_id.as_str() == self.slow_session {
            std::thread::sleep(self.open_delay);
        }
        self.inner.open(session_id)
    }
}
