/// Replay capture backend
///
/// Plays back a recorded landmark track (one JSON document per line) as if it
/// came from a camera and a pose engine. Each line is either a map of named
/// body points, a 33-row MediaPipe landmark array, or `null` for a frame
/// without a detected body. Frames are blank canvases at the configured size.
use image::{Rgb, RgbImage};
use serde_json::Value;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::ReplayConfig;
use crate::errors::{CaptureError, DeviceError, LandmarkSourceError};
use crate::models::{Landmark, LandmarkSet, SessionId};
use crate::services::capture::{CaptureBackend, CaptureDevice, LandmarkSource, SessionDevices};

const CANVAS_COLOR: Rgb<u8> = Rgb([32, 32, 32]);

/// Parse one recorded line
pub fn parse_record(line: &str) -> Result<Option<LandmarkSet>, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;

    match value {
        Value::Null => Ok(None),
        Value::Array(_) => {
            let rows: Vec<Landmark> = serde_json::from_value(value).map_err(|e| e.to_string())?;
            LandmarkSet::from_mediapipe(&rows)
                .map(Some)
                .ok_or_else(|| format!("expected at least 33 landmarks, got {}", rows.len()))
        }
        Value::Object(_) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| e.to_string()),
        other => Err(format!("unexpected record: {}", other)),
    }
}

pub struct ReplayBackend {
    config: ReplayConfig,
    frame_interval: Duration,
}

impl ReplayBackend {
    pub fn new(config: ReplayConfig, nominal_fps: u32) -> Self {
        Self {
            config,
            frame_interval: Duration::from_secs(1) / nominal_fps.max(1),
        }
    }
}

impl CaptureBackend for ReplayBackend {
    fn open(&self, session_id: &SessionId) -> Result<SessionDevices, DeviceError> {
        let content = fs::read_to_string(&self.config.path).map_err(|e| {
            DeviceError::Unavailable(format!("{}: {}", self.config.path.display(), e))
        })?;

        let lines: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        if lines.is_empty() {
            return Err(DeviceError::Unavailable(format!(
                "{}: recording is empty",
                self.config.path.display()
            )));
        }

        info!(
            session_id = %session_id,
            path = %self.config.path.display(),
            frames = lines.len(),
            "Opened landmark recording"
        );

        let current = Arc::new(Mutex::new(None));
        let camera = ReplayCamera {
            lines,
            cursor: 0,
            loop_playback: self.config.loop_playback,
            frame_interval: self.frame_interval,
            last_read: None,
            width: self.config.frame_width.max(1),
            height: self.config.frame_height.max(1),
            current: Arc::clone(&current),
        };

        Ok(SessionDevices {
            camera: Box::new(camera),
            landmarks: Box::new(ReplayLandmarks { current }),
        })
    }
}

struct ReplayCamera {
    lines: Vec<String>,
    cursor: usize,
    loop_playback: bool,
    frame_interval: Duration,
    last_read: Option<Instant>,
    width: u32,
    height: u32,
    current: Arc<Mutex<Option<LandmarkSet>>>,
}

impl ReplayCamera {
    fn pace(&mut self) {
        if let Some(last) = self.last_read {
            let elapsed = last.elapsed();
            if elapsed < self.frame_interval {
                std::thread::sleep(self.frame_interval - elapsed);
            }
        }
        self.last_read = Some(Instant::now());
    }
}

impl CaptureDevice for ReplayCamera {
    fn read_frame(&mut self) -> Result<RgbImage, CaptureError> {
        self.pace();

        if self.cursor >= self.lines.len() {
            if !self.loop_playback {
                return Err(CaptureError::Disconnected("end of recording".to_string()));
            }
            self.cursor = 0;
        }

        let line_number = self.cursor + 1;
        let record = parse_record(&self.lines[self.cursor]);
        self.cursor += 1;

        let landmarks = record
            .map_err(|e| CaptureError::Transient(format!("line {}: {}", line_number, e)))?;

        let mut current = self
            .current
            .lock()
            .map_err(|_| CaptureError::Transient("landmark buffer poisoned".to_string()))?;
        *current = landmarks;

        Ok(RgbImage::from_pixel(self.width, self.height, CANVAS_COLOR))
    }
}

struct ReplayLandmarks {
    current: Arc<Mutex<Option<LandmarkSet>>>,
}

impl LandmarkSource for ReplayLandmarks {
    fn detect(&mut self, _image: &RgbImage) -> Result<Option<LandmarkSet>, LandmarkSourceError> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| LandmarkSourceError("landmark buffer poisoned".to_string()))?;
        Ok(current.take())
    }
}
