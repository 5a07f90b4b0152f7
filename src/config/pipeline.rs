use anyhow::Result;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use super::env_or;
use crate::services::posture_analyzer::PostureThresholds;

/// Settings of the per-session capture/processing loop
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Warm-up cycles before the first calibration attempt
    pub calibration_frames: u32,
    /// Frame rate assumed when turning remaining frames into seconds
    pub nominal_fps: u32,
    pub read_retry_delay: Duration,
    pub max_read_retry_delay: Duration,
    pub stop_timeout: Duration,
    pub mirror_frames: bool,
    pub thresholds: PostureThresholds,
    pub overlay: OverlayConfig,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let calibration_frames = env_or("CALIBRATION_FRAMES", defaults.calibration_frames)?;
        let nominal_fps: u32 = env_or("NOMINAL_FPS", defaults.nominal_fps)?;
        let read_retry_delay_ms = env_or("READ_RETRY_DELAY_MS", 50u64)?;
        let max_read_retry_delay_ms = env_or("MAX_READ_RETRY_DELAY_MS", 1000u64)?;
        let stop_timeout_ms = env_or("STOP_TIMEOUT_MS", 2000u64)?;
        let mirror_frames = env_or("MIRROR_FRAMES", defaults.mirror_frames)?;

        let thresholds = PostureThresholds {
            slouch_pct: env_or("SLOUCH_THRESHOLD_PCT", defaults.thresholds.slouch_pct)?,
            forward_head_pct: env_or(
                "FORWARD_HEAD_THRESHOLD_PCT",
                defaults.thresholds.forward_head_pct,
            )?,
            tilt_deg: env_or("SHOULDER_TILT_THRESHOLD_DEG", defaults.thresholds.tilt_deg)?,
            min_visibility: env_or("MIN_VISIBILITY", defaults.thresholds.min_visibility)?,
        };

        Ok(Self {
            calibration_frames,
            nominal_fps: nominal_fps.max(1),
            read_retry_delay: Duration::from_millis(read_retry_delay_ms),
            max_read_retry_delay: Duration::from_millis(
                max_read_retry_delay_ms.max(read_retry_delay_ms),
            ),
            stop_timeout: Duration::from_millis(stop_timeout_ms),
            mirror_frames,
            thresholds,
            overlay: OverlayConfig::from_env()?,
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            calibration_frames: 90,
            nominal_fps: 30,
            read_retry_delay: Duration::from_millis(50),
            max_read_retry_delay: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(2),
            mirror_frames: true,
            thresholds: PostureThresholds::default(),
            overlay: OverlayConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub draw_skeleton: bool,
    /// TrueType font for status text; only the status box is drawn without one
    pub font_path: Option<PathBuf>,
}

impl OverlayConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            draw_skeleton: env_or("DRAW_SKELETON", true)?,
            font_path: env::var("OVERLAY_FONT_PATH").ok().map(PathBuf::from),
        })
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            draw_skeleton: true,
            font_path: None,
        }
    }
}

/// Settings of the consumer-facing frame stream
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub interval: Duration,
    pub jpeg_quality: u8,
}

impl StreamConfig {
    pub fn from_env() -> Result<Self> {
        let interval_ms = env_or("STREAM_INTERVAL_MS", 33u64)?;
        let jpeg_quality: u8 = env_or("JPEG_QUALITY", 80u8)?;

        Ok(Self {
            interval: Duration::from_millis(interval_ms.max(1)),
            jpeg_quality: jpeg_quality.clamp(1, 100),
        })
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(33),
            jpeg_quality: 80,
        }
    }
}

/// Settings of the bundled replay capture backend
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub path: PathBuf,
    pub frame_width: u32,
    pub frame_height: u32,
    pub loop_playback: bool,
}

impl ReplayConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            path: env::var("REPLAY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("landmarks.jsonl")),
            frame_width: env_or("FRAME_WIDTH", 640)?,
            frame_height: env_or("FRAME_HEIGHT", 480)?,
            loop_playback: env_or("REPLAY_LOOP", true)?,
        })
    }
}
