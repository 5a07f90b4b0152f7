/// Capture/Processing Loop
///
/// One blocking task per session reads frames from the capture device, runs
/// the landmark source, drives the analyzer through its countdown ->
/// calibration -> classification sequence, renders the overlay and publishes
/// the result to the session's latest-frame slot.
use chrono::Utc;
use image::{imageops, RgbImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::errors::CalibrationError;
use crate::models::{Assessment, LandmarkSet, PostureClassification, SessionId};
use crate::services::capture::SessionDevices;
use crate::services::frame_slot::{frame_slot, FramePublisher, FrameReader, FrameSnapshot};
use crate::services::overlay::OverlayRenderer;
use crate::services::posture_analyzer::PostureAnalyzer;

/// Whole seconds left in the warm-up window, rounded up
pub fn countdown_seconds(remaining_frames: u32, nominal_fps: u32) -> u32 {
    remaining_frames.div_ceil(nominal_fps.max(1))
}

/// Log the 1st, 2nd, 4th, 8th... occurrence of a repeating failure
fn should_log(count: u64) -> bool {
    count.is_power_of_two()
}

/// Flags shared between the loop and its owner
#[derive(Debug, Default)]
struct LoopControl {
    stop: AtomicBool,
    recalibrate: AtomicBool,
}

/// Counters reported when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames_processed: u64,
    pub read_failures: u64,
    pub detection_failures: u64,
    pub calibrations: u64,
}

/// Exponential backoff for frame read failures
#[derive(Debug, Clone)]
struct ReadBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl ReadBackoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Per-session frame processor; owns the analyzer and the capture resources
pub struct FrameProcessor {
    session_id: SessionId,
    devices: SessionDevices,
    analyzer: PostureAnalyzer,
    renderer: OverlayRenderer,
    config: PipelineConfig,
    /// Cycles since start or the last recalibration
    cycles: u32,
    sequence: u64,
    stats: LoopStats,
}

impl FrameProcessor {
    pub fn new(session_id: SessionId, devices: SessionDevices, config: PipelineConfig) -> Self {
        Self {
            session_id,
            devices,
            analyzer: PostureAnalyzer::with_thresholds(config.thresholds),
            renderer: OverlayRenderer::new(&config.overlay),
            config,
            cycles: 0,
            sequence: 0,
            stats: LoopStats::default(),
        }
    }

    pub fn analyzer(&self) -> &PostureAnalyzer {
        &self.analyzer
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Forget the baseline and restart the warm-up countdown
    pub fn recalibrate(&mut self) {
        self.analyzer.reset();
        self.cycles = 0;
        info!(session_id = %self.session_id, "Recalibration requested");
    }

    /// Run one captured frame through detection, analysis and rendering
    pub fn process(&mut self, mut frame: RgbImage) -> FrameSnapshot {
        if self.config.mirror_frames {
            imageops::flip_horizontal_in_place(&mut frame);
        }

        let detection = match self.devices.landmarks.detect(&frame) {
            Ok(detection) => detection,
            Err(e) => {
                self.stats.detection_failures += 1;
                if should_log(self.stats.detection_failures) {
                    warn!(
                        session_id = %self.session_id,
                        failures = self.stats.detection_failures,
                        "Landmark detection failed: {}", e
                    );
                }
                None
            }
        };

        let assessment = self.assess(detection.as_ref());
        self.cycles = self.cycles.saturating_add(1);
        self.sequence += 1;
        self.stats.frames_processed += 1;

        self.renderer.render(
            &mut frame,
            detection.as_ref(),
            &assessment,
            self.analyzer.thresholds().min_visibility,
        );

        FrameSnapshot {
            sequence: self.sequence,
            image: frame,
            assessment,
            captured_at: Utc::now(),
        }
    }

    fn assess(&mut self, detection: Option<&LandmarkSet>) -> Assessment {
        if !self.analyzer.is_calibrated() {
            let metrics = detection.and_then(|landmarks| self.analyzer.measure(landmarks));

            if self.cycles < self.config.calibration_frames {
                let remaining = self.config.calibration_frames - self.cycles;
                return Assessment {
                    classification: PostureClassification::Calibrating {
                        seconds_remaining: countdown_seconds(remaining, self.config.nominal_fps),
                    },
                    metrics,
                };
            }

            let attempt = match detection {
                Some(landmarks) => self.analyzer.calibrate(landmarks).map(|_| ()),
                None => Err(CalibrationError::LandmarksUnavailable),
            };
            match attempt {
                Ok(()) => {
                    self.stats.calibrations += 1;
                    info!(session_id = %self.session_id, frame = self.sequence + 1, "Session calibrated");
                }
                Err(e) => {
                    debug!(session_id = %self.session_id, "Calibration attempt failed: {}", e);
                    return Assessment {
                        classification: PostureClassification::Calibrating {
                            seconds_remaining: 0,
                        },
                        metrics,
                    };
                }
            }
        }

        match detection {
            Some(landmarks) => self.analyzer.assess(landmarks),
            None => Assessment::without_metrics(PostureClassification::Unknown),
        }
    }

    fn run(mut self, control: Arc<LoopControl>, publisher: FramePublisher) -> LoopStats {
        let mut backoff = ReadBackoff::new(
            self.config.read_retry_delay,
            self.config.max_read_retry_delay,
        );

        info!(session_id = %self.session_id, "Processing loop started");

        while !control.stop.load(Ordering::Acquire) {
            if control.recalibrate.swap(false, Ordering::AcqRel) {
                self.recalibrate();
            }

            let frame = match self.devices.camera.read_frame() {
                Ok(frame) => {
                    backoff.reset();
                    frame
                }
                Err(e) => {
                    self.stats.read_failures += 1;
                    if should_log(self.stats.read_failures) {
                        warn!(
                            session_id = %self.session_id,
                            failures = self.stats.read_failures,
                            "Frame read failed, retrying: {}", e
                        );
                    }
                    std::thread::sleep(backoff.next_delay());
                    continue;
                }
            };

            publisher.publish(self.process(frame));
        }

        info!(
            session_id = %self.session_id,
            frames = self.stats.frames_processed,
            read_failures = self.stats.read_failures,
            "Processing loop stopped"
        );

        self.stats
    }
}

/// Result of waiting for a processing loop to exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Loop exited; stats are missing when it was already gone or panicked
    Finished(Option<LoopStats>),
    /// Loop is still inside a device call and keeps the device until it returns
    TimedOut,
}

/// Handle to a running processing loop
pub struct CaptureLoop {
    session_id: SessionId,
    control: Arc<LoopControl>,
    handle: Option<JoinHandle<LoopStats>>,
    reader: FrameReader,
    stop_timeout: Duration,
}

impl CaptureLoop {
    /// Spawn the loop on the blocking pool; must be called inside a tokio runtime
    pub fn spawn(session_id: SessionId, devices: SessionDevices, config: PipelineConfig) -> Self {
        let (publisher, reader) = frame_slot();
        let control = Arc::new(LoopControl::default());
        let stop_timeout = config.stop_timeout;

        let processor = FrameProcessor::new(session_id.clone(), devices, config);
        let task_control = Arc::clone(&control);
        let handle =
            tokio::task::spawn_blocking(move || processor.run(task_control, publisher));

        Self {
            session_id,
            control,
            handle: Some(handle),
            reader,
            stop_timeout,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn reader(&self) -> FrameReader {
        self.reader.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |handle| !handle.is_finished())
    }

    pub fn request_recalibration(&self) {
        self.control.recalibrate.store(true, Ordering::Release);
    }

    /// Ask the loop to exit after its current cycle
    pub fn signal_stop(&self) {
        self.control.stop.store(true, Ordering::Release);
    }

    /// Signal the loop and wait for it, at most `stop_timeout`
    pub async fn stop(&mut self) -> StopOutcome {
        self.signal_stop();
        self.join(self.stop_timeout).await
    }

    /// Wait up to `timeout` for the loop task to finish
    ///
    /// On timeout the handle is kept: a loop blocked in a device read still
    /// owns the device until the read returns, and `is_running` keeps
    /// reporting it until then.
    pub async fn join(&mut self, timeout: Duration) -> StopOutcome {
        let Some(handle) = self.handle.as_mut() else {
            return StopOutcome::Finished(None);
        };

        let joined = tokio::time::timeout(timeout, handle).await;
        match joined {
            Ok(result) => {
                self.handle = None;
                match result {
                    Ok(stats) => StopOutcome::Finished(Some(stats)),
                    Err(e) => {
                        error!(session_id = %self.session_id, "Processing loop panicked: {}", e);
                        StopOutcome::Finished(None)
                    }
                }
            }
            Err(_) => {
                warn!(
                    session_id = %self.session_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Processing loop still draining"
                );
                StopOutcome::TimedOut
            }
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.control.stop.store(true, Ordering::Release);
    }
}
