use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::errors::{DeviceError, SessionError};
use crate::models::{
    Assessment, PostureClassification, PostureEvent, PostureStatusRecord, SessionAck, SessionId,
};
use crate::services::capture::CaptureBackend;
use crate::services::capture_loop::{countdown_seconds, CaptureLoop, StopOutcome};
use crate::services::event_log::EventSink;
use crate::services::frame_slot::FrameReader;

/// Lifecycle state of one session id
///
/// Only `Running` slots are visible to status, reader and recalibrate. The
/// other states exist so a session id never has two devices open at once.
enum SessionSlot {
    /// Device open in flight; a stop that races it sets `cancelled`
    Starting { attempt: u64, cancelled: bool },
    Running(CaptureLoop),
    /// A stop is waiting for the loop outside the map lock
    Stopping,
    /// Stop timed out; the loop still holds the device
    Draining(CaptureLoop),
}

impl SessionSlot {
    fn running(&self) -> Option<&CaptureLoop> {
        match self {
            SessionSlot::Running(capture_loop) => Some(capture_loop),
            _ => None,
        }
    }

    fn is_placeholder_of(&self, attempt: u64) -> bool {
        matches!(self, SessionSlot::Starting { attempt: current, .. } if *current == attempt)
    }
}

/// Owns one processing loop per running session
pub struct SessionManager {
    backend: Arc<dyn CaptureBackend>,
    events: Arc<dyn EventSink>,
    config: PipelineConfig,
    sessions: Mutex<HashMap<SessionId, SessionSlot>>,
    attempts: AtomicU64,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        events: Arc<dyn EventSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            backend,
            events,
            config,
            sessions: Mutex::new(HashMap::new()),
            attempts: AtomicU64::new(0),
        }
    }

    /// Open the capture device and start the session's processing loop
    ///
    /// A `Starting` placeholder reserves the id while the device opens, so
    /// the map is not locked during the open and a concurrent start of the
    /// same id answers `AlreadyRunning`. A session whose previous loop is
    /// still draining gets `SessionError::StillStopping` instead of a second
    /// device. A stop that arrives during the open wins: the fresh device is
    /// released and the start answers `Stopped`.
    #[tracing::instrument(skip(self, session_id), fields(session_id = %session_id))]
    pub async fn start(&self, session_id: &SessionId) -> Result<SessionAck, SessionError> {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed);

        let previous = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(session_id) {
                Some(SessionSlot::Starting { .. }) => return Ok(SessionAck::AlreadyRunning),
                Some(SessionSlot::Running(capture_loop)) if capture_loop.is_running() => {
                    return Ok(SessionAck::AlreadyRunning)
                }
                Some(SessionSlot::Stopping) => {
                    return Err(SessionError::StillStopping {
                        session_id: session_id.clone(),
                    })
                }
                _ => {}
            }
            sessions.insert(
                session_id.clone(),
                SessionSlot::Starting {
                    attempt,
                    cancelled: false,
                },
            )
        };

        if let Some(previous) = previous {
            self.retire(session_id, attempt, previous).await?;
        }

        let backend = Arc::clone(&self.backend);
        let id = session_id.clone();
        let opened = tokio::task::spawn_blocking(move || backend.open(&id))
            .await
            .map_err(|e| DeviceError::Unavailable(format!("device open task failed: {}", e)))
            .and_then(|opened| opened);

        let mut sessions = self.sessions.lock().await;
        let cancelled = match sessions.get(session_id) {
            Some(SessionSlot::Starting {
                attempt: current,
                cancelled,
            }) if *current == attempt => Some(*cancelled),
            _ => None,
        };

        let devices = match opened {
            Ok(devices) => devices,
            Err(source) => {
                if cancelled.is_some() {
                    sessions.remove(session_id);
                }
                return Err(SessionError::DeviceUnavailable {
                    session_id: session_id.clone(),
                    source,
                });
            }
        };

        match cancelled {
            Some(false) => {
                // history belongs to the previous run of this id
                self.events.clear(session_id);
                let capture_loop =
                    CaptureLoop::spawn(session_id.clone(), devices, self.config.clone());
                sessions.insert(session_id.clone(), SessionSlot::Running(capture_loop));
                info!("Session started");
                Ok(SessionAck::Started)
            }
            Some(true) => {
                sessions.remove(session_id);
                info!("Session stopped while its device was opening");
                Ok(SessionAck::Stopped)
            }
            None => {
                info!("Session stopped while its device was opening");
                Ok(SessionAck::Stopped)
            }
        }
    }

    /// Wait for the loop a new start displaced, bounded by `stop_timeout`
    async fn retire(
        &self,
        session_id: &SessionId,
        attempt: u64,
        previous: SessionSlot,
    ) -> Result<(), SessionError> {
        let mut capture_loop = match previous {
            SessionSlot::Running(finished) => {
                warn!("Replacing processing loop that exited on its own");
                finished
            }
            SessionSlot::Draining(draining) => draining,
            SessionSlot::Starting { .. } | SessionSlot::Stopping => return Ok(()),
        };

        match capture_loop.join(self.config.stop_timeout).await {
            StopOutcome::Finished(_) => Ok(()),
            StopOutcome::TimedOut => {
                let mut sessions = self.sessions.lock().await;
                if sessions
                    .get(session_id)
                    .map_or(false, |slot| slot.is_placeholder_of(attempt))
                {
                    sessions.insert(session_id.clone(), SessionSlot::Draining(capture_loop));
                }
                Err(SessionError::StillStopping {
                    session_id: session_id.clone(),
                })
            }
        }
    }

    /// Stop the loop and release the device; stopping an idle session is a no-op
    ///
    /// Returns after at most `stop_timeout`. A loop that is still inside a
    /// device read stays registered as draining until the read returns.
    #[tracing::instrument(skip(self, session_id), fields(session_id = %session_id))]
    pub async fn stop(&self, session_id: &SessionId) -> SessionAck {
        let mut capture_loop = {
            let mut sessions = self.sessions.lock().await;
            match sessions.remove(session_id) {
                Some(SessionSlot::Running(capture_loop)) => {
                    sessions.insert(session_id.clone(), SessionSlot::Stopping);
                    capture_loop
                }
                Some(SessionSlot::Starting { attempt, .. }) => {
                    sessions.insert(
                        session_id.clone(),
                        SessionSlot::Starting {
                            attempt,
                            cancelled: true,
                        },
                    );
                    return SessionAck::Stopped;
                }
                Some(SessionSlot::Stopping) => {
                    sessions.insert(session_id.clone(), SessionSlot::Stopping);
                    return SessionAck::Stopped;
                }
                Some(SessionSlot::Draining(draining)) => {
                    if draining.is_running() {
                        sessions.insert(session_id.clone(), SessionSlot::Draining(draining));
                    }
                    return SessionAck::NotRunning;
                }
                None => return SessionAck::NotRunning,
            }
        };

        let outcome = capture_loop.stop().await;

        let mut sessions = self.sessions.lock().await;
        let still_ours = matches!(sessions.get(session_id), Some(SessionSlot::Stopping));
        match outcome {
            StopOutcome::Finished(stats) => {
                if still_ours {
                    sessions.remove(session_id);
                }
                info!(
                    frames = stats.map_or(0, |stats| stats.frames_processed),
                    "Session stopped"
                );
            }
            StopOutcome::TimedOut => {
                if still_ours {
                    sessions.insert(session_id.clone(), SessionSlot::Draining(capture_loop));
                }
                info!("Session stopped, device still draining");
            }
        }

        SessionAck::Stopped
    }

    /// Discard the baseline and restart the calibration countdown
    #[tracing::instrument(skip(self, session_id), fields(session_id = %session_id))]
    pub async fn recalibrate(&self, session_id: &SessionId) -> SessionAck {
        match self
            .sessions
            .lock()
            .await
            .get(session_id)
            .and_then(SessionSlot::running)
        {
            Some(capture_loop) => {
                capture_loop.request_recalibration();
                SessionAck::Recalibrating
            }
            None => SessionAck::NotRunning,
        }
    }

    pub async fn reader(&self, session_id: &SessionId) -> Option<FrameReader> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .and_then(SessionSlot::running)
            .map(CaptureLoop::reader)
    }

    /// Latest status of a running session, `None` when it is not running
    ///
    /// Every successful poll is forwarded to the event sink.
    pub async fn status(&self, session_id: &SessionId) -> Option<PostureStatusRecord> {
        let reader = self.reader(session_id).await?;

        let (record, classification) = match reader.latest() {
            Some(snapshot) => (snapshot.status_record(), snapshot.assessment.classification),
            None => {
                // running, nothing processed yet
                let classification = PostureClassification::Calibrating {
                    seconds_remaining: countdown_seconds(
                        self.config.calibration_frames,
                        self.config.nominal_fps,
                    ),
                };
                let assessment = Assessment::without_metrics(classification);
                let record = PostureStatusRecord::new(&assessment, 0, Utc::now());
                (record, classification)
            }
        };

        self.events
            .record(PostureEvent::new(session_id.clone(), &classification, Utc::now()));

        Some(record)
    }

    pub async fn running_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .sessions
            .lock()
            .await
            .iter()
            .filter(|(_, slot)| slot.running().is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Stop every session; used on shutdown
    ///
    /// Starts still opening a device release it when they find their
    /// placeholder gone.
    pub async fn shutdown(&self) {
        let drained: Vec<(SessionId, SessionSlot)> = self.sessions.lock().await.drain().collect();
        if drained.is_empty() {
            return;
        }

        info!(sessions = drained.len(), "Stopping all sessions");
        for (_, slot) in drained {
            match slot {
                SessionSlot::Running(mut capture_loop) => {
                    capture_loop.stop().await;
                }
                SessionSlot::Draining(mut capture_loop) => {
                    capture_loop.join(self.config.stop_timeout).await;
                }
                SessionSlot::Starting { .. } | SessionSlot::Stopping => {}
            }
        }
    }
}
