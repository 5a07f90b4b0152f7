// Posture pipeline services

pub mod capture;
pub mod capture_loop;
pub mod event_log;
pub mod frame_slot;
pub mod frame_stream;
pub mod overlay;
pub mod posture_analyzer;
pub mod replay;
pub mod session_manager;

pub use capture::{CaptureBackend, CaptureDevice, LandmarkSource, SessionDevices};
pub use capture_loop::{CaptureLoop, FrameProcessor, LoopStats, StopOutcome};
pub use event_log::{EventSink, InMemoryEventLog};
pub use frame_slot::{frame_slot, FramePublisher, FrameReader, FrameSnapshot};
pub use frame_stream::{encode_jpeg, mjpeg_content_type, mjpeg_stream};
pub use overlay::OverlayRenderer;
pub use posture_analyzer::{PostureAnalyzer, PostureThresholds};
pub use replay::ReplayBackend;
pub use session_manager::SessionManager;
