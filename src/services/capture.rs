// Seams to the capture device and the external landmark engine

use image::RgbImage;

use crate::errors::{CaptureError, DeviceError, LandmarkSourceError};
use crate::models::{LandmarkSet, SessionId};

/// A frame source owned exclusively by one session's processing loop
pub trait CaptureDevice: Send {
    /// Block until the next frame is available
    fn read_frame(&mut self) -> Result<RgbImage, CaptureError>;
}

/// External pose-estimation engine
pub trait LandmarkSource: Send {
    /// `Ok(None)` means no body was detected on this frame
    fn detect(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>, LandmarkSourceError>;
}

/// Device and landmark engine handed to a freshly started session
pub struct SessionDevices {
    pub camera: Box<dyn CaptureDevice>,
    pub landmarks: Box<dyn LandmarkSource>,
}

/// Opens per-session capture resources
pub trait CaptureBackend: Send + Sync {
    fn open(&self, session_id: &SessionId) -> Result<SessionDevices, DeviceError>;
}

impl<F> CaptureBackend for F
where
    F: Fn(&SessionId) -> Result<SessionDevices, DeviceError> + Send + Sync,
{
    fn open(&self, session_id: &SessionId) -> Result<SessionDevices, DeviceError> {
        self(session_id)
    }
}
