/// Latest-frame slot
///
/// Single-producer, many-reader cell holding the most recently rendered
/// frame together with its classification. The processing loop replaces the
/// whole snapshot at once, so readers never see a frame paired with the
/// classification of another one.
use chrono::{DateTime, Utc};
use image::RgbImage;
use std::sync::Arc;
use tokio::sync::watch;

use crate::models::{Assessment, PostureStatusRecord};

#[derive(Debug)]
pub struct FrameSnapshot {
    /// Processed-frame counter, strictly increasing per session
    pub sequence: u64,
    pub image: RgbImage,
    pub assessment: Assessment,
    pub captured_at: DateTime<Utc>,
}

impl FrameSnapshot {
    pub fn status_record(&self) -> PostureStatusRecord {
        PostureStatusRecord::new(&self.assessment, self.sequence, self.captured_at)
    }
}

type Slot = Option<Arc<FrameSnapshot>>;

/// Write side, owned by the processing loop
#[derive(Debug)]
pub struct FramePublisher {
    tx: watch::Sender<Slot>,
}

/// Read side, cheap to clone for every consumer
#[derive(Debug, Clone)]
pub struct FrameReader {
    rx: watch::Receiver<Slot>,
}

/// Create an empty slot
pub fn frame_slot() -> (FramePublisher, FrameReader) {
    let (tx, rx) = watch::channel(None);
    (FramePublisher { tx }, FrameReader { rx })
}

impl FramePublisher {
    /// Replace the current snapshot; succeeds even with no readers attached
    pub fn publish(&self, snapshot: FrameSnapshot) {
        self.tx.send_replace(Some(Arc::new(snapshot)));
    }

    pub fn subscribe(&self) -> FrameReader {
        FrameReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl FrameReader {
    pub fn latest(&self) -> Option<Arc<FrameSnapshot>> {
        self.rx.borrow().clone()
    }

    /// True once the publishing loop has gone away
    pub fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }
}
