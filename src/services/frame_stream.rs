// MJPEG delivery of a session's latest frames

use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::{self, Stream};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, RgbImage};
use std::convert::Infallible;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::services::frame_slot::FrameReader;

pub const MJPEG_BOUNDARY: &str = "frame";

/// `Content-Type` of the multipart stream
pub fn mjpeg_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", MJPEG_BOUNDARY)
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder.encode_image(image)?;
    Ok(buffer)
}

/// Wrap one JPEG image as a multipart part
pub fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        MJPEG_BOUNDARY,
        jpeg.len()
    );
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

struct StreamState {
    reader: FrameReader,
    ticker: Interval,
    quality: u8,
    /// Last delivered part and the frame sequence it was encoded from
    last: Option<(u64, Bytes)>,
}

/// Endless multipart stream of the latest frames, one part per tick
///
/// Nothing is emitted until the first frame is published. The stream ends
/// once the session's processing loop is gone.
pub fn mjpeg_stream(
    reader: FrameReader,
    config: &StreamConfig,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let state = StreamState {
        reader,
        ticker,
        quality: config.jpeg_quality,
        last: None,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            state.ticker.tick().await;

            if state.reader.is_closed() {
                debug!("Frame source closed, ending stream");
                return None;
            }

            let Some(snapshot) = state.reader.latest() else {
                continue;
            };

            let cached = state
                .last
                .as_ref()
                .filter(|(sequence, _)| *sequence == snapshot.sequence)
                .map(|(_, part)| part.clone());
            if let Some(part) = cached {
                return Some((Ok(part), state));
            }

            let quality = state.quality;
            let sequence = snapshot.sequence;
            let encoded =
                tokio::task::spawn_blocking(move || encode_jpeg(&snapshot.image, quality)).await;

            match encoded {
                Ok(Ok(jpeg)) => {
                    let part = mjpeg_part(&jpeg);
                    state.last = Some((sequence, part.clone()));
                    return Some((Ok(part), state));
                }
                Ok(Err(e)) => warn!(sequence, "Failed to encode frame: {}", e),
                Err(e) => warn!(sequence, "Frame encoder task failed: {}", e),
            }
        }
    })
}
