use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::watch;

use super::MediaType;

/// A captured sample as handed to a [`SampleBufferDelegate`].
pub struct SampleBuffer {
    pub media_type: MediaType,
    pub presentation_time: Duration,
    /// Only set for video samples.
    pub format: Option<SampleFormat>,
    pub data: Bytes,
}

impl std::fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("media_type", &self.media_type)
            .field("presentation_time", &self.presentation_time)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// The size and pixel format of a video sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFormat {
    pub width: i32,
    pub height: i32,
    pub pixel_format: String,
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{}x{} {}",
            self.width, self.height, self.pixel_format
        ))
    }
}

/// Receives samples from the data outputs of a capture session.
///
/// Called on the backend's delivery queue, never on the thread driving the engine.
/// Both callbacks do nothing unless overridden.
pub trait SampleBufferDelegate: Send + Sync {
    fn did_output(&self, _sample: Arc<SampleBuffer>) {}

    fn did_drop(&self, _sample: Arc<SampleBuffer>) {}
}

pub type SharedDelegate = Arc<dyn SampleBufferDelegate>;

/// Ignores every sample.
pub struct NoopDelegate;

impl SampleBufferDelegate for NoopDelegate {}

/// Logs every sample at trace level.
pub struct LoggingDelegate;

impl SampleBufferDelegate for LoggingDelegate {
    fn did_output(&self, sample: Arc<SampleBuffer>) {
        log::trace!("did_output {:?}", sample);
    }

    fn did_drop(&self, sample: Arc<SampleBuffer>) {
        log::trace!("did_drop {:?}", sample);
    }
}

impl<T: Fn(Arc<SampleBuffer>) + Send + Sync> SampleBufferDelegate for T {
    fn did_output(&self, sample: Arc<SampleBuffer>) {
        log::trace!("did_output for Fn");
        self(sample);
    }
}

impl SampleBufferDelegate for watch::Sender<Option<Arc<SampleBuffer>>> {
    fn did_output(&self, sample: Arc<SampleBuffer>) {
        log::trace!("did_output for watch::Sender");
        let _ = self.send(Some(sample));
    }
}

/// FOURCC is a little crazy. Most codes are four printable bytes, a few
/// legacy ones are small integers.
///
/// Note that 420v means "video range" and 420f means "full range" NV12.
pub fn fourcc_to_string(px_format_u32: u32) -> String {
    let bytes = px_format_u32.to_be_bytes();
    if bytes[0] == 0 {
        match px_format_u32 {
            32 => "ARGB",
            24 => "RGB ",
            _ => return format!("0x{px_format_u32:08X}"),
        }
        .into()
    } else {
        String::from_utf8_lossy(&bytes).to_string()
    }
}

/// Concatenates image planes into one payload, in plane order.
pub(crate) fn pack_planes<'a>(planes: impl IntoIterator<Item = &'a [u8]>) -> Bytes {
    let mut buf = BytesMut::new();
    for plane in planes {
        buf.extend_from_slice(plane);
    }
    buf.freeze()
}
