//! Frame ingestion sources.
//!
//! This module provides different sources for frames:
//! - Synthetic source (`stub://...`, testing and demos)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! All sources produce RGB24 `Frame` instances in capture order. A source
//! that cannot deliver another frame reports end of stream; the capture loop
//! treats read errors the same way.

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

/// A blocking source of frames.
pub trait FrameSource {
    /// Source identifier for logs.
    fn describe(&self) -> String;

    /// Read the next frame. `Ok(None)` means the stream has ended.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying device. Safe to call more than once.
    fn release(&mut self);

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Frames delivered so far.
    fn frames_captured(&self) -> u64;
}

/// Open a source from a location string.
///
/// `stub://name` yields a synthetic source; anything else is treated as a
/// local V4L2 device path and requires the `ingest-v4l2` feature.
pub fn open_source(
    location: &str,
    width: u32,
    height: u32,
    max_frames: Option<u64>,
) -> Result<Box<dyn FrameSource>> {
    if location.trim().is_empty() {
        return Err(anyhow!("frame source location must not be empty"));
    }
    if location.starts_with("stub://") {
        let source = SyntheticSource::new(SyntheticConfig {
            name: location.to_string(),
            width,
            height,
            max_frames,
        });
        return Ok(Box::new(source));
    }
    if location.contains("://") {
        return Err(anyhow!(
            "unsupported frame source '{}': only local devices and stub:// are supported",
            location
        ));
    }

    #[cfg(feature = "ingest-v4l2")]
    {
        let mut source = V4l2Source::new(V4l2Config {
            device: location.to_string(),
            width,
            height,
            max_frames,
            ..V4l2Config::default()
        });
        source.connect()?;
        Ok(Box::new(source))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(anyhow!(
            "camera device '{}' requires the ingest-v4l2 feature",
            location
        ))
    }
}
