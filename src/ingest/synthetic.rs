//! Synthetic frame source.
//!
//! Generates deterministic RGB frames without any device. Used by tests and
//! by `stub://` locations so the whole pipeline can run headless.

use anyhow::Result;

use super::FrameSource;
use crate::frame::Frame;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Display name (e.g., "stub://front_camera").
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// End the stream after this many frames. `None` runs forever.
    pub max_frames: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "stub://camera".to_string(),
            width: crate::CAMERA_WIDTH,
            height: crate::CAMERA_HEIGHT,
            max_frames: None,
        }
    }
}

/// Deterministic frame generator.
pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    /// Simulated scene state; changes every 50 frames.
    scene_state: u8,
    released: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        log::info!(
            "SyntheticSource: opened {} ({}x{})",
            config.name,
            config.width,
            config.height
        );
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
            released: false,
        }
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = self.config.width as usize * self.config.height as usize * 3;

        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("{} (synthetic)", self.config.name)
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if self.released {
            return Ok(None);
        }
        if let Some(limit) = self.config.max_frames {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }

        self.frame_count += 1;
        let pixels = self.generate_pixels();
        let frame = Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )?;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if !self.released {
            log::info!(
                "SyntheticSource: released {} after {} frames",
                self.config.name,
                self.frame_count
            );
            self.released = true;
        }
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_frames: Option<u64>) -> SyntheticConfig {
        SyntheticConfig {
            name: "stub://test".to_string(),
            width: 16,
            height: 8,
            max_frames,
        }
    }

    #[test]
    fn synthetic_source_produces_numbered_frames() -> Result<()> {
        let mut source = SyntheticSource::new(config(None));
        let first = source.read()?.expect("frame");
        let second = source.read()?.expect("frame");

        assert_eq!((first.width, first.height), (16, 8));
        assert_eq!(first.index, 1);
        assert_eq!(second.index, 2);
        assert_ne!(first.pixels(), second.pixels());
        Ok(())
    }

    #[test]
    fn synthetic_source_ends_at_limit() -> Result<()> {
        let mut source = SyntheticSource::new(config(Some(2)));
        assert!(source.read()?.is_some());
        assert!(source.read()?.is_some());
        assert!(source.read()?.is_none());
        assert_eq!(source.frames_captured(), 2);
        Ok(())
    }

    #[test]
    fn released_source_reports_end_of_stream() -> Result<()> {
        let mut source = SyntheticSource::new(config(None));
        source.release();
        source.release();
        assert!(source.read()?.is_none());
        Ok(())
    }
}
