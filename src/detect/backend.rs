use anyhow::Result;

use crate::detect::result::ClassDetection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// Backends are treated as black boxes: a frame goes in, class-indexed
/// detections come out in the backend's native order. Labels are attached
/// afterwards by `LabelMap`, which is validated against `class_count` at startup.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Number of classes in the backend's output vocabulary.
    fn class_count(&self) -> usize;

    /// Run detection on a frame.
    ///
    /// Boxes are in frame pixel coordinates. Errors are fatal to the run.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<ClassDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
