use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::ClassDetection;
use crate::frame::Frame;

/// Scripted backend for testing and synthetic runs.
///
/// Replays a fixed list of per-frame detections. Frame N receives script entry
/// `N - 1`; once the script is exhausted it either loops or yields nothing.
pub struct ScriptedBackend {
    class_count: usize,
    script: Vec<Vec<ClassDetection>>,
    looping: bool,
    cursor: usize,
}

impl ScriptedBackend {
    pub fn new(class_count: usize, script: Vec<Vec<ClassDetection>>) -> Self {
        Self {
            class_count,
            script,
            looping: false,
            cursor: 0,
        }
    }

    /// Restart the script from the beginning once it runs out.
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Number of frames this backend has been asked to process.
    pub fn calls(&self) -> usize {
        self.cursor
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn class_count(&self) -> usize {
        self.class_count
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<ClassDetection>> {
        let step = self.cursor;
        self.cursor += 1;

        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let idx = if self.looping {
            step % self.script.len()
        } else {
            step
        };
        Ok(self.script.get(idx).cloned().unwrap_or_default())
    }
}
