//! Result accumulation and persistence.
//!
//! - `ResultAccumulator`: in-memory `OutputResults`, written once as a
//!   pretty-printed JSON document.
//! - `JsonDocumentSink`: `ResultSink` adapter that flushes an accumulator to a
//!   fixed path when the run finishes.
//! - `JsonLinesRecorder`: streaming sink, one compact JSON line per frame,
//!   written as frames are recorded.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::grouping::FrameResult;

/// Default location of the results document, relative to the working directory.
pub const DEFAULT_OUTPUT_PATH: &str = "output_json/output_results.json";

/// All frame results of a run, in capture order.
pub type OutputResults = Vec<FrameResult>;

/// Destination for per-frame results.
pub trait ResultSink {
    /// Append one frame's result. Called once per processed frame, in order.
    fn record(&mut self, frame: FrameResult) -> Result<()>;

    /// Make everything recorded durable. Called exactly once, at shutdown.
    fn finish(&mut self) -> Result<()>;

    /// Number of frames recorded so far.
    fn frames_recorded(&self) -> usize;

    /// Where results end up.
    fn location(&self) -> &Path;
}

/// Append-only in-memory accumulator of frame results.
#[derive(Debug, Default)]
pub struct ResultAccumulator {
    results: OutputResults,
    flushed: bool,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, frame: FrameResult) {
        self.results.push(frame);
    }

    pub fn results(&self) -> &[FrameResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_results(self) -> OutputResults {
        self.results
    }

    /// Write the full results as a pretty-printed JSON document.
    ///
    /// Parent directories are created as needed. May be called only once.
    pub fn flush(&mut self, path: &Path) -> Result<()> {
        if self.flushed {
            return Err(anyhow!("results were already flushed"));
        }
        ensure_parent_dir(path)?;
        let file = File::create(path)
            .with_context(|| format!("failed to create results file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        write_pretty(&mut writer, &self.results)
            .with_context(|| format!("failed to serialize results to {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("failed to write results file {}", path.display()))?;
        self.flushed = true;
        Ok(())
    }

    /// Parse a results document written by `flush`.
    pub fn load(path: &Path) -> Result<OutputResults> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read results file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid results file {}", path.display()))
    }
}

/// Serialize with four-space indentation.
pub fn write_pretty<W: Write, T: Serialize + ?Sized>(writer: W, value: &T) -> Result<()> {
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(writer, formatter);
    value.serialize(&mut ser)?;
    Ok(())
}

/// Accumulates in memory and writes one JSON document on `finish`.
pub struct JsonDocumentSink {
    path: PathBuf,
    results: ResultAccumulator,
}

impl JsonDocumentSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            results: ResultAccumulator::new(),
        }
    }

    pub fn results(&self) -> &[FrameResult] {
        self.results.results()
    }
}

impl ResultSink for JsonDocumentSink {
    fn record(&mut self, frame: FrameResult) -> Result<()> {
        self.results.record(frame);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.results.flush(&self.path)
    }

    fn frames_recorded(&self) -> usize {
        self.results.len()
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

/// Streams each frame result as one JSON line.
///
/// Memory use stays constant and frames already written survive a crash.
pub struct JsonLinesRecorder {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    frames: usize,
}

impl JsonLinesRecorder {
    /// Create (truncate) the output file, creating parent directories.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_parent_dir(&path)?;
        let file = File::create(&path)
            .with_context(|| format!("failed to create results file {}", path.display()))?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            frames: 0,
        })
    }

    /// Read back a JSON-lines results file. Blank lines are ignored.
    pub fn load(path: &Path) -> Result<OutputResults> {
        let file = File::open(path)
            .with_context(|| format!("failed to open results file {}", path.display()))?;
        let mut results = OutputResults::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("failed to read {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let frame: FrameResult = serde_json::from_str(&line).with_context(|| {
                format!("invalid frame on line {} of {}", lineno + 1, path.display())
            })?;
            results.push(frame);
        }
        Ok(results)
    }
}

impl ResultSink for JsonLinesRecorder {
    fn record(&mut self, frame: FrameResult) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("results stream already finished"))?;
        serde_json::to_writer(&mut *writer, &frame)?;
        writer.write_all(b"\n")?;
        writer
            .flush()
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| anyhow!("results stream already finished"))?;
        let file = writer
            .into_inner()
            .map_err(|e| anyhow!("failed to flush {}: {}", self.path.display(), e))?;
        file.sync_all()
            .with_context(|| format!("failed to sync {}", self.path.display()))?;
        Ok(())
    }

    fn frames_recorded(&self) -> usize {
        self.frames
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create output directory {}", parent.display())
            })?;
        }
    }
    Ok(())
}
