//! Capture loop: source -> detector -> grouping -> sink -> renderer.
//!
//! Strictly single-threaded. One grouping call per captured frame, in frame
//! order. A stop request takes effect only between frames.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::detect::{DetectorBackend, LabelMap};
use crate::grouping::{group_detections, ParentClassMap};
use crate::ingest::FrameSource;
use crate::output::ResultSink;
use crate::render::{RenderStatus, Renderer};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Why the capture loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The source reported no more frames.
    EndOfStream,
    /// The source failed to deliver a frame; treated as end of stream.
    SourceFailed(String),
    /// Stop requested (Ctrl-C).
    UserQuit,
    /// The renderer lost its display surface.
    DisplayClosed,
    /// Configured frame limit reached.
    FrameLimit,
    /// The result sink rejected a frame; nothing further could be saved.
    SinkFailed(String),
}

/// What a run did.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub detections_seen: u64,
    pub unknown_labels_skipped: u64,
    pub stop_reason: StopReason,
    pub output_path: PathBuf,
    /// Set when results could not be made durable at shutdown.
    pub flush_error: Option<String>,
}

impl RunSummary {
    pub fn output_written(&self) -> bool {
        self.flush_error.is_none()
    }
}

pub struct CapturePipeline {
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    labels: LabelMap,
    parents: ParentClassMap,
    sink: Box<dyn ResultSink>,
    renderer: Box<dyn Renderer>,
    stop: Arc<AtomicBool>,
    max_frames: Option<u64>,
}

impl CapturePipeline {
    /// Assemble a pipeline. Fails when the label map does not match the
    /// detector's declared vocabulary.
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn DetectorBackend>,
        labels: LabelMap,
        parents: ParentClassMap,
        sink: Box<dyn ResultSink>,
        renderer: Box<dyn Renderer>,
    ) -> Result<Self> {
        labels
            .validate(detector.name(), detector.class_count())
            .context("label vocabulary does not match detector")?;
        Ok(Self {
            source,
            detector,
            labels,
            parents,
            sink,
            renderer,
            stop: Arc::new(AtomicBool::new(false)),
            max_frames: None,
        })
    }

    /// Stop after this many frames.
    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Flag that requests a stop at the next frame boundary when set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Run until a stop condition, then release the source and finish the sink.
    ///
    /// Detector failures abort the run and are returned. A failure to persist
    /// results, while recording or at shutdown, is logged and reported in the
    /// summary instead.
    pub fn run(mut self) -> Result<RunSummary> {
        self.detector.warm_up().context("detector warm-up failed")?;
        log::info!(
            "capture started: source={} detector={} parents={}",
            self.source.describe(),
            self.detector.name(),
            self.parents.len()
        );

        let outcome = self.capture_loop();

        self.source.release();
        self.renderer.close();

        let mut summary = outcome?;

        match self.sink.finish() {
            Ok(()) => log::info!(
                "results saved: {} frames at {}",
                self.sink.frames_recorded(),
                self.sink.location().display()
            ),
            Err(err) => {
                log::error!(
                    "error saving results to {}: {:#}",
                    self.sink.location().display(),
                    err
                );
                // Keep the first failure when recording already broke.
                summary.flush_error.get_or_insert(format!("{:#}", err));
            }
        }

        log::info!(
            "capture finished: reason={:?} frames={} detections={} unknown_labels={}",
            summary.stop_reason,
            summary.frames_processed,
            summary.detections_seen,
            summary.unknown_labels_skipped
        );
        Ok(summary)
    }

    fn capture_loop(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary {
            frames_processed: 0,
            detections_seen: 0,
            unknown_labels_skipped: 0,
            stop_reason: StopReason::EndOfStream,
            output_path: self.sink.location().to_path_buf(),
            flush_error: None,
        };
        let mut last_health_log = Instant::now();

        summary.stop_reason = loop {
            if self.stop.load(Ordering::SeqCst) {
                break StopReason::UserQuit;
            }
            if self
                .max_frames
                .is_some_and(|limit| summary.frames_processed >= limit)
            {
                break StopReason::FrameLimit;
            }

            let mut frame = match self.source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => break StopReason::EndOfStream,
                Err(err) => {
                    log::warn!("frame read failed, ending capture: {:#}", err);
                    break StopReason::SourceFailed(format!("{:#}", err));
                }
            };

            let raw = self
                .detector
                .detect(&frame)
                .with_context(|| format!("detection failed on frame {}", frame.index))?;
            let (detections, skipped) = self.labels.resolve(&raw);
            let grouped = group_detections(&detections, &self.parents);
            log::debug!(
                "frame {}: {} detections -> {} grouped entries",
                frame.index,
                detections.len(),
                grouped.len()
            );

            if let Err(err) = self.sink.record(grouped) {
                let message = format!("failed to record frame {}: {:#}", frame.index, err);
                log::error!(
                    "error saving results to {}: {}",
                    self.sink.location().display(),
                    message
                );
                summary.flush_error = Some(message.clone());
                break StopReason::SinkFailed(message);
            }

            summary.frames_processed += 1;
            summary.detections_seen += detections.len() as u64;
            summary.unknown_labels_skipped += skipped as u64;

            let status = self.renderer.render(&mut frame, &detections)?;

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                log::info!(
                    "source health={} frames={} source={}",
                    self.source.is_healthy(),
                    self.source.frames_captured(),
                    self.source.describe()
                );
                last_health_log = Instant::now();
            }

            if status == RenderStatus::Closed {
                break StopReason::DisplayClosed;
            }
        };

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, ClassDetection, ScriptedBackend};
    use crate::frame::Frame;
    use crate::ingest::{SyntheticConfig, SyntheticSource};
    use crate::output::JsonDocumentSink;
    use crate::render::NullRenderer;
    use anyhow::anyhow;
    use std::cell::Cell;
    use std::rc::Rc;

    fn source(frames: u64) -> Box<dyn FrameSource> {
        Box::new(SyntheticSource::new(SyntheticConfig {
            name: "stub://unit".to_string(),
            width: 8,
            height: 8,
            max_frames: Some(frames),
        }))
    }

    fn sink(dir: &tempfile::TempDir) -> Box<dyn ResultSink> {
        Box::new(JsonDocumentSink::new(dir.path().join("out.json")))
    }

    struct FailingDetector;

    impl DetectorBackend for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn class_count(&self) -> usize {
            80
        }
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<ClassDetection>> {
            Err(anyhow!("inference exploded"))
        }
    }

    /// Closes after a fixed number of frames.
    struct ClosingRenderer {
        remaining: u32,
    }

    impl Renderer for ClosingRenderer {
        fn render(&mut self, _frame: &mut Frame, _dets: &[crate::Detection]) -> Result<RenderStatus> {
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                Ok(RenderStatus::Closed)
            } else {
                Ok(RenderStatus::Continue)
            }
        }
    }

    /// Accepts `capacity` frames, then fails every write.
    struct FullSink {
        capacity: usize,
        recorded: usize,
        location: PathBuf,
    }

    impl ResultSink for FullSink {
        fn record(&mut self, _frame: crate::FrameResult) -> Result<()> {
            if self.recorded == self.capacity {
                return Err(anyhow!("No space left on device"));
            }
            self.recorded += 1;
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            Ok(())
        }

        fn frames_recorded(&self) -> usize {
            self.recorded
        }

        fn location(&self) -> &std::path::Path {
            &self.location
        }
    }

    /// Sets the stop flag while rendering the given frame.
    struct QuitRenderer {
        stop: Rc<Cell<Option<Arc<AtomicBool>>>>,
        quit_on: u64,
    }

    impl Renderer for QuitRenderer {
        fn render(&mut self, frame: &mut Frame, _dets: &[crate::Detection]) -> Result<RenderStatus> {
            if frame.index == self.quit_on {
                if let Some(flag) = self.stop.take() {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            Ok(RenderStatus::Continue)
        }
    }

    #[test]
    fn rejects_mismatched_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let result = CapturePipeline::new(
            source(1),
            Box::new(ScriptedBackend::new(91, Vec::new())),
            LabelMap::coco(),
            ParentClassMap::default(),
            sink(&dir),
            Box::new(NullRenderer),
        );
        assert!(result.is_err());
    }

    #[test]
    fn runs_to_end_of_stream_and_counts_unknown_labels() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let script = vec![vec![
            ClassDetection {
                class_id: 0,
                bbox: BoundingBox::new(0, 0, 8, 8),
                confidence: 0.9,
            },
            ClassDetection {
                class_id: 500,
                bbox: BoundingBox::new(0, 0, 1, 1),
                confidence: 0.9,
            },
        ]];
        let pipeline = CapturePipeline::new(
            source(3),
            Box::new(ScriptedBackend::new(80, script)),
            LabelMap::coco(),
            ParentClassMap::default(),
            sink(&dir),
            Box::new(NullRenderer),
        )?;

        let summary = pipeline.run()?;
        assert_eq!(summary.stop_reason, StopReason::EndOfStream);
        assert_eq!(summary.frames_processed, 3);
        assert_eq!(summary.detections_seen, 1);
        assert_eq!(summary.unknown_labels_skipped, 1);
        assert!(summary.output_written());
        Ok(())
    }

    #[test]
    fn display_close_stops_after_current_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let pipeline = CapturePipeline::new(
            source(10),
            Box::new(ScriptedBackend::new(80, Vec::new())),
            LabelMap::coco(),
            ParentClassMap::default(),
            sink(&dir),
            Box::new(ClosingRenderer { remaining: 2 }),
        )?;

        let summary = pipeline.run()?;
        assert_eq!(summary.stop_reason, StopReason::DisplayClosed);
        assert_eq!(summary.frames_processed, 2);
        Ok(())
    }

    #[test]
    fn stop_flag_is_honoured_at_frame_boundary() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let slot = Rc::new(Cell::new(None));
        let pipeline = CapturePipeline::new(
            source(10),
            Box::new(ScriptedBackend::new(80, Vec::new())),
            LabelMap::coco(),
            ParentClassMap::default(),
            sink(&dir),
            Box::new(QuitRenderer {
                stop: slot.clone(),
                quit_on: 4,
            }),
        )?;
        slot.set(Some(pipeline.stop_handle()));

        let summary = pipeline.run()?;
        assert_eq!(summary.stop_reason, StopReason::UserQuit);
        assert_eq!(summary.frames_processed, 4);
        Ok(())
    }

    #[test]
    fn frame_limit_stops_loop() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let summary = CapturePipeline::new(
            source(10),
            Box::new(ScriptedBackend::new(80, Vec::new())),
            LabelMap::coco(),
            ParentClassMap::default(),
            sink(&dir),
            Box::new(NullRenderer),
        )?
        .with_max_frames(Some(3))
        .run()?;
        assert_eq!(summary.stop_reason, StopReason::FrameLimit);
        assert_eq!(summary.frames_processed, 3);
        Ok(())
    }

    #[test]
    fn detector_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = CapturePipeline::new(
            source(3),
            Box::new(FailingDetector),
            LabelMap::coco(),
            ParentClassMap::default(),
            sink(&dir),
            Box::new(NullRenderer),
        )
        .unwrap();

        let err = pipeline.run().unwrap_err();
        assert!(format!("{:#}", err).contains("inference exploded"));
        assert!(!dir.path().join("out.json").exists());
    }

    #[test]
    fn sink_failure_ends_capture_without_error() -> Result<()> {
        let summary = CapturePipeline::new(
            source(5),
            Box::new(ScriptedBackend::new(80, Vec::new())),
            LabelMap::coco(),
            ParentClassMap::default(),
            Box::new(FullSink {
                capacity: 2,
                recorded: 0,
                location: PathBuf::from("full.jsonl"),
            }),
            Box::new(NullRenderer),
        )?
        .run()?;

        assert_eq!(summary.frames_processed, 2);
        assert!(matches!(summary.stop_reason, StopReason::SinkFailed(_)));
        assert!(!summary.output_written());
        assert!(summary
            .flush_error
            .as_deref()
            .is_some_and(|e| e.contains("failed to record frame 3")));
        Ok(())
    }
}
