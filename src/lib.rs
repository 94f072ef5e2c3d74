//! Sub-object grouper
//!
//! Real-time object detection on a camera feed with containment-based
//! grouping of sub-objects under their parent objects.
//!
//! # Architecture
//!
//! One linear, single-threaded pipeline per run:
//!
//! 1. **Ingest**: a `FrameSource` yields RGB frames (V4L2 camera or synthetic).
//! 2. **Detect**: a `DetectorBackend` returns class-indexed boxes; `LabelMap`
//!    attaches labels and skips indices outside the vocabulary.
//! 3. **Group**: `group_detections` nests contained sub-objects under parent
//!    classes and keeps the first instance of every other class.
//! 4. **Record**: a `ResultSink` accumulates frame results and persists them
//!    as JSON at shutdown (or streams them as JSON lines).
//! 5. **Render**: a `Renderer` draws boxes for visual feedback.
//!
//! # Module Structure
//!
//! - `frame`: RGB frame container
//! - `ingest`: frame sources
//! - `detect`: detector backends, label vocabulary, NMS
//! - `grouping`: parent/sub-object grouping (the core)
//! - `output`: result accumulation and persistence
//! - `render`: annotation and preview
//! - `pipeline`: the capture loop
//! - `config`: layered configuration

pub mod config;
pub mod detect;
pub mod frame;
pub mod grouping;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod render;
pub mod ui;

/// Requested capture width.
pub const CAMERA_WIDTH: u32 = 1280;
/// Requested capture height.
pub const CAMERA_HEIGHT: u32 = 720;
/// Camera opened when no source is configured.
pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

pub use config::GrouperConfig;
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use detect::{
    BoundingBox, ClassDetection, Detection, DetectorBackend, LabelMap, ScriptedBackend,
    COCO_CLASSES,
};
pub use frame::Frame;
pub use grouping::{group_detections, FrameResult, GroupedObject, ParentClassMap, SubObject};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::{V4l2Config, V4l2Source};
pub use ingest::{open_source, FrameSource, SyntheticConfig, SyntheticSource};
pub use output::{
    JsonDocumentSink, JsonLinesRecorder, OutputResults, ResultAccumulator, ResultSink,
    DEFAULT_OUTPUT_PATH,
};
pub use pipeline::{CapturePipeline, RunSummary, StopReason};
pub use render::{Annotator, JpegPreview, NullRenderer, RenderStatus, Renderer};
