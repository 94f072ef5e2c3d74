//! grouper - live object detection with sub-object grouping
//!
//! This binary:
//! 1. Opens a camera (V4L2) or a synthetic `stub://` source
//! 2. Runs the detector on every frame
//! 3. Groups sub-objects under their parent objects
//! 4. Annotates frames and optionally publishes a JPEG preview
//! 5. Writes all frame results as JSON when capture ends (Ctrl-C, end of
//!    stream, or lost preview surface)

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use subobject_grouper::config::GrouperConfig;
use subobject_grouper::ui::{Ui, UiMode};
use subobject_grouper::{
    open_source, BoundingBox, CapturePipeline, ClassDetection, DetectorBackend, JpegPreview,
    JsonDocumentSink, JsonLinesRecorder, NullRenderer, Renderer, ResultSink, ScriptedBackend,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect objects on a camera feed and group sub-objects under their parents"
)]
struct Args {
    /// Camera device path, or stub://name for synthetic frames.
    #[arg(long)]
    source: Option<String>,
    /// YOLOv8 ONNX model (requires the backend-tract feature).
    #[arg(long)]
    model: Option<PathBuf>,
    /// Results file.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Stream one JSON line per frame instead of a single document at exit.
    #[arg(long)]
    stream_jsonl: bool,
    /// Publish the latest annotated frame to this JPEG path.
    #[arg(long)]
    preview: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Progress output style.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::detect(args.ui);

    let cfg = {
        let stage = ui.stage("load configuration");
        let loaded = GrouperConfig::load().and_then(|mut cfg| {
            apply_args(&mut cfg, &args);
            cfg.validate()?;
            Ok(cfg)
        });
        match loaded {
            Ok(cfg) => cfg,
            Err(err) => {
                stage.fail();
                return Err(err);
            }
        }
    };

    let detector = {
        let stage = ui.stage("load detector");
        match build_detector(&cfg) {
            Ok(detector) => detector,
            Err(err) => {
                stage.fail();
                return Err(err);
            }
        }
    };

    let source = {
        let stage = ui.stage("open camera");
        match open_source(
            &cfg.camera.source,
            cfg.camera.width,
            cfg.camera.height,
            args.max_frames,
        ) {
            Ok(source) => source,
            Err(err) => {
                stage.fail();
                return Err(err);
            }
        }
    };

    let sink: Box<dyn ResultSink> = if cfg.output.stream_jsonl {
        Box::new(JsonLinesRecorder::create(&cfg.output.path)?)
    } else {
        Box::new(JsonDocumentSink::new(&cfg.output.path))
    };

    let renderer: Box<dyn Renderer> = match &cfg.output.preview_path {
        Some(path) => Box::new(JpegPreview::new(path)?),
        None => Box::new(NullRenderer),
    };

    let pipeline = CapturePipeline::new(
        source,
        detector,
        cfg.detector.labels.clone(),
        cfg.parents.clone(),
        sink,
        renderer,
    )?
    .with_max_frames(args.max_frames);

    let stop = pipeline.stop_handle();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("press Ctrl-C to stop; results go to {}", cfg.output.path.display());
    let summary = pipeline.run()?;

    eprintln!("grouper summary:");
    eprintln!("  stop reason: {:?}", summary.stop_reason);
    eprintln!("  frames processed: {}", summary.frames_processed);
    eprintln!("  detections: {}", summary.detections_seen);
    eprintln!("  unknown labels skipped: {}", summary.unknown_labels_skipped);
    match &summary.flush_error {
        None => eprintln!("  results saved at: {}", summary.output_path.display()),
        Some(err) => eprintln!("  error saving results: {}", err),
    }

    Ok(())
}

fn apply_args(cfg: &mut GrouperConfig, args: &Args) {
    if let Some(source) = &args.source {
        cfg.camera.source = source.clone();
    }
    if let Some(model) = &args.model {
        cfg.detector.model_path = Some(model.clone());
    }
    if let Some(output) = &args.output {
        cfg.output.path = output.clone();
    }
    if args.stream_jsonl {
        cfg.output.stream_jsonl = true;
    }
    if let Some(preview) = &args.preview {
        cfg.output.preview_path = Some(preview.clone());
    }
}

fn build_detector(cfg: &GrouperConfig) -> Result<Box<dyn DetectorBackend>> {
    match &cfg.detector.model_path {
        Some(path) => load_model(cfg, path),
        None => {
            log::warn!("no detector model configured; replaying scripted detections");
            Ok(Box::new(demo_backend(cfg.detector.labels.len())))
        }
    }
}

#[cfg(feature = "backend-tract")]
fn load_model(cfg: &GrouperConfig, path: &std::path::Path) -> Result<Box<dyn DetectorBackend>> {
    let backend = subobject_grouper::TractBackend::new(
        path,
        cfg.detector.input_size,
        cfg.detector.labels.len(),
    )?
    .with_thresholds(
        cfg.detector.confidence_threshold,
        cfg.detector.iou_threshold,
    );
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_model(_cfg: &GrouperConfig, path: &std::path::Path) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "model {} requires the backend-tract feature",
        path.display()
    ))
}

/// A person holding a phone, a second person with a laptop, and two cars.
fn demo_backend(class_count: usize) -> ScriptedBackend {
    let det = |class_id: usize, bbox: [i32; 4], confidence: f32| ClassDetection {
        class_id,
        bbox: BoundingBox::from(bbox),
        confidence,
    };
    ScriptedBackend::new(
        class_count,
        vec![
            vec![
                det(0, [300, 100, 700, 700], 0.91),
                det(67, [450, 300, 520, 420], 0.83),
                det(2, [900, 400, 1200, 650], 0.77),
                det(2, [20, 450, 250, 640], 0.64),
            ],
            vec![
                det(0, [320, 110, 720, 710], 0.9),
                det(0, [760, 120, 1100, 700], 0.86),
                det(63, [800, 380, 1000, 520], 0.72),
            ],
            vec![],
        ],
    )
    .looping()
}
