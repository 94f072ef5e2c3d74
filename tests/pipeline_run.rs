//! End-to-end runs over synthetic frames with scripted detections.

use subobject_grouper::{
    BoundingBox, CapturePipeline, ClassDetection, JpegPreview, JsonDocumentSink,
    JsonLinesRecorder, LabelMap, NullRenderer, ParentClassMap, ResultAccumulator,
    ScriptedBackend, StopReason, SyntheticConfig, SyntheticSource,
};

fn det(class_id: usize, bbox: [i32; 4], confidence: f32) -> ClassDetection {
    ClassDetection {
        class_id,
        bbox: BoundingBox::from(bbox),
        confidence,
    }
}

fn synthetic(frames: u64) -> Box<SyntheticSource> {
    Box::new(SyntheticSource::new(SyntheticConfig {
        name: "stub://integration".to_string(),
        width: 320,
        height: 240,
        max_frames: Some(frames),
    }))
}

fn script() -> Vec<Vec<ClassDetection>> {
    vec![
        vec![
            det(0, [0, 0, 100, 100], 0.904),
            det(67, [10, 10, 20, 20], 0.799),
        ],
        vec![det(2, [0, 0, 50, 50], 0.6), det(2, [60, 60, 90, 90], 0.7)],
        vec![],
    ]
}

#[test]
fn document_sink_persists_every_frame_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("output_json").join("output_results.json");

    let summary = CapturePipeline::new(
        synthetic(3),
        Box::new(ScriptedBackend::new(80, script())),
        LabelMap::coco(),
        ParentClassMap::default(),
        Box::new(JsonDocumentSink::new(&path)),
        Box::new(NullRenderer),
    )
    .expect("pipeline")
    .run()
    .expect("run");

    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(summary.frames_processed, 3);
    assert!(summary.output_written());

    let results = ResultAccumulator::load(&path).expect("load results");
    assert_eq!(results.len(), 3);

    let person = &results[0][0];
    assert_eq!(person.object, "person");
    assert_eq!(person.confidence, 0.9);
    assert_eq!(person.subobjects().len(), 1);
    assert_eq!(person.subobjects()[0].object, "cell phone");
    assert_eq!(person.subobjects()[0].confidence, 0.8);
    assert_eq!(results[0][1].object, "cell phone");

    assert_eq!(results[1].len(), 1);
    assert_eq!(results[1][0].bbox, BoundingBox::new(0, 0, 50, 50));
    assert!(results[2].is_empty());
}

#[test]
fn json_lines_sink_streams_frames() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("frames.jsonl");

    let summary = CapturePipeline::new(
        synthetic(5),
        Box::new(ScriptedBackend::new(80, script()).looping()),
        LabelMap::coco(),
        ParentClassMap::default(),
        Box::new(JsonLinesRecorder::create(&path).expect("create")),
        Box::new(NullRenderer),
    )
    .expect("pipeline")
    .run()
    .expect("run");

    assert_eq!(summary.frames_processed, 5);
    let frames = JsonLinesRecorder::load(&path).expect("load");
    assert_eq!(frames.len(), 5);
    assert_eq!(frames[3], frames[0]);
}

#[test]
fn unwritable_output_is_reported_not_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"file, not a directory").expect("write blocker");

    let summary = CapturePipeline::new(
        synthetic(2),
        Box::new(ScriptedBackend::new(80, script())),
        LabelMap::coco(),
        ParentClassMap::default(),
        Box::new(JsonDocumentSink::new(blocker.join("out.json"))),
        Box::new(NullRenderer),
    )
    .expect("pipeline")
    .run()
    .expect("run completes despite flush failure");

    assert_eq!(summary.frames_processed, 2);
    assert!(!summary.output_written());
    assert!(summary
        .flush_error
        .as_deref()
        .is_some_and(|e| e.contains("output directory")));
}

#[test]
fn preview_renders_annotated_frames() {
    let dir = tempfile::tempdir().expect("tempdir");
    let preview_path = dir.path().join("preview.jpg");

    CapturePipeline::new(
        synthetic(2),
        Box::new(ScriptedBackend::new(80, script())),
        LabelMap::coco(),
        ParentClassMap::default(),
        Box::new(JsonDocumentSink::new(dir.path().join("out.json"))),
        Box::new(JpegPreview::new(&preview_path).expect("preview")),
    )
    .expect("pipeline")
    .run()
    .expect("run");

    let image = image::open(&preview_path).expect("decode preview").to_rgb8();
    assert_eq!(image.dimensions(), (320, 240));
}

#[test]
fn custom_vocabulary_must_match_detector() {
    let dir = tempfile::tempdir().expect("tempdir");
    let labels = LabelMap::new(["person", "cell phone"]).expect("labels");
    let result = CapturePipeline::new(
        synthetic(1),
        Box::new(ScriptedBackend::new(80, Vec::new())),
        labels,
        ParentClassMap::default(),
        Box::new(JsonDocumentSink::new(dir.path().join("out.json"))),
        Box::new(NullRenderer),
    );
    let err = result.err().expect("mismatch rejected");
    assert!(format!("{:#}", err).contains("declares 80 classes"));
}

#[test]
fn json_lines_write_failure_ends_run_cleanly() {
    let full = std::path::Path::new("/dev/full");
    if !full.exists() {
        return;
    }

    let summary = CapturePipeline::new(
        synthetic(3),
        Box::new(ScriptedBackend::new(80, script())),
        LabelMap::coco(),
        ParentClassMap::default(),
        Box::new(JsonLinesRecorder::create(full).expect("open /dev/full")),
        Box::new(NullRenderer),
    )
    .expect("pipeline")
    .run()
    .expect("run completes despite write failure");

    assert_eq!(summary.frames_processed, 0);
    assert!(matches!(summary.stop_reason, StopReason::SinkFailed(_)));
    assert!(!summary.output_written());
    assert!(summary
        .flush_error
        .as_deref()
        .is_some_and(|e| e.contains("failed to record frame 1")));
}
