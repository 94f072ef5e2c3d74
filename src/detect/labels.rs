use anyhow::{anyhow, Result};

use crate::detect::result::{ClassDetection, Detection};

/// COCO class names in YOLOv8 output order.
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Explicit class index to label mapping.
///
/// Validated against the detector's declared vocabulary at startup so that a
/// model/label mismatch fails fast instead of surfacing mid-run.
#[derive(Clone, Debug)]
pub struct LabelMap {
    labels: Vec<String>,
}

impl LabelMap {
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(anyhow!("label map must contain at least one label"));
        }
        if let Some(idx) = labels.iter().position(|l| l.trim().is_empty()) {
            return Err(anyhow!("label map entry {} is empty", idx));
        }
        Ok(Self { labels })
    }

    /// The 80-class COCO vocabulary.
    pub fn coco() -> Self {
        Self {
            labels: COCO_CLASSES.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, class_id: usize) -> Option<&str> {
        self.labels.get(class_id).map(String::as_str)
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Check that the detector declares the same vocabulary size.
    pub fn validate(&self, detector_name: &str, class_count: usize) -> Result<()> {
        if class_count != self.labels.len() {
            return Err(anyhow!(
                "detector '{}' declares {} classes but the label map has {}",
                detector_name,
                class_count,
                self.labels.len()
            ));
        }
        Ok(())
    }

    /// Attach labels to raw detections, preserving detector order.
    ///
    /// Detections whose class index is outside the vocabulary are skipped.
    /// Returns the labelled detections and the number skipped.
    pub fn resolve(&self, raw: &[ClassDetection]) -> (Vec<Detection>, usize) {
        let mut skipped = 0usize;
        let detections = raw
            .iter()
            .filter_map(|det| match self.label(det.class_id) {
                Some(label) => Some(Detection::new(label, det.bbox, det.confidence)),
                None => {
                    log::warn!(
                        "skipping detection with unknown class index {} (vocabulary has {})",
                        det.class_id,
                        self.labels.len()
                    );
                    skipped += 1;
                    None
                }
            })
            .collect();
        (detections, skipped)
    }
}

impl Default for LabelMap {
    fn default() -> Self {
        Self::coco()
    }
}
