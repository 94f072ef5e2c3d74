//! Per-class non-maximum suppression for dense detector heads.

use crate::detect::result::{BoundingBox, ClassDetection};

/// Intersection-over-union of two boxes; 0.0 when either has no area.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);
    let inter = ((ix2 - ix1).max(0) as i64 * (iy2 - iy1).max(0) as i64) as f32;
    let area_a = (a.width() as i64 * a.height() as i64) as f32;
    let area_b = (b.width() as i64 * b.height() as i64) as f32;
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        return 0.0;
    }
    inter / union
}

/// Keep the highest-confidence box of each overlapping same-class cluster.
///
/// Output is sorted by descending confidence and capped at `max_detections`.
pub fn non_max_suppression(
    mut candidates: Vec<ClassDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<ClassDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<ClassDetection> = Vec::new();
    for cand in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && iou(&k.bbox, &cand.bbox) > iou_threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}
