//! Candidate filtering and greedy non-maximum suppression.
//!
//! One pass runs: confidence filter → stable score sort → pre-NMS top-k →
//! greedy NMS → post-NMS top-k. Nothing is carried between passes.
//!
//! Ordering is deterministic: sorting is stable, so candidates with equal
//! scores keep their anchor order and the earlier anchor wins NMS ties.

use std::cmp::Ordering;

use super::detection::{Detection, DetectionSet};
use super::detection_config::DetectionConfig;

/// Keeps candidates whose score strictly exceeds `threshold`, in input order.
pub fn filter_by_confidence(candidates: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    candidates
        .into_iter()
        .filter(|d| d.score > threshold)
        .collect()
}

/// Sorts by descending score. Stable, so equal scores keep input order.
pub fn sort_by_score(detections: &mut [Detection]) {
    detections.sort_by(|a, b| descending(a.score, b.score));
}

fn descending(a: f32, b: f32) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Drops everything past the first `k` entries.
pub fn truncate_top_k(detections: &mut Vec<Detection>, k: usize) {
    detections.truncate(k);
}

/// Intersection-over-union under the inclusive-pixel convention.
///
/// Every extent is measured as `max - min + 1`, for both the areas and the
/// intersection, as in the CPU NMS the published FaceBoxes results use.
/// A degenerate box covers one pixel.
pub fn legacy_iou(a: &Detection, b: &Detection) -> f32 {
    let xx1 = a.xmin.max(b.xmin);
    let yy1 = a.ymin.max(b.ymin);
    let xx2 = a.xmax.min(b.xmax);
    let yy2 = a.ymax.min(b.ymax);

    let w = (xx2 - xx1 + 1.0).max(0.0);
    let h = (yy2 - yy1 + 1.0).max(0.0);
    let inter = w * h;
    if inter == 0.0 {
        return 0.0;
    }
    inter / (a.legacy_area() + b.legacy_area() - inter)
}

/// Greedy NMS: repeatedly keep the best remaining box and discard every
/// remaining box overlapping it by more than `nms_threshold`.
///
/// Output is in descending score order. O(n²) in the worst case.
pub fn non_max_suppression(detections: &[Detection], nms_threshold: f32) -> Vec<Detection> {
    let mut order: Vec<Detection> = detections.to_vec();
    sort_by_score(&mut order);

    let mut keep = Vec::new();
    let mut suppressed = vec![false; order.len()];

    for i in 0..order.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(order[i]);
        for j in (i + 1)..order.len() {
            if suppressed[j] {
                continue;
            }
            if legacy_iou(&order[i], &order[j]) > nms_threshold {
                suppressed[j] = true;
            }
        }
    }
    keep
}

/// Runs the full filter/suppress pass over decoded candidates.
///
/// An empty input yields an empty set.
pub fn suppress(candidates: Vec<Detection>, config: &DetectionConfig) -> DetectionSet {
    let mut survivors = filter_by_confidence(candidates, config.confidence_threshold);
    sort_by_score(&mut survivors);
    truncate_top_k(&mut survivors, config.top_k);

    let mut kept = non_max_suppression(&survivors, config.nms_threshold);
    truncate_top_k(&mut kept, config.keep_top_k);

    log::trace!(
        "suppression kept {} of {} candidates",
        kept.len(),
        survivors.len()
    );
    DetectionSet::new(kept)
}
