//! Intersection over Union (IoU) between axis-aligned boxes.

use crate::types::BoundingBox;

/// Calculate the Intersection over Union (IoU) between two bounding boxes.
///
/// Boxes use continuous coordinates: `[0, 0, 10, 10]` and `[10, 0, 10, 10]`
/// touch along an edge and have an IoU of 0. When both boxes have zero area
/// the union is empty and the result is 0.
///
/// # Example
///
/// ```
/// use coco_analyze::metrics::iou::calculate_iou;
/// use coco_analyze::types::BoundingBox;
///
/// let gt = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
/// let dt = BoundingBox::new(2.0, 2.0, 10.0, 10.0);
/// let iou = calculate_iou(&gt, &dt);
/// assert!((iou - 64.0 / 136.0).abs() < 1e-12);
/// ```
pub fn calculate_iou(bbox1: &BoundingBox, bbox2: &BoundingBox) -> f64 {
    let inter_w = bbox1.right().min(bbox2.right()) - bbox1.x.max(bbox2.x);
    let inter_h = bbox1.bottom().min(bbox2.bottom()) - bbox1.y.max(bbox2.y);
    if inter_w <= 0.0 || inter_h <= 0.0 {
        return 0.0;
    }

    let intersection = inter_w * inter_h;
    let union = bbox1.area() + bbox2.area() - intersection;
    if union <= 0.0 {
        return 0.0;
    }

    (intersection / union).clamp(0.0, 1.0)
}

/// Calculate the IoU matrix between two sets of boxes.
///
/// `result[i][j]` is the IoU between `bboxes1[i]` and `bboxes2[j]`. The
/// matcher calls this with detections as rows and ground truths as columns.
pub fn calculate_iou_matrix(bboxes1: &[BoundingBox], bboxes2: &[BoundingBox]) -> Vec<Vec<f64>> {
    bboxes1
        .iter()
        .map(|bbox1| {
            bboxes2
                .iter()
                .map(|bbox2| calculate_iou(bbox1, bbox2))
                .collect()
        })
        .collect()
}
