//! Per-image evaluation: turns the index into match records.
//!
//! Every (category, area bin, IoU threshold, image) combination is one
//! independent matching pass producing a [`PerImageEvalRecord`]. Passes share
//! only read-only state, so [`Evaluator::eval`] distributes them over rayon.

use std::cmp::Ordering;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::index::DatasetIndex;
use crate::matching::{
    classify_false_positive, classify_missed_ground_truth, match_pass, GtUsage, Match,
    MissOverlaps, PassInput,
};
use crate::metrics::iou::{calculate_iou, calculate_iou_matrix};
use crate::params::{AreaRange, EvaluationParameters};
use crate::types::{
    BoundingBox, Detection, EvaluatedDetection, EvaluatedGroundTruth, GroundTruthBox,
    GroundTruthOutcome, MatchOutcome, MissKind, PerImageEvalRecord,
};

/// Matches detections to ground truths over a [`DatasetIndex`].
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    index: &'a DatasetIndex,
    params: &'a EvaluationParameters,
}

impl<'a> Evaluator<'a> {
    pub fn new(index: &'a DatasetIndex, params: &'a EvaluationParameters) -> Self {
        Self { index, params }
    }

    pub fn index(&self) -> &'a DatasetIndex {
        self.index
    }

    pub fn params(&self) -> &'a EvaluationParameters {
        self.params
    }

    /// Evaluate one image and category for one area bin and IoU threshold.
    ///
    /// Detections below the score threshold are dropped. Detections and
    /// ground truths outside `area` (and every crowd ground truth) are kept
    /// in the record but marked ignored.
    ///
    /// # Example
    ///
    /// ```
    /// use coco_analyze::{load_from_string, DatasetIndex, EvaluationParameters, Evaluator};
    /// use coco_analyze::types::MatchOutcome;
    ///
    /// let gt = load_from_string(r#"{
    ///     "annotations": [{"id": 1, "image_id": 1, "category_id": 1, "bbox": [0, 0, 10, 10]}],
    ///     "categories": [{"id": 1, "name": "person"}]
    /// }"#).unwrap();
    /// let dts = coco_analyze::load_detections_from_str(
    ///     r#"[{"image_id": 1, "category_id": 1, "bbox": [0, 0, 10, 10], "score": 0.9}]"#,
    /// ).unwrap();
    ///
    /// let index = DatasetIndex::new(&gt, &dts).unwrap();
    /// let params = EvaluationParameters::default();
    /// let evaluator = Evaluator::new(&index, &params);
    /// let record = evaluator.eval_per_img(1, 1, params.primary_area(), 0.5);
    /// assert_eq!(record.detections[0].outcome, MatchOutcome::Tp);
    /// assert_eq!(record.num_fn, 0);
    /// ```
    pub fn eval_per_img(
        &self,
        image_id: u64,
        category_id: u64,
        area: &AreaRange,
        iou_thresh: f64,
    ) -> PerImageEvalRecord {
        let gts = self.index.ground_truths(image_id, category_id);
        let dts = self.ranked_detections(image_id, category_id);

        let gt_ignore: Vec<bool> = gts
            .iter()
            .map(|gt| gt.iscrowd || !area.contains(gt.area))
            .collect();
        let dt_ignore: Vec<bool> = dts.iter().map(|dt| !area.contains(dt.area)).collect();

        let gt_boxes: Vec<BoundingBox> = gts.iter().map(|gt| gt.bbox).collect();
        let dt_boxes: Vec<BoundingBox> = dts.iter().map(|dt| dt.bbox).collect();
        let ious = calculate_iou_matrix(&dt_boxes, &gt_boxes);

        let (matches, usage) = match_pass(
            PassInput {
                ious: &ious,
                dt_ignore: &dt_ignore,
                gt_ignore: &gt_ignore,
                iou_thresh,
            },
            GtUsage::new(gts.len()),
        );

        let mut matched_dt: Vec<Option<u64>> = vec![None; gts.len()];
        let detections: Vec<EvaluatedDetection> = dts
            .iter()
            .zip(&matches)
            .map(|(dt, m)| {
                let matched_gt_id = m.gt_index.map(|g| gts[g].id);
                if m.outcome == MatchOutcome::Tp {
                    if let Some(g) = m.gt_index {
                        matched_dt[g] = Some(dt.id);
                    }
                }
                let error = (m.outcome == MatchOutcome::Fp).then(|| {
                    let cross = self.cross_category_iou(dt);
                    classify_false_positive(m, cross, iou_thresh, self.params.iou_loc())
                });
                EvaluatedDetection {
                    id: dt.id,
                    bbox: dt.bbox,
                    score: dt.score,
                    outcome: m.outcome,
                    best_iou: m.best_iou,
                    matched_gt_id,
                    error,
                }
            })
            .collect();

        let ground_truths: Vec<EvaluatedGroundTruth> = gts
            .iter()
            .enumerate()
            .map(|(g, gt)| {
                let (outcome, error) = if gt_ignore[g] {
                    (GroundTruthOutcome::Ignore, None)
                } else if usage.is_used(g) {
                    (GroundTruthOutcome::Matched, None)
                } else {
                    let kind = self.classify_miss(gt, g, &ious, &matches, iou_thresh);
                    (GroundTruthOutcome::Missed, Some(kind))
                };
                EvaluatedGroundTruth {
                    id: gt.id,
                    bbox: gt.bbox,
                    outcome,
                    matched_dt_id: matched_dt[g],
                    error,
                }
            })
            .collect();

        let num_gt = gt_ignore.iter().filter(|&&ignored| !ignored).count();
        PerImageEvalRecord {
            image_id,
            category_id,
            area_bin: area.label.clone(),
            iou_thresh,
            detections,
            ground_truths,
            num_gt,
            num_fn: num_gt - usage.count(),
        }
    }

    /// Evaluate every category, area bin, IoU threshold and image.
    ///
    /// Image/category pairs without any annotation are skipped. Records come
    /// back ordered by category, area bin, threshold, then image, regardless
    /// of how rayon schedules the passes.
    pub fn eval(&self) -> Vec<PerImageEvalRecord> {
        let score_thresh = self.params.score_thresh();
        let dropped = self
            .index
            .all_detections()
            .filter(|dt| dt.score < score_thresh)
            .count();
        if dropped > 0 {
            warn!(dropped, score_thresh, "detections below score threshold are discarded");
        }

        let index = self.index;
        let category_ids = index.category_ids();
        let mut jobs = Vec::new();
        for &cat in &category_ids {
            let images: Vec<u64> = index
                .image_ids()
                .iter()
                .copied()
                .filter(|&img| index.has_annotations(img, cat))
                .collect();
            for area in self.params.area_rng() {
                for &iou_thresh in self.params.iou_thresh() {
                    jobs.extend(images.iter().map(|&img| (img, cat, area, iou_thresh)));
                }
            }
        }

        info!(
            categories = category_ids.len(),
            images = index.image_ids().len(),
            passes = jobs.len(),
            "running matching passes"
        );

        let records: Vec<PerImageEvalRecord> = jobs
            .par_iter()
            .map(|&(img, cat, area, iou_thresh)| self.eval_per_img(img, cat, area, iou_thresh))
            .collect();

        info!(records = records.len(), "evaluation complete");
        records
    }

    /// Detections of one pair above the score threshold, highest score first.
    /// The sort is stable, so equal scores keep input order.
    fn ranked_detections(&self, image_id: u64, category_id: u64) -> Vec<&'a Detection> {
        let score_thresh = self.params.score_thresh();
        let mut dts: Vec<&Detection> = self
            .index
            .detections(image_id, category_id)
            .iter()
            .filter(|dt| dt.score >= score_thresh)
            .collect();
        dts.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        dts
    }

    /// Why ground truth `g` of this pass went unmatched.
    fn classify_miss(
        &self,
        gt: &GroundTruthBox,
        g: usize,
        ious: &[Vec<f64>],
        matches: &[Match],
        iou_thresh: f64,
    ) -> MissKind {
        let column = || ious.iter().map(move |row| row[g]);
        let matched_elsewhere_iou = column()
            .zip(matches)
            .filter(|(_, m)| m.outcome == MatchOutcome::Tp)
            .map(|(iou, _)| iou)
            .fold(0.0, f64::max);
        let near_iou = column().filter(|&iou| iou < iou_thresh).fold(0.0, f64::max);
        let score_thresh = self.params.score_thresh();
        let cross_category_iou = self
            .index
            .other_category_detections(gt.image_id, gt.category_id)
            .filter(|dt| dt.score >= score_thresh)
            .map(|dt| calculate_iou(&gt.bbox, &dt.bbox))
            .fold(0.0, f64::max);

        classify_missed_ground_truth(
            MissOverlaps {
                matched_elsewhere_iou,
                cross_category_iou,
                near_iou,
            },
            iou_thresh,
            self.params.iou_loc(),
        )
    }

    fn cross_category_iou(&self, dt: &Detection) -> f64 {
        self.index
            .other_category_ground_truths(dt.image_id, dt.category_id)
            .filter(|gt| !gt.iscrowd)
            .map(|gt| calculate_iou(&dt.bbox, &gt.bbox))
            .fold(0.0, f64::max)
    }
}

/// IoU of one ground truth against each detection, in input order.
pub fn iou_per_single_gt(ground_truth: &BoundingBox, detections: &[Detection]) -> Vec<f64> {
    detections
        .iter()
        .map(|dt| calculate_iou(ground_truth, &dt.bbox))
        .collect()
}
