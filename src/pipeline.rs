//! End-to-end run: index, evaluate, analyze.

use tracing::info;

use crate::analyzer::{analyze, AnalysisSummary};
use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::index::DatasetIndex;
use crate::params::EvaluationParameters;
use crate::types::{Annotation, CocoDataset, PerImageEvalRecord};

/// Match `detections` against `ground_truth` and analyze the result.
///
/// Returns the per-image records (for the middle file) and the summary.
///
/// # Example
///
/// ```
/// use coco_analyze::{evaluate_and_analyze, load_detections_from_str, load_from_string};
/// use coco_analyze::{CategoryKey, EvaluationParameters};
///
/// let gt = load_from_string(r#"{
///     "annotations": [{"id": 1, "image_id": 1, "category_id": 1, "bbox": [0, 0, 10, 10]}],
///     "categories": [{"id": 1, "name": "person"}]
/// }"#).unwrap();
/// let dts = load_detections_from_str(
///     r#"[{"image_id": 1, "category_id": 1, "bbox": [0, 0, 10, 10], "score": 0.9}]"#,
/// ).unwrap();
///
/// let (_, summary) = evaluate_and_analyze(&gt, &dts, &EvaluationParameters::default()).unwrap();
/// assert_eq!(summary.results[&CategoryKey::Category(1)].ap, Some(1.0));
/// ```
pub fn evaluate_and_analyze(
    ground_truth: &CocoDataset,
    detections: &[Annotation],
    params: &EvaluationParameters,
) -> Result<(Vec<PerImageEvalRecord>, AnalysisSummary)> {
    let index = DatasetIndex::new(ground_truth, detections)?;
    info!(
        ground_truths = index.num_ground_truths(),
        detections = index.num_detections(),
        "starting evaluation"
    );

    let records = Evaluator::new(&index, params).eval();
    let categories: Vec<_> = index.categories().cloned().collect();
    let summary = analyze(&records, &categories, params);

    info!(mean_ap = ?summary.mean_ap, "analysis complete");
    Ok((records, summary))
}
