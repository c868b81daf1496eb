//! # coco-analyze
//!
//! A Rust library for matching object detections against COCO ground truth
//! and analyzing where a detector loses precision.
//!
//! The library runs in two stages:
//! - **Evaluation**: every (category, area bin, IoU threshold, image)
//!   combination is an independent greedy matching pass producing a
//!   [`PerImageEvalRecord`] that lists each detection as TP, FP or ignored.
//! - **Analysis**: records are pooled into precision/recall curves, AP and a
//!   breakdown of false positives (localization, duplicate, class confusion,
//!   background).
//!
//! ## Features
//!
//! - Load COCO ground truth and detection results from JSON
//! - IoU on continuous coordinates
//! - Area-range filtering with crowd regions as ignore zones
//! - Interpolated AP over configurable recall breakpoints
//! - Localization error rate and per-error-kind AP impact
//! - Reasons for every missed ground truth
//! - Middle file persistence so analysis can be rerun without matching
//!
//! ## Quick Start
//!
//! ```rust
//! use coco_analyze::{evaluate_and_analyze, load_detections_from_str, load_from_string};
//! use coco_analyze::{CategoryKey, EvaluationParameters};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ground_truth = load_from_string(r#"{
//!     "annotations": [{"id": 1, "image_id": 1, "category_id": 1, "bbox": [0, 0, 10, 10]}],
//!     "categories": [{"id": 1, "name": "person"}]
//! }"#)?;
//! let detections = load_detections_from_str(
//!     r#"[{"image_id": 1, "category_id": 1, "bbox": [20, 20, 10, 10], "score": 0.8}]"#,
//! )?;
//!
//! let params = EvaluationParameters::default();
//! let (records, summary) = evaluate_and_analyze(&ground_truth, &detections, &params)?;
//!
//! let person = &summary.results[&CategoryKey::Category(1)];
//! assert_eq!(person.ap, Some(0.0));
//! assert_eq!(person.localization_error_rate, Some(0.0));
//! assert_eq!(records[0].num_fn, 1);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod types;
pub mod params;
pub mod loader;
pub mod metrics;
pub mod index;
pub mod matching;
pub mod evaluator;
pub mod analyzer;
pub mod report;
pub mod pipeline;

// Re-export commonly used types and functions
pub use error::{CocoAnalyzeError, Result};
pub use types::{
    Annotation, BoundingBox, Category, CocoDataset, FalsePositiveKind, Image, MatchOutcome,
    MissKind, PerImageEvalRecord,
};
pub use params::{AreaRange, EvaluationParameters};
pub use loader::{load_detections_from_file, load_detections_from_str, load_from_file, load_from_string};
pub use index::DatasetIndex;
pub use evaluator::{iou_per_single_gt, Evaluator};
pub use analyzer::{
    analyze, AnalysisSummary, CategoryKey, CategorySummary, FalsePositiveBreakdown,
    MissedGroundTruthBreakdown,
};
pub use report::{dump_final_results_json, dump_middle_file_json, load_middle_file};
pub use pipeline::evaluate_and_analyze;
