//! Error handling and validation tests.

use coco_analyze::error::CocoAnalyzeError;
use coco_analyze::index::DatasetIndex;
use coco_analyze::loader::{load_detections_from_str, load_from_file, load_from_string};
use coco_analyze::params::{AreaRange, EvaluationParameters, AREA_MAX};
use coco_analyze::pipeline::evaluate_and_analyze;
use coco_analyze::report::load_middle_file;
use coco_analyze::types::{Annotation, Category, CocoDataset};

fn create_annotation(
    id: u64,
    image_id: u64,
    category_id: u64,
    bbox: Vec<f64>,
    score: Option<f64>,
) -> Annotation {
    Annotation {
        id,
        image_id,
        category_id,
        bbox,
        area: None,
        iscrowd: false,
        score,
    }
}

fn create_category(id: u64, name: &str) -> Category {
    Category {
        id,
        name: name.to_string(),
        supercategory: None,
    }
}

fn dataset(annotations: Vec<Annotation>, categories: Vec<Category>) -> CocoDataset {
    CocoDataset {
        images: vec![],
        annotations,
        categories,
    }
}

fn default_bins() -> Vec<AreaRange> {
    vec![AreaRange::new("all", 0.0, AREA_MAX)]
}

fn breakpoints() -> Vec<f64> {
    vec![0.0, 0.5, 1.0]
}

// ============================================================================
// LOADER ERROR TESTS
// ============================================================================

#[test]
fn test_invalid_json() {
    let result = load_from_string("{ invalid json");
    assert!(matches!(result, Err(CocoAnalyzeError::JsonError(_))));
}

#[test]
fn test_empty_categories_error() {
    let json = r#"{
        "annotations": [],
        "categories": []
    }"#;

    let result = load_from_string(json);
    assert!(
        matches!(result, Err(CocoAnalyzeError::EmptyDataset(_))),
        "Expected EmptyDataset error"
    );
}

#[test]
fn test_missing_file() {
    let result = load_from_file("/path/that/does/not/exist.json");
    assert!(matches!(result, Err(CocoAnalyzeError::IoError(_))));
}

#[test]
fn test_missing_middle_file() {
    let result = load_middle_file("/path/that/does/not/exist/middle.json");
    assert!(matches!(result, Err(CocoAnalyzeError::IoError(_))));
}

fn write_middle_file(name: &str, record: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("coco_analyze_err_{}_{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("middle.json");
    let json = format!(
        r#"{{"params": {{}}, "categories": [{{"id": 1, "name": "person"}}], "records": [{record}]}}"#
    );
    std::fs::write(&path, json).unwrap();
    path
}

#[test]
fn test_middle_file_with_more_matches_than_ground_truths() {
    let path = write_middle_file(
        "tp_over_gt",
        r#"{"image_id": 7, "category_id": 1, "area_bin": "all", "iou_thresh": 0.5,
            "detections": [{"id": 1, "box": [0, 0, 10, 10], "score": 0.9, "match": "tp", "best_iou": 1.0}],
            "num_gt": 0, "num_fn": 0}"#,
    );
    let err = load_middle_file(&path).unwrap_err();
    match err {
        CocoAnalyzeError::InvalidAnnotation(msg) => {
            assert!(msg.contains("image 7"), "got {msg}");
            assert!(msg.contains("category 1"), "got {msg}");
        }
        other => panic!("expected InvalidAnnotation, got {other:?}"),
    }
    std::fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[test]
fn test_middle_file_with_inconsistent_false_negatives() {
    let path = write_middle_file(
        "bad_fn",
        r#"{"image_id": 3, "category_id": 1, "area_bin": "all", "iou_thresh": 0.5,
            "detections": [], "num_gt": 2, "num_fn": 1}"#,
    );
    assert!(matches!(load_middle_file(&path), Err(CocoAnalyzeError::InvalidAnnotation(_))));
    std::fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[test]
fn test_unknown_category_in_ground_truth() {
    let json = r#"{
        "annotations": [{"id": 4, "image_id": 2, "category_id": 9, "bbox": [0, 0, 1, 1]}],
        "categories": [{"id": 1, "name": "person"}]
    }"#;
    match load_from_string(json) {
        Err(CocoAnalyzeError::UnknownCategory { annotation_id, image_id, category_id }) => {
            assert_eq!((annotation_id, image_id, category_id), (4, 2, 9));
        }
        other => panic!("Expected UnknownCategory, got {other:?}"),
    }
}

// ============================================================================
// DATA VALIDATION TESTS
// ============================================================================

#[test]
fn test_negative_bbox_dimensions() {
    let gt = dataset(
        vec![create_annotation(3, 5, 1, vec![10.0, 20.0, -30.0, 40.0], None)],
        vec![create_category(1, "person")],
    );

    match DatasetIndex::new(&gt, &[]) {
        Err(CocoAnalyzeError::InvalidBoundingBox { annotation_id, image_id, category_id, reason }) => {
            assert_eq!((annotation_id, image_id, category_id), (3, 5, 1));
            assert!(reason.contains("negative"));
        }
        other => panic!("Expected InvalidBoundingBox, got {other:?}"),
    }
}

#[test]
fn test_non_finite_detection_box() {
    let gt = dataset(vec![], vec![create_category(1, "person")]);
    let dts = vec![create_annotation(1, 1, 1, vec![f64::NAN, 0.0, 1.0, 1.0], Some(0.5))];
    let result = DatasetIndex::new(&gt, &dts);
    assert!(matches!(result, Err(CocoAnalyzeError::InvalidBoundingBox { .. })));
}

#[test]
fn test_invalid_detection_bbox_length() {
    let json = r#"[{"image_id": 1, "category_id": 1, "bbox": [0, 0, 1], "score": 0.5}]"#;
    let result = load_detections_from_str(json);
    assert!(matches!(result, Err(CocoAnalyzeError::InvalidBoundingBox { .. })));
}

#[test]
fn test_detection_with_undefined_category() {
    let gt = dataset(
        vec![create_annotation(1, 1, 1, vec![0.0, 0.0, 10.0, 10.0], None)],
        vec![create_category(1, "person")],
    );
    let dts = vec![create_annotation(8, 1, 5, vec![0.0, 0.0, 10.0, 10.0], Some(0.9))];
    let result = evaluate_and_analyze(&gt, &dts, &EvaluationParameters::default());
    assert!(matches!(
        result,
        Err(CocoAnalyzeError::UnknownCategory { annotation_id: 8, image_id: 1, category_id: 5 })
    ));
}

#[test]
fn test_detection_with_non_finite_score() {
    let gt = dataset(vec![], vec![create_category(1, "person")]);
    let dts = vec![create_annotation(1, 1, 1, vec![0.0, 0.0, 1.0, 1.0], Some(f64::INFINITY))];
    let result = DatasetIndex::new(&gt, &dts);
    assert!(matches!(result, Err(CocoAnalyzeError::InvalidAnnotation(_))));
}

#[test]
fn test_evaluation_with_no_categories() {
    let gt = dataset(vec![], vec![]);
    let result = evaluate_and_analyze(&gt, &[], &EvaluationParameters::default());
    assert!(matches!(result, Err(CocoAnalyzeError::EmptyDataset(_))));
}

// ============================================================================
// PARAMETER ERROR TESTS
// ============================================================================

#[test]
fn test_threshold_out_of_range() {
    for bad in [0.0, 1.5, -0.1, f64::NAN] {
        let result = EvaluationParameters::new(vec![bad], 0.1, default_bins(), breakpoints());
        assert!(
            matches!(result, Err(CocoAnalyzeError::InvalidParameters(_))),
            "threshold {bad} should be rejected"
        );
    }
}

#[test]
fn test_duplicate_thresholds_rejected() {
    let result = EvaluationParameters::new(vec![0.5, 0.75, 0.5], 0.1, default_bins(), breakpoints());
    assert!(matches!(result, Err(CocoAnalyzeError::InvalidParameters(_))));

    let result = EvaluationParameters::from_json_str(r#"{"iou_thresh": [0.5, 0.5]}"#);
    assert!(matches!(result, Err(CocoAnalyzeError::InvalidParameters(_))));
}

#[test]
fn test_iou_loc_must_be_positive_and_below_threshold() {
    for bad in [0.0, -0.2, 0.5, 0.6] {
        let result = EvaluationParameters::new(vec![0.5, 0.75], bad, default_bins(), breakpoints());
        assert!(result.is_err(), "iou_loc {bad} should be rejected");
    }
    assert!(EvaluationParameters::new(vec![0.5, 0.75], 0.49, default_bins(), breakpoints()).is_ok());
}

#[test]
fn test_inverted_area_range() {
    let result = EvaluationParameters::new(
        vec![0.5],
        0.2,
        vec![AreaRange::new("broken", 100.0, 10.0)],
        breakpoints(),
    );
    assert!(matches!(result, Err(CocoAnalyzeError::InvalidParameters(_))));
}

#[test]
fn test_recall_breakpoints_out_of_range() {
    let result = EvaluationParameters::new(vec![0.5], 0.2, default_bins(), vec![0.0, 1.2]);
    assert!(result.is_err());
}

#[test]
fn test_mismatched_area_labels() {
    let result = EvaluationParameters::from_json_str(
        r#"{"area_rng": [[0, 10], [10, 20]], "area_rng_lbl": ["only_one"]}"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_unknown_parameter_key() {
    let result = EvaluationParameters::from_json_str(r#"{"iou_threshold": 0.5}"#);
    assert!(result.is_err(), "misspelled keys should not be silently ignored");
}

#[test]
fn test_non_finite_score_threshold() {
    let result = EvaluationParameters::default().with_score_thresh(f64::NAN);
    assert!(result.is_err());
}

// ============================================================================
// ROBUSTNESS TESTS
// ============================================================================

#[test]
fn test_very_large_bounding_boxes() {
    let gt = dataset(
        vec![create_annotation(1, 1, 1, vec![0.0, 0.0, 1e6, 1e6], None)],
        vec![create_category(1, "huge")],
    );
    let dts = vec![create_annotation(1, 1, 1, vec![0.0, 0.0, 1e6, 1e6], Some(0.9))];
    let result = evaluate_and_analyze(&gt, &dts, &EvaluationParameters::default());
    assert!(result.is_ok(), "Should handle very large boxes");
}

#[test]
fn test_negative_coordinates() {
    let gt = dataset(
        vec![create_annotation(1, 1, 1, vec![-10.0, -10.0, 50.0, 50.0], None)],
        vec![create_category(1, "negative")],
    );
    let dts = vec![create_annotation(1, 1, 1, vec![-10.0, -10.0, 50.0, 50.0], Some(0.9))];
    let (records, _) = evaluate_and_analyze(&gt, &dts, &EvaluationParameters::default()).unwrap();
    assert_eq!(records[0].num_tp(), 1, "Negative origins are legal");
}

#[test]
fn test_floating_point_precision() {
    let bbox = vec![
        std::f64::consts::PI,
        std::f64::consts::E,
        std::f64::consts::SQRT_2,
        std::f64::consts::LN_2,
    ];
    let gt = dataset(
        vec![create_annotation(1, 1, 1, bbox.clone(), None)],
        vec![create_category(1, "math")],
    );
    let dts = vec![create_annotation(1, 1, 1, bbox, Some(0.9))];

    let (records, _) = evaluate_and_analyze(&gt, &dts, &EvaluationParameters::default()).unwrap();
    assert!((records[0].detections[0].best_iou - 1.0).abs() < 1e-9);
}

#[test]
fn test_unicode_category_names() {
    let gt = dataset(
        vec![create_annotation(1, 1, 1, vec![10.0, 10.0, 50.0, 50.0], None)],
        vec![create_category(1, "人 🚗 مركبة")],
    );
    let (_, summary) = evaluate_and_analyze(&gt, &[], &EvaluationParameters::default()).unwrap();
    let json = serde_json::to_string(&summary).unwrap();
    assert!(json.contains("人 🚗 مركبة"));
}

#[test]
fn test_extra_fields_ignored() {
    let json = r#"{
        "annotations": [
            {
                "id": 1,
                "image_id": 1,
                "category_id": 1,
                "bbox": [10.0, 20.0, 30.0, 40.0],
                "segmentation": [[1, 2, 3, 4]],
                "another_field": 123
            }
        ],
        "categories": [
            {
                "id": 1,
                "name": "person",
                "extra": "also ignored"
            }
        ],
        "info": {"year": 2017}
    }"#;

    let result = load_from_string(json);
    assert!(result.is_ok(), "Should ignore extra fields");
}
