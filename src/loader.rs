//! JSON loading utilities for COCO ground truth and detection results.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{CocoAnalyzeError, Result};
use crate::index::detection_ids;
use crate::types::{Annotation, CocoDataset};

/// Load a COCO ground-truth dataset from a JSON file.
///
/// # Arguments
///
/// * `path` - Path to the COCO JSON file
///
/// # Returns
///
/// Returns a `CocoDataset` containing images, annotations, and categories.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the dataset
/// fails validation.
///
/// # Example
///
/// ```no_run
/// use coco_analyze::loader::load_from_file;
///
/// let dataset = load_from_file("instances_val2017.json").unwrap();
/// println!("Loaded {} annotations", dataset.annotations.len());
/// ```
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<CocoDataset> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let dataset: CocoDataset = serde_json::from_reader(reader)?;

    validate_dataset(&dataset)?;
    info!(
        path = %path.display(),
        images = dataset.images.len(),
        annotations = dataset.annotations.len(),
        categories = dataset.categories.len(),
        "loaded ground truth"
    );

    Ok(dataset)
}

/// Load a COCO ground-truth dataset from a JSON string.
///
/// # Example
///
/// ```
/// use coco_analyze::loader::load_from_string;
///
/// let json = r#"{
///     "annotations": [],
///     "categories": [{"id": 1, "name": "person"}]
/// }"#;
/// let dataset = load_from_string(json).unwrap();
/// assert_eq!(dataset.categories.len(), 1);
/// ```
pub fn load_from_string(json_str: &str) -> Result<CocoDataset> {
    let dataset: CocoDataset = serde_json::from_str(json_str)?;
    validate_dataset(&dataset)?;
    Ok(dataset)
}

/// Detection results are usually a bare array, but a full dataset object
/// with an `annotations` array is accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum DetectionFile {
    Results(Vec<Annotation>),
    Dataset { annotations: Vec<Annotation> },
}

impl DetectionFile {
    fn into_annotations(self) -> Vec<Annotation> {
        match self {
            DetectionFile::Results(annotations) | DetectionFile::Dataset { annotations } => annotations,
        }
    }
}

/// Load detection results from a JSON file.
///
/// If any detection lacks an `id`, all detections are numbered by position
/// (starting at 1).
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, if a detection
/// has no score or a malformed box, or if two detections share an id.
pub fn load_detections_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<Annotation>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let file: DetectionFile = serde_json::from_reader(reader)?;
    let detections = prepare_detections(file.into_annotations())?;
    info!(path = %path.display(), detections = detections.len(), "loaded detections");
    Ok(detections)
}

/// Load detection results from a JSON string.
///
/// # Example
///
/// ```
/// use coco_analyze::loader::load_detections_from_str;
///
/// let json = r#"[
///     {"image_id": 1, "category_id": 1, "bbox": [0, 0, 10, 10], "score": 0.9},
///     {"image_id": 1, "category_id": 1, "bbox": [5, 5, 10, 10], "score": 0.4}
/// ]"#;
/// let detections = load_detections_from_str(json).unwrap();
/// assert_eq!(detections[1].id, 2);
/// ```
pub fn load_detections_from_str(json_str: &str) -> Result<Vec<Annotation>> {
    let file: DetectionFile = serde_json::from_str(json_str)?;
    prepare_detections(file.into_annotations())
}

fn prepare_detections(mut detections: Vec<Annotation>) -> Result<Vec<Annotation>> {
    let ids = detection_ids(&detections)?;
    for (detection, id) in detections.iter_mut().zip(ids) {
        detection.id = id;
        if detection.score.is_none() {
            return Err(CocoAnalyzeError::MissingField(format!(
                "score for detection {} in image {} (category {})",
                detection.id, detection.image_id, detection.category_id
            )));
        }
        detection.to_bbox()?;
    }
    Ok(detections)
}

/// Validate that a COCO dataset has the required structure.
fn validate_dataset(dataset: &CocoDataset) -> Result<()> {
    if dataset.categories.is_empty() {
        return Err(CocoAnalyzeError::EmptyDataset(
            "Dataset must contain at least one category".to_string(),
        ));
    }

    let mut category_ids = HashSet::new();
    for category in &dataset.categories {
        if !category_ids.insert(category.id) {
            return Err(CocoAnalyzeError::InvalidAnnotation(format!(
                "Category id {} is defined more than once",
                category.id
            )));
        }
    }

    for annotation in &dataset.annotations {
        annotation.to_bbox()?;
        if !category_ids.contains(&annotation.category_id) {
            return Err(CocoAnalyzeError::UnknownCategory {
                annotation_id: annotation.id,
                image_id: annotation.image_id,
                category_id: annotation.category_id,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_string() {
        let json = r#"{
            "annotations": [
                {
                    "id": 1,
                    "image_id": 1,
                    "category_id": 1,
                    "bbox": [10.0, 20.0, 30.0, 40.0]
                }
            ],
            "categories": [
                {
                    "id": 1,
                    "name": "person"
                }
            ]
        }"#;

        let dataset = load_from_string(json).unwrap();
        assert_eq!(dataset.annotations.len(), 1);
        assert_eq!(dataset.categories.len(), 1);
    }

    #[test]
    fn test_empty_categories() {
        let json = r#"{
            "annotations": [],
            "categories": []
        }"#;

        let result = load_from_string(json);
        assert!(matches!(result, Err(CocoAnalyzeError::EmptyDataset(_))));
    }

    #[test]
    fn test_invalid_bbox() {
        let json = r#"{
            "annotations": [
                {
                    "id": 1,
                    "image_id": 1,
                    "category_id": 1,
                    "bbox": [10.0, 20.0, 30.0]
                }
            ],
            "categories": [
                {
                    "id": 1,
                    "name": "person"
                }
            ]
        }"#;

        let result = load_from_string(json);
        assert!(matches!(result, Err(CocoAnalyzeError::InvalidBoundingBox { .. })));
    }

    #[test]
    fn test_duplicate_category_ids() {
        let json = r#"{
            "categories": [{"id": 1, "name": "a"}, {"id": 1, "name": "b"}]
        }"#;
        assert!(load_from_string(json).is_err());
    }

    #[test]
    fn test_detections_from_dataset_object() {
        let json = r#"{
            "annotations": [
                {"id": 7, "image_id": 1, "category_id": 1, "bbox": [0, 0, 1, 1], "score": 0.5}
            ]
        }"#;
        let detections = load_detections_from_str(json).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].id, 7);
    }

    #[test]
    fn test_detection_without_score() {
        let json = r#"[{"image_id": 1, "category_id": 1, "bbox": [0, 0, 1, 1]}]"#;
        assert!(matches!(
            load_detections_from_str(json),
            Err(CocoAnalyzeError::MissingField(_))
        ));
    }

    #[test]
    fn test_mixed_detection_ids_are_renumbered() {
        let json = r#"[
            {"id": 2, "image_id": 1, "category_id": 1, "bbox": [0, 0, 1, 1], "score": 0.9},
            {"image_id": 1, "category_id": 1, "bbox": [0, 0, 1, 1], "score": 0.8}
        ]"#;
        let ids: Vec<u64> = load_detections_from_str(json).unwrap().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_duplicate_detection_ids() {
        let json = r#"[
            {"id": 3, "image_id": 1, "category_id": 1, "bbox": [0, 0, 1, 1], "score": 0.9},
            {"id": 3, "image_id": 2, "category_id": 1, "bbox": [0, 0, 1, 1], "score": 0.8}
        ]"#;
        assert!(matches!(
            load_detections_from_str(json),
            Err(CocoAnalyzeError::InvalidAnnotation(_))
        ));
    }
}
