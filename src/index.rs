//! Read-only lookup over validated ground truths and detections.
//!
//! The index is built once from the loaded annotations, validating every box
//! and category reference on the way in, and is then shared by reference with
//! the evaluator. Nothing mutates it after construction.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::error::{CocoAnalyzeError, Result};
use crate::types::{Annotation, Category, CocoDataset, Detection, GroundTruthBox, Image};

/// Validated ground truths and detections grouped by `(image_id, category_id)`.
#[derive(Debug, Clone)]
pub struct DatasetIndex {
    categories: BTreeMap<u64, Category>,
    images: Vec<Image>,
    image_ids: Vec<u64>,
    ground_truths: HashMap<(u64, u64), Vec<GroundTruthBox>>,
    detections: HashMap<(u64, u64), Vec<Detection>>,
    num_ground_truths: usize,
    num_detections: usize,
}

impl DatasetIndex {
    /// Build the index from a ground-truth dataset and detection results.
    ///
    /// When any detection lacks an `id`, every detection is renumbered from
    /// its position in `detections` (1-based), so assigned and explicit ids
    /// never mix. Input order is preserved inside every group so
    /// that score ties resolve the same way on every run.
    ///
    /// # Errors
    ///
    /// - `EmptyDataset` if the ground truth defines no categories
    /// - `InvalidBoundingBox` for malformed geometry
    /// - `UnknownCategory` for a category id missing from `categories`
    /// - `MissingField` / `InvalidAnnotation` for detections without a usable score
    /// - `InvalidAnnotation` for a detection id used twice
    pub fn new(ground_truth: &CocoDataset, detections: &[Annotation]) -> Result<Self> {
        if ground_truth.categories.is_empty() {
            return Err(CocoAnalyzeError::EmptyDataset(
                "Ground truth must define at least one category".to_string(),
            ));
        }
        let categories: BTreeMap<u64, Category> = ground_truth
            .categories
            .iter()
            .map(|c| (c.id, c.clone()))
            .collect();

        let mut image_ids: BTreeSet<u64> = ground_truth.images.iter().map(|i| i.id).collect();

        let mut gt_groups: HashMap<(u64, u64), Vec<GroundTruthBox>> = HashMap::new();
        for ann in &ground_truth.annotations {
            check_category(&categories, ann)?;
            let bbox = ann.to_bbox()?;
            image_ids.insert(ann.image_id);
            gt_groups
                .entry((ann.image_id, ann.category_id))
                .or_default()
                .push(GroundTruthBox {
                    id: ann.id,
                    image_id: ann.image_id,
                    category_id: ann.category_id,
                    bbox,
                    area: ann.effective_area(&bbox),
                    iscrowd: ann.iscrowd,
                });
        }

        let ids = detection_ids(detections)?;
        let mut dt_groups: HashMap<(u64, u64), Vec<Detection>> = HashMap::new();
        for (ann, id) in detections.iter().zip(ids) {
            check_category(&categories, ann)?;
            let bbox = ann.to_bbox()?;
            let score = detection_score(ann)?;
            image_ids.insert(ann.image_id);
            dt_groups
                .entry((ann.image_id, ann.category_id))
                .or_default()
                .push(Detection {
                    id,
                    image_id: ann.image_id,
                    category_id: ann.category_id,
                    bbox,
                    area: ann.effective_area(&bbox),
                    score,
                });
        }

        debug!(
            categories = categories.len(),
            images = image_ids.len(),
            ground_truths = ground_truth.annotations.len(),
            detections = detections.len(),
            "built dataset index"
        );

        Ok(Self {
            categories,
            images: ground_truth.images.clone(),
            image_ids: image_ids.into_iter().collect(),
            ground_truths: gt_groups,
            detections: dt_groups,
            num_ground_truths: ground_truth.annotations.len(),
            num_detections: detections.len(),
        })
    }

    /// Categories sorted by id.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    pub fn category(&self, category_id: u64) -> Option<&Category> {
        self.categories.get(&category_id)
    }

    /// Sorted category ids.
    pub fn category_ids(&self) -> Vec<u64> {
        self.categories.keys().copied().collect()
    }

    /// Images listed in the ground-truth file.
    pub fn images(&self) -> &[Image] {
        &self.images
    }

    /// Sorted ids of every image that is listed or referenced by an annotation.
    pub fn image_ids(&self) -> &[u64] {
        &self.image_ids
    }

    /// Ground truths of one image and category, in input order.
    pub fn ground_truths(&self, image_id: u64, category_id: u64) -> &[GroundTruthBox] {
        self.ground_truths
            .get(&(image_id, category_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Detections of one image and category, in input order.
    pub fn detections(&self, image_id: u64, category_id: u64) -> &[Detection] {
        self.detections
            .get(&(image_id, category_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every detection, grouped arbitrarily.
    pub fn all_detections(&self) -> impl Iterator<Item = &Detection> {
        self.detections.values().flatten()
    }

    /// Ground truths of `image_id` belonging to any category other than `category_id`.
    pub fn other_category_ground_truths(
        &self,
        image_id: u64,
        category_id: u64,
    ) -> impl Iterator<Item = &GroundTruthBox> {
        self.categories
            .keys()
            .filter(move |&&cat| cat != category_id)
            .flat_map(move |&cat| self.ground_truths(image_id, cat))
    }

    /// Detections of `image_id` belonging to any category other than `category_id`.
    pub fn other_category_detections(
        &self,
        image_id: u64,
        category_id: u64,
    ) -> impl Iterator<Item = &Detection> {
        self.categories
            .keys()
            .filter(move |&&cat| cat != category_id)
            .flat_map(move |&cat| self.detections(image_id, cat))
    }

    /// Whether the pair has anything to evaluate.
    pub fn has_annotations(&self, image_id: u64, category_id: u64) -> bool {
        !self.ground_truths(image_id, category_id).is_empty()
            || !self.detections(image_id, category_id).is_empty()
    }

    pub fn num_ground_truths(&self) -> usize {
        self.num_ground_truths
    }

    pub fn num_detections(&self) -> usize {
        self.num_detections
    }
}

/// Ids of `detections`: their own when all are set, positions otherwise.
pub(crate) fn detection_ids(detections: &[Annotation]) -> Result<Vec<u64>> {
    let renumber = detections.iter().any(|ann| ann.id == 0);
    let mut seen = HashSet::with_capacity(detections.len());
    detections
        .iter()
        .enumerate()
        .map(|(position, ann)| {
            let id = if renumber { position as u64 + 1 } else { ann.id };
            if seen.insert(id) {
                Ok(id)
            } else {
                Err(CocoAnalyzeError::InvalidAnnotation(format!(
                    "Detection id {} is used more than once (image {}, category {})",
                    id, ann.image_id, ann.category_id
                )))
            }
        })
        .collect()
}

fn check_category(categories: &BTreeMap<u64, Category>, ann: &Annotation) -> Result<()> {
    if categories.contains_key(&ann.category_id) {
        Ok(())
    } else {
        Err(CocoAnalyzeError::UnknownCategory {
            annotation_id: ann.id,
            image_id: ann.image_id,
            category_id: ann.category_id,
        })
    }
}

fn detection_score(ann: &Annotation) -> Result<f64> {
    match ann.score {
        Some(score) if score.is_finite() => Ok(score),
        Some(score) => Err(CocoAnalyzeError::InvalidAnnotation(format!(
            "Detection {} in image {} (category {}) has non-finite score {}",
            ann.id, ann.image_id, ann.category_id, score
        ))),
        None => Err(CocoAnalyzeError::MissingField(format!(
            "score for detection {} in image {} (category {})",
            ann.id, ann.image_id, ann.category_id
        ))),
    }
}
