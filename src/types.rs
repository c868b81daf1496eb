//! Core data types for COCO annotations and per-image evaluation records.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CocoAnalyzeError, Result};

/// Represents a bounding box in COCO format (x, y, width, height).
///
/// Coordinates are in LTWH (Left-Top-Width-Height) format where:
/// - x: Left coordinate
/// - y: Top coordinate
/// - width: Box width
/// - height: Box height
///
/// Serialized as the plain `[x, y, width, height]` array used by COCO files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Get the area of the bounding box.
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Get the right coordinate (x + width).
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Get the bottom coordinate (y + height).
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Check if the bounding box is well formed: finite coordinates and
    /// non-negative extent. Zero-area boxes are valid.
    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width >= 0.0
            && self.height >= 0.0
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

/// Represents a category in the COCO dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supercategory: Option<String>,
}

/// Represents an image in the COCO dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: u64,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub width: u32,
}

/// Represents an annotation in COCO format.
///
/// Ground-truth files and detection result files share this shape; only
/// detections carry a `score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    /// Bounding box in [x, y, width, height] format
    pub bbox: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_iscrowd")]
    pub iscrowd: bool,
    /// Confidence score (for predictions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

fn deserialize_iscrowd<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IsCrowd {
        Bool(bool),
        Int(u8),
    }
    match IsCrowd::deserialize(deserializer)? {
        IsCrowd::Bool(b) => Ok(b),
        IsCrowd::Int(i) => Ok(i != 0),
    }
}

impl Annotation {
    /// Convert the bbox array to a validated `BoundingBox`.
    ///
    /// Fails with the annotation's image and category in the error so the
    /// offending entry can be located in the input file.
    pub fn to_bbox(&self) -> Result<BoundingBox> {
        if self.bbox.len() != 4 {
            return Err(self.invalid_bbox(format!(
                "expected 4 values, got {}",
                self.bbox.len()
            )));
        }
        let bbox = BoundingBox::new(self.bbox[0], self.bbox[1], self.bbox[2], self.bbox[3]);
        if bbox.width < 0.0 || bbox.height < 0.0 {
            return Err(self.invalid_bbox(format!(
                "negative dimensions {}x{}",
                bbox.width, bbox.height
            )));
        }
        if !bbox.is_valid() {
            return Err(self.invalid_bbox("non-finite coordinates".to_string()));
        }
        Ok(bbox)
    }

    /// Area used for area-range filtering: the explicit `area` field when
    /// present, otherwise the box area.
    pub fn effective_area(&self, bbox: &BoundingBox) -> f64 {
        self.area.unwrap_or_else(|| bbox.area())
    }

    fn invalid_bbox(&self, reason: String) -> CocoAnalyzeError {
        CocoAnalyzeError::InvalidBoundingBox {
            annotation_id: self.id,
            image_id: self.image_id,
            category_id: self.category_id,
            reason,
        }
    }
}

/// Represents a complete COCO dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocoDataset {
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

/// A validated ground-truth box.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruthBox {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    pub bbox: BoundingBox,
    pub area: f64,
    pub iscrowd: bool,
}

/// A validated detection with its confidence score.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    pub bbox: BoundingBox,
    pub area: f64,
    pub score: f64,
}

/// Outcome of one detection in a matching pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOutcome {
    /// Matched an unused ground truth at or above the acceptance threshold.
    Tp,
    /// No acceptable match.
    Fp,
    /// Outside the active area bin, or matched to an ignored ground truth.
    Ignore,
}

/// Why a false positive failed to match.
///
/// Variants are listed in classification priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FalsePositiveKind {
    /// Overlaps an unused ground truth, but only in `[iou_loc, iou_thresh)`.
    Localization,
    /// Would have matched a ground truth already taken by a higher-scoring detection.
    Duplicate,
    /// Overlaps a ground truth of another category at or above the threshold.
    ClassConfusion,
    /// Overlaps nothing meaningfully.
    Background,
}

impl FalsePositiveKind {
    pub const ALL: [FalsePositiveKind; 4] = [
        FalsePositiveKind::Localization,
        FalsePositiveKind::Duplicate,
        FalsePositiveKind::ClassConfusion,
        FalsePositiveKind::Background,
    ];
}

/// Outcome of one ground truth in a matching pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroundTruthOutcome {
    Matched,
    Missed,
    Ignore,
}

/// Why a ground truth was missed, in classification priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissKind {
    /// A same-category detection overlapped it at the threshold but was
    /// matched to another ground truth first.
    LostToOther,
    /// A detection of another category overlapped it at the threshold.
    ClassConfusion,
    /// A same-category detection overlapped it only in `[iou_loc, iou_thresh)`.
    Localization,
    /// Nothing overlapped it meaningfully.
    Missed,
}

impl MissKind {
    pub const ALL: [MissKind; 4] = [
        MissKind::LostToOther,
        MissKind::ClassConfusion,
        MissKind::Localization,
        MissKind::Missed,
    ];
}

/// One detection as it came out of a matching pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedDetection {
    pub id: u64,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub score: f64,
    #[serde(rename = "match")]
    pub outcome: MatchOutcome,
    /// Highest IoU against a ground truth that was still available at this rank.
    pub best_iou: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_gt_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FalsePositiveKind>,
}

/// One ground truth as it came out of a matching pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedGroundTruth {
    pub id: u64,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub outcome: GroundTruthOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_dt_id: Option<u64>,
    /// Set for missed ground truths only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MissKind>,
}

/// Result of matching one (image, category, area bin, IoU threshold) combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerImageEvalRecord {
    pub image_id: u64,
    pub category_id: u64,
    pub area_bin: String,
    pub iou_thresh: f64,
    /// Sorted by descending score.
    pub detections: Vec<EvaluatedDetection>,
    /// Input order.
    #[serde(default)]
    pub ground_truths: Vec<EvaluatedGroundTruth>,
    /// Non-ignored ground truths.
    pub num_gt: usize,
    pub num_fn: usize,
}

impl PerImageEvalRecord {
    pub fn num_tp(&self) -> usize {
        self.count_outcome(MatchOutcome::Tp)
    }

    pub fn num_fp(&self) -> usize {
        self.count_outcome(MatchOutcome::Fp)
    }

    pub fn num_ignored(&self) -> usize {
        self.count_outcome(MatchOutcome::Ignore)
    }

    fn count_outcome(&self, outcome: MatchOutcome) -> usize {
        self.detections
            .iter()
            .filter(|d| d.outcome == outcome)
            .count()
    }
}
