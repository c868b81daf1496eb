//! Error types for the coco-analyze library.

use thiserror::Error;

/// Result type for coco-analyze operations.
pub type Result<T> = std::result::Result<T, CocoAnalyzeError>;

/// Error types that can occur while loading, evaluating or persisting results.
#[derive(Error, Debug)]
pub enum CocoAnalyzeError {
    /// Error during JSON parsing or serialization.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error during I/O operations.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid annotation data.
    #[error("Invalid annotation: {0}")]
    InvalidAnnotation(String),

    /// Malformed bounding box geometry.
    #[error(
        "Invalid bounding box for annotation {annotation_id} \
         (image {image_id}, category {category_id}): {reason}"
    )]
    InvalidBoundingBox {
        annotation_id: u64,
        image_id: u64,
        category_id: u64,
        reason: String,
    },

    /// An annotation references a category that the ground truth never defines.
    #[error(
        "Unknown category {category_id} referenced by annotation {annotation_id} in image {image_id}"
    )]
    UnknownCategory {
        annotation_id: u64,
        image_id: u64,
        category_id: u64,
    },

    /// Missing required field in COCO format.
    #[error("Missing field: {0}")]
    MissingField(String),

    /// Empty dataset provided.
    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    /// Evaluation parameters rejected at construction.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}
