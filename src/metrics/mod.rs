//! Metric primitives: box overlap, precision/recall curves and AP.

pub mod iou;
pub mod ap;
pub mod precision_recall;

pub use iou::{calculate_iou, calculate_iou_matrix};
pub use ap::{calculate_ap, calculate_map};
pub use precision_recall::{
    calculate_precision_recall, cumulative_precision, cumulative_recall, interpolate_precision,
    precision_envelope, PrecisionRecall,
};
