//! Precision and recall, as scalars and as cumulative curves over a ranking.

use serde::{Deserialize, Serialize};

/// Precision and recall for a set of counts.
///
/// A ratio whose denominator is zero is undefined and reported as `None`
/// rather than 0: "no detections" is not the same as "no correct detections".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionRecall {
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

/// Calculate precision and recall from TP, FP, and FN counts.
///
/// # Example
///
/// ```
/// use coco_analyze::metrics::precision_recall::calculate_precision_recall;
///
/// let pr = calculate_precision_recall(8, 2, 3);
/// assert_eq!(pr.precision, Some(0.8));
/// assert!((pr.recall.unwrap() - 8.0 / 11.0).abs() < 1e-12);
///
/// let empty = calculate_precision_recall(0, 0, 0);
/// assert_eq!(empty.precision, None);
/// ```
pub fn calculate_precision_recall(
    true_positives: usize,
    false_positives: usize,
    false_negatives: usize,
) -> PrecisionRecall {
    PrecisionRecall {
        precision: ratio(true_positives, true_positives + false_positives),
        recall: ratio(true_positives, true_positives + false_negatives),
        true_positives,
        false_positives,
        false_negatives,
    }
}

fn ratio(num: usize, den: usize) -> Option<f64> {
    (den > 0).then(|| num as f64 / den as f64)
}

/// Cumulative precision at every rank of a confidence-ordered list of
/// TP (`true`) / FP (`false`) flags.
///
/// Every rank adds one detection, so the denominator is never zero.
pub fn cumulative_precision(is_true_positive: &[bool]) -> Vec<f64> {
    let mut tp = 0usize;
    is_true_positive
        .iter()
        .enumerate()
        .map(|(rank, &is_tp)| {
            tp += usize::from(is_tp);
            tp as f64 / (rank + 1) as f64
        })
        .collect()
}

/// Cumulative recall at every rank, against a fixed ground-truth count.
///
/// Returns `None` when there are no ground truths.
pub fn cumulative_recall(is_true_positive: &[bool], num_ground_truth: usize) -> Option<Vec<f64>> {
    if num_ground_truth == 0 {
        return None;
    }
    let mut tp = 0usize;
    Some(
        is_true_positive
            .iter()
            .map(|&is_tp| {
                tp += usize::from(is_tp);
                tp as f64 / num_ground_truth as f64
            })
            .collect(),
    )
}

/// Make a precision curve non-increasing from right to left.
///
/// Each entry becomes the maximum precision at its rank or any later rank,
/// i.e. at any rank with equal or higher recall.
pub fn precision_envelope(precision: &[f64]) -> Vec<f64> {
    let mut envelope = precision.to_vec();
    for i in (0..envelope.len().saturating_sub(1)).rev() {
        envelope[i] = envelope[i].max(envelope[i + 1]);
    }
    envelope
}

/// Sample interpolated precision at each recall breakpoint.
///
/// The value at breakpoint `r` is the envelope precision at the first rank
/// whose recall reaches `r`, or 0 when no rank does. `recall` must be
/// non-decreasing, which holds for any cumulative recall curve.
pub fn interpolate_precision(precision: &[f64], recall: &[f64], recall_levels: &[f64]) -> Vec<f64> {
    let envelope = precision_envelope(precision);
    recall_levels
        .iter()
        .map(|&level| {
            let pos = recall.partition_point(|&r| r < level);
            envelope.get(pos).copied().unwrap_or(0.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_precision_recall() {
        let pr = calculate_precision_recall(10, 0, 0);
        assert_eq!(pr.precision, Some(1.0));
        assert_eq!(pr.recall, Some(1.0));
    }

    #[test]
    fn test_zero_precision() {
        let pr = calculate_precision_recall(0, 10, 5);
        assert_eq!(pr.precision, Some(0.0));
        assert_eq!(pr.recall, Some(0.0));
    }

    #[test]
    fn test_undefined_ratios() {
        let pr = calculate_precision_recall(0, 0, 4);
        assert_eq!(pr.precision, None);
        assert_eq!(pr.recall, Some(0.0));

        let pr = calculate_precision_recall(0, 3, 0);
        assert_eq!(pr.recall, None);
    }

    #[test]
    fn test_cumulative_curves() {
        let flags = [true, true, false, true, false];
        let precision = cumulative_precision(&flags);
        let recall = cumulative_recall(&flags, 4).unwrap();

        let expected_p = [1.0, 1.0, 2.0 / 3.0, 0.75, 0.6];
        let expected_r = [0.25, 0.5, 0.5, 0.75, 0.75];
        for (got, want) in precision.iter().zip(expected_p) {
            assert!((got - want).abs() < 1e-12);
        }
        for (got, want) in recall.iter().zip(expected_r) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn test_recall_without_ground_truth() {
        assert_eq!(cumulative_recall(&[false, false], 0), None);
    }

    #[test]
    fn test_envelope_is_non_increasing() {
        let envelope = precision_envelope(&[1.0, 0.5, 0.67, 0.5, 0.6, 0.2]);
        assert_eq!(envelope, vec![1.0, 0.67, 0.67, 0.6, 0.6, 0.2]);
        assert!(precision_envelope(&[]).is_empty());
    }

    #[test]
    fn test_interpolate_precision() {
        let precision = [1.0, 1.0, 2.0 / 3.0, 0.75, 0.6];
        let recall = [0.25, 0.5, 0.5, 0.75, 0.75];
        let levels = [0.0, 0.25, 0.5, 0.6, 0.75, 1.0];

        let interpolated = interpolate_precision(&precision, &recall, &levels);
        assert_eq!(interpolated, vec![1.0, 1.0, 1.0, 0.75, 0.75, 0.0]);
    }
}
