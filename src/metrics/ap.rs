//! Average Precision (AP) and mean Average Precision (mAP) calculation.

use crate::metrics::precision_recall::interpolate_precision;

/// Calculate Average Precision from a precision-recall curve.
///
/// Precision is interpolated at each of `recall_levels` using the monotonic
/// envelope, and AP is the mean of those samples. An empty curve has AP 0:
/// the caller decides whether the curve is defined at all.
///
/// # Example
///
/// ```
/// use coco_analyze::metrics::ap::calculate_ap;
///
/// let levels: Vec<f64> = (0..=10).map(|i| i as f64 / 10.0).collect();
/// let precisions = vec![1.0, 1.0, 0.67, 0.75, 0.6];
/// let recalls = vec![0.25, 0.5, 0.5, 0.75, 0.75];
/// let ap = calculate_ap(&precisions, &recalls, &levels);
/// assert!(ap >= 0.0 && ap <= 1.0);
/// ```
pub fn calculate_ap(precisions: &[f64], recalls: &[f64], recall_levels: &[f64]) -> f64 {
    if recall_levels.is_empty() {
        return 0.0;
    }
    let interpolated = interpolate_precision(precisions, recalls, recall_levels);
    interpolated.iter().sum::<f64>() / interpolated.len() as f64
}

/// Calculate the mean of the defined AP values.
///
/// Undefined entries (`None`, e.g. a category without ground truth) are
/// skipped; the result is `None` when nothing is defined.
///
/// # Example
///
/// ```
/// use coco_analyze::metrics::ap::calculate_map;
///
/// let map = calculate_map([Some(0.8), None, Some(0.9), Some(0.75), Some(0.85)]);
/// assert!((map.unwrap() - 0.825).abs() < 1e-10);
/// assert_eq!(calculate_map([None, None]), None);
/// ```
pub fn calculate_map<I>(aps: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = aps
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), ap| (sum + ap, count + 1));
    (count > 0).then(|| sum / count as f64)
}
