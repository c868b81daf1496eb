//! Greedy one-to-one matching of detections to ground truths.
//!
//! A matching pass walks detections in descending confidence order and pairs
//! each one with the highest-IoU ground truth that is still available. The
//! set of consumed ground truths is an explicit [`GtUsage`] value handed into
//! and back out of [`match_pass`], so two passes never share state.

use crate::types::{FalsePositiveKind, MatchOutcome, MissKind};

/// Which ground truths have been consumed in one matching pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GtUsage {
    used: Vec<bool>,
}

impl GtUsage {
    /// Fresh usage state for `num_ground_truths` boxes, none used.
    pub fn new(num_ground_truths: usize) -> Self {
        Self {
            used: vec![false; num_ground_truths],
        }
    }

    pub fn is_used(&self, gt_index: usize) -> bool {
        self.used.get(gt_index).copied().unwrap_or(false)
    }

    /// Number of consumed ground truths.
    pub fn count(&self) -> usize {
        self.used.iter().filter(|&&u| u).count()
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    fn mark(&mut self, gt_index: usize) {
        self.used[gt_index] = true;
    }
}

/// Result of matching one detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub outcome: MatchOutcome,
    /// Index of the matched ground truth (non-ignored for TP, ignored for `Ignore`).
    pub gt_index: Option<usize>,
    /// Highest IoU against a non-ignored ground truth still unused at this rank.
    pub best_iou: f64,
    /// Highest IoU against a non-ignored ground truth consumed by an earlier detection.
    pub best_used_iou: f64,
}

/// Inputs of one matching pass. Detections must already be sorted by
/// descending confidence.
#[derive(Debug, Clone, Copy)]
pub struct PassInput<'a> {
    /// `ious[d][g]`: IoU between detection `d` and ground truth `g`.
    pub ious: &'a [Vec<f64>],
    /// Detections outside the active area range; they neither match nor count.
    pub dt_ignore: &'a [bool],
    /// Ground truths outside the active area range, or crowd regions.
    pub gt_ignore: &'a [bool],
    pub iou_thresh: f64,
}

/// Run one greedy matching pass.
///
/// For each non-ignored detection the best unused, non-ignored ground truth
/// is chosen (ties keep the earlier ground truth). At or above `iou_thresh`
/// it becomes a TP and the ground truth is consumed. Otherwise a detection
/// that overlaps an ignored ground truth at the threshold is itself ignored,
/// and anything else is a FP. Ignored ground truths are never consumed.
pub fn match_pass(input: PassInput<'_>, mut usage: GtUsage) -> (Vec<Match>, GtUsage) {
    let matches = input
        .dt_ignore
        .iter()
        .enumerate()
        .map(|(d, &ignored)| {
            if ignored {
                return Match {
                    outcome: MatchOutcome::Ignore,
                    gt_index: None,
                    best_iou: 0.0,
                    best_used_iou: 0.0,
                };
            }

            let row = input.ious.get(d).map(Vec::as_slice).unwrap_or(&[]);
            let mut best_iou = 0.0;
            let mut best_gt = None;
            let mut best_used_iou: f64 = 0.0;
            let mut best_ignored_iou = 0.0;
            let mut best_ignored = None;

            for (g, &iou) in row.iter().enumerate() {
                if input.gt_ignore[g] {
                    if iou > best_ignored_iou {
                        best_ignored_iou = iou;
                        best_ignored = Some(g);
                    }
                } else if usage.is_used(g) {
                    best_used_iou = best_used_iou.max(iou);
                } else if iou > best_iou {
                    best_iou = iou;
                    best_gt = Some(g);
                }
            }

            match best_gt {
                Some(g) if best_iou >= input.iou_thresh => {
                    usage.mark(g);
                    Match {
                        outcome: MatchOutcome::Tp,
                        gt_index: Some(g),
                        best_iou,
                        best_used_iou,
                    }
                }
                _ if best_ignored_iou >= input.iou_thresh => Match {
                    outcome: MatchOutcome::Ignore,
                    gt_index: best_ignored,
                    best_iou,
                    best_used_iou,
                },
                _ => Match {
                    outcome: MatchOutcome::Fp,
                    gt_index: None,
                    best_iou,
                    best_used_iou,
                },
            }
        })
        .collect();

    (matches, usage)
}

/// Classify a false positive by the overlaps it had at matching time.
///
/// `cross_category_iou` is the highest IoU against a non-crowd ground truth
/// of another category in the same image. The first rule that applies wins:
/// localization, duplicate, class confusion, background.
pub fn classify_false_positive(
    m: &Match,
    cross_category_iou: f64,
    iou_thresh: f64,
    iou_loc: f64,
) -> FalsePositiveKind {
    if m.best_iou >= iou_loc && m.best_iou < iou_thresh {
        FalsePositiveKind::Localization
    } else if m.best_used_iou >= iou_thresh {
        FalsePositiveKind::Duplicate
    } else if cross_category_iou >= iou_thresh {
        FalsePositiveKind::ClassConfusion
    } else {
        FalsePositiveKind::Background
    }
}

/// Overlaps of one missed ground truth, gathered after its pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MissOverlaps {
    /// Highest IoU against a same-category detection that matched another ground truth.
    pub matched_elsewhere_iou: f64,
    /// Highest IoU against a detection of another category in the same image.
    pub cross_category_iou: f64,
    /// Highest IoU below the threshold against any same-category detection.
    pub near_iou: f64,
}

/// Classify a missed ground truth. The first rule that applies wins:
/// lost to another ground truth, class confusion, localization, missed.
pub fn classify_missed_ground_truth(
    overlaps: MissOverlaps,
    iou_thresh: f64,
    iou_loc: f64,
) -> MissKind {
    if overlaps.matched_elsewhere_iou >= iou_thresh {
        MissKind::LostToOther
    } else if overlaps.cross_category_iou >= iou_thresh {
        MissKind::ClassConfusion
    } else if overlaps.near_iou >= iou_loc {
        MissKind::Localization
    } else {
        MissKind::Missed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(ious: Vec<Vec<f64>>, dt_ignore: Vec<bool>, gt_ignore: Vec<bool>) -> (Vec<Match>, GtUsage) {
        let usage = GtUsage::new(gt_ignore.len());
        match_pass(
            PassInput {
                ious: &ious,
                dt_ignore: &dt_ignore,
                gt_ignore: &gt_ignore,
                iou_thresh: 0.5,
            },
            usage,
        )
    }

    #[test]
    fn test_perfect_match() {
        let (matches, usage) = run(vec![vec![1.0]], vec![false], vec![false]);
        assert_eq!(matches[0].outcome, MatchOutcome::Tp);
        assert_eq!(matches[0].gt_index, Some(0));
        assert!(usage.is_used(0));
    }

    #[test]
    fn test_ground_truth_consumed_once() {
        let (matches, usage) = run(vec![vec![0.9], vec![0.8]], vec![false, false], vec![false]);
        assert_eq!(matches[0].outcome, MatchOutcome::Tp);
        assert_eq!(matches[1].outcome, MatchOutcome::Fp);
        assert_eq!(matches[1].best_iou, 0.0);
        assert_eq!(matches[1].best_used_iou, 0.8);
        assert_eq!(usage.count(), 1);
    }

    #[test]
    fn test_picks_highest_iou_ground_truth() {
        let (matches, _) = run(vec![vec![0.6, 0.9, 0.9]], vec![false], vec![false; 3]);
        assert_eq!(matches[0].gt_index, Some(1));
    }

    #[test]
    fn test_below_threshold_is_false_positive() {
        let (matches, usage) = run(vec![vec![0.47]], vec![false], vec![false]);
        assert_eq!(matches[0].outcome, MatchOutcome::Fp);
        assert_eq!(matches[0].best_iou, 0.47);
        assert_eq!(usage.count(), 0);
    }

    #[test]
    fn test_match_on_ignored_ground_truth_is_ignored() {
        let (matches, usage) = run(
            vec![vec![0.1, 0.8], vec![0.0, 0.9]],
            vec![false, false],
            vec![false, true],
        );
        assert_eq!(matches[0].outcome, MatchOutcome::Ignore);
        assert_eq!(matches[0].gt_index, Some(1));
        // Ignored ground truths are never consumed, so they can absorb more detections.
        assert_eq!(matches[1].outcome, MatchOutcome::Ignore);
        assert_eq!(usage.count(), 0);
    }

    #[test]
    fn test_prefers_regular_ground_truth_over_ignored() {
        let (matches, _) = run(vec![vec![0.6, 0.95]], vec![false], vec![false, true]);
        assert_eq!(matches[0].outcome, MatchOutcome::Tp);
        assert_eq!(matches[0].gt_index, Some(0));
    }

    #[test]
    fn test_ignored_detection_does_not_consume() {
        let (matches, usage) = run(vec![vec![1.0], vec![1.0]], vec![true, false], vec![false]);
        assert_eq!(matches[0].outcome, MatchOutcome::Ignore);
        assert_eq!(matches[1].outcome, MatchOutcome::Tp);
        assert_eq!(usage.count(), 1);
    }

    #[test]
    fn test_usage_is_threaded_through() {
        let mut usage = GtUsage::new(1);
        usage.mark(0);
        let ious = vec![vec![1.0]];
        let (matches, usage) = match_pass(
            PassInput {
                ious: &ious,
                dt_ignore: &[false],
                gt_ignore: &[false],
                iou_thresh: 0.5,
            },
            usage,
        );
        assert_eq!(matches[0].outcome, MatchOutcome::Fp);
        assert_eq!(usage.count(), 1);
    }

    #[test]
    fn test_classify_false_positive_priority() {
        let fp = |best_iou, best_used_iou| Match {
            outcome: MatchOutcome::Fp,
            gt_index: None,
            best_iou,
            best_used_iou,
        };
        assert_eq!(
            classify_false_positive(&fp(0.47, 0.9), 0.9, 0.5, 0.3),
            FalsePositiveKind::Localization
        );
        assert_eq!(
            classify_false_positive(&fp(0.1, 0.9), 0.9, 0.5, 0.3),
            FalsePositiveKind::Duplicate
        );
        assert_eq!(
            classify_false_positive(&fp(0.0, 0.0), 0.7, 0.5, 0.3),
            FalsePositiveKind::ClassConfusion
        );
        assert_eq!(
            classify_false_positive(&fp(0.0, 0.0), 0.2, 0.5, 0.3),
            FalsePositiveKind::Background
        );
    }

    #[test]
    fn test_missed_ground_truth_priority() {
        let classify = |matched_elsewhere_iou, cross_category_iou, near_iou| {
            classify_missed_ground_truth(
                MissOverlaps { matched_elsewhere_iou, cross_category_iou, near_iou },
                0.5,
                0.2,
            )
        };
        assert_eq!(classify(0.6, 0.9, 0.4), MissKind::LostToOther);
        assert_eq!(classify(0.4, 0.5, 0.4), MissKind::ClassConfusion);
        assert_eq!(classify(0.0, 0.3, 0.2), MissKind::Localization);
        assert_eq!(classify(0.0, 0.3, 0.1), MissKind::Missed);
        assert_eq!(classify_missed_ground_truth(MissOverlaps::default(), 0.5, 0.2), MissKind::Missed);
    }
}
