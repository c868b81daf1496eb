//! Metrics over evaluation records: precision/recall curves, AP and
//! false-positive analysis.
//!
//! Everything here is a pure function of the records, so analysis can run
//! right after evaluation or later on records loaded from a middle file.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CocoAnalyzeError;
use crate::metrics::ap::{calculate_ap, calculate_map};
use crate::metrics::precision_recall::{
    calculate_precision_recall, cumulative_precision, cumulative_recall, interpolate_precision,
    PrecisionRecall,
};
use crate::params::EvaluationParameters;
use crate::types::{
    Category, EvaluatedDetection, FalsePositiveKind, GroundTruthOutcome, MatchOutcome, MissKind,
    PerImageEvalRecord,
};

/// Key of one entry in the summary: a category id or the pooled `"all"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum CategoryKey {
    Category(u64),
    All,
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryKey::Category(id) => write!(f, "{id}"),
            CategoryKey::All => f.write_str("all"),
        }
    }
}

impl FromStr for CategoryKey {
    type Err = CocoAnalyzeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(CategoryKey::All);
        }
        s.parse()
            .map(CategoryKey::Category)
            .map_err(|_| CocoAnalyzeError::InvalidAnnotation(format!("invalid category key '{s}'")))
    }
}

impl From<CategoryKey> for String {
    fn from(key: CategoryKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for CategoryKey {
    type Error = CocoAnalyzeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl CategoryKey {
    fn includes(&self, category_id: u64) -> bool {
        match self {
            CategoryKey::Category(id) => *id == category_id,
            CategoryKey::All => true,
        }
    }
}

/// False positives of one curve, counted by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FalsePositiveBreakdown {
    pub localization: usize,
    pub duplicate: usize,
    pub class_confusion: usize,
    pub background: usize,
}

impl FalsePositiveBreakdown {
    pub fn count(&self, kind: FalsePositiveKind) -> usize {
        match kind {
            FalsePositiveKind::Localization => self.localization,
            FalsePositiveKind::Duplicate => self.duplicate,
            FalsePositiveKind::ClassConfusion => self.class_confusion,
            FalsePositiveKind::Background => self.background,
        }
    }

    fn add(&mut self, kind: FalsePositiveKind) {
        match kind {
            FalsePositiveKind::Localization => self.localization += 1,
            FalsePositiveKind::Duplicate => self.duplicate += 1,
            FalsePositiveKind::ClassConfusion => self.class_confusion += 1,
            FalsePositiveKind::Background => self.background += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.localization + self.duplicate + self.class_confusion + self.background
    }

    /// False positives that are not localization errors.
    pub fn false_alarms(&self) -> usize {
        self.total() - self.localization
    }

    /// Share of false positives that are localization errors; `None` without FPs.
    pub fn localization_error_rate(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.localization as f64 / total as f64)
    }
}

/// Missed ground truths of one curve, counted by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedGroundTruthBreakdown {
    pub lost_to_other: usize,
    pub class_confusion: usize,
    pub localization: usize,
    pub missed: usize,
}

impl MissedGroundTruthBreakdown {
    pub fn count(&self, kind: MissKind) -> usize {
        match kind {
            MissKind::LostToOther => self.lost_to_other,
            MissKind::ClassConfusion => self.class_confusion,
            MissKind::Localization => self.localization,
            MissKind::Missed => self.missed,
        }
    }

    fn add(&mut self, kind: MissKind) {
        match kind {
            MissKind::LostToOther => self.lost_to_other += 1,
            MissKind::ClassConfusion => self.class_confusion += 1,
            MissKind::Localization => self.localization += 1,
            MissKind::Missed => self.missed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.lost_to_other + self.class_confusion + self.localization + self.missed
    }

    /// Fraction of `num_gt` ground truths missed for `kind`; `None` without ground truth.
    pub fn share(&self, kind: MissKind, num_gt: usize) -> Option<f64> {
        (num_gt > 0).then(|| self.count(kind) as f64 / num_gt as f64)
    }
}

/// Full analysis of one precision/recall curve (one category or `"all"`,
/// one area bin, one IoU threshold).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveAnalysis {
    pub area_bin: String,
    pub iou_thresh: f64,
    pub num_gt: usize,
    pub num_tp: usize,
    pub num_fp: usize,
    pub num_fn: usize,
    /// Scalar precision and recall over the whole curve.
    pub totals: PrecisionRecall,
    /// Scores of the ranked detections.
    pub scores: Vec<f64>,
    pub precision: Vec<f64>,
    pub recall: Option<Vec<f64>>,
    /// Precision sampled at each recall breakpoint; empty without ground truth.
    pub interpolated_precision: Vec<f64>,
    pub ap: Option<f64>,
    pub false_positives: FalsePositiveBreakdown,
    pub missed_ground_truths: MissedGroundTruthBreakdown,
    pub localization_error_rate: Option<f64>,
    /// AP gained when each kind of false positive is counted as a true positive.
    pub ap_error_impact: BTreeMap<FalsePositiveKind, f64>,
    /// Each gain divided by the AP plus every gain.
    pub ap_error_share: BTreeMap<FalsePositiveKind, f64>,
}

/// Summary of one category (or `"all"`).
///
/// The headline fields come from the primary area bin at the first IoU
/// threshold; `mean_ap` averages the primary bin over every threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub name: String,
    pub precision: Vec<f64>,
    pub recall: Option<Vec<f64>>,
    pub ap: Option<f64>,
    pub localization_error_rate: Option<f64>,
    pub totals: PrecisionRecall,
    pub missed_ground_truths: MissedGroundTruthBreakdown,
    pub mean_ap: Option<f64>,
    pub curves: Vec<CurveAnalysis>,
}

/// Per-category summaries plus the aggregate mAP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub results: BTreeMap<CategoryKey, CategorySummary>,
    /// Mean of the defined per-category headline APs (`"all"` excluded).
    pub mean_ap: Option<f64>,
}

/// Records of one category (or every category) for one area bin and threshold.
pub fn select_records<'r>(
    records: &'r [PerImageEvalRecord],
    key: CategoryKey,
    area_bin: &str,
    iou_thresh: f64,
) -> Vec<&'r PerImageEvalRecord> {
    records
        .iter()
        .filter(|r| key.includes(r.category_id) && r.area_bin == area_bin && r.iou_thresh == iou_thresh)
        .collect()
}

/// Non-ignored detections of `records`, highest score first.
///
/// Records are pooled in the given order and the sort is stable, so ties
/// keep a fixed order between runs.
pub fn rank_detections<'r>(records: &[&'r PerImageEvalRecord]) -> Vec<&'r EvaluatedDetection> {
    let mut ranked: Vec<&EvaluatedDetection> = records
        .iter()
        .flat_map(|r| r.detections.iter())
        .filter(|d| d.outcome != MatchOutcome::Ignore)
        .collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    ranked
}

fn tp_flags(ranked: &[&EvaluatedDetection]) -> Vec<bool> {
    ranked.iter().map(|d| d.outcome == MatchOutcome::Tp).collect()
}

fn total_gt(records: &[&PerImageEvalRecord]) -> usize {
    records.iter().map(|r| r.num_gt).sum()
}

/// Cumulative precision over the pooled ranking.
pub fn precision_analyze(records: &[&PerImageEvalRecord]) -> Vec<f64> {
    cumulative_precision(&tp_flags(&rank_detections(records)))
}

/// Cumulative recall over the pooled ranking; `None` without ground truth.
pub fn recall_analyze(records: &[&PerImageEvalRecord]) -> Option<Vec<f64>> {
    cumulative_recall(&tp_flags(&rank_detections(records)), total_gt(records))
}

/// Interpolated AP of a precision/recall curve over `recall_inter`.
///
/// # Example
///
/// ```
/// use coco_analyze::analyzer::ap_analyze;
///
/// let levels: Vec<f64> = (0..=10).map(|i| i as f64 / 10.0).collect();
/// assert_eq!(ap_analyze(&[1.0], &[1.0], &levels), 1.0);
/// assert_eq!(ap_analyze(&[0.0], &[0.0], &levels), 0.0);
/// ```
pub fn ap_analyze(precision: &[f64], recall: &[f64], recall_inter: &[f64]) -> f64 {
    calculate_ap(precision, recall, recall_inter)
}

/// Count false positives by kind.
///
/// A false positive without a recorded kind counts as background.
pub fn evaluation_check(records: &[&PerImageEvalRecord]) -> FalsePositiveBreakdown {
    let mut breakdown = FalsePositiveBreakdown::default();
    records
        .iter()
        .flat_map(|r| r.detections.iter())
        .filter(|d| d.outcome == MatchOutcome::Fp)
        .for_each(|d| breakdown.add(d.error.unwrap_or(FalsePositiveKind::Background)));
    breakdown
}

/// Count missed ground truths by reason.
///
/// A missed ground truth without a recorded reason counts as plain missed.
pub fn recall_check(records: &[&PerImageEvalRecord]) -> MissedGroundTruthBreakdown {
    let mut breakdown = MissedGroundTruthBreakdown::default();
    records
        .iter()
        .flat_map(|r| r.ground_truths.iter())
        .filter(|gt| gt.outcome == GroundTruthOutcome::Missed)
        .for_each(|gt| breakdown.add(gt.error.unwrap_or(MissKind::Missed)));
    breakdown
}

/// AP gained when the false positives of each kind are relabelled as true
/// positives, keeping the ranking and the ground-truth count.
///
/// Empty when there is no ground truth, since AP is undefined then.
pub fn ap_error_impact(
    records: &[&PerImageEvalRecord],
    recall_inter: &[f64],
) -> BTreeMap<FalsePositiveKind, f64> {
    let num_gt = total_gt(records);
    let ranked = rank_detections(records);
    let ap_of = |flags: &[bool]| -> Option<f64> {
        let recall = cumulative_recall(flags, num_gt)?;
        Some(calculate_ap(&cumulative_precision(flags), &recall, recall_inter))
    };
    let Some(base) = ap_of(&tp_flags(&ranked)) else {
        return BTreeMap::new();
    };

    FalsePositiveKind::ALL
        .iter()
        .filter_map(|&kind| {
            let relabelled: Vec<bool> = ranked
                .iter()
                .map(|d| match d.outcome {
                    MatchOutcome::Tp => true,
                    MatchOutcome::Fp => d.error.unwrap_or(FalsePositiveKind::Background) == kind,
                    MatchOutcome::Ignore => false,
                })
                .collect();
            ap_of(&relabelled).map(|ap| (kind, ap - base))
        })
        .collect()
}

/// Normalize AP gains so that the AP and the gains together sum to one.
///
/// A zero gain stays zero.
pub fn ap_error_share(
    impact: &BTreeMap<FalsePositiveKind, f64>,
    ap: f64,
) -> BTreeMap<FalsePositiveKind, f64> {
    let total = ap + impact.values().sum::<f64>();
    impact
        .iter()
        .map(|(&kind, &gain)| {
            let share = if gain != 0.0 && total > 0.0 { gain / total } else { 0.0 };
            (kind, share)
        })
        .collect()
}

/// Analyze one curve from its records.
pub fn analyze_curve(
    records: &[&PerImageEvalRecord],
    area_bin: &str,
    iou_thresh: f64,
    recall_inter: &[f64],
) -> CurveAnalysis {
    let ranked = rank_detections(records);
    let flags = tp_flags(&ranked);
    let num_gt = total_gt(records);
    let num_tp = flags.iter().filter(|&&tp| tp).count();

    let precision = cumulative_precision(&flags);
    let recall = cumulative_recall(&flags, num_gt);
    let (interpolated_precision, ap) = match &recall {
        Some(recall) => (
            interpolate_precision(&precision, recall, recall_inter),
            Some(ap_analyze(&precision, recall, recall_inter)),
        ),
        None => (Vec::new(), None),
    };
    let false_positives = evaluation_check(records);
    let ap_error_impact = ap_error_impact(records, recall_inter);
    let ap_error_share = ap_error_share(&ap_error_impact, ap.unwrap_or(0.0));
    let num_fp = flags.len() - num_tp;
    let num_fn = num_gt.saturating_sub(num_tp);

    CurveAnalysis {
        area_bin: area_bin.to_string(),
        iou_thresh,
        num_gt,
        num_tp,
        num_fp,
        num_fn,
        totals: calculate_precision_recall(num_tp, num_fp, num_fn),
        scores: ranked.iter().map(|d| d.score).collect(),
        precision,
        recall,
        interpolated_precision,
        ap,
        localization_error_rate: false_positives.localization_error_rate(),
        false_positives,
        missed_ground_truths: recall_check(records),
        ap_error_impact,
        ap_error_share,
    }
}

fn summarize(
    key: CategoryKey,
    name: String,
    records: &[PerImageEvalRecord],
    params: &EvaluationParameters,
) -> CategorySummary {
    let mut curves = Vec::with_capacity(params.area_rng().len() * params.iou_thresh().len());
    for area in params.area_rng() {
        for &iou_thresh in params.iou_thresh() {
            let selected = select_records(records, key, &area.label, iou_thresh);
            curves.push(analyze_curve(&selected, &area.label, iou_thresh, params.recall_inter()));
        }
    }

    // Curves are laid out bin-major, so the primary bin's curves come first.
    let primary = &curves[..params.iou_thresh().len()];
    let mean_ap = calculate_map(primary.iter().map(|c| c.ap));
    let headline = &primary[0];
    CategorySummary {
        name,
        precision: headline.precision.clone(),
        recall: headline.recall.clone(),
        ap: headline.ap,
        localization_error_rate: headline.localization_error_rate,
        totals: headline.totals.clone(),
        missed_ground_truths: headline.missed_ground_truths,
        mean_ap,
        curves,
    }
}

/// Analyze every category of `categories` plus the pooled `"all"` entry.
pub fn analyze(
    records: &[PerImageEvalRecord],
    categories: &[Category],
    params: &EvaluationParameters,
) -> AnalysisSummary {
    let mut results = BTreeMap::new();
    for category in categories {
        let key = CategoryKey::Category(category.id);
        let summary = summarize(key, category.name.clone(), records, params);
        debug!(
            category = category.id,
            name = %category.name,
            ap = ?summary.ap,
            localization_error_rate = ?summary.localization_error_rate,
            "analyzed category"
        );
        results.insert(key, summary);
    }

    let mean_ap = calculate_map(results.values().map(|s| s.ap));
    let all = summarize(CategoryKey::All, "all".to_string(), records, params);
    debug!(ap = ?all.ap, mean_ap = ?mean_ap, "analyzed pooled categories");
    results.insert(CategoryKey::All, all);

    AnalysisSummary { results, mean_ap }
}
