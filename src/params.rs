//! Evaluation parameters: IoU thresholds, area bins and recall breakpoints.
//!
//! `EvaluationParameters` is validated once at construction and is immutable
//! afterwards. It can be built in code with [`EvaluationParameters::new`] or
//! loaded from a JSON configuration object, where every key is optional:
//!
//! ```json
//! {
//!   "iou_thresh": [0.5, 0.75],
//!   "iou_loc": 0.2,
//!   "area_rng": [[0, 1e10], [0, 1024], [1024, 9216], [9216, 1e10]],
//!   "recall_inter": [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0],
//!   "score_thresh": 0.0001
//! }
//! ```

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CocoAnalyzeError, Result};

/// Upper bound used by COCO for "unbounded" area ranges.
pub const AREA_MAX: f64 = 1e10;

const SMALL_MAX: f64 = 32.0 * 32.0;
const MEDIUM_MAX: f64 = 96.0 * 96.0;

/// A labelled, inclusive `[min, max]` area range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaRange {
    pub label: String,
    pub min: f64,
    pub max: f64,
}

impl AreaRange {
    pub fn new(label: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            label: label.into(),
            min,
            max,
        }
    }

    /// Build a range from a bare `[min, max]` pair, naming the standard COCO
    /// bins and falling back to `area_<min>_<max>`.
    pub fn from_bounds(min: f64, max: f64) -> Self {
        let named = [
            ("all", 0.0, AREA_MAX),
            ("small", 0.0, SMALL_MAX),
            ("medium", SMALL_MAX, MEDIUM_MAX),
            ("large", MEDIUM_MAX, AREA_MAX),
        ];
        let label = named
            .iter()
            .find(|(_, lo, hi)| *lo == min && *hi == max)
            .map_or_else(|| format!("area_{min}_{max}"), |(name, _, _)| name.to_string());
        Self::new(label, min, max)
    }

    /// Whether `area` falls inside the range (both ends inclusive).
    pub fn contains(&self, area: f64) -> bool {
        area >= self.min && area <= self.max
    }
}

/// Immutable, validated evaluation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParamsConfig")]
pub struct EvaluationParameters {
    iou_thresh: Vec<f64>,
    iou_loc: f64,
    area_rng: Vec<AreaRange>,
    recall_inter: Vec<f64>,
    score_thresh: f64,
}

impl EvaluationParameters {
    /// Build and validate parameters. `score_thresh` starts at its default.
    pub fn new(
        iou_thresh: Vec<f64>,
        iou_loc: f64,
        area_rng: Vec<AreaRange>,
        recall_inter: Vec<f64>,
    ) -> Result<Self> {
        let params = Self {
            iou_thresh,
            iou_loc,
            area_rng,
            recall_inter,
            score_thresh: default_score_thresh(),
        };
        params.validate()?;
        Ok(params)
    }

    /// Return a copy with a different minimum detection score.
    pub fn with_score_thresh(mut self, score_thresh: f64) -> Result<Self> {
        self.score_thresh = score_thresh;
        self.validate()?;
        Ok(self)
    }

    /// Parse parameters from a JSON configuration object.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load parameters from a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn iou_thresh(&self) -> &[f64] {
        &self.iou_thresh
    }

    pub fn iou_loc(&self) -> f64 {
        self.iou_loc
    }

    pub fn area_rng(&self) -> &[AreaRange] {
        &self.area_rng
    }

    pub fn recall_inter(&self) -> &[f64] {
        &self.recall_inter
    }

    pub fn score_thresh(&self) -> f64 {
        self.score_thresh
    }

    /// The first area bin; summaries report it as the headline curve.
    pub fn primary_area(&self) -> &AreaRange {
        &self.area_rng[0]
    }

    /// The first IoU threshold; summaries report it as the headline curve.
    pub fn primary_iou_thresh(&self) -> f64 {
        self.iou_thresh[0]
    }

    /// Look up an area bin by label.
    pub fn area(&self, label: &str) -> Option<&AreaRange> {
        self.area_rng.iter().find(|a| a.label == label)
    }

    fn validate(&self) -> Result<()> {
        if self.iou_thresh.is_empty() {
            return Err(invalid("iou_thresh must contain at least one threshold"));
        }
        for &t in &self.iou_thresh {
            if !(t > 0.0 && t <= 1.0) {
                return Err(invalid(format!("iou_thresh values must be in (0, 1], got {t}")));
            }
        }
        // Records are selected by threshold value, so a repeated value would
        // pool its passes twice.
        for (i, &t) in self.iou_thresh.iter().enumerate() {
            if self.iou_thresh[..i].contains(&t) {
                return Err(invalid(format!("duplicate iou_thresh value {t}")));
            }
        }
        let min_thresh = self.iou_thresh.iter().copied().fold(f64::INFINITY, f64::min);
        if !(self.iou_loc > 0.0 && self.iou_loc < min_thresh) {
            return Err(invalid(format!(
                "iou_loc must satisfy 0 < iou_loc < iou_thresh ({min_thresh}), got {}",
                self.iou_loc
            )));
        }

        if self.area_rng.is_empty() {
            return Err(invalid("area_rng must contain at least one range"));
        }
        let mut labels = HashSet::new();
        for area in &self.area_rng {
            if !(area.min >= 0.0 && area.min <= area.max) {
                return Err(invalid(format!(
                    "area range '{}' must satisfy 0 <= min <= max, got [{}, {}]",
                    area.label, area.min, area.max
                )));
            }
            if !labels.insert(area.label.as_str()) {
                return Err(invalid(format!("duplicate area range label '{}'", area.label)));
            }
        }

        if self.recall_inter.is_empty() {
            return Err(invalid("recall_inter must contain at least one breakpoint"));
        }
        if self.recall_inter.iter().any(|r| !(0.0..=1.0).contains(r)) {
            return Err(invalid("recall_inter breakpoints must be in [0, 1]"));
        }
        if self.recall_inter.windows(2).any(|w| w[0] > w[1]) {
            return Err(invalid("recall_inter breakpoints must be non-decreasing"));
        }

        if !self.score_thresh.is_finite() {
            return Err(invalid(format!(
                "score_thresh must be finite, got {}",
                self.score_thresh
            )));
        }
        Ok(())
    }
}

impl Default for EvaluationParameters {
    fn default() -> Self {
        Self {
            iou_thresh: default_iou_thresh(),
            iou_loc: default_iou_loc(),
            area_rng: default_area_rng(),
            recall_inter: default_recall_inter(),
            score_thresh: default_score_thresh(),
        }
    }
}

fn invalid(msg: impl Into<String>) -> CocoAnalyzeError {
    CocoAnalyzeError::InvalidParameters(msg.into())
}

/// COCO's 0.50:0.05:0.95 threshold sweep.
pub fn coco_iou_sweep() -> Vec<f64> {
    (0..10).map(|i| 0.5 + 0.05 * i as f64).collect()
}

fn default_iou_thresh() -> Vec<f64> {
    vec![0.5]
}

fn default_iou_loc() -> f64 {
    0.2
}

fn default_area_rng() -> Vec<AreaRange> {
    vec![
        AreaRange::from_bounds(0.0, AREA_MAX),
        AreaRange::from_bounds(0.0, SMALL_MAX),
        AreaRange::from_bounds(SMALL_MAX, MEDIUM_MAX),
        AreaRange::from_bounds(MEDIUM_MAX, AREA_MAX),
    ]
}

fn default_recall_inter() -> Vec<f64> {
    (0..=10).map(|i| i as f64 / 10.0).collect()
}

fn default_score_thresh() -> f64 {
    0.0001
}

/// One IoU threshold or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum IouThreshConfig {
    Single(f64),
    Multiple(Vec<f64>),
}

/// An area range given either as a bare pair or with its label.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AreaRangeConfig {
    Pair([f64; 2]),
    Labeled { label: String, min: f64, max: f64 },
}

/// Wire form of the parameters; every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParamsConfig {
    #[serde(default)]
    iou_thresh: Option<IouThreshConfig>,
    #[serde(default = "default_iou_loc")]
    iou_loc: f64,
    #[serde(default)]
    area_rng: Option<Vec<AreaRangeConfig>>,
    #[serde(default)]
    area_rng_lbl: Option<Vec<String>>,
    #[serde(default = "default_recall_inter")]
    recall_inter: Vec<f64>,
    #[serde(default = "default_score_thresh")]
    score_thresh: f64,
}

impl TryFrom<ParamsConfig> for EvaluationParameters {
    type Error = CocoAnalyzeError;

    fn try_from(config: ParamsConfig) -> Result<Self> {
        let iou_thresh = match config.iou_thresh {
            None => default_iou_thresh(),
            Some(IouThreshConfig::Single(t)) => vec![t],
            Some(IouThreshConfig::Multiple(ts)) => ts,
        };

        let mut area_rng: Vec<AreaRange> = match config.area_rng {
            None => default_area_rng(),
            Some(ranges) => ranges
                .into_iter()
                .map(|r| match r {
                    AreaRangeConfig::Pair([min, max]) => AreaRange::from_bounds(min, max),
                    AreaRangeConfig::Labeled { label, min, max } => AreaRange::new(label, min, max),
                })
                .collect(),
        };
        if let Some(labels) = config.area_rng_lbl {
            if labels.len() != area_rng.len() {
                return Err(invalid(format!(
                    "area_rng_lbl has {} labels for {} area ranges",
                    labels.len(),
                    area_rng.len()
                )));
            }
            for (area, label) in area_rng.iter_mut().zip(labels) {
                area.label = label;
            }
        }

        let params = Self {
            iou_thresh,
            iou_loc: config.iou_loc,
            area_rng,
            recall_inter: config.recall_inter,
            score_thresh: config.score_thresh,
        };
        params.validate()?;
        Ok(params)
    }
}
