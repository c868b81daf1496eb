//! JSON persistence of evaluation records and analysis results.
//!
//! Two files are produced. The middle file holds the per-image records
//! together with the parameters and categories they were computed with, so
//! analysis can be rerun from it without matching again. The final results
//! file holds the analysis summary.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analyzer::{AnalysisSummary, CategoryKey, CategorySummary};
use crate::error::{CocoAnalyzeError, Result};
use crate::params::EvaluationParameters;
use crate::types::{Category, Image, PerImageEvalRecord};

/// Contents of a middle file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiddleFile {
    pub params: EvaluationParameters,
    pub categories: Vec<Category>,
    #[serde(default)]
    pub images: Vec<Image>,
    pub records: Vec<PerImageEvalRecord>,
}

#[derive(Serialize)]
struct MiddleFileRef<'a> {
    params: &'a EvaluationParameters,
    categories: &'a [Category],
    images: &'a [Image],
    records: &'a [PerImageEvalRecord],
}

/// Contents of a final results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResults {
    pub params: EvaluationParameters,
    pub categories: Vec<Category>,
    pub results: BTreeMap<CategoryKey, CategorySummary>,
    pub mean_ap: Option<f64>,
}

#[derive(Serialize)]
struct FinalResultsRef<'a> {
    params: &'a EvaluationParameters,
    categories: &'a [Category],
    results: &'a BTreeMap<CategoryKey, CategorySummary>,
    mean_ap: Option<f64>,
}

/// Write the per-image records to `dir/file_name`, creating `dir` if needed.
///
/// Returns the path of the written file.
pub fn dump_middle_file_json<P: AsRef<Path>>(
    dir: P,
    file_name: &str,
    records: &[PerImageEvalRecord],
    categories: &[Category],
    images: &[Image],
    params: &EvaluationParameters,
) -> Result<PathBuf> {
    let path = write_json(
        dir.as_ref(),
        file_name,
        &MiddleFileRef {
            params,
            categories,
            images,
            records,
        },
    )?;
    info!(path = %path.display(), records = records.len(), "wrote middle file");
    Ok(path)
}

/// Read a middle file written by [`dump_middle_file_json`].
///
/// The embedded parameters are validated again on the way in, and every
/// record must agree with its own counts.
///
/// # Errors
///
/// `InvalidAnnotation` when a record has more true positives than ground
/// truths, or a `num_fn` that does not equal `num_gt` minus its true positives.
pub fn load_middle_file<P: AsRef<Path>>(path: P) -> Result<MiddleFile> {
    let reader = BufReader::new(File::open(path)?);
    let middle: MiddleFile = serde_json::from_reader(reader)?;
    middle.records.iter().try_for_each(check_record)?;
    Ok(middle)
}

fn check_record(record: &PerImageEvalRecord) -> Result<()> {
    let num_tp = record.num_tp();
    let consistent = record
        .num_gt
        .checked_sub(num_tp)
        .is_some_and(|missed| missed == record.num_fn);
    if consistent {
        return Ok(());
    }
    Err(CocoAnalyzeError::InvalidAnnotation(format!(
        "record for image {} category {} (area {}, iou {}) has {} true positives, \
         num_gt {} and num_fn {}",
        record.image_id,
        record.category_id,
        record.area_bin,
        record.iou_thresh,
        num_tp,
        record.num_gt,
        record.num_fn
    )))
}

/// Write the analysis summary to `dir/file_name`, creating `dir` if needed.
///
/// Undefined metrics are written as `null`.
pub fn dump_final_results_json<P: AsRef<Path>>(
    dir: P,
    file_name: &str,
    summary: &AnalysisSummary,
    categories: &[Category],
    params: &EvaluationParameters,
) -> Result<PathBuf> {
    let path = write_json(
        dir.as_ref(),
        file_name,
        &FinalResultsRef {
            params,
            categories,
            results: &summary.results,
            mean_ap: summary.mean_ap,
        },
    )?;
    info!(path = %path.display(), mean_ap = ?summary.mean_ap, "wrote final results");
    Ok(path)
}

/// Read a final results file written by [`dump_final_results_json`].
pub fn load_final_results<P: AsRef<Path>>(path: P) -> Result<FinalResults> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn write_json<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, EvaluatedDetection, MatchOutcome};

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("coco_analyze_report_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_middle_file_round_trip() {
        let dir = scratch_dir("middle").join("nested");
        let record = PerImageEvalRecord {
            image_id: 3,
            category_id: 1,
            area_bin: "all".to_string(),
            iou_thresh: 0.5,
            detections: vec![EvaluatedDetection {
                id: 1,
                bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
                score: 0.9,
                outcome: MatchOutcome::Tp,
                best_iou: 1.0,
                matched_gt_id: Some(4),
                error: None,
            }],
            ground_truths: vec![],
            num_gt: 1,
            num_fn: 0,
        };
        let categories = vec![Category { id: 1, name: "person".to_string(), supercategory: None }];
        let params = EvaluationParameters::default();

        let path = dump_middle_file_json(&dir, "middle.json", &[record.clone()], &categories, &[], &params)
            .unwrap();
        let loaded = load_middle_file(&path).unwrap();
        assert_eq!(loaded.records, vec![record]);
        assert_eq!(loaded.params, params);
        assert_eq!(loaded.categories, categories);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"match\": \"tp\""));
        assert!(raw.contains("\"box\""));
        fs::remove_dir_all(scratch_dir("middle")).ok();
    }
}
