//! Evaluate a detection results file against COCO ground truth and write the
//! middle file and the final results.
//!
//! ```text
//! cargo run --example analyze_files -- <ground_truth.json> <detections.json> <out_dir> [params.json]
//! RUST_LOG=coco_analyze=debug cargo run --example analyze_files -- ...
//! ```
//!
//! With `--from-middle <middle.json> <out_dir>` the matching stage is skipped
//! and analysis reruns on previously written records.

use std::env;
use std::process;

use coco_analyze::report::{dump_final_results_json, dump_middle_file_json, load_middle_file};
use coco_analyze::{
    analyze, evaluate_and_analyze, load_detections_from_file, load_from_file, EvaluationParameters,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const MIDDLE_FILE: &str = "middle_file.json";
const FINAL_FILE: &str = "final_results.json";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        Some("--from-middle") if args.len() == 3 => rerun_analysis(&args[1], &args[2]),
        _ if args.len() == 3 || args.len() == 4 => {
            run(&args[0], &args[1], &args[2], args.get(3).map(String::as_str))
        }
        _ => {
            eprintln!(
                "usage: analyze_files <ground_truth.json> <detections.json> <out_dir> [params.json]\n       \
                 analyze_files --from-middle <middle.json> <out_dir>"
            );
            process::exit(2);
        }
    };

    if let Err(e) = result {
        error!(error = %e, "analysis failed");
        process::exit(1);
    }
}

fn run(
    gt_path: &str,
    dt_path: &str,
    out_dir: &str,
    params_path: Option<&str>,
) -> coco_analyze::Result<()> {
    let params = match params_path {
        Some(path) => EvaluationParameters::from_file(path)?,
        None => EvaluationParameters::default(),
    };
    let ground_truth = load_from_file(gt_path)?;
    let detections = load_detections_from_file(dt_path)?;

    let (records, summary) = evaluate_and_analyze(&ground_truth, &detections, &params)?;
    dump_middle_file_json(
        out_dir,
        MIDDLE_FILE,
        &records,
        &ground_truth.categories,
        &ground_truth.images,
        &params,
    )?;
    let path = dump_final_results_json(out_dir, FINAL_FILE, &summary, &ground_truth.categories, &params)?;
    info!(path = %path.display(), mean_ap = ?summary.mean_ap, "done");
    Ok(())
}

fn rerun_analysis(middle_path: &str, out_dir: &str) -> coco_analyze::Result<()> {
    let middle = load_middle_file(middle_path)?;
    info!(records = middle.records.len(), "loaded middle file");
    let summary = analyze(&middle.records, &middle.categories, &middle.params);
    let path = dump_final_results_json(out_dir, FINAL_FILE, &summary, &middle.categories, &middle.params)?;
    info!(path = %path.display(), mean_ap = ?summary.mean_ap, "done");
    Ok(())
}
