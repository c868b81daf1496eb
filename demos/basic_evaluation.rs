//! Basic evaluation example demonstrating core functionality.

use coco_analyze::{
    evaluate_and_analyze, load_detections_from_str, load_from_string, metrics::iou::calculate_iou,
    BoundingBox, CategoryKey, EvaluationParameters,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== COCO Analysis Example ===\n");

    // Example 1: IoU Calculation
    println!("1. IoU Calculation");
    let bbox1 = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    let bbox2 = BoundingBox::new(2.0, 2.0, 10.0, 10.0);
    let iou = calculate_iou(&bbox1, &bbox2);
    println!("   IoU between shifted boxes: {:.4}", iou);
    println!();

    // Example 2: Load COCO annotations
    println!("2. Loading COCO Annotations");
    let ground_truth_json = r#"{
        "images": [
            {
                "id": 1,
                "file_name": "image1.jpg",
                "height": 480,
                "width": 640
            }
        ],
        "annotations": [
            {
                "id": 1,
                "image_id": 1,
                "category_id": 1,
                "bbox": [100.0, 100.0, 200.0, 150.0],
                "area": 30000.0
            },
            {
                "id": 2,
                "image_id": 1,
                "category_id": 2,
                "bbox": [350.0, 200.0, 100.0, 120.0],
                "area": 12000.0
            }
        ],
        "categories": [
            {
                "id": 1,
                "name": "person",
                "supercategory": "human"
            },
            {
                "id": 2,
                "name": "car",
                "supercategory": "vehicle"
            }
        ]
    }"#;

    let ground_truth = load_from_string(ground_truth_json)?;
    println!("   Loaded {} ground truth annotations", ground_truth.annotations.len());
    println!(
        "   Categories: {:?}",
        ground_truth.categories.iter().map(|c| &c.name).collect::<Vec<_>>()
    );
    println!();

    // Example 3: Load detections
    println!("3. Loading Detections");
    let detections_json = r#"[
        {"image_id": 1, "category_id": 1, "bbox": [105.0, 98.0, 195.0, 155.0], "score": 0.95},
        {"image_id": 1, "category_id": 1, "bbox": [160.0, 120.0, 200.0, 150.0], "score": 0.60},
        {"image_id": 1, "category_id": 2, "bbox": [348.0, 198.0, 105.0, 125.0], "score": 0.87},
        {"image_id": 1, "category_id": 2, "bbox": [100.0, 100.0, 200.0, 150.0], "score": 0.40}
    ]"#;
    let detections = load_detections_from_str(detections_json)?;
    println!("   Loaded {} detections", detections.len());
    println!();

    // Example 4: Evaluate and analyze
    println!("4. Evaluation Results");
    let params = EvaluationParameters::default();
    let (records, summary) = evaluate_and_analyze(&ground_truth, &detections, &params)?;

    for record in records.iter().filter(|r| r.area_bin == "all") {
        println!(
            "   image {} category {}: TP={} FP={} FN={}",
            record.image_id,
            record.category_id,
            record.num_tp(),
            record.num_fp(),
            record.num_fn
        );
        for detection in &record.detections {
            println!(
                "     score {:.2} -> {:?} (best IoU {:.3}, error {:?})",
                detection.score, detection.outcome, detection.best_iou, detection.error
            );
        }
    }
    println!();

    println!("5. Per-Category Summary");
    for (key, result) in &summary.results {
        let ap = result.ap.map_or("n/a".to_string(), |ap| format!("{ap:.4}"));
        let loc = result
            .localization_error_rate
            .map_or("n/a".to_string(), |r| format!("{r:.2}"));
        println!("   {:<8} {:<8} AP={}  localization error rate={}", key, result.name, ap, loc);
    }
    if let Some(mean_ap) = summary.mean_ap {
        println!("   mAP: {:.4}", mean_ap);
    }

    let person = &summary.results[&CategoryKey::Category(1)];
    println!("\n   person AP impact by error kind:");
    let curve = &person.curves[0];
    for (kind, gain) in &curve.ap_error_impact {
        println!("     {:?}: +{:.4} (share {:.2})", kind, gain, curve.ap_error_share[kind]);
    }

    let missed = &person.missed_ground_truths;
    println!(
        "   person missed ground truths: lost to other={} class confusion={} localization={} missed={}",
        missed.lost_to_other, missed.class_confusion, missed.localization, missed.missed
    );

    Ok(())
}
