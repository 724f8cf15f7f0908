//! Example of reconstructing and scoring a crowd of walkers.
//!
//! Run with: cargo run --example batch_evaluation --features parallel

use std::time::Instant;

use trajectory_matcher::{
    engine, Detection, Detector, DetectorTable, EngineConfig, ReferenceStay, ReferenceTrajectory,
};

const ROUTES: [&str; 4] = ["ABCD", "DCBA", "ACBD", "BDAC"];

fn main() {
    println!("Batch Evaluation Example\n");

    let detectors = DetectorTable::new(vec![
        Detector::new("A", 0.0, 0.0),
        Detector::new("B", 120.0, 0.0),
        Detector::new("C", 120.0, 120.0),
        Detector::new("D", 0.0, 120.0),
    ])
    .unwrap();

    let mut detections = Vec::new();
    let mut references = Vec::new();

    for walker in 0..200 {
        let route = ROUTES[walker % ROUTES.len()];
        let h = 0x9e37_79b9_7f4a_7c15u64.wrapping_mul(walker as u64 + 1);
        let raw = format!("{:016x}{:016x}", h, h.rotate_left(29));
        let start = 8.0 * 3600.0 + walker as f64 * 45.0;

        let (walker_detections, reference) = simulate_walk(&format!("walker-{}", walker), &raw, route, start);
        detections.extend(walker_detections);
        references.push(reference);
    }

    println!("Simulated {} walkers, {} detections\n", references.len(), detections.len());

    let config = EngineConfig::default();
    let start = Instant::now();
    let output = engine::run(&detections, &references, &detectors, &config).unwrap();
    let elapsed = start.elapsed();

    println!("Run completed in {:?}\n", elapsed);

    let metrics = &output.evaluation.metrics;
    println!("Stats:");
    println!("  Identities:        {}", output.reconstruction.identities.len());
    println!("  Clusters:          {}", output.reconstruction.clusters.len());
    println!("  Trajectories:      {}", output.reconstruction.trajectories.len());
    println!("  Matched:           {}", metrics.matched);
    println!("  Precision:         {:.3}", metrics.precision);
    println!("  Recall:            {:.3}", metrics.recall);
    println!("  F1:                {:.3}", metrics.f1);
    println!("  Mean similarity:   {:.3}", metrics.mean_similarity);
    println!("  Mean time error:   {:.1}s", metrics.mean_temporal_error);
    println!("  Within tolerance:  {}", metrics.within_tolerance);
    println!("  Route-count RMSE:  {:.3}", output.evaluation.route_counts.rmse);
}

/// Walk `route` starting at `start`, dwelling 4 minutes per detector and
/// emitting a packet every 15 seconds.
fn simulate_walk(id: &str, raw: &str, route: &str, start: f64) -> (Vec<Detection>, ReferenceTrajectory) {
    let mut detections = Vec::new();
    let mut stays = Vec::new();
    let mut t = start;
    let mut seq = (start as u32) % 4096;

    for (i, detector) in route.chars().enumerate() {
        let detector = detector.to_string();
        let arrival = t;
        let departure = t + 240.0;
        while t <= departure {
            seq = (seq + 1) % 4096;
            detections.push(Detection::new(t, detector.as_str(), raw, seq));
            t += 15.0;
        }
        stays.push(ReferenceStay::new(detector, arrival, departure));
        // Walk to the next detector at a leisurely pace
        t = departure + 180.0 + (i as f64) * 5.0;
    }

    (detections, ReferenceTrajectory::new(id, stays))
}
