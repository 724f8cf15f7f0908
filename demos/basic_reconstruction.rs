//! Basic example of reconstructing one walker and scoring it.
//!
//! Run with: cargo run --example basic_reconstruction

use trajectory_matcher::{
    engine, pairwise_movements, Detection, Detector, DetectorTable, EngineConfig, ReferenceStay,
    ReferenceTrajectory,
};

fn main() {
    // Four detectors at the corners of a 60m x 60m square
    let detectors = DetectorTable::new(vec![
        Detector::new("A", 0.0, 0.0),
        Detector::new("B", 60.0, 0.0),
        Detector::new("C", 60.0, 60.0),
        Detector::new("D", 0.0, 60.0),
    ])
    .expect("valid detector table");

    let nine = 9.0 * 3600.0;
    let mut detections = Vec::new();
    let mut seq = 0;

    // The phone rotates its hash once while at C
    for (detector, raw, from, to) in [
        ("A", "3f9a1c7e5b2d8f4a6c0e", 0.0, 240.0),
        ("B", "3f9a1c7e5b2d8f4a6c0e", 300.0, 600.0),
        ("C", "3f9a1c7e5b2d8f4a6c0f", 700.0, 900.0),
        ("D", "3f9a1c7e5b2d8f4a6c0f", 1000.0, 1200.0),
    ] {
        let mut t = from;
        while t <= to {
            seq += 1;
            detections.push(Detection::new(nine + t, detector, raw, seq));
            t += 20.0;
        }
    }

    // A spurious packet at D while the walker is at A: an impossible move
    detections.push(Detection::new(nine + 10.0, "D", "3f9a1c7e5b2d8f4a6c0e", 900));

    let reference = ReferenceTrajectory::new(
        "walker-1",
        vec![
            ReferenceStay::new("A", nine, nine + 240.0),
            ReferenceStay::new("B", nine + 300.0, nine + 600.0),
            ReferenceStay::new("C", nine + 700.0, nine + 900.0),
            ReferenceStay::new("D", nine + 1000.0, nine + 1200.0),
        ],
    );

    let mut config = EngineConfig::default();
    config.merge.similarity_threshold = 0.9;

    println!("Trajectory Reconstruction Example\n");
    println!(
        "Config: merge threshold={}, walker speed={} m/s, merge gap={}s\n",
        config.merge.similarity_threshold, config.cluster.max_walker_speed, config.cluster.merge_gap_seconds
    );

    let output = match engine::run(&detections, &[reference.clone()], &detectors, &config) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Run failed: {}", e);
            return;
        }
    };

    let reconstruction = &output.reconstruction;
    println!("Identities: {}", reconstruction.identities.len());
    for identity in reconstruction.identities.identities() {
        println!("  {} <- {:?}", identity.id, identity.members);
    }

    println!("\nTrajectories: {}", reconstruction.trajectories.len());
    for t in &reconstruction.trajectories {
        println!("  {} route={} stays={}", t.id, t.route, t.stays.len());
    }

    let evaluation = &output.evaluation;
    println!("\nMatches:");
    for m in &evaluation.matches {
        println!(
            "  {} <-> {}: similarity {:.3}, mean temporal error {:?}",
            m.reference_id, m.reconstructed_id, m.similarity, m.mean_temporal_error
        );
    }

    let metrics = &evaluation.metrics;
    println!("\nMetrics:");
    println!("  Precision: {:.3}", metrics.precision);
    println!("  Recall:    {:.3}", metrics.recall);
    println!("  F1:        {:.3}", metrics.f1);
    println!("  Route-count MAE: {:.3}", evaluation.route_counts.mae);

    println!("\nPairwise movements (30 min bins):");
    match pairwise_movements(&[reference], &reconstruction.trajectories, 30) {
        Ok(rows) => {
            for row in rows {
                println!(
                    "  {}@{} -> {}@{}: reference {} reconstructed {}",
                    row.origin, row.origin_bin, row.destination, row.destination_bin, row.reference_count,
                    row.reconstructed_count
                );
            }
        }
        Err(e) => eprintln!("Pairwise counting failed: {}", e),
    }
}
