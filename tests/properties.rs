//! Property-based tests for merging, clustering, assignment and metrics

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use trajectory_matcher::geo_utils::min_travel_time;
use trajectory_matcher::stays::route_string;
use trajectory_matcher::{
    build_trajectories, cluster_identity, evaluate_trajectories, maximize_similarity, merge_identifiers,
    ClusterConfig, ClusteringStrategy, Detection, Detector, DetectorTable, MatchConfig, MergeConfig, ReferenceStay,
    ReferenceTrajectory, StayConfig,
};

fn site() -> DetectorTable {
    DetectorTable::new(vec![
        Detector::new("A", 0.0, 0.0),
        Detector::new("B", 80.0, 0.0),
        Detector::new("C", 80.0, 60.0),
        Detector::new("D", 0.0, 200.0),
    ])
    .unwrap()
}

fn detector_name() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("A"), Just("B"), Just("C"), Just("D")]
}

fn detections() -> impl Strategy<Value = Vec<Detection>> {
    prop::collection::vec((0.0f64..3000.0, detector_name(), 0u32..4096), 1..40).prop_map(|raw| {
        raw.into_iter()
            .map(|(t, d, seq)| Detection::new(t.round(), d, "dev", seq))
            .collect()
    })
}

fn strategy() -> impl Strategy<Value = ClusteringStrategy> {
    prop_oneof![
        Just(ClusteringStrategy::ImpossibleMove),
        (1usize..5).prop_map(|k| ClusteringStrategy::ImpossibleMoveWithWindow { max_lookahead: k }),
        Just(ClusteringStrategy::WindowMax),
    ]
}

fn trajectory(id: String) -> impl Strategy<Value = ReferenceTrajectory> {
    prop::collection::vec((detector_name(), 0.0f64..5000.0, 0.0f64..600.0), 0..5).prop_map(move |stays| {
        ReferenceTrajectory::new(
            id.clone(),
            stays
                .into_iter()
                .map(|(d, arrival, dwell)| ReferenceStay::new(d, arrival, arrival + dwell))
                .collect(),
        )
    })
}

fn trajectories(prefix: &'static str) -> impl Strategy<Value = Vec<ReferenceTrajectory>> {
    (0usize..5).prop_flat_map(move |n| {
        (0..n)
            .map(|i| trajectory(format!("{prefix}{i}")))
            .collect::<Vec<_>>()
    })
}

proptest! {
    #[test]
    fn prop_merge_is_idempotent(
        ids in prop::collection::btree_set("[ab]{1,6}", 1..12),
        families in prop::collection::btree_map("[ab]{1,6}", "c[ab]{0,2}", 0..6),
        targets_listed in any::<bool>(),
        threshold in 0.0f64..=1.0,
    ) {
        let mut static_mapping: HashMap<String, String> = families.into_iter().collect();
        let mut ids: Vec<String> = ids.into_iter().collect();
        if targets_listed {
            let targets: Vec<String> = static_mapping.values().cloned().collect();
            for target in targets {
                static_mapping.insert(target.clone(), target.clone());
                ids.push(target);
            }
        }
        let config = MergeConfig { similarity_threshold: threshold, static_mapping };
        let first = merge_identifiers(&ids, &config).unwrap();
        let canonical: Vec<String> = first.identities().iter().map(|i| i.id.clone()).collect();
        let second = merge_identifiers(&canonical, &config).unwrap();

        prop_assert_eq!(second.len(), first.len());
        for id in &canonical {
            prop_assert_eq!(second.canonical_of(id), id.as_str());
        }
    }

    #[test]
    fn prop_merge_partitions_every_identifier(
        ids in prop::collection::vec("[abc]{2,5}", 1..15),
        threshold in 0.5f64..=1.0,
    ) {
        let config = MergeConfig { similarity_threshold: threshold, ..MergeConfig::default() };
        let map = merge_identifiers(&ids, &config).unwrap();

        let members: usize = map.identities().iter().map(|i| i.members.len()).sum();
        let distinct: HashSet<&String> = ids.iter().collect();
        prop_assert_eq!(members, distinct.len());
        for id in &ids {
            let canonical = map.canonical_of(id);
            prop_assert!(map.identities().iter().any(|i| i.id == canonical && i.members.contains(id)));
        }
    }

    #[test]
    fn prop_no_impossible_move_survives(
        detections in detections(),
        strategy in strategy(),
        factor in 0.5f64..=1.0,
    ) {
        let table = site();
        let config = ClusterConfig { strategy, feasibility_factor: factor, ..ClusterConfig::default() };
        let clusters = cluster_identity("dev", &detections, &table, &config).unwrap();

        let total: usize = clusters.iter().map(|c| c.detection_count()).sum();
        prop_assert_eq!(total, detections.len());

        for cluster in &clusters {
            for pair in cluster.stays.windows(2) {
                if pair[0].detector_id == pair[1].detector_id {
                    continue;
                }
                let from = table.get(&pair[0].detector_id).unwrap();
                let to = table.get(&pair[1].detector_id).unwrap();
                let needed = min_travel_time(from, to, config.max_walker_speed).unwrap();
                let gap = pair[1].first_timestamp() - pair[0].last_timestamp();
                prop_assert!(gap >= needed * factor);
            }
        }
    }

    #[test]
    fn prop_route_matches_stays(detections in detections()) {
        let clusters = cluster_identity("dev", &detections, &site(), &ClusterConfig::default()).unwrap();
        for t in build_trajectories(&clusters, &StayConfig::default()).unwrap() {
            prop_assert_eq!(&t.route, &route_string(&t.stays));
            for stay in &t.stays {
                for d in &stay.detections {
                    prop_assert!(stay.arrival_estimate <= d.timestamp);
                    prop_assert!(d.timestamp <= stay.departure_estimate);
                }
            }
        }
    }

    #[test]
    fn prop_assignment_is_exclusive(
        matrix in (1usize..6, 1usize..6).prop_flat_map(|(r, c)| {
            prop::collection::vec(prop::collection::vec(0.0f64..=1.0, c), r)
        })
    ) {
        let pairs = maximize_similarity(&matrix);
        let rows: HashSet<usize> = pairs.iter().map(|&(i, _)| i).collect();
        let cols: HashSet<usize> = pairs.iter().map(|&(_, j)| j).collect();

        prop_assert_eq!(rows.len(), pairs.len());
        prop_assert_eq!(cols.len(), pairs.len());
        prop_assert_eq!(pairs.len(), matrix.len().min(matrix[0].len()));
    }

    #[test]
    fn prop_assignment_beats_every_permutation(
        matrix in prop::collection::vec(prop::collection::vec(0.0f64..=1.0, 3), 3)
    ) {
        let pairs = maximize_similarity(&matrix);
        let best: f64 = pairs.iter().map(|&(i, j)| matrix[i][j]).sum();

        let permutations = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for p in permutations {
            let total: f64 = (0..3).map(|i| matrix[i][p[i]]).sum();
            prop_assert!(best >= total - 1e-9);
        }
    }

    #[test]
    fn prop_metrics_are_bounded(
        references in trajectories("g"),
        reconstructed in trajectories("e"),
        min_similarity in 0.0f64..=1.0,
    ) {
        let config = MatchConfig { min_similarity, ..MatchConfig::default() };
        let result = evaluate_trajectories(&references, &reconstructed, &config).unwrap();
        let m = &result.metrics;

        for value in [m.precision, m.recall, m.f1, m.mean_similarity] {
            prop_assert!((0.0..=1.0).contains(&value));
        }
        if m.precision == 0.0 && m.recall == 0.0 {
            prop_assert_eq!(m.f1, 0.0);
        }
        for matched in &result.matches {
            prop_assert!((0.0..=1.0).contains(&matched.similarity));
            prop_assert!(matched.similarity >= min_similarity);
        }

        let refs: HashSet<&str> = result.matches.iter().map(|m| m.reference_id.as_str()).collect();
        let recs: HashSet<&str> = result.matches.iter().map(|m| m.reconstructed_id.as_str()).collect();
        prop_assert_eq!(refs.len(), result.matches.len());
        prop_assert_eq!(recs.len(), result.matches.len());
        prop_assert_eq!(result.matches.len() + result.unmatched_reference_ids.len(), references.len());
        prop_assert_eq!(result.matches.len() + result.unmatched_reconstructed_ids.len(), reconstructed.len());
    }
}

#[cfg(feature = "parallel")]
proptest! {
    #[test]
    fn prop_parallel_evaluation_matches_sequential(
        references in trajectories("g"),
        reconstructed in trajectories("e"),
    ) {
        use trajectory_matcher::{evaluate_trajectories_parallel, similarity_matrix, similarity_matrix_parallel};

        let config = MatchConfig::default();
        prop_assert_eq!(
            similarity_matrix(&references, &reconstructed, &config),
            similarity_matrix_parallel(&references, &reconstructed, &config)
        );
        prop_assert_eq!(
            evaluate_trajectories(&references, &reconstructed, &config).unwrap(),
            evaluate_trajectories_parallel(&references, &reconstructed, &config).unwrap()
        );
    }
}
