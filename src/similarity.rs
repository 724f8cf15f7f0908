//! # Trajectory Similarity
//!
//! Dynamic time warping over stay sequences. Two stays at the same detector
//! cost the weighted difference of their arrival and departure times; stays at
//! different detectors cost a fixed mismatch penalty. The DTW total is divided
//! by the warping-path length so long and short trajectories score on the same
//! scale, then mapped to a similarity in `[0, 1]`.

use log::info;
use serde::{Deserialize, Serialize};

use crate::stays::{StayTiming, TrajectoryView};
use crate::MatchConfig;

/// Cost of aligning stay `a` with stay `b`.
pub fn step_cost<A: StayTiming, B: StayTiming>(a: &A, b: &B, config: &MatchConfig) -> f64 {
    if a.detector_id() != b.detector_id() {
        return config.mismatch_penalty;
    }
    config.arrival_weight * (a.arrival() - b.arrival()).abs()
        + config.departure_weight * (a.departure() - b.departure()).abs()
}

/// Length-normalized DTW distance between two stay sequences.
///
/// Returns `f64::INFINITY` when either sequence is empty. Identical sequences
/// have distance 0.
///
/// # Example
/// ```
/// use trajectory_matcher::{MatchConfig, ReferenceStay};
/// use trajectory_matcher::similarity::dtw_distance;
///
/// let a = vec![ReferenceStay::new("A", 0.0, 60.0), ReferenceStay::new("B", 120.0, 180.0)];
/// let b = vec![ReferenceStay::new("A", 10.0, 70.0), ReferenceStay::new("B", 120.0, 180.0)];
///
/// // Diagonal path of length 2: (10 + 0) / 2
/// assert_eq!(dtw_distance(&a, &b, &MatchConfig::default()), 5.0);
/// ```
pub fn dtw_distance<A: StayTiming, B: StayTiming>(a: &[A], b: &[B], config: &MatchConfig) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::INFINITY;
    }

    let (n, m) = (a.len(), b.len());
    let cols = m + 1;
    // Accumulated cost and path length, (n+1) x (m+1) with an infinite border
    let mut cost = vec![f64::INFINITY; (n + 1) * cols];
    let mut steps = vec![0usize; (n + 1) * cols];
    cost[0] = 0.0;

    for i in 1..=n {
        for j in 1..=m {
            let local = step_cost(&a[i - 1], &b[j - 1], config);

            // Diagonal wins ties so equal-length identical sequences align 1:1
            let diag = (i - 1) * cols + (j - 1);
            let up = (i - 1) * cols + j;
            let left = i * cols + (j - 1);
            let mut best = diag;
            if cost[up] < cost[best] {
                best = up;
            }
            if cost[left] < cost[best] {
                best = left;
            }

            let idx = i * cols + j;
            cost[idx] = local + cost[best];
            steps[idx] = steps[best] + 1;
        }
    }

    let last = n * cols + m;
    cost[last] / steps[last] as f64
}

/// Map a DTW distance to a similarity in `[0, 1]`.
///
/// Non-finite distances map to 0.
pub fn distance_to_similarity(distance: f64, scale: f64) -> f64 {
    if !distance.is_finite() || distance < 0.0 {
        return 0.0;
    }
    1.0 / (1.0 + distance / scale)
}

/// Distance and similarity of one trajectory pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairSimilarity {
    pub distance: f64,
    pub similarity: f64,
}

/// Compare a reference trajectory with a reconstructed one.
pub fn compare_trajectories<R, C>(reference: &R, reconstructed: &C, config: &MatchConfig) -> PairSimilarity
where
    R: TrajectoryView,
    C: TrajectoryView,
{
    let distance = dtw_distance(reference.stays(), reconstructed.stays(), config);
    PairSimilarity {
        distance,
        similarity: distance_to_similarity(distance, config.similarity_scale),
    }
}

/// Pairwise similarities between every reference and reconstructed trajectory.
///
/// Rows follow the reference order, columns the reconstructed order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatrix {
    pub reference_ids: Vec<String>,
    pub reconstructed_ids: Vec<String>,
    /// Row-major `rows x cols`
    pub pairs: Vec<Vec<PairSimilarity>>,
}

impl SimilarityMatrix {
    pub fn rows(&self) -> usize {
        self.reference_ids.len()
    }

    pub fn cols(&self) -> usize {
        self.reconstructed_ids.len()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&PairSimilarity> {
        self.pairs.get(row).and_then(|r| r.get(col))
    }

    /// Similarity values only, row-major.
    pub fn similarities(&self) -> Vec<Vec<f64>> {
        self.pairs
            .iter()
            .map(|row| row.iter().map(|p| p.similarity).collect())
            .collect()
    }
}

fn ids<T: TrajectoryView>(trajectories: &[T]) -> Vec<String> {
    trajectories.iter().map(|t| t.id().to_string()).collect()
}

/// Compute the full similarity matrix.
pub fn similarity_matrix<R, C>(references: &[R], reconstructed: &[C], config: &MatchConfig) -> SimilarityMatrix
where
    R: TrajectoryView,
    C: TrajectoryView,
{
    let pairs: Vec<Vec<PairSimilarity>> = references
        .iter()
        .map(|r| {
            reconstructed
                .iter()
                .map(|c| compare_trajectories(r, c, config))
                .collect()
        })
        .collect();

    info!(
        "Computed {}x{} similarity matrix",
        references.len(),
        reconstructed.len()
    );

    SimilarityMatrix {
        reference_ids: ids(references),
        reconstructed_ids: ids(reconstructed),
        pairs,
    }
}

/// Compute the full similarity matrix using parallel processing.
///
/// Rows are independent, so the result is identical to [`similarity_matrix`].
#[cfg(feature = "parallel")]
pub fn similarity_matrix_parallel<R, C>(
    references: &[R],
    reconstructed: &[C],
    config: &MatchConfig,
) -> SimilarityMatrix
where
    R: TrajectoryView + Sync,
    C: TrajectoryView + Sync,
{
    use rayon::prelude::*;

    let pairs: Vec<Vec<PairSimilarity>> = references
        .par_iter()
        .map(|r| {
            reconstructed
                .iter()
                .map(|c| compare_trajectories(r, c, config))
                .collect()
        })
        .collect();

    info!(
        "Computed {}x{} similarity matrix (parallel)",
        references.len(),
        reconstructed.len()
    );

    SimilarityMatrix {
        reference_ids: ids(references),
        reconstructed_ids: ids(reconstructed),
        pairs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReferenceStay, ReferenceTrajectory};

    fn traj(id: &str, stays: &[(&str, f64, f64)]) -> ReferenceTrajectory {
        ReferenceTrajectory::new(
            id,
            stays
                .iter()
                .map(|&(d, a, b)| ReferenceStay::new(d, a, b))
                .collect(),
        )
    }

    #[test]
    fn test_identical_trajectories_score_one() {
        let a = traj("a", &[("A", 0.0, 100.0), ("B", 200.0, 300.0), ("A", 400.0, 500.0)]);
        let pair = compare_trajectories(&a, &a, &MatchConfig::default());
        assert_eq!(pair.distance, 0.0);
        assert_eq!(pair.similarity, 1.0);
    }

    #[test]
    fn test_empty_side_scores_zero() {
        let a = traj("a", &[("A", 0.0, 100.0)]);
        let empty = traj("e", &[]);
        let config = MatchConfig::default();
        assert_eq!(compare_trajectories(&a, &empty, &config).similarity, 0.0);
        assert_eq!(compare_trajectories(&empty, &a, &config).similarity, 0.0);
        assert!(dtw_distance::<ReferenceStay, ReferenceStay>(&[], &[], &config).is_infinite());
    }

    #[test]
    fn test_mismatch_penalty_dominates() {
        let config = MatchConfig::default();
        let a = traj("a", &[("A", 0.0, 100.0)]);
        let near_time_wrong_place = traj("b", &[("B", 0.0, 100.0)]);
        let right_place_late = traj("c", &[("A", 600.0, 700.0)]);

        let wrong_place = compare_trajectories(&a, &near_time_wrong_place, &config);
        let late = compare_trajectories(&a, &right_place_late, &config);
        assert_eq!(wrong_place.distance, config.mismatch_penalty);
        assert!(late.similarity > wrong_place.similarity);
    }

    #[test]
    fn test_distance_is_path_normalized() {
        let config = MatchConfig::default();
        let a = traj("a", &[("A", 0.0, 100.0)]);
        let b = traj("b", &[("A", 0.0, 100.0), ("A", 0.0, 160.0)]);
        // Path (0,0) -> (0,1): costs 0 and 30 over two steps
        assert_eq!(compare_trajectories(&a, &b, &config).distance, 15.0);
    }

    #[test]
    fn test_warping_absorbs_extra_stay() {
        // Reconstruction split one stay at A into two
        let config = MatchConfig::default();
        let reference = traj("r", &[("A", 0.0, 100.0), ("B", 200.0, 300.0)]);
        let split = traj("s", &[("A", 0.0, 40.0), ("A", 60.0, 100.0), ("B", 200.0, 300.0)]);
        let pair = compare_trajectories(&reference, &split, &config);
        assert!(pair.distance < config.mismatch_penalty);
        assert!(pair.similarity > 0.5);
    }

    #[test]
    fn test_matrix_shape() {
        let config = MatchConfig::default();
        let refs = vec![traj("r1", &[("A", 0.0, 10.0)]), traj("r2", &[("B", 0.0, 10.0)])];
        let recs = vec![traj("c1", &[("A", 0.0, 10.0)])];
        let matrix = similarity_matrix(&refs, &recs, &config);
        assert_eq!(matrix.rows(), 2);
        assert_eq!(matrix.cols(), 1);
        assert_eq!(matrix.get(0, 0).map(|p| p.similarity), Some(1.0));
        assert!(matrix.get(1, 1).is_none());
        assert_eq!(matrix.similarities()[1][0], 1.0 / (1.0 + 10_800.0 / 300.0));
    }
}
