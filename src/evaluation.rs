//! # Matching & Accuracy Metrics
//!
//! Pairs reconstructed trajectories with reference trajectories through an
//! optimal one-to-one assignment on DTW similarity, rejects weak pairs, and
//! summarizes the result.
//!
//! ## Algorithm
//! 1. Build the similarity matrix (rows: references, columns: reconstructed).
//! 2. Solve the assignment maximizing total similarity, padding the smaller
//!    side with zero-similarity dummies.
//! 3. Reject assigned pairs below `min_similarity`; both sides become unmatched.
//! 4. For every accepted pair, report per-detector temporal errors.
//! 5. Aggregate precision, recall, F1, mean similarity and mean temporal error.

use std::collections::HashMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::assignment::maximize_similarity;
use crate::error::Result;
use crate::route_counts::{compute_route_counts, RouteCountMetrics};
use crate::similarity::{similarity_matrix, SimilarityMatrix};
use crate::stays::{StayTiming, TrajectoryView};
use crate::MatchConfig;

// ============================================================================
// Types
// ============================================================================

/// Timing error at one detector shared by both sides of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorTemporalError {
    pub detector_id: String,
    /// 0 for the first visit to this detector, 1 for the second, ...
    pub visit: usize,
    pub arrival_error: f64,
    pub departure_error: f64,
    pub duration_error: f64,
}

impl DetectorTemporalError {
    /// Mean of the arrival and departure errors.
    pub fn mean_error(&self) -> f64 {
        (self.arrival_error + self.departure_error) / 2.0
    }
}

/// An accepted reference/reconstructed pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub reference_id: String,
    pub reconstructed_id: String,
    pub similarity: f64,
    /// Length-normalized DTW distance
    pub distance: f64,
    /// One entry per detector visit present on both sides, in reference order
    pub per_detector_temporal_error: Vec<DetectorTemporalError>,
    /// Mean over `per_detector_temporal_error`; `None` when no detector is shared
    pub mean_temporal_error: Option<f64>,
    /// Same route and every stay inside the reference stay widened by the tolerance
    pub within_tolerance: bool,
}

/// Aggregate accuracy of one evaluation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub total_reference: usize,
    pub total_reconstructed: usize,
    pub matched: usize,
    /// `matched / total_reconstructed`, 0 when there is nothing reconstructed
    pub precision: f64,
    /// `matched / total_reference`, 0 when there is no reference
    pub recall: f64,
    /// Harmonic mean of precision and recall, 0 when both are 0
    pub f1: f64,
    pub mean_similarity: f64,
    /// Seconds, over matches sharing at least one detector
    pub mean_temporal_error: f64,
    /// Matches passing the strict tolerance check
    pub within_tolerance: usize,
}

/// Complete outcome of matching reconstructed against reference trajectories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Accepted matches, in reference order
    pub matches: Vec<Match>,
    pub unmatched_reference_ids: Vec<String>,
    pub unmatched_reconstructed_ids: Vec<String>,
    pub metrics: EvaluationMetrics,
    pub route_counts: RouteCountMetrics,
}

// ============================================================================
// Per-match details
// ============================================================================

/// Per-detector errors between two stay sequences.
///
/// The k-th visit of a detector on one side is paired with the k-th visit of
/// the same detector on the other side. Visits without a counterpart are
/// omitted.
pub fn temporal_errors<R, C>(reference: &[R], reconstructed: &[C]) -> Vec<DetectorTemporalError>
where
    R: StayTiming,
    C: StayTiming,
{
    let mut visits: HashMap<&str, Vec<&C>> = HashMap::new();
    for stay in reconstructed {
        visits.entry(stay.detector_id()).or_default().push(stay);
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut errors = Vec::new();

    for stay in reference {
        let detector = stay.detector_id();
        let visit = seen.entry(detector).or_insert(0);
        let k = *visit;
        *visit += 1;

        let Some(other) = visits.get(detector).and_then(|v| v.get(k)) else {
            continue;
        };
        errors.push(DetectorTemporalError {
            detector_id: detector.to_string(),
            visit: k,
            arrival_error: (stay.arrival() - other.arrival()).abs(),
            departure_error: (stay.departure() - other.departure()).abs(),
            duration_error: (stay.duration() - other.duration()).abs(),
        });
    }

    errors
}

/// Strict acceptance test used by route-count evaluation.
///
/// Passes when both trajectories have the same route and, stay by stay, the
/// reconstructed arrival and departure both fall inside
/// `[reference.arrival - tolerance, reference.departure + tolerance]`.
pub fn within_tolerance<R, C>(reference: &R, reconstructed: &C, tolerance: f64) -> bool
where
    R: TrajectoryView,
    C: TrajectoryView,
{
    let (ref_stays, rec_stays) = (reference.stays(), reconstructed.stays());
    if reference.route() != reconstructed.route() || ref_stays.len() != rec_stays.len() {
        return false;
    }

    ref_stays.iter().zip(rec_stays).all(|(r, c)| {
        let lo = r.arrival() - tolerance;
        let hi = r.departure() + tolerance;
        r.detector_id() == c.detector_id()
            && (lo..=hi).contains(&c.arrival())
            && (lo..=hi).contains(&c.departure())
    })
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

// ============================================================================
// Metrics
// ============================================================================

/// Aggregate metrics over accepted matches.
///
/// Empty sets never divide by zero: every ratio over an empty denominator is 0.
pub fn compute_metrics(matches: &[Match], total_reference: usize, total_reconstructed: usize) -> EvaluationMetrics {
    let matched = matches.len();
    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

    let precision = ratio(matched, total_reconstructed);
    let recall = ratio(matched, total_reference);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    EvaluationMetrics {
        total_reference,
        total_reconstructed,
        matched,
        precision,
        recall,
        f1,
        mean_similarity: mean(matches.iter().map(|m| m.similarity)).unwrap_or(0.0),
        mean_temporal_error: mean(matches.iter().filter_map(|m| m.mean_temporal_error)).unwrap_or(0.0),
        within_tolerance: matches.iter().filter(|m| m.within_tolerance).count(),
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Evaluate using a precomputed similarity matrix.
///
/// `matrix` must have been computed over the same `references` (rows) and
/// `reconstructed` (columns).
pub fn evaluate_with_matrix<R, C>(
    references: &[R],
    reconstructed: &[C],
    matrix: &SimilarityMatrix,
    config: &MatchConfig,
) -> EvaluationResult
where
    R: TrajectoryView,
    C: TrajectoryView,
{
    if references.is_empty() {
        warn!("Evaluating against an empty reference set");
    }
    if reconstructed.is_empty() {
        warn!("Evaluating an empty reconstructed set");
    }

    let mut reference_matched = vec![false; references.len()];
    let mut reconstructed_matched = vec![false; reconstructed.len()];
    let mut matches = Vec::new();

    for (row, col) in maximize_similarity(&matrix.similarities()) {
        let (Some(reference), Some(candidate), Some(pair)) =
            (references.get(row), reconstructed.get(col), matrix.get(row, col))
        else {
            continue;
        };

        if pair.similarity < config.min_similarity {
            debug!(
                "Rejected {} <-> {} (similarity {:.3} < {:.3})",
                reference.id(),
                candidate.id(),
                pair.similarity,
                config.min_similarity
            );
            continue;
        }

        let errors = temporal_errors(reference.stays(), candidate.stays());
        let mean_temporal_error = mean(errors.iter().map(DetectorTemporalError::mean_error));

        reference_matched[row] = true;
        reconstructed_matched[col] = true;
        matches.push(Match {
            reference_id: reference.id().to_string(),
            reconstructed_id: candidate.id().to_string(),
            similarity: pair.similarity,
            distance: pair.distance,
            per_detector_temporal_error: errors,
            mean_temporal_error,
            within_tolerance: within_tolerance(reference, candidate, config.tolerance_seconds),
        });
    }

    let unmatched_reference_ids: Vec<String> = references
        .iter()
        .zip(&reference_matched)
        .filter(|(_, matched)| !**matched)
        .map(|(t, _)| t.id().to_string())
        .collect();
    let unmatched_reconstructed_ids: Vec<String> = reconstructed
        .iter()
        .zip(&reconstructed_matched)
        .filter(|(_, matched)| !**matched)
        .map(|(t, _)| t.id().to_string())
        .collect();

    let metrics = compute_metrics(&matches, references.len(), reconstructed.len());
    info!(
        "Matched {}/{} references ({} reconstructed): precision {:.3}, recall {:.3}, F1 {:.3}",
        metrics.matched, metrics.total_reference, metrics.total_reconstructed, metrics.precision, metrics.recall, metrics.f1
    );

    EvaluationResult {
        matches,
        unmatched_reference_ids,
        unmatched_reconstructed_ids,
        metrics,
        route_counts: compute_route_counts(references, reconstructed, config.tolerance_seconds),
    }
}

/// Match reconstructed trajectories against references and compute metrics.
///
/// # Example
/// ```
/// use trajectory_matcher::{evaluate_trajectories, MatchConfig, ReferenceStay, ReferenceTrajectory};
///
/// let reference = ReferenceTrajectory::new("gt", vec![
///     ReferenceStay::new("A", 0.0, 300.0),
///     ReferenceStay::new("B", 330.0, 660.0),
/// ]);
/// let reconstructed = vec![reference.clone()];
///
/// let result = evaluate_trajectories(&[reference], &reconstructed, &MatchConfig::default()).unwrap();
/// assert_eq!(result.metrics.matched, 1);
/// assert_eq!(result.matches[0].similarity, 1.0);
/// ```
pub fn evaluate_trajectories<R, C>(references: &[R], reconstructed: &[C], config: &MatchConfig) -> Result<EvaluationResult>
where
    R: TrajectoryView,
    C: TrajectoryView,
{
    config.validate()?;
    let matrix = similarity_matrix(references, reconstructed, config);
    Ok(evaluate_with_matrix(references, reconstructed, &matrix, config))
}

/// Match and compute metrics, building the similarity matrix in parallel.
#[cfg(feature = "parallel")]
pub fn evaluate_trajectories_parallel<R, C>(
    references: &[R],
    reconstructed: &[C],
    config: &MatchConfig,
) -> Result<EvaluationResult>
where
    R: TrajectoryView + Sync,
    C: TrajectoryView + Sync,
{
    config.validate()?;
    let matrix = crate::similarity::similarity_matrix_parallel(references, reconstructed, config);
    Ok(evaluate_with_matrix(references, reconstructed, &matrix, config))
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
    fn test_revisits_pair_by_visit_order() {
        let reference = traj("r", &[("A", 0.0, 100.0), ("B", 200.0, 300.0), ("A", 400.0, 500.0)]);
        let candidate = traj("c", &[("A", 10.0, 100.0), ("B", 200.0, 300.0), ("A", 400.0, 520.0)]);
        let errors = temporal_errors(&reference.stays, &candidate.stays);

        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].visit, 0);
        assert_eq!(errors[0].arrival_error, 10.0);
        assert_eq!(errors[2].detector_id, "A");
        assert_eq!(errors[2].visit, 1);
        assert_eq!(errors[2].departure_error, 20.0);
        assert_eq!(errors[2].duration_error, 20.0);
    }

    #[test]
    fn test_one_sided_detectors_omitted() {
        let reference = traj("r", &[("A", 0.0, 100.0), ("C", 200.0, 300.0)]);
        let candidate = traj("c", &[("A", 0.0, 100.0), ("B", 200.0, 300.0)]);
        let errors = temporal_errors(&reference.stays, &candidate.stays);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].detector_id, "A");
    }

    #[test]
    fn test_tolerance_check() {
        let reference = traj("r", &[("A", 1000.0, 1300.0), ("B", 1400.0, 1600.0)]);
        let close = traj("c", &[("A", 900.0, 1350.0), ("B", 1450.0, 1500.0)]);
        let late = traj("l", &[("A", 1000.0, 1300.0), ("B", 1400.0, 3000.0)]);
        let other_route = traj("o", &[("B", 1000.0, 1300.0), ("A", 1400.0, 1600.0)]);

        assert!(within_tolerance(&reference, &close, 1200.0));
        assert!(!within_tolerance(&reference, &late, 1200.0));
        assert!(!within_tolerance(&reference, &other_route, 1200.0));
    }

    #[test]
    fn test_metrics_empty_sets() {
        let metrics = compute_metrics(&[], 0, 0);
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.recall, 0.0);
        assert_eq!(metrics.f1, 0.0);
        assert_eq!(metrics.mean_similarity, 0.0);
    }

    #[test]
    fn test_low_similarity_rejected_post_assignment() {
        let config = MatchConfig {
            min_similarity: 0.5,
            ..MatchConfig::default()
        };
        let references = vec![traj("r", &[("A", 0.0, 100.0)])];
        let reconstructed = vec![traj("c", &[("B", 0.0, 100.0)])];

        let result = evaluate_trajectories(&references, &reconstructed, &config).unwrap();
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_reference_ids, vec!["r"]);
        assert_eq!(result.unmatched_reconstructed_ids, vec!["c"]);
        assert_eq!(result.metrics.f1, 0.0);
    }

    #[test]
    fn test_no_shared_detector_has_no_temporal_error() {
        let config = MatchConfig {
            min_similarity: 0.0,
            ..MatchConfig::default()
        };
        let references = vec![traj("r", &[("A", 0.0, 100.0)]), traj("r2", &[("A", 0.0, 100.0)])];
        let reconstructed = vec![traj("c", &[("A", 20.0, 100.0)]), traj("c2", &[("B", 0.0, 100.0)])];

        let result = evaluate_trajectories(&references, &reconstructed, &config).unwrap();
        assert_eq!(result.matches.len(), 2);
        let mismatched = result.matches.iter().find(|m| m.reconstructed_id == "c2").unwrap();
        assert_eq!(mismatched.mean_temporal_error, None);
        // Only the shared-detector match contributes: (20 + 0) / 2
        assert_eq!(result.metrics.mean_temporal_error, 10.0);
    }
}
