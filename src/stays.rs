//! # Stay & Route Building
//!
//! Turns each [`Cluster`] into a [`ReconstructedTrajectory`]: one finalized
//! [`Stay`] per provisional stay plus the route string.
//!
//! Arrival and departure default to the first and last detection of a stay.
//! A symmetric padding can be configured to account for the walker being
//! present before the first and after the last detected packet, and callers
//! can plug in their own [`StayEstimator`].

use log::info;
use serde::{Deserialize, Serialize};

use crate::clustering::{Cluster, ProvisionalStay};
use crate::error::{ensure_non_negative, Result, TrajectoryError};
use crate::Detection;

// ============================================================================
// Shared trajectory views
// ============================================================================

/// Timing of one stay, shared by reconstructed and reference stays.
pub trait StayTiming {
    fn detector_id(&self) -> &str;
    fn arrival(&self) -> f64;
    fn departure(&self) -> f64;

    fn duration(&self) -> f64 {
        self.departure() - self.arrival()
    }
}

/// Read-only view over a trajectory, reconstructed or reference.
pub trait TrajectoryView {
    type Stay: StayTiming;

    fn id(&self) -> &str;
    fn route(&self) -> &str;
    fn stays(&self) -> &[Self::Stay];
}

/// Concatenate stay detector ids in visit order.
///
/// Repeated visits (A→B→A) are kept.
pub fn route_string<S: StayTiming>(stays: &[S]) -> String {
    stays.iter().map(StayTiming::detector_id).collect()
}

// ============================================================================
// Core Types
// ============================================================================

/// All detections one cluster produced at one detector during one visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stay {
    pub detector_id: String,
    pub detections: Vec<Detection>,
    /// Never later than the first detection
    pub arrival_estimate: f64,
    /// Never earlier than the last detection
    pub departure_estimate: f64,
    /// `departure_estimate - arrival_estimate`, zero for a single unpadded detection
    pub duration: f64,
}

impl Stay {
    pub fn detection_count(&self) -> usize {
        self.detections.len()
    }
}

impl StayTiming for Stay {
    fn detector_id(&self) -> &str {
        &self.detector_id
    }

    fn arrival(&self) -> f64 {
        self.arrival_estimate
    }

    fn departure(&self) -> f64 {
        self.departure_estimate
    }

    fn duration(&self) -> f64 {
        self.duration
    }
}

/// A trajectory reconstructed from one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedTrajectory {
    /// Derived from the cluster id
    pub id: String,
    pub cluster_id: String,
    pub canonical_id: String,
    /// Concatenated detector ids of `stays`, in order
    pub route: String,
    pub stays: Vec<Stay>,
}

impl ReconstructedTrajectory {
    /// Detector ids in visit order.
    pub fn route_detectors(&self) -> Vec<&str> {
        self.stays.iter().map(|s| s.detector_id.as_str()).collect()
    }
}

impl TrajectoryView for ReconstructedTrajectory {
    type Stay = Stay;

    fn id(&self) -> &str {
        &self.id
    }

    fn route(&self) -> &str {
        &self.route
    }

    fn stays(&self) -> &[Stay] {
        &self.stays
    }
}

// ============================================================================
// Estimation
// ============================================================================

/// Estimates a stay's arrival and departure from its detections.
pub trait StayEstimator {
    /// Return `(arrival, departure)` for a non-empty, chronological slice.
    fn estimate(&self, detections: &[Detection]) -> (f64, f64);
}

/// Built-in stay estimators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StayEstimation {
    /// Arrival at the first detection, departure at the last.
    DetectionBounds,
    /// First/last detection widened by `seconds` on both sides.
    SymmetricPadding { seconds: f64 },
}

impl StayEstimator for StayEstimation {
    fn estimate(&self, detections: &[Detection]) -> (f64, f64) {
        let first = detections.first().map_or(0.0, |d| d.timestamp);
        let last = detections.last().map_or(0.0, |d| d.timestamp);
        match self {
            Self::DetectionBounds => (first, last),
            Self::SymmetricPadding { seconds } => (first - seconds, last + seconds),
        }
    }
}

/// Configuration for stay and route building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StayConfig {
    /// How arrival/departure are estimated. Default: detection bounds
    pub estimation: StayEstimation,

    /// Trajectories with fewer stays are not emitted. Default: 1
    pub min_stays: usize,
}

impl Default for StayConfig {
    fn default() -> Self {
        Self {
            estimation: StayEstimation::DetectionBounds,
            min_stays: 1,
        }
    }
}

impl StayConfig {
    pub fn validate(&self) -> Result<()> {
        if let StayEstimation::SymmetricPadding { seconds } = self.estimation {
            ensure_non_negative("estimation.seconds", seconds)?;
        }
        if self.min_stays == 0 {
            return Err(TrajectoryError::config("min_stays", "must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// Building
// ============================================================================

fn finalize_stay<E: StayEstimator + ?Sized>(stay: &ProvisionalStay, estimator: &E) -> Stay {
    let (arrival, departure) = estimator.estimate(&stay.detections);
    // Clamp so every detection stays inside the estimated interval
    let arrival = arrival.min(stay.first_timestamp());
    let departure = departure.max(stay.last_timestamp());

    Stay {
        detector_id: stay.detector_id.clone(),
        detections: stay.detections.clone(),
        arrival_estimate: arrival,
        departure_estimate: departure,
        duration: departure - arrival,
    }
}

/// Build the trajectory of one cluster with a custom estimator.
pub fn build_trajectory_with<E: StayEstimator + ?Sized>(cluster: &Cluster, estimator: &E) -> ReconstructedTrajectory {
    let stays: Vec<Stay> = cluster
        .stays
        .iter()
        .map(|s| finalize_stay(s, estimator))
        .collect();

    ReconstructedTrajectory {
        id: format!("est_{}", cluster.id),
        cluster_id: cluster.id.clone(),
        canonical_id: cluster.canonical_id.clone(),
        route: route_string(&stays),
        stays,
    }
}

/// Build the trajectory of one cluster using the configured estimation.
///
/// # Example
/// ```
/// use trajectory_matcher::{Detection, Detector, DetectorTable};
/// use trajectory_matcher::clustering::{cluster_identity, ClusterConfig};
/// use trajectory_matcher::stays::{build_trajectory, StayConfig};
///
/// let table = DetectorTable::new(vec![
///     Detector::new("A", 0.0, 0.0),
///     Detector::new("B", 100.0, 0.0),
/// ]).unwrap();
/// let detections = vec![
///     Detection::new(0.0, "A", "dev", 1),
///     Detection::new(60.0, "A", "dev", 2),
///     Detection::new(200.0, "B", "dev", 3),
/// ];
///
/// let clusters = cluster_identity("dev", &detections, &table, &ClusterConfig::default()).unwrap();
/// let trajectory = build_trajectory(&clusters[0], &StayConfig::default());
///
/// assert_eq!(trajectory.route, "AB");
/// assert_eq!(trajectory.stays[0].duration, 60.0);
/// ```
pub fn build_trajectory(cluster: &Cluster, config: &StayConfig) -> ReconstructedTrajectory {
    build_trajectory_with(cluster, &config.estimation)
}

/// Build trajectories for many clusters with a custom estimator.
pub fn build_trajectories_with<E: StayEstimator + ?Sized>(
    clusters: &[Cluster],
    estimator: &E,
    min_stays: usize,
) -> Vec<ReconstructedTrajectory> {
    clusters
        .iter()
        .filter(|c| c.stays.len() >= min_stays)
        .map(|c| build_trajectory_with(c, estimator))
        .collect()
}

/// Build one trajectory per cluster, dropping clusters below `min_stays`.
pub fn build_trajectories(clusters: &[Cluster], config: &StayConfig) -> Result<Vec<ReconstructedTrajectory>> {
    config.validate()?;
    let trajectories = build_trajectories_with(clusters, &config.estimation, config.min_stays);
    info!(
        "Built {} trajectories from {} clusters",
        trajectories.len(),
        clusters.len()
    );
    Ok(trajectories)
}
