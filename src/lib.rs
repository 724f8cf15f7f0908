//! # Trajectory Matcher
//!
//! Reconstructs anonymous pedestrian trajectories from noisy proximity-detector
//! logs and scores them against known ground truth.
//!
//! This library provides:
//! - Merging of near-duplicate device identifiers into canonical identities
//! - Feasibility clustering that never keeps a physically impossible move
//! - Stay and route reconstruction per cluster
//! - DTW-based trajectory similarity with optimal one-to-one assignment
//! - Accuracy metrics (precision, recall, F1, temporal errors, route counts)
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel processing with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use trajectory_matcher::{
//!     engine, Detection, Detector, DetectorTable, EngineConfig, ReferenceStay, ReferenceTrajectory,
//! };
//!
//! let detectors = DetectorTable::new(vec![
//!     Detector::new("A", 0.0, 0.0),
//!     Detector::new("B", 40.0, 0.0),
//! ]).unwrap();
//!
//! let detections = vec![
//!     Detection::new(0.0, "A", "phone-1", 1),
//!     Detection::new(300.0, "A", "phone-1", 2),
//!     Detection::new(330.0, "B", "phone-1", 3),
//!     Detection::new(660.0, "B", "phone-1", 4),
//! ];
//!
//! let reference = ReferenceTrajectory::new("gt-1", vec![
//!     ReferenceStay::new("A", 0.0, 300.0),
//!     ReferenceStay::new("B", 330.0, 660.0),
//! ]);
//!
//! let output = engine::run(&detections, &[reference], &detectors, &EngineConfig::default()).unwrap();
//! assert_eq!(output.evaluation.matches.len(), 1);
//! assert!(output.evaluation.metrics.f1 > 0.99);
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;

use geo::Point;
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, TrajectoryError};

// Union-Find data structure for identity merging
pub mod union_find;
pub use union_find::UnionFind;

// Detector distances and travel times
pub mod geo_utils;

// Time-of-day labels for route keys and movement bins
pub mod time_utils;

// Identity merging (edit-distance similarity graph)
pub mod identity;
pub use identity::{merge_detections, merge_identifiers, CanonicalIdentity, IdentityMap, MergeConfig};

// Feasibility clustering
pub mod clustering;
#[cfg(feature = "parallel")]
pub use clustering::cluster_identities_parallel;
pub use clustering::{cluster_identities, cluster_identity, Cluster, ClusterConfig, ClusteringStrategy, ProvisionalStay};

// Stay and route building
pub mod stays;
pub use stays::{
    build_trajectories, build_trajectory, ReconstructedTrajectory, Stay, StayConfig, StayEstimation,
    StayEstimator, StayTiming, TrajectoryView,
};

// DTW similarity between trajectories
pub mod similarity;
#[cfg(feature = "parallel")]
pub use similarity::similarity_matrix_parallel;
pub use similarity::{compare_trajectories, dtw_distance, similarity_matrix, PairSimilarity, SimilarityMatrix};

// Optimal assignment (Kuhn-Munkres)
pub mod assignment;
pub use assignment::{hungarian_assignment, maximize_similarity};

// Matching and accuracy metrics
pub mod evaluation;
#[cfg(feature = "parallel")]
pub use evaluation::evaluate_trajectories_parallel;
pub use evaluation::{evaluate_trajectories, DetectorTemporalError, EvaluationMetrics, EvaluationResult, Match};

// Route-pattern count metrics
pub mod route_counts;
pub use route_counts::{compute_route_counts, RouteCountEntry, RouteCountMetrics};

// Origin-destination movement counts
pub mod pairwise;
pub use pairwise::{pairwise_movements, PairwiseMovement};

// End-to-end batch pipeline
pub mod engine;
pub use engine::{Reconstruction, RunOutput};

// ============================================================================
// Core Types
// ============================================================================

/// One packet observation by one detector.
///
/// Timestamps are seconds on a common clock (e.g. Unix time with millisecond
/// fraction).
///
/// # Example
/// ```
/// use trajectory_matcher::Detection;
/// let d = Detection::new(12.5, "A", "a1b2c3", 100);
/// assert_eq!(d.detector_id, "A");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub timestamp: f64,
    pub detector_id: String,
    /// Hashed payload as advertised by the device
    pub raw_identifier: String,
    /// Packet sequence number (wraps at 4096)
    pub sequence_number: u32,
}

impl Detection {
    pub fn new(
        timestamp: f64,
        detector_id: impl Into<String>,
        raw_identifier: impl Into<String>,
        sequence_number: u32,
    ) -> Self {
        Self {
            timestamp,
            detector_id: detector_id.into(),
            raw_identifier: raw_identifier.into(),
            sequence_number,
        }
    }

    /// Order by timestamp, then sequence number.
    pub fn chronological(a: &Detection, b: &Detection) -> Ordering {
        a.timestamp
            .total_cmp(&b.timestamp)
            .then(a.sequence_number.cmp(&b.sequence_number))
    }
}

/// A proximity detector at a fixed site-plan position (meters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detector {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

impl Detector {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self { id: id.into(), x, y }
    }

    /// Check if the coordinates are finite and non-negative.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.x >= 0.0 && self.y >= 0.0
    }

    pub fn position(&self) -> Point<f64> {
        Point::new(self.x, self.y)
    }
}

/// Lookup table of detector positions.
#[derive(Debug, Clone, Default)]
pub struct DetectorTable {
    detectors: HashMap<String, Detector>,
}

impl DetectorTable {
    /// Build a table, rejecting duplicate ids and unusable coordinates.
    pub fn new(detectors: Vec<Detector>) -> Result<Self> {
        let mut table = HashMap::with_capacity(detectors.len());
        for detector in detectors {
            if !detector.is_valid() {
                return Err(TrajectoryError::InvalidDetector {
                    detector_id: detector.id.clone(),
                    reason: format!(
                        "coordinates must be finite and non-negative, got ({}, {})",
                        detector.x, detector.y
                    ),
                });
            }
            if table.contains_key(&detector.id) {
                return Err(TrajectoryError::DuplicateDetector {
                    detector_id: detector.id,
                });
            }
            table.insert(detector.id.clone(), detector);
        }
        Ok(Self { detectors: table })
    }

    pub fn get(&self, id: &str) -> Option<&Detector> {
        self.detectors.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.detectors.contains_key(id)
    }

    /// Look up a detector, reporting a referential error when it is missing.
    pub fn require(&self, id: &str, context: &str) -> Result<&Detector> {
        self.detectors
            .get(id)
            .ok_or_else(|| TrajectoryError::UnknownDetector {
                detector_id: id.to_string(),
                context: context.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Detector ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.detectors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// One ground-truth stay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceStay {
    pub detector_id: String,
    pub arrival: f64,
    pub departure: f64,
    pub duration: f64,
}

impl ReferenceStay {
    pub fn new(detector_id: impl Into<String>, arrival: f64, departure: f64) -> Self {
        Self {
            detector_id: detector_id.into(),
            arrival,
            departure,
            duration: departure - arrival,
        }
    }
}

impl StayTiming for ReferenceStay {
    fn detector_id(&self) -> &str {
        &self.detector_id
    }

    fn arrival(&self) -> f64 {
        self.arrival
    }

    fn departure(&self) -> f64 {
        self.departure
    }

    fn duration(&self) -> f64 {
        self.duration
    }
}

/// A known-correct trajectory used for evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTrajectory {
    pub id: String,
    pub route: String,
    pub stays: Vec<ReferenceStay>,
}

impl ReferenceTrajectory {
    /// Create a reference trajectory, deriving the route from its stays.
    pub fn new(id: impl Into<String>, stays: Vec<ReferenceStay>) -> Self {
        Self {
            id: id.into(),
            route: stays::route_string(&stays),
            stays,
        }
    }
}

impl TrajectoryView for ReferenceTrajectory {
    type Stay = ReferenceStay;

    fn id(&self) -> &str {
        &self.id
    }

    fn route(&self) -> &str {
        &self.route
    }

    fn stays(&self) -> &[ReferenceStay] {
        &self.stays
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for trajectory matching and evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// DTW step cost when two aligned stays are at different detectors.
    /// Must dwarf any plausible time-based cost. Default: 10800.0 (3 hours)
    pub mismatch_penalty: f64,

    /// Weight of the arrival-time difference in the DTW step cost.
    /// Default: 0.5
    pub arrival_weight: f64,

    /// Weight of the departure-time difference in the DTW step cost.
    /// Default: 0.5
    pub departure_weight: f64,

    /// Seconds of normalized DTW distance that halve the similarity:
    /// `similarity = 1 / (1 + distance / similarity_scale)`. Default: 300.0
    pub similarity_scale: f64,

    /// Assigned pairs below this similarity are rejected as unmatched.
    /// Default: 0.1
    pub min_similarity: f64,

    /// Slack in seconds for the strict per-stay tolerance check.
    /// Default: 1200.0 (20 minutes)
    pub tolerance_seconds: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            mismatch_penalty: 10_800.0,
            arrival_weight: 0.5,
            departure_weight: 0.5,
            similarity_scale: 300.0,
            min_similarity: 0.1,
            tolerance_seconds: 1_200.0,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<()> {
        error::ensure_positive("mismatch_penalty", self.mismatch_penalty)?;
        error::ensure_non_negative("arrival_weight", self.arrival_weight)?;
        error::ensure_non_negative("departure_weight", self.departure_weight)?;
        error::ensure_positive("similarity_scale", self.similarity_scale)?;
        error::ensure_in_range("min_similarity", self.min_similarity, 0.0, 1.0)?;
        error::ensure_non_negative("tolerance_seconds", self.tolerance_seconds)?;
        Ok(())
    }
}

/// All configuration consumed by one reconstruction and evaluation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub merge: MergeConfig,
    pub cluster: ClusterConfig,
    pub stays: StayConfig,
    pub matching: MatchConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.merge.validate()?;
        self.cluster.validate()?;
        self.stays.validate()?;
        self.matching.validate()
    }
}

// ============================================================================
// Tests
// ============================================================================
