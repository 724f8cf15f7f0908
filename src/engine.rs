//! # Batch Engine
//!
//! Runs the whole pipeline over one complete batch:
//! detections → identity merge → feasibility clustering → stays & routes →
//! matching against references.
//!
//! All configuration and detector references are checked before any work is
//! done, so a run either completes or fails without partial output.

use log::{info, warn};

use crate::clustering::Cluster;
use crate::error::{Result, TrajectoryError};
use crate::evaluation::EvaluationResult;
use crate::identity::{merge_detections, IdentityMap};
use crate::stays::{build_trajectories, route_string, ReconstructedTrajectory};
use crate::{Detection, DetectorTable, EngineConfig, ReferenceTrajectory};

/// Output of [`reconstruct`].
#[derive(Debug, Clone, Default)]
pub struct Reconstruction {
    pub identities: IdentityMap,
    pub clusters: Vec<Cluster>,
    pub trajectories: Vec<ReconstructedTrajectory>,
}

/// Output of [`run`].
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub reconstruction: Reconstruction,
    pub evaluation: EvaluationResult,
}

/// Check that every detection has a finite timestamp and a known detector.
pub fn validate_detections(detections: &[Detection], detectors: &DetectorTable) -> Result<()> {
    for detection in detections {
        let context = format!("detection of '{}' at t={}", detection.raw_identifier, detection.timestamp);
        if !detection.timestamp.is_finite() {
            return Err(TrajectoryError::InvalidTimestamp {
                context,
                reason: "timestamp must be finite".to_string(),
            });
        }
        detectors.require(&detection.detector_id, &context)?;
    }
    Ok(())
}

/// Check that every reference stay has a finite, ordered interval and a known
/// detector.
///
/// A route string disagreeing with its stays is only logged; stays are
/// authoritative.
pub fn validate_references(references: &[ReferenceTrajectory], detectors: &DetectorTable) -> Result<()> {
    for reference in references {
        let context = format!("reference trajectory '{}'", reference.id);
        for stay in &reference.stays {
            if !stay.arrival.is_finite() || !stay.departure.is_finite() || stay.arrival > stay.departure {
                return Err(TrajectoryError::InvalidTimestamp {
                    context,
                    reason: format!(
                        "stay at '{}' must satisfy finite arrival <= departure, got {}..{}",
                        stay.detector_id, stay.arrival, stay.departure
                    ),
                });
            }
            detectors.require(&stay.detector_id, &context)?;
        }
        let derived = route_string(&reference.stays);
        if derived != reference.route {
            warn!(
                "Reference '{}' route '{}' disagrees with its stays ('{}')",
                reference.id, reference.route, derived
            );
        }
    }
    Ok(())
}

/// Reconstruct trajectories from raw detections.
pub fn reconstruct(detections: &[Detection], detectors: &DetectorTable, config: &EngineConfig) -> Result<Reconstruction> {
    config.validate()?;
    validate_detections(detections, detectors)?;

    if detections.is_empty() {
        warn!("No detections to reconstruct");
    }

    let identities = merge_detections(detections, &config.merge)?;
    let groups = identities.group_detections(detections);

    #[cfg(feature = "parallel")]
    let clusters = crate::clustering::cluster_identities_parallel(&groups, detectors, &config.cluster)?;
    #[cfg(not(feature = "parallel"))]
    let clusters = crate::clustering::cluster_identities(&groups, detectors, &config.cluster)?;

    let trajectories = build_trajectories(&clusters, &config.stays)?;

    info!(
        "Reconstructed {} trajectories from {} detections ({} identities, {} clusters)",
        trajectories.len(),
        detections.len(),
        identities.len(),
        clusters.len()
    );

    Ok(Reconstruction {
        identities,
        clusters,
        trajectories,
    })
}

/// Match reconstructed trajectories against references.
pub fn evaluate(
    references: &[ReferenceTrajectory],
    reconstructed: &[ReconstructedTrajectory],
    detectors: &DetectorTable,
    config: &EngineConfig,
) -> Result<EvaluationResult> {
    config.matching.validate()?;
    validate_references(references, detectors)?;

    #[cfg(feature = "parallel")]
    let result = crate::evaluation::evaluate_trajectories_parallel(references, reconstructed, &config.matching)?;
    #[cfg(not(feature = "parallel"))]
    let result = crate::evaluation::evaluate_trajectories(references, reconstructed, &config.matching)?;

    Ok(result)
}

/// Reconstruct, then evaluate against references.
pub fn run(
    detections: &[Detection],
    references: &[ReferenceTrajectory],
    detectors: &DetectorTable,
    config: &EngineConfig,
) -> Result<RunOutput> {
    // References are checked up front so a bad reference fails before any work
    validate_references(references, detectors)?;
    let reconstruction = reconstruct(detections, detectors, config)?;
    let evaluation = evaluate(references, &reconstruction.trajectories, detectors, config)?;
    Ok(RunOutput {
        reconstruction,
        evaluation,
    })
}
