//! Origin-destination movement counts per time-of-day bin.
//!
//! Every ordered stay pair `i < j` of a trajectory counts as one movement from
//! stay `i`'s detector to stay `j`'s detector, binned by the arrival time at
//! each end. Reference and reconstructed counts are reported side by side.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrajectoryError};
use crate::stays::{StayTiming, TrajectoryView};
use crate::time_utils::time_bin_label;

/// Default bin width in minutes.
pub const DEFAULT_BIN_MINUTES: u32 = 30;

/// Movement count for one `(origin, origin_bin, destination, destination_bin)` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairwiseMovement {
    pub origin: String,
    /// e.g. `"0900~0930"`
    pub origin_bin: String,
    pub destination: String,
    pub destination_bin: String,
    pub reference_count: usize,
    pub reconstructed_count: usize,
}

impl PairwiseMovement {
    pub fn error(&self) -> usize {
        self.reference_count.abs_diff(self.reconstructed_count)
    }
}

type MovementKey = (String, String, String, String);

fn count_movements<T: TrajectoryView>(trajectories: &[T], bin_minutes: u32) -> BTreeMap<MovementKey, usize> {
    let mut counts = BTreeMap::new();
    for trajectory in trajectories {
        let stays = trajectory.stays();
        for (i, origin) in stays.iter().enumerate() {
            let origin_bin = time_bin_label(origin.arrival(), bin_minutes);
            for destination in &stays[i + 1..] {
                let key = (
                    origin.detector_id().to_string(),
                    origin_bin.clone(),
                    destination.detector_id().to_string(),
                    time_bin_label(destination.arrival(), bin_minutes),
                );
                *counts.entry(key).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Count pairwise movements in both sets, sorted by key.
///
/// # Example
/// ```
/// use trajectory_matcher::{pairwise_movements, ReferenceStay, ReferenceTrajectory};
///
/// let t = ReferenceTrajectory::new("gt", vec![
///     ReferenceStay::new("A", 9.0 * 3600.0, 9.0 * 3600.0 + 300.0),
///     ReferenceStay::new("B", 9.0 * 3600.0 + 2400.0, 9.0 * 3600.0 + 2700.0),
/// ]);
/// let rows = pairwise_movements(&[t], &Vec::<ReferenceTrajectory>::new(), 30).unwrap();
///
/// assert_eq!(rows.len(), 1);
/// assert_eq!(rows[0].origin_bin, "0900~0930");
/// assert_eq!(rows[0].destination_bin, "0930~1000");
/// assert_eq!(rows[0].reference_count, 1);
/// ```
pub fn pairwise_movements<R, C>(references: &[R], reconstructed: &[C], bin_minutes: u32) -> Result<Vec<PairwiseMovement>>
where
    R: TrajectoryView,
    C: TrajectoryView,
{
    if bin_minutes == 0 {
        return Err(TrajectoryError::config("bin_minutes", "must be at least 1"));
    }

    let reference_counts = count_movements(references, bin_minutes);
    let mut reconstructed_counts = count_movements(reconstructed, bin_minutes);

    let mut rows: BTreeMap<MovementKey, (usize, usize)> = BTreeMap::new();
    for (key, count) in reference_counts {
        let other = reconstructed_counts.remove(&key).unwrap_or(0);
        rows.insert(key, (count, other));
    }
    for (key, count) in reconstructed_counts {
        rows.insert(key, (0, count));
    }

    Ok(rows
        .into_iter()
        .map(
            |((origin, origin_bin, destination, destination_bin), (reference_count, reconstructed_count))| {
                PairwiseMovement {
                    origin,
                    origin_bin,
                    destination,
                    destination_bin,
                    reference_count,
                    reconstructed_count,
                }
            },
        )
        .collect())
}
