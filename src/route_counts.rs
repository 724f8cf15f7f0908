//! # Route-Pattern Counts
//!
//! Compares how many people took each timed route in the reference set with
//! how many reconstructed trajectories landed on it.
//!
//! A timed route key pairs the route with the time of day of each stay, e.g.
//! `"AB_0900-0910_1000-1010"`, so the same spatial route walked at different
//! times counts separately. A reconstructed trajectory that passes the strict
//! tolerance check against some reference is counted under that reference's
//! key; otherwise it opens its own key with no reference count.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::evaluation::within_tolerance;
use crate::stays::{StayTiming, TrajectoryView};
use crate::time_utils::hhmm;

/// Counts for one timed route key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteCountEntry {
    pub route_key: String,
    pub reference_count: usize,
    pub reconstructed_count: usize,
    /// `|reference_count - reconstructed_count|`
    pub error: usize,
    pub reference_ids: Vec<String>,
    pub reconstructed_ids: Vec<String>,
}

/// Route-count comparison summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteCountMetrics {
    /// Sorted by route key
    pub entries: Vec<RouteCountEntry>,
    /// Mean absolute count error per key
    pub mae: f64,
    /// Root mean squared count error per key
    pub rmse: f64,
    /// Share of keys whose counts agree exactly
    pub tracking_rate: f64,
    pub total_absolute_error: usize,
    pub total_reference: usize,
    pub total_reconstructed: usize,
}

/// Timed route key of a trajectory: `"{route}_{HHMM-HHMM}_{HHMM-HHMM}..."`.
///
/// # Example
/// ```
/// use trajectory_matcher::{ReferenceStay, ReferenceTrajectory};
/// use trajectory_matcher::route_counts::timed_route_key;
///
/// let t = ReferenceTrajectory::new("gt", vec![
///     ReferenceStay::new("A", 9.0 * 3600.0, 9.0 * 3600.0 + 600.0),
///     ReferenceStay::new("B", 10.0 * 3600.0, 10.0 * 3600.0 + 600.0),
/// ]);
/// assert_eq!(timed_route_key(&t), "AB_0900-0910_1000-1010");
/// ```
pub fn timed_route_key<T: TrajectoryView>(trajectory: &T) -> String {
    let times: Vec<String> = trajectory
        .stays()
        .iter()
        .map(|s| format!("{}-{}", hhmm(s.arrival()), hhmm(s.departure())))
        .collect();
    format!("{}_{}", trajectory.route(), times.join("_"))
}

/// Count references and reconstructions per timed route key.
pub fn compute_route_counts<R, C>(references: &[R], reconstructed: &[C], tolerance: f64) -> RouteCountMetrics
where
    R: TrajectoryView,
    C: TrajectoryView,
{
    let mut entries: BTreeMap<String, RouteCountEntry> = BTreeMap::new();

    for reference in references {
        let key = timed_route_key(reference);
        let entry = entries.entry(key.clone()).or_insert_with(|| RouteCountEntry {
            route_key: key,
            ..RouteCountEntry::default()
        });
        entry.reference_count += 1;
        entry.reference_ids.push(reference.id().to_string());
    }

    for candidate in reconstructed {
        let key = references
            .iter()
            .find(|r| within_tolerance(*r, candidate, tolerance))
            .map(timed_route_key)
            .unwrap_or_else(|| timed_route_key(candidate));
        let entry = entries.entry(key.clone()).or_insert_with(|| RouteCountEntry {
            route_key: key,
            ..RouteCountEntry::default()
        });
        entry.reconstructed_count += 1;
        entry.reconstructed_ids.push(candidate.id().to_string());
    }

    let entries: Vec<RouteCountEntry> = entries
        .into_values()
        .map(|mut e| {
            e.error = e.reference_count.abs_diff(e.reconstructed_count);
            e
        })
        .collect();

    let keys = entries.len();
    let total_absolute_error: usize = entries.iter().map(|e| e.error).sum();
    let (mae, rmse, tracking_rate) = if keys == 0 {
        (0.0, 0.0, 0.0)
    } else {
        let n = keys as f64;
        let squared: f64 = entries.iter().map(|e| (e.error as f64).powi(2)).sum();
        let exact = entries.iter().filter(|e| e.error == 0).count();
        (total_absolute_error as f64 / n, (squared / n).sqrt(), exact as f64 / n)
    };

    RouteCountMetrics {
        entries,
        mae,
        rmse,
        tracking_rate,
        total_absolute_error,
        total_reference: references.len(),
        total_reconstructed: reconstructed.len(),
    }
}
