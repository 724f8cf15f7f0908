//! # Geometric Utilities
//!
//! Planar distance and travel-time computations between detectors.
//!
//! Detector positions are site-plan coordinates in meters (`x`, `y`), so all
//! distances here are plain euclidean distances rather than great-circle ones.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`euclidean_distance`] | Straight-line distance between two detectors |
//! | [`min_travel_time`] | Fastest plausible walk between two detectors |
//! | [`is_feasible_transition`] | Whether an elapsed time allows the walk |
//!
//! ## Example
//!
//! ```rust
//! use trajectory_matcher::{Detector, geo_utils};
//!
//! let a = Detector::new("A", 0.0, 0.0);
//! let b = Detector::new("B", 140.0, 0.0);
//!
//! let t = geo_utils::min_travel_time(&a, &b, 1.4).unwrap();
//! assert!((t - 100.0).abs() < 1e-9);
//! ```

use geo::{Distance, Euclidean};

use crate::error::{Result, TrajectoryError};
use crate::Detector;

// =============================================================================
// Distance Functions
// =============================================================================

/// Straight-line distance between two detectors in meters.
#[inline]
pub fn euclidean_distance(a: &Detector, b: &Detector) -> f64 {
    Euclidean::distance(a.position(), b.position())
}

/// Minimum time in seconds a walker needs to get from `a` to `b`.
///
/// `max_speed` is the conservative upper bound on walking speed (m/s).
/// A negative or NaN result means the detector table or speed is malformed
/// and is reported as [`TrajectoryError::InvalidTravelTime`].
///
/// # Example
///
/// ```rust
/// use trajectory_matcher::{Detector, geo_utils};
///
/// let a = Detector::new("A", 0.0, 0.0);
/// let b = Detector::new("B", 100.0, 0.0);
///
/// // 100m at 1.4 m/s
/// let t = geo_utils::min_travel_time(&a, &b, 1.4).unwrap();
/// assert!((t - 71.428).abs() < 0.01);
/// ```
pub fn min_travel_time(a: &Detector, b: &Detector, max_speed: f64) -> Result<f64> {
    let time = euclidean_distance(a, b) / max_speed;
    if time.is_nan() || time < 0.0 {
        return Err(TrajectoryError::InvalidTravelTime {
            from: a.id.clone(),
            to: b.id.clone(),
            value: time,
        });
    }
    Ok(time)
}

/// Check whether `actual_gap` seconds is enough to cover `min_travel_time`.
///
/// The comparison is non-strict: a gap exactly equal to the scaled minimum
/// travel time is feasible.
#[inline]
pub fn is_feasible_transition(actual_gap: f64, min_travel_time: f64, factor: f64) -> bool {
    actual_gap >= min_travel_time * factor
}

// =============================================================================
// Unit Tests
// =============================================================================
