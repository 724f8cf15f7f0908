//! Unified error handling for trajectory reconstruction and matching.
//!
//! Only configuration and referential problems are errors. Data anomalies
//! (single-detection clusters, empty trajectory sets, zero-length stays) are
//! absorbed by the data model and never surface here.

/// Common result type for reconstruction and matching operations.
pub type Result<T> = std::result::Result<T, TrajectoryError>;

/// Errors that abort a reconstruction or evaluation run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrajectoryError {
    /// A configuration value is outside its valid range.
    #[error("Invalid configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// A detector has unusable coordinates.
    #[error("Invalid detector '{detector_id}': {reason}")]
    InvalidDetector { detector_id: String, reason: String },

    /// The same detector id appears twice in the detector table.
    #[error("Duplicate detector '{detector_id}' in detector table")]
    DuplicateDetector { detector_id: String },

    /// Minimum travel time between two detectors came out negative or NaN.
    #[error("Invalid travel time {value} between detectors '{from}' and '{to}'")]
    InvalidTravelTime { from: String, to: String, value: f64 },

    /// A detection or reference stay carries an unusable time.
    #[error("Invalid timestamp in {context}: {reason}")]
    InvalidTimestamp { context: String, reason: String },

    /// A detection or stay references a detector missing from the table.
    #[error("Unknown detector '{detector_id}' referenced by {context}")]
    UnknownDetector { detector_id: String, context: String },
}

impl TrajectoryError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// True for errors caused by configuration or malformed input (thresholds,
    /// speeds, coordinates, timestamps).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::InvalidDetector { .. }
                | Self::DuplicateDetector { .. }
                | Self::InvalidTravelTime { .. }
                | Self::InvalidTimestamp { .. }
        )
    }

    /// True for errors caused by references to unknown detectors.
    pub fn is_referential(&self) -> bool {
        matches!(self, Self::UnknownDetector { .. })
    }
}

/// Check that a value is a finite number inside `[min, max]`.
pub(crate) fn ensure_in_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(TrajectoryError::config(
            field,
            format!("must be within [{min}, {max}], got {value}"),
        ));
    }
    Ok(())
}

/// Check that a value is finite and strictly positive.
pub(crate) fn ensure_positive(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(TrajectoryError::config(
            field,
            format!("must be a positive finite number, got {value}"),
        ));
    }
    Ok(())
}

/// Check that a value is finite and not negative.
pub(crate) fn ensure_non_negative(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(TrajectoryError::config(
            field,
            format!("must be a non-negative finite number, got {value}"),
        ));
    }
    Ok(())
}
