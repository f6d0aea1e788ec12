//! Validation of run settings.
//!
//! Settings arrive either from the preset catalog or from an encoded start
//! request. Both paths go through [`validate`] before an engine is built,
//! so the yard model can rely on a non-empty layout and positive clock.

use std::time::Duration;

use dynstack_types::Settings;

/// A settings value the yard model cannot run with.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsViolation {
    /// A stack height or count is zero.
    #[error("{field} must be at least 1")]
    ZeroCapacity {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A duration that drives the clock is zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The lower bound of a range exceeds its upper bound.
    #[error("{min_field} ({min}) exceeds {max_field} ({max})")]
    InvertedRange {
        /// Name of the lower-bound field.
        min_field: &'static str,
        /// Name of the upper-bound field.
        max_field: &'static str,
        /// Lower bound value.
        min: f64,
        /// Upper bound value.
        max: f64,
    },

    /// A ready factor lies outside `[0, 1]` (or is not a number).
    #[error("{field} ({value}) must lie within [0, 1]")]
    FactorOutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },
}

/// Check that `settings` describe a runnable yard.
///
/// # Errors
///
/// Returns the first [`SettingsViolation`] found.
pub fn validate(settings: &Settings) -> Result<(), SettingsViolation> {
    for (field, value) in [
        ("production_max_height", settings.production_max_height),
        ("buffer_max_height", settings.buffer_max_height),
        ("buffer_count", settings.buffer_count),
    ] {
        if value == 0 {
            return Err(SettingsViolation::ZeroCapacity { field });
        }
    }

    for (field, value) in [
        ("check_interval", settings.check_interval),
        ("simulation_duration", settings.simulation_duration),
    ] {
        if value == Duration::ZERO {
            return Err(SettingsViolation::ZeroDuration { field });
        }
    }

    if settings.min_clear_time > settings.max_clear_time {
        return Err(SettingsViolation::InvertedRange {
            min_field: "min_clear_time",
            max_field: "max_clear_time",
            min: settings.min_clear_time.as_secs_f64(),
            max: settings.max_clear_time.as_secs_f64(),
        });
    }

    for (field, value) in [
        ("ready_factor_min", settings.ready_factor_min),
        ("ready_factor_max", settings.ready_factor_max),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(SettingsViolation::FactorOutOfRange { field, value });
        }
    }

    if settings.ready_factor_min > settings.ready_factor_max {
        return Err(SettingsViolation::InvertedRange {
            min_field: "ready_factor_min",
            max_field: "ready_factor_max",
            min: settings.ready_factor_min,
            max: settings.ready_factor_max,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::small_yard;

    #[test]
    fn small_yard_is_valid() {
        assert_eq!(validate(&small_yard()), Ok(()));
    }

    #[test]
    fn zero_buffers_are_rejected() {
        let mut settings = small_yard();
        settings.buffer_count = 0;
        assert_eq!(
            validate(&settings),
            Err(SettingsViolation::ZeroCapacity {
                field: "buffer_count"
            })
        );
    }

    #[test]
    fn zero_check_interval_is_rejected() {
        let mut settings = small_yard();
        settings.check_interval = Duration::ZERO;
        assert!(matches!(
            validate(&settings),
            Err(SettingsViolation::ZeroDuration {
                field: "check_interval"
            })
        ));
    }

    #[test]
    fn inverted_clear_range_is_rejected() {
        let mut settings = small_yard();
        settings.min_clear_time = Duration::from_secs(5);
        assert!(matches!(
            validate(&settings),
            Err(SettingsViolation::InvertedRange {
                min_field: "min_clear_time",
                ..
            })
        ));
    }

    #[test]
    fn nan_ready_factor_is_rejected() {
        let mut settings = small_yard();
        settings.ready_factor_max = f64::NAN;
        assert!(matches!(
            validate(&settings),
            Err(SettingsViolation::FactorOutOfRange {
                field: "ready_factor_max",
                ..
            })
        ));
    }
}
