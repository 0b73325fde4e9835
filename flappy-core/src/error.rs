use std::fmt;

/// Rejected configuration. Raised before any simulation work starts.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    NonPositive { field: &'static str, value: f64 },
    Negative { field: &'static str, value: f64 },
    NonFinite { field: &'static str },
    ZeroCount { field: &'static str },
    FloorBelowCeiling { floor: f64, ceiling: f64 },
    EmptyGapRange { min: i32, max: i32 },
    EmptyTargets,
    ZeroTarget,
    ZeroGenerationCeiling,
    EmptySweep { field: &'static str },
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    MaskSize { expected: usize, actual: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositive { field, value } => {
                write!(f, "{field} must be > 0, got {value}")
            }
            Self::Negative { field, value } => {
                write!(f, "{field} must be >= 0, got {value}")
            }
            Self::NonFinite { field } => write!(f, "{field} must be finite"),
            Self::ZeroCount { field } => write!(f, "{field} must be >= 1"),
            Self::FloorBelowCeiling { floor, ceiling } => write!(
                f,
                "floor height ({floor}) must be below the ceiling ({ceiling}) in screen space"
            ),
            Self::EmptyGapRange { min, max } => {
                write!(f, "gap-top range [{min}, {max}) is empty")
            }
            Self::EmptyTargets => write!(f, "at least one target score is required"),
            Self::ZeroTarget => write!(f, "target scores must be >= 1"),
            Self::ZeroGenerationCeiling => write!(f, "generation ceiling must be >= 1"),
            Self::EmptySweep { field } => write!(f, "sweep parameter {field} is empty"),
            Self::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "{field} must lie in [{min}, {max}], got {value}"),
            Self::MaskSize { expected, actual } => write!(
                f,
                "pixel mask needs {expected} bits for its width x height, got {actual}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

pub fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NonFinite { field });
    }
    if value <= 0.0 {
        return Err(ConfigError::NonPositive { field, value });
    }
    Ok(())
}

pub fn require_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NonFinite { field });
    }
    if value < 0.0 {
        return Err(ConfigError::Negative { field, value });
    }
    Ok(())
}

pub fn require_in_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NonFinite { field });
    }
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}
