use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        expected: usize,
        got: usize,
        field: &'static str,
    },
    #[error("{field} cannot be empty")]
    EmptyInput { field: &'static str },
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("{field} contains negative value {value} at index {index}")]
    NegativeValue {
        field: &'static str,
        index: usize,
        value: f64,
    },
    #[error("{field} contains NaN at index {index}")]
    NaNValue { field: &'static str, index: usize },
    #[error("{field} contains infinite value at index {index}")]
    InfiniteValue { field: &'static str, index: usize },
    #[error("{field}: periods for group {group} must be numbered 1..=k in order, found {found} at position {position}")]
    NonContiguousPeriods {
        field: &'static str,
        group: String,
        position: usize,
        found: usize,
    },
    #[error("{field}: no rate periods for stratum {stratum:?}, treatment {treatment:?}")]
    MissingRateGroup {
        field: &'static str,
        stratum: String,
        treatment: String,
    },
    #[error("{field} must sum to 1, got {sum}")]
    ProbabilitySum { field: &'static str, sum: f64 },
}

pub fn validate_length(
    expected: usize,
    got: usize,
    field: &'static str,
) -> Result<(), ValidationError> {
    if expected != got {
        return Err(ValidationError::LengthMismatch {
            expected,
            got,
            field,
        });
    }
    Ok(())
}

pub fn validate_non_empty<T>(slice: &[T], field: &'static str) -> Result<(), ValidationError> {
    if slice.is_empty() {
        return Err(ValidationError::EmptyInput { field });
    }
    Ok(())
}

pub fn validate_non_negative(slice: &[f64], field: &'static str) -> Result<(), ValidationError> {
    for (i, &val) in slice.iter().enumerate() {
        if val < 0.0 {
            return Err(ValidationError::NegativeValue {
                field,
                index: i,
                value: val,
            });
        }
    }
    Ok(())
}

pub fn validate_no_nan(slice: &[f64], field: &'static str) -> Result<(), ValidationError> {
    for (i, &val) in slice.iter().enumerate() {
        if val.is_nan() {
            return Err(ValidationError::NaNValue { field, index: i });
        }
    }
    Ok(())
}

pub fn validate_finite(slice: &[f64], field: &'static str) -> Result<(), ValidationError> {
    validate_no_nan(slice, field)?;
    for (i, &val) in slice.iter().enumerate() {
        if val.is_infinite() {
            return Err(ValidationError::InfiniteValue { field, index: i });
        }
    }
    Ok(())
}

/// Non-negative finite scalar parameter.
pub fn validate_parameter(value: f64, field: &'static str) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::InvalidValue {
            field,
            message: format!("must be finite and >= 0, got {value}"),
        });
    }
    Ok(())
}

pub fn validate_probabilities(probs: &[f64], field: &'static str) -> Result<(), ValidationError> {
    validate_non_empty(probs, field)?;
    validate_finite(probs, field)?;
    validate_non_negative(probs, field)?;
    let sum: f64 = probs.iter().sum();
    if (sum - 1.0).abs() > crate::constants::PROBABILITY_SUM_TOL {
        return Err(ValidationError::ProbabilitySum { field, sum });
    }
    Ok(())
}

pub fn clamp_probability(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
