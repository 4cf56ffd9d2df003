use thiserror::Error;

pub use crate::utilities::validation::ValidationError;

#[derive(Debug, Error)]
pub enum TrialSimError {
    /// Malformed or inconsistent call: bad rate tables, missing rate groups,
    /// mismatched list lengths.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The data cannot support the statistic (zero variance, all-zero
    /// weights, correlation not positive semi-definite).
    #[error("degenerate statistic: {reason}")]
    DegenerateStatistic { reason: String },

    #[error(
        "multivariate normal integration aborted ({reason}) after {points} points: \
         estimate {estimate} +/- {error}"
    )]
    IntegrationAborted {
        reason: String,
        estimate: f64,
        error: f64,
        points: usize,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl TrialSimError {
    pub fn degenerate(reason: impl Into<String>) -> Self {
        TrialSimError::DegenerateStatistic {
            reason: reason.into(),
        }
    }

    /// True for failures that depend on the call rather than the data.
    pub fn is_configuration(&self) -> bool {
        matches!(self, TrialSimError::Validation(_) | TrialSimError::Config(_))
    }
}

impl From<serde_json::Error> for TrialSimError {
    fn from(err: serde_json::Error) -> Self {
        TrialSimError::Config(err.to_string())
    }
}

impl From<std::io::Error> for TrialSimError {
    fn from(err: std::io::Error) -> Self {
        TrialSimError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrialSimError>;
