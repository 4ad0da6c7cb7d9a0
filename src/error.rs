use thiserror::Error;

#[derive(Debug, Error)]
pub enum InsightError {
    /// Not enough history to train or score. Recoverable by waiting for more data.
    #[error("insufficient data for {subject}: {available} available, {required} required")]
    InsufficientData {
        subject: String,
        available: usize,
        required: usize,
    },

    #[error("unknown state: {0}")]
    UnknownState(String),

    /// Prediction requested before any successful training run.
    #[error("no trained model for {0}; train the state first")]
    ModelNotFound(String),

    #[error("numerically unstable fit: {0}")]
    NumericInstability(String),

    #[error("invalid series: {0}")]
    InvalidSeries(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("training task for {state} did not complete: {reason}")]
    TaskFailed { state: String, reason: String },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InsightError>;

impl InsightError {
    pub fn insufficient(subject: impl Into<String>, available: usize, required: usize) -> Self {
        InsightError::InsufficientData {
            subject: subject.into(),
            available,
            required,
        }
    }

    /// True for conditions the caller can resolve by waiting for data or training.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            InsightError::InsufficientData { .. } | InsightError::ModelNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_message_names_counts() {
        let err = InsightError::insufficient("Kerala", 3, 20);
        let message = err.to_string();
        assert!(message.contains("Kerala"));
        assert!(message.contains("3 available"));
        assert!(message.contains("20 required"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn input_errors_are_not_recoverable() {
        assert!(!InsightError::UnknownState("Atlantis".into()).is_recoverable());
        assert!(!InsightError::NumericInstability("singular".into()).is_recoverable());
        assert!(InsightError::ModelNotFound("Goa".into()).is_recoverable());
    }
}
