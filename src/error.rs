//! Record-level error taxonomy for the prediction pipeline

/// Failure of a single record somewhere between validation and scoring.
///
/// The `Display` text is the message returned to callers as `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictionError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {value}. Must be a number.")]
    InvalidNumericField { field: &'static str, value: String },

    /// The payload element could not be read as a record at all
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Model not loaded correctly")]
    ModelUnavailable,

    #[error("{0}")]
    Scoring(String),

    #[error("Batch size exceeds maximum limit of {limit} records")]
    BatchTooLarge { limit: usize },
}

impl PredictionError {
    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            PredictionError::MissingField(_) => "missing_field",
            PredictionError::InvalidNumericField { .. } => "invalid_numeric_field",
            PredictionError::MalformedRecord(_) => "malformed_record",
            PredictionError::ModelUnavailable => "model_unavailable",
            PredictionError::Scoring(_) => "scoring",
            PredictionError::BatchTooLarge { .. } => "batch_too_large",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_wire_format() {
        assert_eq!(
            PredictionError::MissingField("age").to_string(),
            "Missing required field: age"
        );
        assert_eq!(
            PredictionError::InvalidNumericField {
                field: "attendance",
                value: "lots".to_string()
            }
            .to_string(),
            "Invalid value for attendance: lots. Must be a number."
        );
        assert_eq!(
            PredictionError::BatchTooLarge { limit: 100 }.to_string(),
            "Batch size exceeds maximum limit of 100 records"
        );
    }
}
