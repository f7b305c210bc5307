//! Prediction result data structures

use crate::error::PredictionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Letter grade predicted by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
    Unknown,
}

impl Grade {
    /// Grades in class-index order (index 0 is `A`)
    pub const CLASSES: [Grade; 5] = [Grade::A, Grade::B, Grade::C, Grade::D, Grade::F];

    /// Map a class index from the model to a grade
    pub fn from_class_index(index: i64) -> Self {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::CLASSES.get(i).copied())
            .unwrap_or(Grade::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
            Grade::Unknown => "Unknown",
        }
    }
}

/// Successful prediction for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradePrediction {
    pub predicted_grade: Grade,
    /// Probability per grade, rounded to two decimals
    pub confidence: BTreeMap<Grade, f64>,
}

/// Result for one record: a prediction or the error that stopped it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutcome {
    Prediction(GradePrediction),
    Failure { error: String },
}

impl PredictionOutcome {
    pub fn failure(error: &PredictionError) -> Self {
        PredictionOutcome::Failure {
            error: error.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PredictionOutcome::Failure { .. })
    }

    pub fn prediction(&self) -> Option<&GradePrediction> {
        match self {
            PredictionOutcome::Prediction(p) => Some(p),
            PredictionOutcome::Failure { .. } => None,
        }
    }
}

impl From<Result<GradePrediction, PredictionError>> for PredictionOutcome {
    fn from(result: Result<GradePrediction, PredictionError>) -> Self {
        match result {
            Ok(prediction) => PredictionOutcome::Prediction(prediction),
            Err(e) => PredictionOutcome::failure(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_index_mapping() {
        assert_eq!(Grade::from_class_index(0), Grade::A);
        assert_eq!(Grade::from_class_index(4), Grade::F);
        assert_eq!(Grade::from_class_index(5), Grade::Unknown);
        assert_eq!(Grade::from_class_index(-1), Grade::Unknown);
    }

    #[test]
    fn test_outcome_json_shape() {
        let confidence: BTreeMap<Grade, f64> = Grade::CLASSES
            .iter()
            .zip([0.1, 0.6, 0.2, 0.05, 0.05])
            .map(|(g, p)| (*g, p))
            .collect();
        let outcome = PredictionOutcome::Prediction(GradePrediction {
            predicted_grade: Grade::B,
            confidence,
        });

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["predicted_grade"], "B");
        assert_eq!(json["confidence"]["A"], 0.1);
        assert_eq!(json["confidence"].as_object().unwrap().len(), 5);

        let failure = PredictionOutcome::failure(&PredictionError::MissingField("age"));
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            serde_json::json!({ "error": "Missing required field: age" })
        );
    }
}
