//! Type definitions for the grade prediction service

pub mod prediction;
pub mod record;

pub use prediction::{Grade, GradePrediction, PredictionOutcome};
pub use record::{FieldValue, RawRecord, ValidatedRecord};
