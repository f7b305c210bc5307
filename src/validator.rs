//! Presence and numeric checks on raw records.

use crate::error::PredictionError;
use crate::types::record::{FieldValue, RawRecord, ValidatedRecord};

/// Fields that must be present, in the order they are checked.
pub const REQUIRED_FIELDS: [&str; 16] = [
    "age",
    "gender",
    "attendance",
    "midterm_score",
    "final_score",
    "assignments_avg",
    "quizzes_avg",
    "participation_score",
    "projects_score",
    "study_hours_per_week",
    "extracurricular_activities",
    "internet_access_at_home",
    "parent_education_level",
    "family_income_level",
    "stress_level",
    "sleep_hours_per_night",
];

/// Fields that must convert to a floating-point number, in check order.
pub const NUMERIC_FIELDS: [&str; 11] = [
    "age",
    "attendance",
    "midterm_score",
    "final_score",
    "assignments_avg",
    "quizzes_avg",
    "participation_score",
    "projects_score",
    "study_hours_per_week",
    "stress_level",
    "sleep_hours_per_night",
];

/// Validates raw records and produces an owned, typed copy.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldValidator;

impl FieldValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check a record and convert it.
    ///
    /// Fails on the first missing required field, then on the first numeric
    /// field that does not parse. The input record is left untouched.
    pub fn validate(&self, record: &RawRecord) -> Result<ValidatedRecord, PredictionError> {
        for field in REQUIRED_FIELDS {
            if record.field(field).is_none() {
                return Err(PredictionError::MissingField(field));
            }
        }

        let mut numbers = [0.0_f64; NUMERIC_FIELDS.len()];
        for (slot, field) in numbers.iter_mut().zip(NUMERIC_FIELDS) {
            *slot = numeric(record, field)?;
        }
        let [
            age,
            attendance,
            midterm_score,
            final_score,
            assignments_avg,
            quizzes_avg,
            participation_score,
            projects_score,
            study_hours_per_week,
            stress_level,
            sleep_hours_per_night,
        ] = numbers;

        Ok(ValidatedRecord {
            age,
            attendance,
            midterm_score,
            final_score,
            assignments_avg,
            quizzes_avg,
            participation_score,
            projects_score,
            study_hours_per_week,
            stress_level,
            sleep_hours_per_night,
            gender: text(record, "gender")?,
            extracurricular_activities: text(record, "extracurricular_activities")?,
            internet_access_at_home: text(record, "internet_access_at_home")?,
            parent_education_level: text(record, "parent_education_level")?,
            family_income_level: text(record, "family_income_level")?,
            department: record.field("department").map(FieldValue::to_string),
        })
    }
}

fn numeric(record: &RawRecord, field: &'static str) -> Result<f64, PredictionError> {
    let value = record
        .field(field)
        .ok_or(PredictionError::MissingField(field))?;
    value
        .as_f64()
        .ok_or_else(|| PredictionError::InvalidNumericField {
            field,
            value: value.to_string(),
        })
}

fn text(record: &RawRecord, field: &'static str) -> Result<String, PredictionError> {
    record
        .field(field)
        .map(FieldValue::to_string)
        .ok_or(PredictionError::MissingField(field))
}
