//! Raw and validated student records

use crate::error::PredictionError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single raw value as supplied by a form or a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    /// Arrays and objects; never valid, kept so the error can echo them
    Other(serde_json::Value),
}

impl FieldValue {
    /// Numeric reading of the value, if it has one.
    ///
    /// Strings are trimmed before parsing; booleans read as 1.0 / 0.0.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => n.as_f64(),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Null | FieldValue::Other(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Other(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n.into())
    }
}

/// A present key always deserializes to `Some`, even when its value is `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<FieldValue>, D::Error>
where
    D: Deserializer<'de>,
{
    FieldValue::deserialize(deserializer).map(Some)
}

/// Student record exactly as received. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, deserialize_with = "present")]
    pub age: Option<FieldValue>,
    #[serde(default, deserialize_with = "present")]
    pub gender: Option<FieldValue>,
    #[serde(default, deserialize_with = "present")]
    pub attendance: Option<FieldValue>,
    #[serde(default, deserialize_with = "present")]
    pub midterm_score: Option<FieldValue>,
    #[serde(default, deserialize_with = "present")]
    pub final_score: Option<FieldValue>,
    #[serde(default, deserialize_with = "present")]
    pub assignments_avg: Option<FieldValue>,
    #[serde(default, deserialize_with = "present")]
    pub quizzes_avg: Option<FieldValue>,
    #[serde(default, deserialize_with = "present")]
    pub participation_score: Option<FieldValue>,
    #[serde(default, deserialize_with = "present")]
    pub projects_score: Option<FieldValue>,
    #[serde(default, deserialize_with = "present")]
    pub study_hours_per_week: Option<FieldValue>,
    #[serde(default, deserialize_with = "present")]
    pub extracurricular_activities: Option<FieldValue>,
    #[serde(default, deserialize_with = "present")]
    pub internet_access_at_home: Option<FieldValue>,
    #[serde(default, deserialize_with = "present")]
    pub parent_education_level: Option<FieldValue>,
    #[serde(default, deserialize_with = "present")]
    pub family_income_level: Option<FieldValue>,
    #[serde(default, deserialize_with = "present")]
    pub stress_level: Option<FieldValue>,
    #[serde(default, deserialize_with = "present")]
    pub sleep_hours_per_night: Option<FieldValue>,
    /// Not required; the encoder falls back to "CS" when absent
    #[serde(default, deserialize_with = "present")]
    pub department: Option<FieldValue>,
}

impl RawRecord {
    /// Look up a field by its wire name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.slot(name).and_then(|v| v.as_ref())
    }

    /// Set a field by its wire name. Unknown names are ignored.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) {
        if let Some(slot) = self.slot_mut(name) {
            *slot = Some(value.into());
        }
    }

    /// Clear a field by its wire name.
    pub fn remove(&mut self, name: &str) {
        if let Some(slot) = self.slot_mut(name) {
            *slot = None;
        }
    }

    fn slot(&self, name: &str) -> Option<&Option<FieldValue>> {
        let slot = match name {
            "age" => &self.age,
            "gender" => &self.gender,
            "attendance" => &self.attendance,
            "midterm_score" => &self.midterm_score,
            "final_score" => &self.final_score,
            "assignments_avg" => &self.assignments_avg,
            "quizzes_avg" => &self.quizzes_avg,
            "participation_score" => &self.participation_score,
            "projects_score" => &self.projects_score,
            "study_hours_per_week" => &self.study_hours_per_week,
            "extracurricular_activities" => &self.extracurricular_activities,
            "internet_access_at_home" => &self.internet_access_at_home,
            "parent_education_level" => &self.parent_education_level,
            "family_income_level" => &self.family_income_level,
            "stress_level" => &self.stress_level,
            "sleep_hours_per_night" => &self.sleep_hours_per_night,
            "department" => &self.department,
            _ => return None,
        };
        Some(slot)
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut Option<FieldValue>> {
        let slot = match name {
            "age" => &mut self.age,
            "gender" => &mut self.gender,
            "attendance" => &mut self.attendance,
            "midterm_score" => &mut self.midterm_score,
            "final_score" => &mut self.final_score,
            "assignments_avg" => &mut self.assignments_avg,
            "quizzes_avg" => &mut self.quizzes_avg,
            "participation_score" => &mut self.participation_score,
            "projects_score" => &mut self.projects_score,
            "study_hours_per_week" => &mut self.study_hours_per_week,
            "extracurricular_activities" => &mut self.extracurricular_activities,
            "internet_access_at_home" => &mut self.internet_access_at_home,
            "parent_education_level" => &mut self.parent_education_level,
            "family_income_level" => &mut self.family_income_level,
            "stress_level" => &mut self.stress_level,
            "sleep_hours_per_night" => &mut self.sleep_hours_per_night,
            "department" => &mut self.department,
            _ => return None,
        };
        Some(slot)
    }

    /// Convert a JSON payload element into a record.
    ///
    /// Only JSON objects are records; anything else is rejected here so the
    /// validator never sees an unknown shape.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, PredictionError> {
        if !value.is_object() {
            return Err(PredictionError::MalformedRecord(format!(
                "expected a JSON object, got {value}"
            )));
        }
        RawRecord::deserialize(value).map_err(|e| PredictionError::MalformedRecord(e.to_string()))
    }

    /// Build a record from submitted form fields; every value is a string.
    pub fn from_form(fields: HashMap<String, String>) -> Self {
        let mut record = RawRecord::default();
        for (name, value) in fields {
            record.set(&name, FieldValue::Text(value));
        }
        record
    }
}

/// Record whose required fields are present and whose numeric fields parsed.
///
/// Categorical fields hold their textual form, before any case folding.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub age: f64,
    pub attendance: f64,
    pub midterm_score: f64,
    pub final_score: f64,
    pub assignments_avg: f64,
    pub quizzes_avg: f64,
    pub participation_score: f64,
    pub projects_score: f64,
    pub study_hours_per_week: f64,
    pub stress_level: f64,
    pub sleep_hours_per_night: f64,
    pub gender: String,
    pub extracurricular_activities: String,
    pub internet_access_at_home: String,
    pub parent_education_level: String,
    pub family_income_level: String,
    pub department: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_deserialization_ignores_unknown_keys() {
        let value = json!({
            "age": 21,
            "gender": "Male",
            "total_score": 78.8,
            "department": "CS"
        });

        let record = RawRecord::from_json(&value).unwrap();
        assert_eq!(record.age, Some(FieldValue::Number(21.into())));
        assert_eq!(record.field("gender"), Some(&FieldValue::from("Male")));
        assert_eq!(record.field("department"), Some(&FieldValue::from("CS")));
        assert!(record.field("attendance").is_none());
        assert!(record.field("total_score").is_none());
    }

    #[test]
    fn test_null_value_counts_as_present() {
        let record = RawRecord::from_json(&json!({ "age": null })).unwrap();
        assert_eq!(record.field("age"), Some(&FieldValue::Null));
        assert_eq!(record.field("age").and_then(FieldValue::as_f64), None);
    }

    #[test]
    fn test_non_object_is_malformed() {
        let err = RawRecord::from_json(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, PredictionError::MalformedRecord(_)));
    }

    #[test]
    fn test_numeric_readings() {
        assert_eq!(FieldValue::from(" 12.5 ").as_f64(), Some(12.5));
        assert_eq!(FieldValue::from("abc").as_f64(), None);
        assert_eq!(FieldValue::Bool(true).as_f64(), Some(1.0));
        assert_eq!(FieldValue::Number(7.into()).as_f64(), Some(7.0));
    }

    #[test]
    fn test_from_form_keeps_strings() {
        let mut fields = HashMap::new();
        fields.insert("age".to_string(), "21".to_string());
        fields.insert("unused".to_string(), "x".to_string());

        let record = RawRecord::from_form(fields);
        assert_eq!(record.field("age"), Some(&FieldValue::from("21")));
        assert_eq!(record.field("age").and_then(FieldValue::as_f64), Some(21.0));
    }
}
