//! Feature encoding for grade prediction model inference.
//!
//! Turns a validated student record into the 24 named features the
//! classifier was trained on, in the exact training column order.

use crate::types::record::ValidatedRecord;
use tracing::debug;

/// Number of features the model expects.
pub const FEATURE_COUNT: usize = 24;

/// Training-time column order. Reordering this silently changes predictions.
pub const CANONICAL_FEATURE_ORDER: [&str; FEATURE_COUNT] = [
    "Age",
    "Attendance (%)",
    "Midterm_Score",
    "Final_Score",
    "Assignments_Avg",
    "Quizzes_Avg",
    "Participation_Score",
    "Projects_Score",
    "Total_Score",
    "Study_Hours_per_Week",
    "Stress_Level (1-10)",
    "Sleep_Hours_per_Night",
    "Gender_Male",
    "Department_CS",
    "Department_Engineering",
    "Department_Mathematics",
    "Extracurricular_Activities_Yes",
    "Internet_Access_at_Home_Yes",
    "Parent_Education_Level_High School",
    "Parent_Education_Level_Master's",
    "Parent_Education_Level_PhD",
    "Parent_Education_Level_Unknown",
    "Family_Income_Level_Low",
    "Family_Income_Level_Medium",
];

/// Department assumed when the record carries none.
pub const DEFAULT_DEPARTMENT: &str = "CS";

/// Weights of the derived `Total_Score`: midterm, final, assignments, quizzes, projects.
pub const TOTAL_SCORE_WEIGHTS: [f64; 5] = [0.3, 0.4, 0.15, 0.1, 0.05];

/// Sets one indicator column when any pattern occurs in the lowercased value.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorRule {
    pub patterns: &'static [&'static str],
    pub column: &'static str,
}

/// Ordered substring rules for one categorical field.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRules {
    /// Columns of the group that are declared zero before matching
    pub columns: &'static [&'static str],
    /// Evaluated in order; the first match wins
    pub rules: &'static [IndicatorRule],
    /// Column set when nothing matches, if any
    pub fallback: Option<&'static str>,
}

impl CategoryRules {
    /// Indicator column selected for a raw value.
    pub fn select(&self, value: &str) -> Option<&'static str> {
        let value = value.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.patterns.iter().any(|p| value.contains(p)))
            .map(|rule| rule.column)
            .or(self.fallback)
    }
}

pub const DEPARTMENT_RULES: CategoryRules = CategoryRules {
    columns: &[
        "Department_CS",
        "Department_Engineering",
        "Department_Mathematics",
    ],
    rules: &[
        IndicatorRule {
            patterns: &["cs", "computer"],
            column: "Department_CS",
        },
        IndicatorRule {
            patterns: &["eng", "engineering"],
            column: "Department_Engineering",
        },
        IndicatorRule {
            patterns: &["math", "mathematics"],
            column: "Department_Mathematics",
        },
    ],
    fallback: Some("Department_CS"),
};

// "Unknown" is only written on fallback, never declared with the others.
pub const PARENT_EDUCATION_RULES: CategoryRules = CategoryRules {
    columns: &[
        "Parent_Education_Level_High School",
        "Parent_Education_Level_Master's",
        "Parent_Education_Level_PhD",
    ],
    rules: &[
        IndicatorRule {
            patterns: &["high", "secondary"],
            column: "Parent_Education_Level_High School",
        },
        IndicatorRule {
            patterns: &["master"],
            column: "Parent_Education_Level_Master's",
        },
        IndicatorRule {
            patterns: &["phd", "doctorate"],
            column: "Parent_Education_Level_PhD",
        },
    ],
    fallback: Some("Parent_Education_Level_Unknown"),
};

// High income is the absence of both indicators.
pub const FAMILY_INCOME_RULES: CategoryRules = CategoryRules {
    columns: &["Family_Income_Level_Low", "Family_Income_Level_Medium"],
    rules: &[
        IndicatorRule {
            patterns: &["low"],
            column: "Family_Income_Level_Low",
        },
        IndicatorRule {
            patterns: &["medium", "mid"],
            column: "Family_Income_Level_Medium",
        },
    ],
    fallback: None,
};

/// Values read as "male" for `Gender_Male`.
pub const MALE_VALUES: &[&str] = &["male", "m", "1"];

/// Values read as "yes" for the binary `*_Yes` columns.
pub const AFFIRMATIVE_VALUES: &[&str] = &["yes", "y", "true", "1"];

/// Exact, case-insensitive membership test.
fn flag(value: &str, accepted: &[&str]) -> f64 {
    let value = value.to_lowercase();
    if accepted.contains(&value.as_str()) {
        1.0
    } else {
        0.0
    }
}

/// `Total_Score` derived from the graded components.
pub fn total_score(record: &ValidatedRecord) -> f64 {
    let [midterm, final_exam, assignments, quizzes, projects] = TOTAL_SCORE_WEIGHTS;
    record.midterm_score * midterm
        + record.final_score * final_exam
        + record.assignments_avg * assignments
        + record.quizzes_avg * quizzes
        + record.projects_score * projects
}

/// Fixed-order, fully encoded feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl EncodedFeatureVector {
    /// Position of a named column.
    pub fn index_of(name: &str) -> Option<usize> {
        CANONICAL_FEATURE_ORDER.iter().position(|&n| n == name)
    }

    /// Arrange named columns into canonical order.
    ///
    /// Canonical columns that were not produced are zero; produced columns
    /// outside the canonical order are dropped. A column produced twice keeps
    /// its last value.
    pub fn reindex<'a, I>(columns: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut values = [0.0; FEATURE_COUNT];
        for (name, value) in columns {
            match Self::index_of(name) {
                Some(i) => values[i] = value,
                None => debug!(column = name, "Dropping column outside the trained schema"),
            }
        }
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        Self::index_of(name).map(|i| self.values[i])
    }

    pub fn set(&mut self, name: &str, value: f64) -> bool {
        match Self::index_of(name) {
            Some(i) => {
                self.values[i] = value;
                true
            }
            None => false,
        }
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    /// (name, value) pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        CANONICAL_FEATURE_ORDER.iter().copied().zip(self.values.iter().copied())
    }

    /// Single-precision copy for the model input tensor.
    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }
}

/// Feature encoder that transforms validated records into model input features.
///
/// Deterministic and total: every validated record encodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeatureEncoder;

impl FeatureEncoder {
    /// Create a new feature encoder.
    pub fn new() -> Self {
        Self
    }

    /// Encode a validated record.
    pub fn encode(&self, record: &ValidatedRecord) -> EncodedFeatureVector {
        let mut columns: Vec<(&'static str, f64)> = Vec::with_capacity(FEATURE_COUNT);

        // Numeric features, renamed
        columns.push(("Age", record.age));
        columns.push(("Attendance (%)", record.attendance));
        columns.push(("Midterm_Score", record.midterm_score));
        columns.push(("Final_Score", record.final_score));
        columns.push(("Assignments_Avg", record.assignments_avg));
        columns.push(("Quizzes_Avg", record.quizzes_avg));
        columns.push(("Participation_Score", record.participation_score));
        columns.push(("Projects_Score", record.projects_score));
        columns.push(("Study_Hours_per_Week", record.study_hours_per_week));
        columns.push(("Stress_Level (1-10)", record.stress_level));
        columns.push(("Sleep_Hours_per_Night", record.sleep_hours_per_night));

        // Derived
        columns.push(("Total_Score", total_score(record)));

        // Binary categorical
        columns.push(("Gender_Male", flag(&record.gender, MALE_VALUES)));
        columns.push((
            "Extracurricular_Activities_Yes",
            flag(&record.extracurricular_activities, AFFIRMATIVE_VALUES),
        ));
        columns.push((
            "Internet_Access_at_Home_Yes",
            flag(&record.internet_access_at_home, AFFIRMATIVE_VALUES),
        ));

        // One-hot categorical
        let department = record.department.as_deref().unwrap_or(DEFAULT_DEPARTMENT);
        push_category(&mut columns, &DEPARTMENT_RULES, department);
        push_category(
            &mut columns,
            &PARENT_EDUCATION_RULES,
            &record.parent_education_level,
        );
        push_category(&mut columns, &FAMILY_INCOME_RULES, &record.family_income_level);

        EncodedFeatureVector::reindex(columns)
    }
}

fn push_category(columns: &mut Vec<(&'static str, f64)>, group: &CategoryRules, value: &str) {
    columns.extend(group.columns.iter().map(|&c| (c, 0.0)));
    if let Some(column) = group.select(value) {
        columns.push((column, 1.0));
    }
}
