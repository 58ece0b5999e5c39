use std::ops::Deref;

use crate::model::Model;
use crate::models::{FieldValue, StudentRecord, PREDICTED_CGPA};

/// Features the GPA regressor was trained on, used when the artifact does
/// not record its own feature names.
pub const GPA_FALLBACK_FEATURES: &[&str] = &[
    "Attendance_Percentage",
    "Study_Hours_Per_Week",
    "Previous_CGPA",
    "G1_Internal",
    "G2_Internal",
    "Final_Exam_Score",
    "Age",
    "Backlogs",
    "Semester",
    "Parent_Education_Level",
    "Gender",
    "Department",
    "Part_Time_Work",
];

/// Risk classifier fallback: the GPA features plus the predicted CGPA.
pub const RISK_FALLBACK_FEATURES: &[&str] = &[
    "Attendance_Percentage",
    "Study_Hours_Per_Week",
    "Previous_CGPA",
    "G1_Internal",
    "G2_Internal",
    "Final_Exam_Score",
    "Age",
    "Backlogs",
    "Semester",
    "Parent_Education_Level",
    "Gender",
    "Department",
    "Part_Time_Work",
    PREDICTED_CGPA,
];

/// Ordered feature names a model consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    fields: Vec<String>,
    from_artifact: bool,
}

impl FeatureSchema {
    /// Uses the model's recorded feature names when it has any, otherwise
    /// `fallback`.
    pub fn resolve(model: &dyn Model, fallback: &[&str]) -> Self {
        match model.feature_names() {
            Some(names) if !names.is_empty() => Self {
                fields: names.to_vec(),
                from_artifact: true,
            },
            _ => Self {
                fields: fallback.iter().map(|name| name.to_string()).collect(),
                from_artifact: false,
            },
        }
    }

    pub fn from_artifact(&self) -> bool {
        self.from_artifact
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|name| name == field)
    }

    /// Aligns `record` to this schema. Missing fields come back as
    /// `FieldValue::Absent`, which encodes to zero (or the default category);
    /// fields outside the schema are dropped.
    pub fn reconcile(&self, record: &StudentRecord) -> StudentRecord {
        self.fields
            .iter()
            .map(|field| {
                let value = record.get(field).cloned().unwrap_or(FieldValue::Absent);
                (field.clone(), value)
            })
            .collect()
    }
}

impl Deref for FeatureSchema {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.fields
    }
}
