use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const STUDENT_NAME: &str = "Student_Name";
pub const ENROLLMENT_NO: &str = "Enrollment_No";
pub const PREDICTED_CGPA: &str = "predicted_CGPA";
pub const ACADEMIC_RISK_LEVEL: &str = "Academic_Risk_Level";

/// A single attribute value as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
    Absent,
}

impl FieldValue {
    /// Parses a cell from a CSV file or command line.
    pub fn parse_cell(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return FieldValue::Absent;
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return FieldValue::Int(value);
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => FieldValue::Float(value),
            _ => FieldValue::Text(raw.to_string()),
        }
    }

    /// Absent values and whitespace-only strings carry no information.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Absent => true,
            FieldValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// String form used for category lookup. Floats with no fractional part
    /// render without a decimal point, so `3.0` and `3` name the same category.
    /// Negative zero renders as `0`.
    pub fn as_category(&self) -> Option<String> {
        match self {
            FieldValue::Int(value) => Some(value.to_string()),
            FieldValue::Float(value) if *value == 0.0 => Some("0".to_string()),
            FieldValue::Float(value) => Some(value.to_string()),
            FieldValue::Text(text) => Some(text.trim().to_string()),
            FieldValue::Absent => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(value) => write!(f, "{value}"),
            FieldValue::Float(value) => write!(f, "{value}"),
            FieldValue::Text(text) => write!(f, "{text}"),
            FieldValue::Absent => write!(f, ""),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// Raw student attributes keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl StudentRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value.into());
        self
    }

    pub fn insert(&mut self, field: &str, value: FieldValue) {
        self.fields.insert(field.to_string(), value);
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.remove(field)
    }

    /// Drops every field whose name matches `field` ignoring ASCII case.
    pub fn remove_ignore_case(&mut self, field: &str) {
        self.fields.retain(|name, _| !name.eq_ignore_ascii_case(field));
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Text of a bookkeeping field such as the student name, if present.
    pub fn label(&self, field: &str) -> Option<String> {
        self.get(field)
            .filter(|value| !value.is_blank())
            .map(|value| value.to_string())
    }
}

impl FromIterator<(String, FieldValue)> for StudentRecord {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceResult {
    #[serde(rename = "predicted_CGPA")]
    pub predicted_gpa: f64,
    #[serde(rename = "academic_risk_level")]
    pub risk_label: String,
}

#[derive(Debug, Clone)]
pub struct PredictionRow {
    pub id: Uuid,
    pub student_name: Option<String>,
    pub enrollment_no: Option<String>,
    pub predicted_gpa: f64,
    pub risk_label: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RiskLevelSummary {
    pub risk_label: String,
    pub count: usize,
    pub avg_predicted_gpa: f64,
}
