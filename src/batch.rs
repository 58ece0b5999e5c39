use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::InferenceError;
use crate::models::{
    FieldValue, InferenceResult, StudentRecord, ENROLLMENT_NO, STUDENT_NAME,
};
use crate::pipeline::ChainedPredictor;

#[derive(Debug, Clone, Serialize)]
pub struct BatchRow {
    pub row: usize,
    #[serde(rename = "Student_Name")]
    pub student_name: Option<String>,
    #[serde(rename = "Enrollment_No")]
    pub enrollment_no: Option<String>,
    #[serde(rename = "predicted_CGPA")]
    pub predicted_gpa: Option<f64>,
    #[serde(rename = "academic_risk_level")]
    pub risk_label: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub rows: Vec<BatchRow>,
    /// Records that scored successfully, for optional persistence.
    pub scored: Vec<(StudentRecord, InferenceResult)>,
    pub rejected: usize,
}

pub fn read_records(csv_path: &Path) -> anyhow::Result<Vec<StudentRecord>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let headers = reader.headers()?.clone();
    let mut records = Vec::new();

    for result in reader.records() {
        let row = result?;
        let record: StudentRecord = headers
            .iter()
            .zip(row.iter())
            .map(|(field, cell)| (field.trim().to_string(), FieldValue::parse_cell(cell)))
            .collect();
        records.push(record);
    }

    Ok(records)
}

/// Scores every record. Rows with unknown categories are reported and
/// skipped; an internal failure stops the batch.
pub fn score_records(
    predictor: &ChainedPredictor,
    records: Vec<StudentRecord>,
) -> anyhow::Result<BatchOutcome> {
    let mut outcome = BatchOutcome::default();

    for (idx, record) in records.into_iter().enumerate() {
        let row = idx + 1;
        let student_name = record.label(STUDENT_NAME);
        let enrollment_no = record.label(ENROLLMENT_NO);

        match predictor.infer(&record) {
            Ok(result) => {
                outcome.rows.push(BatchRow {
                    row,
                    student_name,
                    enrollment_no,
                    predicted_gpa: Some(result.predicted_gpa),
                    risk_label: Some(result.risk_label.clone()),
                    error: None,
                });
                outcome.scored.push((record, result));
            }
            Err(InferenceError::UnknownCategory(err)) => {
                warn!(row, field = %err.field, value = %err.value, "Row rejected");
                outcome.rejected += 1;
                outcome.rows.push(BatchRow {
                    row,
                    student_name,
                    enrollment_no,
                    predicted_gpa: None,
                    risk_label: None,
                    error: Some(err.to_string()),
                });
            }
            Err(err) => {
                return Err(err).with_context(|| format!("batch aborted at row {row}"));
            }
        }
    }

    info!(
        scored = outcome.scored.len(),
        rejected = outcome.rejected,
        "Batch scored"
    );
    Ok(outcome)
}

pub fn write_results(out: &Path, rows: &[BatchRow]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(out)
        .with_context(|| format!("failed to create {}", out.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
