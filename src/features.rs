//! Turns a reconciled record into the numeric vector a model consumes.

use tracing::warn;

use crate::encoders::CategoryEncoderSet;
use crate::error::UnknownCategoryError;
use crate::models::{FieldValue, StudentRecord};
use crate::schema::FeatureSchema;
use crate::stats::PipelineStats;

pub struct FeatureEncoder<'a> {
    encoders: &'a CategoryEncoderSet,
    stats: &'a PipelineStats,
}

impl<'a> FeatureEncoder<'a> {
    pub fn new(encoders: &'a CategoryEncoderSet, stats: &'a PipelineStats) -> Self {
        Self { encoders, stats }
    }

    /// Encodes `record` in `schema` order. Categorical fields go through
    /// their encoder; everything else is coerced to a float.
    pub fn encode(
        &self,
        record: &StudentRecord,
        schema: &FeatureSchema,
    ) -> Result<Vec<f64>, UnknownCategoryError> {
        let mut vector = Vec::with_capacity(schema.len());

        for field in schema.iter() {
            let value = record.get(field).unwrap_or(&FieldValue::Absent);
            let encoded = match self.encoders.get(field) {
                Some(encoder) => {
                    let code = match value.as_category().filter(|c| !c.is_empty()) {
                        Some(category) => encoder.encode(&category)?,
                        None => encoder.default_code(),
                    };
                    code as f64
                }
                None => self.coerce_numeric(field, value),
            };
            vector.push(encoded);
        }

        Ok(vector)
    }

    fn coerce_numeric(&self, field: &str, value: &FieldValue) -> f64 {
        let parsed = match value {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Absent => return 0.0,
            FieldValue::Text(text) if text.trim().is_empty() => return 0.0,
            FieldValue::Text(text) => text.trim().parse::<f64>().ok(),
        };

        match parsed.filter(|v| v.is_finite()) {
            Some(v) => v,
            None => {
                self.stats.record_coercion();
                warn!(
                    field = %field,
                    value = %value,
                    "Non-numeric value coerced to 0"
                );
                0.0
            }
        }
    }
}
