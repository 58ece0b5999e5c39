use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::info;

use crate::error::{ArtifactError, UnknownCategoryError};
use crate::models::ACADEMIC_RISK_LEVEL;

const RISK_DEFAULT: &str = "Medium";

/// Bijection between the known categories of one field and codes `0..n`.
#[derive(Debug, Clone)]
pub struct CategoryEncoder {
    field: String,
    classes: Vec<String>,
    codes: HashMap<String, usize>,
    default_code: usize,
}

impl CategoryEncoder {
    /// Builds an encoder from classes in training order.
    pub fn new(field: &str, classes: Vec<String>) -> Result<Self, ArtifactError> {
        if classes.is_empty() {
            return Err(ArtifactError::invalid(
                "label encoders",
                format!("encoder for '{field}' has no classes"),
            ));
        }

        let mut codes = HashMap::with_capacity(classes.len());
        for (code, class) in classes.iter().enumerate() {
            if codes.insert(class.clone(), code).is_some() {
                return Err(ArtifactError::invalid(
                    "label encoders",
                    format!("encoder for '{field}' lists '{class}' twice"),
                ));
            }
        }

        let default_code = if field == ACADEMIC_RISK_LEVEL {
            codes.get(RISK_DEFAULT).copied().unwrap_or(0)
        } else {
            0
        };

        Ok(Self {
            field: field.to_string(),
            classes,
            codes,
            default_code,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn encode(&self, category: &str) -> Result<usize, UnknownCategoryError> {
        self.codes
            .get(category)
            .copied()
            .ok_or_else(|| UnknownCategoryError {
                field: self.field.clone(),
                value: category.to_string(),
                known: self.classes.clone(),
            })
    }

    pub fn decode(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }

    /// Category substituted when the field is missing or blank.
    pub fn default_category(&self) -> &str {
        &self.classes[self.default_code]
    }

    pub fn default_code(&self) -> usize {
        self.default_code
    }
}

/// All encoders fitted at training time, keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct CategoryEncoderSet {
    encoders: BTreeMap<String, CategoryEncoder>,
}

impl CategoryEncoderSet {
    pub fn from_classes(classes: BTreeMap<String, Vec<String>>) -> Result<Self, ArtifactError> {
        let mut encoders = BTreeMap::new();
        for (field, field_classes) in classes {
            let encoder = CategoryEncoder::new(&field, field_classes)?;
            encoders.insert(field, encoder);
        }
        Ok(Self { encoders })
    }

    /// Loads `{ "<field>": ["<class>", ...], ... }` from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ArtifactError> {
        let label = "label encoders".to_string();
        if !path.exists() {
            return Err(ArtifactError::Missing {
                label,
                path: path.to_path_buf(),
            });
        }

        let data = std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            label: label.clone(),
            path: path.to_path_buf(),
            source,
        })?;
        let classes: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&data).map_err(|source| ArtifactError::Malformed {
                label,
                path: path.to_path_buf(),
                source,
            })?;

        let set = Self::from_classes(classes)?;
        info!(
            path = %path.display(),
            fields = ?set.fields().collect::<Vec<_>>(),
            "Label encoders loaded"
        );
        Ok(set)
    }

    pub fn get(&self, field: &str) -> Option<&CategoryEncoder> {
        self.encoders.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.encoders.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn sample_encoders() -> CategoryEncoderSet {
    let mut classes = BTreeMap::new();
    let mut add = |field: &str, values: &[&str]| {
        classes.insert(
            field.to_string(),
            values.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
        );
    };
    add("Gender", &["Female", "Male"]);
    add("Department", &["CIVIL", "CSE", "ECE", "EEE", "IT", "MECH"]);
    add("Part_Time_Work", &["No", "Yes"]);
    add("Parent_Education_Level", &["Graduate", "High School", "Postgraduate"]);
    add("Semester", &["1", "2", "3", "4", "5", "6", "7", "8"]);
    add(ACADEMIC_RISK_LEVEL, &["High", "Low", "Medium"]);
    CategoryEncoderSet::from_classes(classes).unwrap()
}
