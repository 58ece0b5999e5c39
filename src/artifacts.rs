//! Startup loading of the trained models and label encoders.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::encoders::CategoryEncoderSet;
use crate::error::ArtifactError;
use crate::model::{Task, TreeEnsemble};
use crate::pipeline::ChainedPredictor;

pub const GPA_MODEL_FILE: &str = "gpa_prediction_model.json";
pub const RISK_MODEL_FILE: &str = "dropout_risk_model.json";
pub const ENCODER_FILE: &str = "label_encoders.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub gpa_model: PathBuf,
    pub risk_model: PathBuf,
    pub encoders: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            gpa_model: dir.join(GPA_MODEL_FILE),
            risk_model: dir.join(RISK_MODEL_FILE),
            encoders: dir.join(ENCODER_FILE),
        }
    }
}

fn load_model(path: &Path, label: &str, task: Task) -> Result<TreeEnsemble, ArtifactError> {
    let model = TreeEnsemble::from_json_file(path, label)?;
    if model.task != task {
        return Err(ArtifactError::invalid(
            label,
            format!("expected a {task:?} model, found {:?}", model.task),
        ));
    }
    Ok(model)
}

/// Loads both models and the encoders and wires them into a predictor.
/// Any failure here means the process must not serve.
pub fn load_predictor(paths: &ArtifactPaths) -> Result<ChainedPredictor, ArtifactError> {
    let gpa_model = load_model(&paths.gpa_model, "GPA model", Task::Regression)?;
    let risk_model = load_model(&paths.risk_model, "dropout model", Task::Classification)?;
    let encoders = CategoryEncoderSet::from_json_file(&paths.encoders)?;

    let predictor = ChainedPredictor::new(Box::new(gpa_model), Box::new(risk_model), encoders)?;
    info!(
        gpa_features = predictor.gpa_schema().len(),
        risk_features = predictor.risk_schema().len(),
        encoders = predictor.encoders().len(),
        "Models and encoders loaded"
    );
    Ok(predictor)
}
