//! Chained GPA → academic-risk inference.
//!
//! The risk classifier is conditioned on the regressor's output, so every
//! request runs the GPA stage first and injects its prediction into the
//! GPA-reconciled record before the risk stage is encoded. Fields only the
//! risk model uses are therefore always absent from the augmented record.

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::encoders::CategoryEncoderSet;
use crate::error::{ArtifactError, InferenceError, ModelError};
use crate::features::FeatureEncoder;
use crate::model::Model;
use crate::models::{
    FieldValue, InferenceResult, StudentRecord, ACADEMIC_RISK_LEVEL, PREDICTED_CGPA,
};
use crate::report::format_result;
use crate::schema::{FeatureSchema, GPA_FALLBACK_FEATURES, RISK_FALLBACK_FEATURES};
use crate::stats::{PipelineStats, StatsSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Gpa,
    Risk,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Stage::Gpa => "gpa",
            Stage::Risk => "risk",
        }
    }
}

/// Models, schemas and encoders loaded once at startup. Nothing here is
/// mutated after construction apart from the atomic counters, so a single
/// instance can serve any number of threads.
pub struct ChainedPredictor {
    gpa_model: Box<dyn Model>,
    risk_model: Box<dyn Model>,
    gpa_schema: FeatureSchema,
    risk_schema: FeatureSchema,
    encoders: CategoryEncoderSet,
    stats: PipelineStats,
}

impl ChainedPredictor {
    pub fn new(
        gpa_model: Box<dyn Model>,
        risk_model: Box<dyn Model>,
        encoders: CategoryEncoderSet,
    ) -> Result<Self, ArtifactError> {
        let gpa_schema = FeatureSchema::resolve(gpa_model.as_ref(), GPA_FALLBACK_FEATURES);
        let risk_schema = FeatureSchema::resolve(risk_model.as_ref(), RISK_FALLBACK_FEATURES);

        check_schema(gpa_model.as_ref(), &gpa_schema)?;
        check_schema(risk_model.as_ref(), &risk_schema)?;

        if gpa_schema.contains(PREDICTED_CGPA) {
            return Err(ArtifactError::invalid(
                format!("model '{}'", gpa_model.name()),
                format!("GPA model cannot consume its own output '{PREDICTED_CGPA}'"),
            ));
        }
        if !risk_schema.contains(PREDICTED_CGPA) {
            return Err(ArtifactError::invalid(
                format!("model '{}'", risk_model.name()),
                format!("risk model features do not include '{PREDICTED_CGPA}'"),
            ));
        }
        if encoders.get(ACADEMIC_RISK_LEVEL).is_none() {
            warn!("No encoder for {ACADEMIC_RISK_LEVEL}; risk labels will be raw codes");
        }

        debug!(
            gpa_features = ?&*gpa_schema,
            gpa_from_artifact = gpa_schema.from_artifact(),
            risk_features = ?&*risk_schema,
            risk_from_artifact = risk_schema.from_artifact(),
            "Feature schemas resolved"
        );

        Ok(Self {
            gpa_model,
            risk_model,
            gpa_schema,
            risk_schema,
            encoders,
            stats: PipelineStats::new(),
        })
    }

    pub fn gpa_schema(&self) -> &FeatureSchema {
        &self.gpa_schema
    }

    pub fn risk_schema(&self) -> &FeatureSchema {
        &self.risk_schema
    }

    pub fn encoders(&self) -> &CategoryEncoderSet {
        &self.encoders
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Runs both models for one record. Unknown categories abort before any
    /// model runs; no partial result is ever returned.
    pub fn infer(&self, raw: &StudentRecord) -> Result<InferenceResult, InferenceError> {
        self.stats.record_request();
        let result = self.run(raw);
        match &result {
            Ok(_) => self.stats.record_success(),
            Err(e) if e.is_client_error() => self.stats.record_client_error(),
            Err(_) => self.stats.record_internal_error(),
        }
        result
    }

    fn run(&self, raw: &StudentRecord) -> Result<InferenceResult, InferenceError> {
        let encoder = FeatureEncoder::new(&self.encoders, &self.stats);

        // Derived and output-only fields never come from the caller.
        let mut record = raw.clone();
        record.remove_ignore_case(PREDICTED_CGPA);
        record.remove_ignore_case(ACADEMIC_RISK_LEVEL);

        let gpa_input = self.gpa_schema.reconcile(&record);
        let gpa_vector = encoder.encode(&gpa_input, &self.gpa_schema)?;
        let predicted_gpa = self.predict(Stage::Gpa, &gpa_vector)?;
        debug!(predicted_gpa, "GPA stage complete");

        let mut augmented = gpa_input;
        augmented.insert(PREDICTED_CGPA, FieldValue::Float(predicted_gpa));
        let risk_input = self.risk_schema.reconcile(&augmented);
        let risk_vector = encoder.encode(&risk_input, &self.risk_schema)?;
        let risk_code = self.predict(Stage::Risk, &risk_vector)?;

        let risk_label = self.decode_risk(risk_code);
        debug!(risk_code, risk_label = %risk_label, "Risk stage complete");

        Ok(format_result(predicted_gpa, risk_label))
    }

    fn predict(&self, stage: Stage, features: &[f64]) -> Result<f64, InferenceError> {
        let model = match stage {
            Stage::Gpa => &self.gpa_model,
            Stage::Risk => &self.risk_model,
        };
        let output = model
            .predict(features)
            .map_err(|e| self.internal(stage, model.name(), features, e))?;
        if !output.is_finite() {
            let source = ModelError::NonFinite {
                model: model.name().to_string(),
            };
            return Err(self.internal(stage, model.name(), features, source));
        }
        Ok(output)
    }

    fn internal(
        &self,
        stage: Stage,
        model: &str,
        features: &[f64],
        source: ModelError,
    ) -> InferenceError {
        let reference = Uuid::new_v4();
        error!(
            %reference,
            stage = stage.as_str(),
            model = %model,
            features = ?features,
            error = %source,
            "Model prediction failed"
        );
        InferenceError::Internal { reference }
    }

    /// Maps a classifier code back to its label, falling back to the raw
    /// code when it cannot be decoded.
    fn decode_risk(&self, raw_code: f64) -> String {
        let rounded = raw_code.round();
        let label = self.encoders.get(ACADEMIC_RISK_LEVEL).and_then(|encoder| {
            if rounded >= 0.0 && rounded <= usize::MAX as f64 {
                encoder.decode(rounded as usize)
            } else {
                None
            }
        });

        match label {
            Some(label) => label.to_string(),
            None => {
                self.stats.record_degraded_decode();
                warn!(raw_code, "Risk code could not be decoded; returning raw code");
                raw_code.to_string()
            }
        }
    }
}

fn check_schema(model: &dyn Model, schema: &FeatureSchema) -> Result<(), ArtifactError> {
    if schema.len() != model.n_features() {
        return Err(ArtifactError::invalid(
            format!("model '{}'", model.name()),
            format!(
                "resolved {} features but the model expects {}",
                schema.len(),
                model.n_features()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::encoders::sample_encoders;

    /// Linear stand-in for a fitted model; records every vector it sees.
    struct FakeModel {
        name: String,
        features: Vec<String>,
        weights: Vec<f64>,
        bias: f64,
        seen: Arc<Mutex<Vec<Vec<f64>>>>,
        fail: bool,
    }

    impl FakeModel {
        fn new(name: &str, features: &[&str], weights: Vec<f64>, bias: f64) -> Self {
            Self {
                name: name.to_string(),
                features: features.iter().map(|f| f.to_string()).collect(),
                weights,
                bias,
                seen: Arc::new(Mutex::new(Vec::new())),
                fail: false,
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn seen(&self) -> Arc<Mutex<Vec<Vec<f64>>>> {
            self.seen.clone()
        }
    }

    impl Model for FakeModel {
        fn name(&self) -> &str {
            &self.name
        }

        fn n_features(&self) -> usize {
            self.features.len()
        }

        fn feature_names(&self) -> Option<&[String]> {
            Some(&self.features)
        }

        fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
            self.seen.lock().unwrap().push(features.to_vec());
            if self.fail {
                return Err(ModelError::Failed {
                    model: self.name.clone(),
                    reason: "boom".to_string(),
                });
            }
            Ok(self.bias + features.iter().zip(&self.weights).map(|(x, w)| x * w).sum::<f64>())
        }
    }

    const GPA: &[&str] = &[
        "Attendance_Percentage",
        "Study_Hours_Per_Week",
        "Previous_CGPA",
        "Backlogs",
        "Semester",
        "Parent_Education_Level",
        "Gender",
        "Department",
        "Part_Time_Work",
    ];

    const RISK: &[&str] = &["Backlogs", PREDICTED_CGPA];

    // GPA = 0.02 * attendance + 0.5 * previous CGPA - 0.3 * backlogs + 0.1 * parent level
    fn gpa_model() -> FakeModel {
        FakeModel::new(
            "gpa",
            GPA,
            vec![0.02, 0.0, 0.5, -0.3, 0.0, 0.1, 0.0, 0.0, 0.0],
            0.0,
        )
    }

    // Risk code = 0.5 * backlogs + 0.25 * predicted GPA
    fn risk_model() -> FakeModel {
        FakeModel::new("risk", RISK, vec![0.5, 0.25], 0.0)
    }

    fn predictor() -> ChainedPredictor {
        ChainedPredictor::new(
            Box::new(gpa_model()),
            Box::new(risk_model()),
            sample_encoders(),
        )
        .unwrap()
    }

    fn scenario_a() -> StudentRecord {
        StudentRecord::new()
            .with("Semester", 3)
            .with("Department", "CSE")
            .with("Age", 20)
            .with("Gender", "Male")
            .with("Attendance_Percentage", 100)
            .with("Study_Hours_Per_Week", 9)
            .with("Backlogs", 0)
            .with("Part_Time_Work", "No")
            .with("Previous_CGPA", 8.8)
            .with("Parent_Education_Level", "Graduate")
    }

    #[test]
    fn scenario_a_predicts_gpa_and_known_risk_label() {
        let predictor = predictor();
        let result = predictor.infer(&scenario_a()).unwrap();

        // 0.02 * 100 + 0.5 * 8.8 = 6.4
        assert_eq!(result.predicted_gpa, 6.4);
        assert!((0.0..=10.0).contains(&result.predicted_gpa));
        let domain = predictor.encoders().get(ACADEMIC_RISK_LEVEL).unwrap().classes();
        assert!(domain.contains(&result.risk_label));
        // 0.25 * 6.4 = 1.6, rounded to code 2
        assert_eq!(result.risk_label, "Medium");
    }

    #[test]
    fn scenario_b_unknown_department_is_a_client_error() {
        let predictor = predictor();
        let record = scenario_a().with("Department", "Unknown_Dept");

        match predictor.infer(&record) {
            Err(InferenceError::UnknownCategory(err)) => {
                assert_eq!(err.field, "Department");
                assert_eq!(err.value, "Unknown_Dept");
                assert!(err.known.contains(&"CSE".to_string()));
            }
            other => panic!("expected unknown category, got {other:?}"),
        }
        assert_eq!(predictor.stats_snapshot().client_errors, 1);
    }

    #[test]
    fn unknown_category_aborts_before_any_model_runs() {
        let gpa = gpa_model();
        let risk = risk_model();
        let (gpa_seen, risk_seen) = (gpa.seen(), risk.seen());
        let predictor =
            ChainedPredictor::new(Box::new(gpa), Box::new(risk), sample_encoders()).unwrap();

        let record = scenario_a().with("Gender", "Robot");
        assert!(predictor.infer(&record).is_err());
        assert!(gpa_seen.lock().unwrap().is_empty());
        assert!(risk_seen.lock().unwrap().is_empty());
    }

    #[test]
    fn scenario_c_omitted_category_matches_explicit_default() {
        let predictor = predictor();
        let mut omitted = scenario_a();
        omitted.remove("Parent_Education_Level");
        let explicit = scenario_a().with("Parent_Education_Level", "Graduate");

        assert_eq!(
            predictor.infer(&omitted).unwrap(),
            predictor.infer(&explicit).unwrap()
        );
    }

    #[test]
    fn omitted_numeric_field_matches_explicit_zero() {
        let predictor = predictor();
        let mut omitted = scenario_a();
        omitted.remove("Backlogs");

        assert_eq!(
            predictor.infer(&omitted).unwrap(),
            predictor.infer(&scenario_a()).unwrap()
        );
    }

    #[test]
    fn risk_model_sees_freshly_predicted_gpa() {
        let gpa = gpa_model();
        let risk = risk_model();
        let risk_seen = risk.seen();
        let predictor =
            ChainedPredictor::new(Box::new(gpa), Box::new(risk), sample_encoders()).unwrap();

        let plain = predictor.infer(&scenario_a()).unwrap();
        let spoofed = predictor
            .infer(&scenario_a().with("predicted_CGPA", 1.0))
            .unwrap();
        let spoofed_other_case = predictor
            .infer(&scenario_a().with("Predicted_CGPA", 9.9))
            .unwrap();

        assert_eq!(plain, spoofed);
        assert_eq!(plain, spoofed_other_case);
        for vector in risk_seen.lock().unwrap().iter() {
            assert_eq!(vector[1], 6.4);
        }
    }

    #[test]
    fn risk_only_fields_are_not_taken_from_the_caller() {
        let gpa = FakeModel::new("gpa", &["Age"], vec![0.0], 7.0);
        let risk = FakeModel::new(
            "risk",
            &["Study_Hours_Per_Week", PREDICTED_CGPA],
            vec![1.0, 0.25],
            0.0,
        );
        let risk_seen = risk.seen();
        let predictor =
            ChainedPredictor::new(Box::new(gpa), Box::new(risk), sample_encoders()).unwrap();

        let record = StudentRecord::new()
            .with("Age", 20)
            .with("Study_Hours_Per_Week", 9);
        let result = predictor.infer(&record).unwrap();

        assert_eq!(result.predicted_gpa, 7.0);
        assert_eq!(*risk_seen.lock().unwrap(), vec![vec![0.0, 7.0]]);
    }

    #[test]
    fn risk_only_category_gets_its_default() {
        let gpa = FakeModel::new("gpa", &["Age"], vec![0.0], 7.0);
        let risk = FakeModel::new("risk", &["Department", PREDICTED_CGPA], vec![1.0, 0.25], 0.0);
        let (gpa_seen, risk_seen) = (gpa.seen(), risk.seen());
        let predictor =
            ChainedPredictor::new(Box::new(gpa), Box::new(risk), sample_encoders()).unwrap();

        let record = StudentRecord::new()
            .with("Age", 20)
            .with("Department", "Bogus");
        let result = predictor.infer(&record).unwrap();

        // Department falls back to code 0; 0.25 * 7 = 1.75 rounds to Medium.
        assert_eq!(result.risk_label, "Medium");
        assert_eq!(gpa_seen.lock().unwrap().len(), 1);
        assert_eq!(*risk_seen.lock().unwrap(), vec![vec![0.0, 7.0]]);
        assert_eq!(predictor.stats_snapshot().client_errors, 0);
    }

    #[test]
    fn infer_is_idempotent() {
        let predictor = predictor();
        let record = scenario_a();
        let first = serde_json::to_string(&predictor.infer(&record).unwrap()).unwrap();
        let second = serde_json::to_string(&predictor.infer(&record).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn undecodable_risk_code_falls_back_to_raw_code() {
        // Constant 7 is outside the three known risk levels.
        let risk = FakeModel::new("risk", RISK, vec![0.0, 0.0], 7.0);
        let predictor =
            ChainedPredictor::new(Box::new(gpa_model()), Box::new(risk), sample_encoders())
                .unwrap();

        let result = predictor.infer(&scenario_a()).unwrap();
        assert_eq!(result.risk_label, "7");
        assert_eq!(predictor.stats_snapshot().degraded_decodes, 1);
    }

    #[test]
    fn missing_risk_encoder_falls_back_to_raw_code() {
        let mut classes = std::collections::BTreeMap::new();
        classes.insert("Gender".to_string(), vec!["Female".to_string(), "Male".to_string()]);
        let encoders = CategoryEncoderSet::from_classes(classes).unwrap();
        let predictor =
            ChainedPredictor::new(Box::new(gpa_model()), Box::new(risk_model()), encoders)
                .unwrap();

        let result = predictor.infer(&scenario_a()).unwrap();
        assert_eq!(result.risk_label, "1.6");
    }

    #[test]
    fn model_failure_is_opaque_internal_error() {
        let predictor = ChainedPredictor::new(
            Box::new(gpa_model()),
            Box::new(risk_model().failing()),
            sample_encoders(),
        )
        .unwrap();

        let err = predictor.infer(&scenario_a()).unwrap_err();
        assert!(!err.is_client_error());
        assert!(!err.to_string().contains("boom"));
        assert_eq!(predictor.stats_snapshot().internal_errors, 1);
    }

    #[test]
    fn non_finite_gpa_stops_before_the_risk_model() {
        let gpa = FakeModel::new("gpa", GPA, vec![0.0; GPA.len()], f64::NAN);
        let risk = risk_model();
        let risk_seen = risk.seen();
        let predictor =
            ChainedPredictor::new(Box::new(gpa), Box::new(risk), sample_encoders()).unwrap();

        let err = predictor.infer(&scenario_a()).unwrap_err();
        assert!(matches!(err, InferenceError::Internal { .. }));
        assert!(risk_seen.lock().unwrap().is_empty());
        assert_eq!(predictor.stats_snapshot().internal_errors, 1);
    }

    #[test]
    fn non_finite_risk_code_is_an_internal_error() {
        let risk = FakeModel::new("risk", RISK, vec![0.0, 0.0], f64::INFINITY);
        let predictor =
            ChainedPredictor::new(Box::new(gpa_model()), Box::new(risk), sample_encoders())
                .unwrap();

        let err = predictor.infer(&scenario_a()).unwrap_err();
        assert!(!err.is_client_error());
        assert_eq!(predictor.stats_snapshot().degraded_decodes, 0);
        assert_eq!(predictor.stats_snapshot().internal_errors, 1);
    }

    #[test]
    fn schema_length_must_match_model() {
        let mut gpa = gpa_model();
        gpa.features.clear();
        // Fallback schema has 13 features; the fake expects none.
        let err = ChainedPredictor::new(Box::new(gpa), Box::new(risk_model()), sample_encoders());
        assert!(err.is_err());
    }

    #[test]
    fn risk_schema_must_include_predicted_gpa() {
        let risk = FakeModel::new("risk", &["Backlogs"], vec![0.0], 0.0);
        let err = ChainedPredictor::new(Box::new(gpa_model()), Box::new(risk), sample_encoders());
        assert!(matches!(err, Err(ArtifactError::Invalid { .. })));
    }

    #[test]
    fn predictor_serves_concurrent_requests() {
        let predictor = predictor();
        let expected = predictor.infer(&scenario_a()).unwrap();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| predictor.infer(&scenario_a()).unwrap()))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
        assert_eq!(predictor.stats_snapshot().succeeded, 9);
    }
}
