//! Student outcome prediction.
//!
//! A GPA regressor and an academic-risk classifier run as one chained
//! pipeline: the classifier consumes the regressor's prediction as a feature.
//! Every entry point goes through [`ChainedPredictor::infer`].

pub mod artifacts;
pub mod batch;
pub mod db;
pub mod encoders;
pub mod error;
pub mod features;
pub mod model;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod stats;

pub use artifacts::{load_predictor, ArtifactPaths};
pub use encoders::{CategoryEncoder, CategoryEncoderSet};
pub use error::{ArtifactError, InferenceError, ModelError, UnknownCategoryError};
pub use model::{Model, TreeEnsemble};
pub use models::{FieldValue, InferenceResult, StudentRecord};
pub use pipeline::ChainedPredictor;
pub use schema::FeatureSchema;
