//! Fitted estimators and the interface the pipeline drives them through.
//!
//! Trained models are exported as JSON decision-tree ensembles. A regressor
//! averages the leaf values reached in each tree; a classifier takes a
//! majority vote over leaf class codes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ArtifactError, ModelError};

/// Anything that maps a feature vector to a single number.
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    /// Number of features `predict` expects.
    fn n_features(&self) -> usize;

    /// Feature names in training order, if the artifact recorded them.
    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    fn predict(&self, features: &[f64]) -> Result<f64, ModelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Regression,
    Classification,
}

/// A split when `value` is absent, a leaf otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(default)]
    pub feature: usize,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub left: Option<usize>,
    #[serde(default)]
    pub right: Option<usize>,
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn leaf_value(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            if let Some(value) = node.value {
                return value;
            }
            // validate() guarantees both children exist and point forward.
            idx = if features[node.feature] <= node.threshold {
                node.left.unwrap_or(idx + 1)
            } else {
                node.right.unwrap_or(idx + 1)
            };
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub name: String,
    pub task: Task,
    pub n_features: usize,
    #[serde(default)]
    pub feature_names: Vec<String>,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn from_json_file(path: &Path, label: &str) -> Result<Self, ArtifactError> {
        if !path.exists() {
            return Err(ArtifactError::Missing {
                label: label.to_string(),
                path: path.to_path_buf(),
            });
        }

        let data = std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            label: label.to_string(),
            path: path.to_path_buf(),
            source,
        })?;
        let model: Self = serde_json::from_str(&data).map_err(|source| ArtifactError::Malformed {
            label: label.to_string(),
            path: path.to_path_buf(),
            source,
        })?;
        model.validate()?;

        info!(
            model = %model.name,
            task = ?model.task,
            trees = model.trees.len(),
            n_features = model.n_features,
            path = %path.display(),
            "Model loaded"
        );
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), ArtifactError> {
        let label = format!("model '{}'", self.name);

        if self.trees.is_empty() {
            return Err(ArtifactError::invalid(label, "model has no trees"));
        }
        if !self.feature_names.is_empty() && self.feature_names.len() != self.n_features {
            return Err(ArtifactError::invalid(
                label,
                format!(
                    "{} feature names recorded for {} features",
                    self.feature_names.len(),
                    self.n_features
                ),
            ));
        }

        for (t_idx, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(ArtifactError::invalid(label, format!("tree {t_idx} has no nodes")));
            }

            for (n_idx, node) in tree.nodes.iter().enumerate() {
                if node.value.is_some() {
                    continue;
                }
                if node.feature >= self.n_features {
                    return Err(ArtifactError::invalid(
                        label,
                        format!("tree {t_idx} node {n_idx} splits on unknown feature {}", node.feature),
                    ));
                }
                let forward = |child: Option<usize>| {
                    matches!(child, Some(c) if c > n_idx && c < tree.nodes.len())
                };
                if !forward(node.left) || !forward(node.right) {
                    return Err(ArtifactError::invalid(
                        label,
                        format!("invalid child reference in tree {t_idx} node {n_idx}"),
                    ));
                }
            }
        }

        Ok(())
    }
}

impl Model for TreeEnsemble {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn feature_names(&self) -> Option<&[String]> {
        Some(&self.feature_names)
    }

    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        if features.len() != self.n_features {
            return Err(ModelError::ShapeMismatch {
                model: self.name.clone(),
                expected: self.n_features,
                actual: features.len(),
            });
        }

        let output = match self.task {
            Task::Regression => {
                let sum: f64 = self.trees.iter().map(|t| t.leaf_value(features)).sum();
                sum / self.trees.len() as f64
            }
            Task::Classification => {
                let mut votes: BTreeMap<i64, usize> = BTreeMap::new();
                for tree in &self.trees {
                    *votes.entry(tree.leaf_value(features).round() as i64).or_insert(0) += 1;
                }
                // Ties go to the lowest code; BTreeMap iterates in ascending order.
                let mut best: Option<(i64, usize)> = None;
                for (code, count) in votes {
                    if best.map_or(true, |(_, top)| count > top) {
                        best = Some((code, count));
                    }
                }
                best.map(|(code, _)| code as f64).unwrap_or(0.0)
            }
        };

        if !output.is_finite() {
            return Err(ModelError::NonFinite {
                model: self.name.clone(),
            });
        }
        Ok(output)
    }
}
