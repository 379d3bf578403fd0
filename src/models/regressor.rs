//! Feature-based regressors: random forest, gradient-boosted trees and
//! elastic net, sharing one preprocessing path (imputer, then scaler).
//!
//! Tree conventions differ between the two ensemble families:
//! - random forest: go left when `x <= threshold`, average the trees
//! - boosted trees: go left when `x < threshold`, `base_score` plus the sum
//!
//! A NaN reaching a split follows `missing_left`.

use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::ModelFamily;
use crate::models::error::ModelError;
use crate::models::features::{future_matrix, historical_matrix, FeatureMatrix};
use crate::models::history::{History, TrainingFrame};
use crate::models::{Forecaster, Prediction};

fn yes() -> bool {
    true
}

fn half() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        #[serde(default = "yes")]
        missing_left: bool,
    },
    Leaf {
        value: f64,
    },
}

impl TreeNode {
    pub fn eval(&self, row: &[f64], strict: bool) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    missing_left,
                } => {
                    let x = row.get(*feature).copied().unwrap_or(f64::NAN);
                    let go_left = if x.is_nan() {
                        *missing_left
                    } else if strict {
                        x < *threshold
                    } else {
                        x <= *threshold
                    };
                    node = if go_left { left } else { right };
                }
            }
        }
    }

    fn max_feature(&self) -> Option<usize> {
        match self {
            TreeNode::Leaf { .. } => None,
            TreeNode::Split {
                feature, left, right, ..
            } => [Some(*feature), left.max_feature(), right.max_feature()]
                .into_iter()
                .flatten()
                .max(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Imputer {
    #[serde(alias = "statistics_")]
    pub statistics: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scaler {
    #[serde(alias = "mean_")]
    pub mean: Vec<f64>,
    #[serde(alias = "scale_")]
    pub scale: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Estimator {
    Forest(Vec<TreeNode>),
    Boosted { base_score: f64, trees: Vec<TreeNode> },
    Linear { coef: DVector<f64>, intercept: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeModel {
    pub family: ModelFamily,
    pub features: Vec<String>,
    pub estimator: Estimator,
    pub imputer: Option<Imputer>,
    pub scaler: Option<Scaler>,
    pub training: Option<TrainingFrame>,
}

#[derive(Deserialize)]
struct Common {
    #[serde(alias = "feature_names", alias = "feature_cols")]
    features: Vec<String>,
    #[serde(default)]
    imputer: Option<Imputer>,
    #[serde(default)]
    scaler: Option<Scaler>,
    #[serde(default)]
    training: Option<TrainingFrame>,
}

#[derive(Deserialize)]
struct ForestParams {
    trees: Vec<TreeNode>,
}

#[derive(Deserialize)]
struct BoostParams {
    trees: Vec<TreeNode>,
    #[serde(default = "half")]
    base_score: f64,
}

#[derive(Deserialize)]
struct LinearParams {
    coef: Vec<f64>,
    #[serde(default)]
    intercept: f64,
}

impl TreeModel {
    /// Read a feature-based model of `family` from its JSON object.
    pub fn from_json(family: ModelFamily, value: &Value) -> Result<Self, serde_json::Error> {
        let common = Common::deserialize(value)?;
        let estimator = match family {
            ModelFamily::Xgboost => {
                let p = BoostParams::deserialize(value)?;
                Estimator::Boosted {
                    base_score: p.base_score,
                    trees: p.trees,
                }
            }
            ModelFamily::ElasticNet => {
                let p = LinearParams::deserialize(value)?;
                Estimator::Linear {
                    coef: DVector::from_vec(p.coef),
                    intercept: p.intercept,
                }
            }
            _ => Estimator::Forest(ForestParams::deserialize(value)?.trees),
        };
        Ok(Self {
            family,
            features: common.features,
            estimator,
            imputer: common.imputer,
            scaler: common.scaler,
            training: common.training,
        })
    }

    pub fn check(&self) -> Result<(), String> {
        let p = self.features.len();
        let mismatch = |what: &str, n: usize| format!("{what} has {n} entries for {p} features");

        if let Some(imp) = &self.imputer {
            if imp.statistics.len() != p {
                return Err(mismatch("imputer", imp.statistics.len()));
            }
        }
        if let Some(sc) = &self.scaler {
            if sc.mean.len() != p || sc.scale.len() != p {
                return Err(mismatch("scaler", sc.mean.len().max(sc.scale.len())));
            }
        }
        match &self.estimator {
            Estimator::Forest(trees) | Estimator::Boosted { trees, .. } => {
                if trees.is_empty() {
                    return Err("ensemble has no trees".to_string());
                }
                if let Some(f) = trees.iter().filter_map(TreeNode::max_feature).max() {
                    if f >= p {
                        return Err(format!("tree splits on feature {f} but only {p} features are listed"));
                    }
                }
            }
            Estimator::Linear { coef, .. } => {
                if coef.len() != p {
                    return Err(mismatch("coef", coef.len()));
                }
            }
        }
        if let Some(t) = &self.training {
            t.check()?;
        }
        Ok(())
    }

    /// Impute missing cells, then standardize. A zero scale is treated as 1.
    fn prepare(&self, mut x: DMatrix<f64>) -> DMatrix<f64> {
        if let Some(imp) = &self.imputer {
            for (j, mut col) in x.column_iter_mut().enumerate() {
                let fill = imp.statistics.get(j).copied().unwrap_or(0.0);
                col.iter_mut().filter(|v| v.is_nan()).for_each(|v| *v = fill);
            }
        }
        if let Some(sc) = &self.scaler {
            for (j, mut col) in x.column_iter_mut().enumerate() {
                let mean = sc.mean.get(j).copied().unwrap_or(0.0);
                let scale = match sc.scale.get(j).copied() {
                    Some(s) if s != 0.0 => s,
                    _ => 1.0,
                };
                col.iter_mut().for_each(|v| *v = (*v - mean) / scale);
            }
        }
        x
    }

    pub fn predict_matrix(&self, x: DMatrix<f64>) -> Result<Vec<f64>, ModelError> {
        if x.ncols() != self.features.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.features.len(),
                got: x.ncols(),
            });
        }
        let x = self.prepare(x);

        let out: Vec<f64> = match &self.estimator {
            Estimator::Linear { coef, intercept } => {
                let dense = x.map(|v| if v.is_nan() { 0.0 } else { v });
                (dense * coef).iter().map(|v| v + intercept).collect()
            }
            Estimator::Forest(trees) => (0..x.nrows())
                .into_par_iter()
                .map(|i| {
                    let row: Vec<f64> = x.row(i).iter().copied().collect();
                    trees.iter().map(|t| t.eval(&row, false)).sum::<f64>() / trees.len() as f64
                })
                .collect(),
            Estimator::Boosted { base_score, trees } => (0..x.nrows())
                .into_par_iter()
                .map(|i| {
                    let row: Vec<f64> = x.row(i).iter().copied().collect();
                    base_score + trees.iter().map(|t| t.eval(&row, true)).sum::<f64>()
                })
                .collect(),
        };

        if let Some(i) = out.iter().position(|v| !v.is_finite()) {
            return Err(ModelError::ComputationError(format!("non-finite prediction at row {i}")));
        }
        Ok(out)
    }

    fn run(&self, m: FeatureMatrix) -> Result<Prediction, ModelError> {
        Ok(Prediction {
            values: self.predict_matrix(m.values)?,
            warnings: m.warnings,
        })
    }
}

impl Forecaster for TreeModel {
    fn name(&self) -> &'static str {
        self.family.display_name()
    }

    fn predict_historical(&self, history: &History) -> Result<Prediction, ModelError> {
        if history.is_empty() {
            return Err(ModelError::EmptyData);
        }
        self.run(historical_matrix(&self.features, history, self.training.as_ref()))
    }

    fn predict_future(&self, history: &History, dates: &[NaiveDate]) -> Result<Prediction, ModelError> {
        self.run(future_matrix(&self.features, history, self.training.as_ref(), dates))
    }
}
