//! Gradient-boosted tree ensemble loaded from an XGBoost JSON model
//!
//! Only the `gbtree` booster is supported. Margins are accumulated in `f32`
//! the way XGBoost does, then converted to probabilities in `f64`.

use super::tree::Tree;
use super::GbdtError;
use serde::Deserialize;

/// Output transformation named by the model's objective
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// `multi:softprob`
    SoftProb,
    /// `multi:softmax`; probabilities are still recovered via softmax
    SoftMax,
    /// `binary:logistic`
    BinaryLogistic,
}

impl Objective {
    pub fn parse(name: &str) -> Result<Self, GbdtError> {
        match name {
            "multi:softprob" => Ok(Objective::SoftProb),
            "multi:softmax" => Ok(Objective::SoftMax),
            "binary:logistic" => Ok(Objective::BinaryLogistic),
            other => Err(GbdtError::UnsupportedObjective(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Objective::SoftProb => "multi:softprob",
            Objective::SoftMax => "multi:softmax",
            Objective::BinaryLogistic => "binary:logistic",
        }
    }
}

#[derive(Debug, Deserialize)]
struct XgbDocument {
    learner: Learner,
    #[serde(default)]
    version: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct Learner {
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: GradientBooster,
    learner_model_param: LearnerModelParam,
    objective: ObjectiveDoc,
}

#[derive(Debug, Deserialize)]
struct GradientBooster {
    name: String,
    #[serde(default)]
    model: Option<GbtreeModel>,
}

#[derive(Debug, Deserialize)]
struct GbtreeModel {
    trees: Vec<Tree>,
    tree_info: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    base_score: String,
    num_class: String,
    num_feature: String,
}

#[derive(Debug, Deserialize)]
struct ObjectiveDoc {
    name: String,
}

/// Immutable tree ensemble ready for inference
#[derive(Debug, Clone, PartialEq)]
pub struct Booster {
    trees: Vec<Tree>,
    tree_group: Vec<usize>,
    num_groups: usize,
    num_feature: usize,
    base_margin: Vec<f32>,
    objective: Objective,
    feature_names: Vec<String>,
    format_version: Vec<u32>,
}

impl Booster {
    /// Assemble and validate a booster from parts.
    ///
    /// `base_score` is the value XGBoost records in `learner_model_param`:
    /// a raw margin for softmax objectives, a probability for logistic.
    pub fn new(
        trees: Vec<Tree>,
        tree_group: Vec<usize>,
        num_feature: usize,
        num_class: usize,
        base_score: f32,
        objective: Objective,
    ) -> Result<Self, GbdtError> {
        let num_groups = Self::groups_for(objective, num_class)?;
        let base_margin = vec![Self::base_margin_for(objective, base_score)?; num_groups];
        let booster = Self {
            trees,
            tree_group,
            num_groups,
            num_feature,
            base_margin,
            objective,
            feature_names: Vec::new(),
            format_version: Vec::new(),
        };
        booster.validate()?;
        Ok(booster)
    }

    /// Parse an XGBoost JSON model and validate its structure
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, GbdtError> {
        let doc: XgbDocument = serde_json::from_slice(bytes)?;
        let learner = doc.learner;

        if learner.gradient_booster.name != "gbtree" {
            return Err(GbdtError::UnsupportedBooster(learner.gradient_booster.name));
        }
        let model = learner
            .gradient_booster
            .model
            .ok_or_else(|| GbdtError::Structure("gbtree booster has no model".to_string()))?;

        let objective = Objective::parse(&learner.objective.name)?;
        let num_class = parse_count("num_class", &learner.learner_model_param.num_class)?;
        let num_feature = parse_count("num_feature", &learner.learner_model_param.num_feature)?;
        let num_groups = Self::groups_for(objective, num_class)?;

        let base_scores = parse_base_score(&learner.learner_model_param.base_score)?;
        let base_margin = match base_scores.len() {
            1 => vec![Self::base_margin_for(objective, base_scores[0])?; num_groups],
            n if n == num_groups => base_scores
                .into_iter()
                .map(|score| Self::base_margin_for(objective, score))
                .collect::<Result<Vec<_>, _>>()?,
            n => {
                return Err(GbdtError::Structure(format!(
                    "base_score has {} entries for {} output groups",
                    n, num_groups
                )))
            }
        };

        let tree_group = model
            .tree_info
            .iter()
            .map(|&group| {
                usize::try_from(group)
                    .map_err(|_| GbdtError::Structure(format!("negative tree_info entry {group}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let booster = Self {
            trees: model.trees,
            tree_group,
            num_groups,
            num_feature,
            base_margin,
            objective,
            feature_names: learner.feature_names,
            format_version: doc.version,
        };
        booster.validate()?;
        Ok(booster)
    }

    fn groups_for(objective: Objective, num_class: usize) -> Result<usize, GbdtError> {
        match objective {
            Objective::BinaryLogistic if num_class <= 1 => Ok(1),
            Objective::BinaryLogistic => Err(GbdtError::Structure(format!(
                "binary:logistic model declares {num_class} classes"
            ))),
            Objective::SoftProb | Objective::SoftMax if num_class >= 2 => Ok(num_class),
            Objective::SoftProb | Objective::SoftMax => Err(GbdtError::Structure(format!(
                "multi-class objective with num_class {num_class}"
            ))),
        }
    }

    fn base_margin_for(objective: Objective, base_score: f32) -> Result<f32, GbdtError> {
        if !base_score.is_finite() {
            return Err(GbdtError::Structure(format!(
                "base_score {base_score} is not finite"
            )));
        }
        match objective {
            Objective::BinaryLogistic => {
                if base_score <= 0.0 || base_score >= 1.0 {
                    return Err(GbdtError::Structure(format!(
                        "logistic base_score {base_score} must lie in (0, 1)"
                    )));
                }
                Ok((base_score / (1.0 - base_score)).ln())
            }
            Objective::SoftProb | Objective::SoftMax => Ok(base_score),
        }
    }

    /// Structural checks run once at load
    pub fn validate(&self) -> Result<(), GbdtError> {
        if self.trees.is_empty() {
            return Err(GbdtError::Structure("model has no trees".to_string()));
        }
        if self.num_feature == 0 {
            return Err(GbdtError::Structure("model declares zero features".to_string()));
        }
        if self.tree_group.len() != self.trees.len() {
            return Err(GbdtError::Structure(format!(
                "tree_info has {} entries for {} trees",
                self.tree_group.len(),
                self.trees.len()
            )));
        }
        if let Some(group) = self.tree_group.iter().find(|&&g| g >= self.num_groups) {
            return Err(GbdtError::Structure(format!(
                "tree assigned to output group {} but the model has {}",
                group, self.num_groups
            )));
        }
        if !self.feature_names.is_empty() && self.feature_names.len() != self.num_feature {
            return Err(GbdtError::Structure(format!(
                "model lists {} feature names but declares {} features",
                self.feature_names.len(),
                self.num_feature
            )));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.num_feature)
                .map_err(|e| GbdtError::Structure(format!("tree {i} validation failed: {e}")))?;
        }
        Ok(())
    }

    /// Raw per-group margins for one feature vector
    pub fn predict_margin(&self, features: &[f64]) -> Result<Vec<f32>, GbdtError> {
        if features.len() != self.num_feature {
            return Err(GbdtError::FeatureCount {
                expected: self.num_feature,
                actual: features.len(),
            });
        }

        let row: Vec<f32> = features.iter().map(|&v| v as f32).collect();
        let mut margins = self.base_margin.clone();

        for (tree, &group) in self.trees.iter().zip(&self.tree_group) {
            margins[group] += tree.leaf_value(&row)?;
        }

        Ok(margins)
    }

    /// Class probability distribution, one entry per class
    pub fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, GbdtError> {
        let margins = self.predict_margin(features)?;

        let probabilities = match self.objective {
            Objective::SoftProb | Objective::SoftMax => softmax(&margins),
            Objective::BinaryLogistic => {
                let p = sigmoid(margins[0] as f64);
                vec![1.0 - p, p]
            }
        };

        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(GbdtError::NonFinite);
        }
        Ok(probabilities)
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn num_feature(&self) -> usize {
        self.num_feature
    }

    /// Number of classes the probability vector covers
    pub fn num_classes(&self) -> usize {
        match self.objective {
            Objective::BinaryLogistic => 2,
            Objective::SoftProb | Objective::SoftMax => self.num_groups,
        }
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Feature names recorded by the training library, empty when absent
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn format_version(&self) -> &[u32] {
        &self.format_version
    }
}

/// Numerically stable softmax over `f32` margins
pub fn softmax(margins: &[f32]) -> Vec<f64> {
    let max = margins
        .iter()
        .map(|&m| m as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = margins.iter().map(|&m| (m as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn parse_count(name: &str, raw: &str) -> Result<usize, GbdtError> {
    raw.trim()
        .parse()
        .map_err(|_| GbdtError::Structure(format!("{name} '{raw}' is not a count")))
}

/// `base_score` is either a scalar ("5E-1") or, in newer releases, a list ("[5E-1,5E-1]")
fn parse_base_score(raw: &str) -> Result<Vec<f32>, GbdtError> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);

    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|_| GbdtError::Structure(format!("base_score '{raw}' is not numeric")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbdt::tree::Node;

    fn three_class_booster() -> Booster {
        // one tree per class, each splitting on feature 0 at 10.0
        let trees = vec![
            Tree::from_nodes(0, &[Node::split(0, 10.0, 1, 2), Node::leaf(2.0), Node::leaf(-1.0)]),
            Tree::from_nodes(1, &[Node::split(0, 10.0, 1, 2), Node::leaf(-1.0), Node::leaf(2.0)]),
            Tree::from_nodes(2, &[Node::leaf(0.0)]),
        ];
        Booster::new(trees, vec![0, 1, 2], 2, 3, 0.5, Objective::SoftProb).unwrap()
    }

    #[test]
    fn test_margin_accumulates_base_score_and_leaves() {
        let booster = three_class_booster();
        let margins = booster.predict_margin(&[5.0, 0.0]).unwrap();
        assert_eq!(margins, vec![2.5, -0.5, 0.5]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let booster = three_class_booster();
        for x in [0.0, 9.99, 10.0, 250.0] {
            let proba = booster.predict_proba(&[x, 1.0]).unwrap();
            assert_eq!(proba.len(), 3);
            let sum: f64 = proba.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
            assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn test_feature_count_mismatch() {
        let booster = three_class_booster();
        let err = booster.predict_proba(&[1.0]).unwrap_err();
        assert!(matches!(err, GbdtError::FeatureCount { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_tree_group_out_of_range() {
        let trees = vec![Tree::from_nodes(0, &[Node::leaf(1.0)])];
        let err = Booster::new(trees, vec![3], 1, 3, 0.5, Objective::SoftProb).unwrap_err();
        assert!(err.to_string().contains("output group"));
    }

    #[test]
    fn test_binary_logistic_returns_two_classes() {
        let trees = vec![Tree::from_nodes(0, &[Node::leaf(0.0)])];
        let booster = Booster::new(trees, vec![0], 1, 0, 0.5, Objective::BinaryLogistic).unwrap();
        let proba = booster.predict_proba(&[3.0]).unwrap();
        assert_eq!(booster.num_classes(), 2);
        assert!((proba[0] - 0.5).abs() < 1e-9);
        assert!((proba[1] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_base_score_formats() {
        assert_eq!(parse_base_score("5E-1").unwrap(), vec![0.5]);
        assert_eq!(parse_base_score("[5E-1,2.5E-1]").unwrap(), vec![0.5, 0.25]);
        assert!(parse_base_score("half").is_err());
    }

    #[test]
    fn test_softmax_is_shift_invariant() {
        let a = softmax(&[1.0, 2.0, 3.0]);
        let b = softmax(&[101.0, 102.0, 103.0]);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_unsupported_objective() {
        assert!(matches!(
            Objective::parse("reg:squarederror"),
            Err(GbdtError::UnsupportedObjective(_))
        ));
    }
}
