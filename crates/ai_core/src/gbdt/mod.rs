//! Gradient Boosted Decision Tree inference over XGBoost JSON models
//!
//! The training side exports its classifier with `save_model("model.json")`.
//! This module reads that document, validates the ensemble structure and
//! evaluates it without any native XGBoost dependency.
//!
//! # Model Format
//!
//! ```json
//! {
//!   "learner": {
//!     "feature_names": ["bill_length_mm", "..."],
//!     "gradient_booster": {
//!       "name": "gbtree",
//!       "model": {
//!         "trees": [
//!           {
//!             "left_children": [1, -1, -1],
//!             "right_children": [2, -1, -1],
//!             "split_indices": [0, 0, 0],
//!             "split_conditions": [42.35, 0.54, -0.33],
//!             "default_left": [1, 0, 0],
//!             "tree_param": {"num_nodes": "3"}
//!           }
//!         ],
//!         "tree_info": [0]
//!       }
//!     },
//!     "learner_model_param": {"base_score": "5E-1", "num_class": "3", "num_feature": "7"},
//!     "objective": {"name": "multi:softprob"}
//!   },
//!   "version": [2, 0, 3]
//! }
//! ```
//!
//! # Determinism
//!
//! - Leaf values are summed in tree order with `f32` arithmetic
//! - Split comparison is `value < threshold` on `f32` features
//! - Softmax subtracts the maximum margin before exponentiating

pub mod model;
pub mod tree;

pub use model::{softmax, Booster, Objective};
pub use tree::{Node, Tree, LEAF_MARKER};

use thiserror::Error;

/// GBDT parsing and evaluation errors
#[derive(Error, Debug)]
pub enum GbdtError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid model structure: {0}")]
    Structure(String),

    #[error("Unsupported booster '{0}', only gbtree is supported")]
    UnsupportedBooster(String),

    #[error("Unsupported objective '{0}'")]
    UnsupportedObjective(String),

    #[error("Feature vector has {actual} values, model expects {expected}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("Model produced a non-finite probability")]
    NonFinite,
}
