//! Regression trees in XGBoost's JSON layout
//!
//! A tree is stored as parallel arrays indexed by node id. Node 0 is the
//! root; a node whose left child is `-1` is a leaf and keeps its value in
//! `split_conditions`.

use super::GbdtError;
use serde::{Deserialize, Deserializer, Serialize};

/// Child index marking a leaf node
pub const LEAF_MARKER: i32 = -1;

/// Per-tree parameters; XGBoost writes every number as a string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeParam {
    pub num_nodes: String,
    #[serde(default)]
    pub num_feature: Option<String>,
}

/// A single regression tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    #[serde(default)]
    pub id: i32,
    pub left_children: Vec<i32>,
    pub right_children: Vec<i32>,
    pub split_indices: Vec<u32>,
    pub split_conditions: Vec<f32>,
    #[serde(deserialize_with = "deserialize_flags")]
    pub default_left: Vec<bool>,
    pub tree_param: TreeParam,
}

/// Builder-friendly node description, used to assemble trees in code
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    Split {
        feature: u32,
        threshold: f32,
        left: i32,
        right: i32,
        default_left: bool,
    },
    Leaf(f32),
}

impl Node {
    pub fn split(feature: u32, threshold: f32, left: i32, right: i32) -> Self {
        Node::Split {
            feature,
            threshold,
            left,
            right,
            default_left: true,
        }
    }

    pub fn leaf(value: f32) -> Self {
        Node::Leaf(value)
    }
}

impl Tree {
    /// Assemble a tree from node descriptions (index = node id)
    pub fn from_nodes(id: i32, nodes: &[Node]) -> Self {
        let mut tree = Tree {
            id,
            left_children: Vec::with_capacity(nodes.len()),
            right_children: Vec::with_capacity(nodes.len()),
            split_indices: Vec::with_capacity(nodes.len()),
            split_conditions: Vec::with_capacity(nodes.len()),
            default_left: Vec::with_capacity(nodes.len()),
            tree_param: TreeParam {
                num_nodes: nodes.len().to_string(),
                num_feature: None,
            },
        };

        for node in nodes {
            match *node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    tree.left_children.push(left);
                    tree.right_children.push(right);
                    tree.split_indices.push(feature);
                    tree.split_conditions.push(threshold);
                    tree.default_left.push(default_left);
                }
                Node::Leaf(value) => {
                    tree.left_children.push(LEAF_MARKER);
                    tree.right_children.push(LEAF_MARKER);
                    tree.split_indices.push(0);
                    tree.split_conditions.push(value);
                    tree.default_left.push(false);
                }
            }
        }

        tree
    }

    /// Number of nodes declared in `tree_param`
    pub fn num_nodes(&self) -> Result<usize, GbdtError> {
        self.tree_param.num_nodes.trim().parse().map_err(|_| {
            GbdtError::Structure(format!(
                "tree {} has non-numeric num_nodes '{}'",
                self.id, self.tree_param.num_nodes
            ))
        })
    }

    fn is_leaf(&self, idx: usize) -> bool {
        self.left_children.get(idx) == Some(&LEAF_MARKER)
    }

    /// Check array lengths, child links and split features.
    ///
    /// Children must point strictly forward, which rules out cycles and
    /// guarantees traversal terminates.
    pub fn validate(&self, num_feature: usize) -> Result<(), GbdtError> {
        let n = self.num_nodes()?;
        if n == 0 {
            return Err(GbdtError::Structure(format!("tree {} has no nodes", self.id)));
        }

        let lengths = [
            ("left_children", self.left_children.len()),
            ("right_children", self.right_children.len()),
            ("split_indices", self.split_indices.len()),
            ("split_conditions", self.split_conditions.len()),
            ("default_left", self.default_left.len()),
        ];
        for (name, len) in lengths {
            if len != n {
                return Err(GbdtError::Structure(format!(
                    "tree {}: {} has {} entries, expected {}",
                    self.id, name, len, n
                )));
            }
        }

        for i in 0..n {
            let left = self.left_children[i];
            let right = self.right_children[i];
            let condition = self.split_conditions[i];

            if !condition.is_finite() {
                return Err(GbdtError::Structure(format!(
                    "tree {} node {} has non-finite value {}",
                    self.id, i, condition
                )));
            }

            if left == LEAF_MARKER {
                if right != LEAF_MARKER {
                    return Err(GbdtError::Structure(format!(
                        "tree {} node {} has a right child but no left child",
                        self.id, i
                    )));
                }
                continue;
            }

            for (side, child) in [("left", left), ("right", right)] {
                if child <= i as i32 || child as usize >= n {
                    return Err(GbdtError::Structure(format!(
                        "tree {} node {} has invalid {} child {}",
                        self.id, i, side, child
                    )));
                }
            }

            if self.split_indices[i] as usize >= num_feature {
                return Err(GbdtError::Structure(format!(
                    "tree {} node {} splits on feature {} but the model has {} features",
                    self.id, i, self.split_indices[i], num_feature
                )));
            }
        }

        Ok(())
    }

    /// Walk from the root to a leaf and return its value.
    ///
    /// `value < threshold` goes left; NaN follows `default_left`.
    pub fn leaf_value(&self, features: &[f32]) -> Result<f32, GbdtError> {
        let mut idx = 0usize;

        loop {
            if self.is_leaf(idx) {
                return self
                    .split_conditions
                    .get(idx)
                    .copied()
                    .ok_or_else(|| self.broken(idx));
            }

            let left = *self.left_children.get(idx).ok_or_else(|| self.broken(idx))?;

            let right = *self.right_children.get(idx).ok_or_else(|| self.broken(idx))?;
            let feature = *self.split_indices.get(idx).ok_or_else(|| self.broken(idx))? as usize;
            let threshold = *self.split_conditions.get(idx).ok_or_else(|| self.broken(idx))?;
            let value = *features.get(feature).ok_or(GbdtError::FeatureCount {
                expected: feature + 1,
                actual: features.len(),
            })?;

            let go_left = if value.is_nan() {
                self.default_left.get(idx).copied().unwrap_or(false)
            } else {
                value < threshold
            };

            let next = if go_left { left } else { right };
            if next <= idx as i32 {
                return Err(self.broken(idx));
            }
            idx = next as usize;
        }
    }

    fn broken(&self, idx: usize) -> GbdtError {
        GbdtError::Structure(format!("tree {} is malformed at node {}", self.id, idx))
    }
}

/// XGBoost has written `default_left` both as booleans and as 0/1 integers.
fn deserialize_flags<'de, D>(deserializer: D) -> Result<Vec<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    let flags = Vec::<Flag>::deserialize(deserializer)?;
    Ok(flags
        .into_iter()
        .map(|flag| match flag {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        })
        .collect())
}
