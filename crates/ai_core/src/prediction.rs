//! Species prediction from an encoded feature vector

use crate::errors::{CoreError, Result};
use crate::features::EncodedVector;
use crate::gbdt::Booster;
use crate::metadata::ModelMetadata;
use serde::{Deserialize, Serialize};

/// Default number of decimal places kept in the confidence score
pub const DEFAULT_CONFIDENCE_DECIMALS: u32 = 6;

/// Largest precision accepted for confidence rounding
pub const MAX_CONFIDENCE_DECIMALS: u32 = 12;

/// Outcome of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_species: String,
    pub class_index: usize,
    /// Maximum class probability, rounded
    pub confidence: f64,
    /// Full distribution in class-label order, unrounded
    pub probabilities: Vec<f64>,
}

/// Evaluate the booster and map the winning class to its label
pub fn predict(
    vector: &EncodedVector,
    booster: &Booster,
    metadata: &ModelMetadata,
    decimals: u32,
) -> Result<PredictionResult> {
    if booster.num_classes() != metadata.class_labels.len() {
        return Err(CoreError::Inference(format!(
            "model produces {} classes but metadata lists {} labels",
            booster.num_classes(),
            metadata.class_labels.len()
        )));
    }

    let probabilities = booster
        .predict_proba(vector.as_slice())
        .map_err(|e| CoreError::Inference(e.to_string()))?;

    let (class_index, max_probability) = argmax(&probabilities)
        .ok_or_else(|| CoreError::Inference("model produced no probabilities".to_string()))?;

    let predicted_species = metadata
        .label(class_index)
        .ok_or_else(|| CoreError::Inference(format!("no label for class index {class_index}")))?
        .to_string();

    Ok(PredictionResult {
        predicted_species,
        class_index,
        confidence: round_confidence(max_probability, decimals),
        probabilities,
    })
}

/// Index and value of the largest entry; ties resolve to the lowest index
pub fn argmax(values: &[f64]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

/// Round half away from zero to `decimals` places and clamp into [0, 1]
pub fn round_confidence(probability: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals.min(MAX_CONFIDENCE_DECIMALS) as i32);
    ((probability * scale).round() / scale).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbdt::{Node, Objective, Tree};
    use std::collections::BTreeMap;

    fn metadata(labels: &[&str]) -> ModelMetadata {
        ModelMetadata {
            feature_columns: vec!["x".to_string()],
            categorical_vocabulary: BTreeMap::new(),
            class_labels: labels.iter().map(|s| s.to_string()).collect(),
            integrity: None,
            model_type: None,
            trained_at: None,
            reference_cases: Vec::new(),
        }
    }

    fn booster() -> Booster {
        let trees = vec![
            Tree::from_nodes(0, &[Node::split(0, 0.5, 1, 2), Node::leaf(3.0), Node::leaf(0.0)]),
            Tree::from_nodes(1, &[Node::split(0, 0.5, 1, 2), Node::leaf(0.0), Node::leaf(3.0)]),
            Tree::from_nodes(2, &[Node::leaf(0.0)]),
        ];
        Booster::new(trees, vec![0, 1, 2], 1, 3, 0.5, Objective::SoftProb).unwrap()
    }

    #[test]
    fn test_predict_maps_index_to_label() {
        let labels = metadata(&["Adelie", "Chinstrap", "Gentoo"]);
        let low = predict(&EncodedVector::from(vec![0.0]), &booster(), &labels, 6).unwrap();
        assert_eq!(low.predicted_species, "Adelie");
        assert_eq!(low.class_index, 0);

        let high = predict(&EncodedVector::from(vec![1.0]), &booster(), &labels, 6).unwrap();
        assert_eq!(high.predicted_species, "Chinstrap");
        assert_eq!(high.probabilities.len(), 3);
        assert!((high.probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_label_count_mismatch_is_an_inference_error() {
        let labels = metadata(&["Adelie", "Chinstrap"]);
        let err = predict(&EncodedVector::from(vec![0.0]), &booster(), &labels, 6).unwrap_err();
        assert!(matches!(err, CoreError::Inference(_)));
    }

    #[test]
    fn test_wrong_vector_length_is_an_inference_error() {
        let labels = metadata(&["Adelie", "Chinstrap", "Gentoo"]);
        let err =
            predict(&EncodedVector::from(vec![0.0, 1.0]), &booster(), &labels, 6).unwrap_err();
        assert!(matches!(err, CoreError::Inference(_)));
    }

    #[test]
    fn test_argmax_ties_go_to_lowest_index() {
        assert_eq!(argmax(&[0.25, 0.5, 0.25]), Some((1, 0.5)));
        assert_eq!(argmax(&[0.4, 0.2, 0.4]), Some((0, 0.4)));
        assert_eq!(argmax(&[1.0 / 3.0; 3]), Some((0, 1.0 / 3.0)));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_confidence_rounding() {
        assert_eq!(round_confidence(0.998700084, 4), 0.9987);
        assert_eq!(round_confidence(0.99996, 4), 1.0);
        assert_eq!(round_confidence(0.123456789, 6), 0.123457);
        assert_eq!(round_confidence(0.5, 0), 1.0);
        assert_eq!(round_confidence(0.49, 0), 0.0);
        // precision is capped
        assert_eq!(round_confidence(0.1, 40), round_confidence(0.1, 12));
    }
}
