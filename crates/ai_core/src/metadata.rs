//! Training-time metadata persisted next to the model artifact.
//!
//! Key names follow what the training script writes; `feature_names` and
//! `label_encoder_classes` are accepted as aliases.

use crate::errors::{CoreError, Result};
use crate::integrity::IntegrityToken;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Reference prediction shipped by the training side
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceCaseDoc {
    /// Feature record in wire format
    pub record: serde_json::Value,
    pub expected_label: String,
    #[serde(default)]
    pub expected_confidence: Option<f64>,
    #[serde(default)]
    pub tolerance: Option<f64>,
}

/// Metadata describing how the model was trained
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    /// Ordered model input columns
    #[serde(default, alias = "feature_names")]
    pub feature_columns: Vec<String>,
    /// Categorical field -> ordered known values
    #[serde(default)]
    pub categorical_vocabulary: BTreeMap<String, Vec<String>>,
    /// Ordered output class labels (class index -> label)
    #[serde(default, alias = "label_encoder_classes")]
    pub class_labels: Vec<String>,
    /// Integrity token of the model file
    #[serde(default, alias = "model_sha256")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_cases: Vec<ReferenceCaseDoc>,
}

impl ModelMetadata {
    /// Parse and validate a metadata document
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let metadata: ModelMetadata = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::ModelValidation(format!("metadata does not parse: {e}")))?;
        metadata.validate()?;
        Ok(metadata)
    }

    pub fn validate(&self) -> Result<()> {
        if self.class_labels.is_empty() {
            return Err(CoreError::ModelValidation(
                "metadata has no class labels".to_string(),
            ));
        }
        if self.feature_columns.is_empty() {
            return Err(CoreError::ModelValidation(
                "metadata has no feature columns".to_string(),
            ));
        }

        ensure_unique("feature column", &self.feature_columns)?;
        ensure_unique("class label", &self.class_labels)?;
        if let Some(label) = self.class_labels.iter().find(|l| l.trim().is_empty()) {
            return Err(CoreError::ModelValidation(format!(
                "blank class label '{label}'"
            )));
        }

        for (field, values) in &self.categorical_vocabulary {
            if values.is_empty() {
                return Err(CoreError::ModelValidation(format!(
                    "vocabulary for '{field}' is empty"
                )));
            }
            ensure_unique(&format!("'{field}' category"), values)?;
        }

        self.integrity_token()?;
        Ok(())
    }

    /// Parsed integrity token, `None` when the metadata carries none
    pub fn integrity_token(&self) -> Result<Option<IntegrityToken>> {
        match self.integrity.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some),
        }
    }

    /// Position of a column in the model input
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.feature_columns.iter().position(|c| c == column)
    }

    pub fn label(&self, class_index: usize) -> Option<&str> {
        self.class_labels.get(class_index).map(String::as_str)
    }
}

fn ensure_unique(what: &str, values: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for value in values {
        if !seen.insert(value.as_str()) {
            return Err(CoreError::ModelValidation(format!(
                "duplicate {what} '{value}'"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAINING_SCRIPT_OUTPUT: &str = r#"{
        "model_type": "xgboost.XGBClassifier",
        "feature_names": ["bill_length_mm", "bill_depth_mm", "flipper_length_mm",
                          "body_mass_g", "sex_Male", "island_Dream", "island_Torgersen"],
        "categorical_vocabulary": {"sex": ["Female", "Male"], "island": ["Biscoe", "Dream", "Torgersen"]},
        "label_encoder_classes": ["Adelie", "Chinstrap", "Gentoo"],
        "integrity": "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    }"#;

    #[test]
    fn test_parse_training_script_keys() {
        let metadata = ModelMetadata::from_json_slice(TRAINING_SCRIPT_OUTPUT.as_bytes()).unwrap();
        assert_eq!(metadata.feature_columns.len(), 7);
        assert_eq!(metadata.class_labels, vec!["Adelie", "Chinstrap", "Gentoo"]);
        assert_eq!(metadata.column_index("sex_Male"), Some(4));
        assert_eq!(metadata.label(2), Some("Gentoo"));
        assert!(metadata.integrity_token().unwrap().is_some());
    }

    #[test]
    fn test_missing_class_labels_is_rejected() {
        let doc = r#"{"feature_columns": ["a"], "class_labels": []}"#;
        let err = ModelMetadata::from_json_slice(doc.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("no class labels"));

        let doc = r#"{"feature_columns": ["a"]}"#;
        assert!(ModelMetadata::from_json_slice(doc.as_bytes()).is_err());
    }

    #[test]
    fn test_duplicate_columns_are_rejected() {
        let doc = r#"{"feature_columns": ["a", "a"], "class_labels": ["x", "y"]}"#;
        let err = ModelMetadata::from_json_slice(doc.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("duplicate feature column 'a'"));
    }

    #[test]
    fn test_bad_integrity_token_is_rejected() {
        let doc = r#"{"feature_columns": ["a"], "class_labels": ["x"], "integrity": "sha256:nothex"}"#;
        assert!(matches!(
            ModelMetadata::from_json_slice(doc.as_bytes()),
            Err(CoreError::ModelValidation(_))
        ));
    }

    #[test]
    fn test_blank_integrity_means_absent() {
        let doc = r#"{"feature_columns": ["a"], "class_labels": ["x"], "integrity": "  "}"#;
        let metadata = ModelMetadata::from_json_slice(doc.as_bytes()).unwrap();
        assert!(metadata.integrity_token().unwrap().is_none());
    }

    #[test]
    fn test_garbage_bytes_are_a_validation_error() {
        assert!(matches!(
            ModelMetadata::from_json_slice(b"\x00\x01not json"),
            Err(CoreError::ModelValidation(_))
        ));
    }
}
