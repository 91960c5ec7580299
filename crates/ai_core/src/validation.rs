//! Startup validation of a freshly loaded model
//!
//! Known inputs are pushed through encode and predict before the model is
//! allowed to serve. A corrupted artifact that still parses will usually
//! fail here.

use crate::errors::{CoreError, Result};
use crate::features::{FeatureRecord, Island, Sex};
use crate::loader::LoadedModel;
use crate::metadata::ReferenceCaseDoc;
use crate::prediction::{predict, MAX_CONFIDENCE_DECIMALS};
use serde::Serialize;
use tracing::{debug, info};

/// Tolerance used when a reference case does not state one
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// Allowed deviation of the probability sum from 1
pub const PROBABILITY_SUM_TOLERANCE: f64 = 1e-6;

/// A known input and the prediction it must produce
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceCase {
    pub name: String,
    pub record: FeatureRecord,
    pub expected_label: String,
    pub expected_confidence: Option<f64>,
    pub tolerance: f64,
}

impl ReferenceCase {
    /// Male Adelie from Torgersen, 2007
    pub fn canonical() -> Self {
        Self {
            name: "canonical-adelie".to_string(),
            record: FeatureRecord {
                bill_length_mm: 39.1,
                bill_depth_mm: 18.7,
                flipper_length_mm: 181.0,
                body_mass_g: 3750.0,
                year: 2007,
                sex: Sex::Male,
                island: Island::Torgersen,
            },
            expected_label: "Adelie".to_string(),
            expected_confidence: Some(0.9987),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// Convert a metadata-supplied case; a malformed record fails the load
    pub fn from_doc(index: usize, doc: &ReferenceCaseDoc) -> Result<Self> {
        let record = FeatureRecord::from_json(&doc.record).map_err(|e| {
            CoreError::ModelValidation(format!("reference case {index} has an invalid record: {e}"))
        })?;
        let tolerance = doc.tolerance.unwrap_or(DEFAULT_TOLERANCE);
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(CoreError::ModelValidation(format!(
                "reference case {index} has invalid tolerance {tolerance}"
            )));
        }
        Ok(Self {
            name: format!("metadata-case-{index}"),
            record,
            expected_label: doc.expected_label.clone(),
            expected_confidence: doc.expected_confidence,
            tolerance,
        })
    }
}

/// Canonical case followed by the ones recorded in the metadata
pub fn reference_cases(docs: &[ReferenceCaseDoc]) -> Result<Vec<ReferenceCase>> {
    let mut cases = vec![ReferenceCase::canonical()];
    for (i, doc) in docs.iter().enumerate() {
        cases.push(ReferenceCase::from_doc(i, doc)?);
    }
    Ok(cases)
}

/// Outcome of one reference case
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseOutcome {
    pub name: String,
    pub predicted_species: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub outcomes: Vec<CaseOutcome>,
}

impl ValidationReport {
    pub fn cases_checked(&self) -> usize {
        self.outcomes.len()
    }
}

/// Run every case; the first failed check aborts with `ModelValidation`
pub fn validate(model: &LoadedModel, cases: &[ReferenceCase]) -> Result<ValidationReport> {
    let mut outcomes = Vec::with_capacity(cases.len());

    for case in cases {
        let fail = |reason: String| {
            CoreError::ModelValidation(format!("reference case '{}': {}", case.name, reason))
        };

        let vector = model
            .encoder()
            .encode(&case.record)
            .map_err(|e| fail(e.to_string()))?;

        let first = predict(&vector, model.booster(), model.metadata(), MAX_CONFIDENCE_DECIMALS)
            .map_err(|e| fail(e.to_string()))?;
        let second = predict(&vector, model.booster(), model.metadata(), MAX_CONFIDENCE_DECIMALS)
            .map_err(|e| fail(e.to_string()))?;

        if first != second {
            return Err(fail("repeated evaluation gave different results".to_string()));
        }

        if first.predicted_species != case.expected_label {
            return Err(fail(format!(
                "expected {} but model predicted {} ({:.4})",
                case.expected_label, first.predicted_species, first.confidence
            )));
        }

        if !(0.0..=1.0).contains(&first.confidence) {
            return Err(fail(format!("confidence {} outside [0, 1]", first.confidence)));
        }

        let sum: f64 = first.probabilities.iter().sum();
        if (sum - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
            return Err(fail(format!("probabilities sum to {sum}")));
        }

        if let Some(expected) = case.expected_confidence {
            if (first.confidence - expected).abs() > case.tolerance {
                return Err(fail(format!(
                    "confidence {:.6} differs from expected {} by more than {}",
                    first.confidence, expected, case.tolerance
                )));
            }
        }

        debug!(
            case = %case.name,
            species = %first.predicted_species,
            confidence = first.confidence,
            "Reference case passed"
        );
        outcomes.push(CaseOutcome {
            name: case.name.clone(),
            predicted_species: first.predicted_species,
            confidence: first.confidence,
        });
    }

    info!("Startup validation passed ({} reference cases)", outcomes.len());
    Ok(ValidationReport { outcomes })
}
