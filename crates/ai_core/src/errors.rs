//! Error types for the penguin AI core
//!
//! Startup-class errors (`Configuration`, `ModelFetch`, `ModelValidation`) stop
//! the service before it accepts traffic. Request-class errors (`Encoding`,
//! `Inference`) are scoped to a single prediction.

use std::fmt;
use thiserror::Error;

/// Errors produced by the resolution, loading and inference pipeline
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid or contradictory artifact source configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Remote or local artifact bytes could not be retrieved
    #[error("Model fetch failed ({location}): {reason}")]
    ModelFetch { location: String, reason: String },

    /// Artifact bytes were retrieved but failed parsing, integrity or reference checks
    #[error("Model validation failed: {0}")]
    ModelValidation(String),

    /// Caller-supplied record violates the training-time schema
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// Unexpected failure while evaluating the loaded model
    #[error("Inference failed: {0}")]
    Inference(String),
}

impl CoreError {
    pub fn fetch(location: impl Into<String>, reason: impl fmt::Display) -> Self {
        CoreError::ModelFetch {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors that must halt startup
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::Configuration(_) | CoreError::ModelFetch { .. } | CoreError::ModelValidation(_)
        )
    }
}

/// A single schema violation in an inbound feature record
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldViolation {
    #[error("field required")]
    Missing { field: String },

    #[error("expected {expected}")]
    InvalidType { field: String, expected: &'static str },

    #[error("value must be a finite number")]
    NonFinite { field: String },

    #[error("value {value} outside allowed range [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("unknown category '{value}'; expected one of: {}", .allowed.join(", "))]
    UnknownCategory {
        field: String,
        value: String,
        allowed: Vec<String>,
    },
}

impl FieldViolation {
    /// Name of the offending wire field
    pub fn field(&self) -> &str {
        match self {
            FieldViolation::Missing { field }
            | FieldViolation::InvalidType { field, .. }
            | FieldViolation::NonFinite { field }
            | FieldViolation::OutOfRange { field, .. }
            | FieldViolation::UnknownCategory { field, .. } => field,
        }
    }
}

/// Rejection of a feature record, carrying every violation found
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid feature record: {}", summarize(.violations))]
pub struct EncodingError {
    pub violations: Vec<FieldViolation>,
}

impl EncodingError {
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    pub fn single(violation: FieldViolation) -> Self {
        Self {
            violations: vec![violation],
        }
    }

    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(FieldViolation::field).collect()
    }
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field(), v))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
