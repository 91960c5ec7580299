//! Penguin species inference core
//!
//! Locates and validates a trained gradient-boosted-tree classifier, rebuilds
//! the training-time feature encoding and turns measurement records into
//! species predictions.
//!
//! Modules:
//! - `source`: configuration to artifact source (bucket or local files)
//! - `store`: object store client with bounded retry
//! - `loader`: artifact loading, integrity check and fallback policy
//! - `gbdt`: XGBoost JSON model parsing and evaluation
//! - `metadata`: training-time metadata document
//! - `integrity`: content tokens over model bytes
//! - `features`: wire record validation and one-hot encoding
//! - `prediction`: argmax and confidence
//! - `validation`: reference predictions run at startup

pub mod errors;
pub mod features;
pub mod gbdt;
pub mod integrity;
pub mod loader;
pub mod metadata;
pub mod prediction;
pub mod source;
pub mod store;
pub mod validation;

pub use errors::{CoreError, EncodingError, FieldViolation, Result};
pub use features::{
    encode, EncodedVector, FeatureBounds, FeatureEncoder, FeatureRecord, Island, Range, Sex,
};
pub use gbdt::{Booster, GbdtError, Objective};
pub use integrity::{HashAlgorithm, IntegrityToken};
pub use loader::{ArtifactLoader, LoadOptions, LoadedModel, Provenance};
pub use metadata::{ModelMetadata, ReferenceCaseDoc};
pub use prediction::{
    predict, PredictionResult, DEFAULT_CONFIDENCE_DECIMALS, MAX_CONFIDENCE_DECIMALS,
};
pub use source::{resolve, ArtifactConfig, LocalArtifact, RemoteArtifact, SourceDescriptor};
pub use store::{
    fetch_with_retry, FetchError, GcsConfig, GcsObjectStore, ObjectStore, RetryPolicy,
};
pub use validation::{validate, ReferenceCase, ValidationReport};

/// Crate version string reported by the service
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
