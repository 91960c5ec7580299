//! Artifact loading
//!
//! Retrieves model and metadata bytes from the resolved source, checks them
//! and assembles a [`LoadedModel`]. A model is only returned once every
//! check, including the reference predictions, has passed.

use crate::errors::{CoreError, Result};
use crate::features::{FeatureBounds, FeatureEncoder, FeatureRecord};
use crate::gbdt::Booster;
use crate::integrity::IntegrityToken;
use crate::metadata::ModelMetadata;
use crate::prediction::{predict, PredictionResult};
use crate::source::{LocalArtifact, RemoteArtifact, SourceDescriptor};
use crate::store::{fetch_with_retry, ObjectStore, RetryPolicy};
use crate::validation::{reference_cases, validate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Where the serving model actually came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Remote,
    Local,
    LocalFallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Remote => "remote",
            Provenance::Local => "local",
            Provenance::LocalFallback => "local-fallback",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks applied while loading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Refuse metadata without an integrity token
    pub require_integrity: bool,
    pub bounds: FeatureBounds,
    pub retry: RetryPolicy,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            require_integrity: true,
            bounds: FeatureBounds::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// A validated model ready to serve; never mutated after construction
#[derive(Debug, Clone)]
pub struct LoadedModel {
    booster: Booster,
    metadata: ModelMetadata,
    encoder: FeatureEncoder,
    provenance: Provenance,
    location: String,
    integrity: Option<IntegrityToken>,
}

impl LoadedModel {
    /// Parse and cross-check raw artifact bytes.
    ///
    /// Reference predictions are not run here; [`ArtifactLoader::load`] does that.
    pub fn from_bytes(
        model_bytes: &[u8],
        metadata_bytes: &[u8],
        provenance: Provenance,
        location: impl Into<String>,
        options: &LoadOptions,
    ) -> Result<Self> {
        let metadata = ModelMetadata::from_json_slice(metadata_bytes)?;

        let integrity = metadata.integrity_token()?;
        match &integrity {
            Some(token) => token.verify(model_bytes)?,
            None if options.require_integrity => {
                return Err(CoreError::ModelValidation(
                    "metadata carries no integrity token".to_string(),
                ))
            }
            None => warn!("Metadata carries no integrity token, model bytes are unverified"),
        }

        let booster = Booster::from_json_slice(model_bytes)
            .map_err(|e| CoreError::ModelValidation(format!("model artifact: {e}")))?;

        if booster.num_classes() != metadata.class_labels.len() {
            return Err(CoreError::ModelValidation(format!(
                "model has {} classes but metadata lists {} labels",
                booster.num_classes(),
                metadata.class_labels.len()
            )));
        }
        if booster.num_feature() != metadata.feature_columns.len() {
            return Err(CoreError::ModelValidation(format!(
                "model expects {} features but metadata lists {} columns",
                booster.num_feature(),
                metadata.feature_columns.len()
            )));
        }
        if !booster.feature_names().is_empty()
            && booster.feature_names() != metadata.feature_columns.as_slice()
        {
            return Err(CoreError::ModelValidation(format!(
                "column order differs: model records {:?}, metadata lists {:?}",
                booster.feature_names(),
                metadata.feature_columns
            )));
        }

        let encoder = FeatureEncoder::new(&metadata, options.bounds.clone())?;

        Ok(Self {
            booster,
            metadata,
            encoder,
            provenance,
            location: location.into(),
            integrity,
        })
    }

    pub fn booster(&self) -> &Booster {
        &self.booster
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Path or URI the model bytes were read from
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn integrity(&self) -> Option<&IntegrityToken> {
        self.integrity.as_ref()
    }

    /// Encode and predict one record
    pub fn predict(&self, record: &FeatureRecord, decimals: u32) -> Result<PredictionResult> {
        let vector = self.encoder.encode(record)?;
        predict(&vector, &self.booster, &self.metadata, decimals)
    }
}

/// Loads artifacts from a [`SourceDescriptor`]
#[derive(Clone)]
pub struct ArtifactLoader {
    store: Option<Arc<dyn ObjectStore>>,
    options: LoadOptions,
}

impl ArtifactLoader {
    /// Loader without an object store; remote sources fail with `Configuration`
    pub fn new(options: LoadOptions) -> Self {
        Self {
            store: None,
            options,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Fetch, check and validate. Every call re-fetches.
    #[instrument(skip(self, source), fields(source = %source))]
    pub async fn load(&self, source: &SourceDescriptor) -> Result<LoadedModel> {
        let model = match source {
            SourceDescriptor::Local(local) => self.load_local(local, Provenance::Local).await?,
            SourceDescriptor::Remote(remote) => self.load_remote_or_fallback(remote).await?,
        };

        let cases = reference_cases(&model.metadata.reference_cases)?;
        let report = validate(&model, &cases)?;

        let integrity = model
            .integrity
            .as_ref()
            .map_or_else(|| "none".to_string(), ToString::to_string);
        info!(
            provenance = %model.provenance,
            location = %model.location,
            classes = model.metadata.class_labels.len(),
            features = model.metadata.feature_columns.len(),
            trees = model.booster.num_trees(),
            integrity = %integrity,
            reference_cases = report.cases_checked(),
            "Model loaded"
        );
        Ok(model)
    }

    async fn load_remote_or_fallback(&self, remote: &RemoteArtifact) -> Result<LoadedModel> {
        let remote_err = match self.load_remote(remote).await {
            Ok(model) => return Ok(model),
            Err(err @ CoreError::ModelFetch { .. }) => err,
            Err(err) => return Err(err),
        };

        let Some(fallback) = remote.fallback.as_ref().filter(|f| f.exists()) else {
            return Err(remote_err);
        };

        warn!(
            "Remote artifact unavailable ({}), falling back to {}",
            remote_err,
            fallback.model_path.display()
        );

        self.load_local(fallback, Provenance::LocalFallback)
            .await
            .map_err(|local_err| {
                CoreError::fetch(
                    format!("{} and {}", remote.model_uri(), fallback.model_path.display()),
                    format!("remote: {remote_err}; local fallback: {local_err}"),
                )
            })
    }

    async fn load_remote(&self, remote: &RemoteArtifact) -> Result<LoadedModel> {
        let store = self.store.as_deref().ok_or_else(|| {
            CoreError::Configuration("remote source configured without an object store".to_string())
        })?;

        let retry = &self.options.retry;
        let model_bytes = fetch_with_retry(store, &remote.bucket, &remote.model_object, retry)
            .await
            .map_err(|e| CoreError::fetch(remote.model_uri(), e))?;
        let metadata_bytes =
            fetch_with_retry(store, &remote.bucket, &remote.metadata_object, retry)
                .await
                .map_err(|e| CoreError::fetch(remote.metadata_uri(), e))?;

        info!(
            model_bytes = model_bytes.len(),
            metadata_bytes = metadata_bytes.len(),
            "Fetched remote artifact"
        );

        LoadedModel::from_bytes(
            &model_bytes,
            &metadata_bytes,
            Provenance::Remote,
            remote.model_uri(),
            &self.options,
        )
    }

    async fn load_local(
        &self,
        local: &LocalArtifact,
        provenance: Provenance,
    ) -> Result<LoadedModel> {
        let model_bytes = read_file(&local.model_path).await?;
        let metadata_bytes = read_file(&local.metadata_path).await?;

        info!(
            model_bytes = model_bytes.len(),
            metadata_bytes = metadata_bytes.len(),
            "Read local artifact"
        );

        LoadedModel::from_bytes(
            &model_bytes,
            &metadata_bytes,
            provenance,
            local.model_path.display().to_string(),
            &self.options,
        )
    }
}

impl fmt::Debug for ArtifactLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactLoader")
            .field("store", &self.store.is_some())
            .field("options", &self.options)
            .finish()
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| CoreError::fetch(path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbdt::{Node, Tree};
    use serde_json::json;

    /// Single-feature, two-class model serialized in XGBoost's layout
    fn tiny_model_bytes() -> Vec<u8> {
        let trees = [
            Tree::from_nodes(0, &[Node::split(0, 0.5, 1, 2), Node::leaf(1.0), Node::leaf(-1.0)]),
            Tree::from_nodes(1, &[Node::split(0, 0.5, 1, 2), Node::leaf(-1.0), Node::leaf(1.0)]),
        ];
        serde_json::to_vec(&json!({
            "learner": {
                "feature_names": ["bill_length_mm"],
                "gradient_booster": {
                    "name": "gbtree",
                    "model": {"trees": trees, "tree_info": [0, 1]}
                },
                "learner_model_param": {"base_score": "5E-1", "num_class": "2", "num_feature": "1"},
                "objective": {"name": "multi:softprob"}
            },
            "version": [2, 0, 3]
        }))
        .unwrap()
    }

    fn tiny_metadata(model: &[u8], columns: &[&str]) -> Vec<u8> {
        let token = IntegrityToken::compute(crate::integrity::HashAlgorithm::Sha256, model);
        serde_json::to_vec(&json!({
            "feature_columns": columns,
            "class_labels": ["Adelie", "Gentoo"],
            "integrity": token.to_string()
        }))
        .unwrap()
    }

    #[test]
    fn test_from_bytes_assembles_model() {
        let model = tiny_model_bytes();
        let metadata = tiny_metadata(&model, &["bill_length_mm"]);
        let loaded =
            LoadedModel::from_bytes(&model, &metadata, Provenance::Local, "mem", &LoadOptions::default())
                .unwrap();
        assert_eq!(loaded.provenance(), Provenance::Local);
        assert_eq!(loaded.location(), "mem");
        assert_eq!(loaded.encoder().width(), 1);
        assert!(loaded.integrity().is_some());
    }

    #[test]
    fn test_integrity_mismatch_is_rejected() {
        let model = tiny_model_bytes();
        let metadata = tiny_metadata(b"other bytes", &["bill_length_mm"]);
        let err =
            LoadedModel::from_bytes(&model, &metadata, Provenance::Local, "mem", &LoadOptions::default())
                .unwrap_err();
        assert!(matches!(err, CoreError::ModelValidation(_)));
        assert!(err.to_string().contains("integrity token mismatch"));
    }

    #[test]
    fn test_missing_token_respects_require_integrity() {
        let model = tiny_model_bytes();
        let metadata = serde_json::to_vec(&json!({
            "feature_columns": ["bill_length_mm"],
            "class_labels": ["Adelie", "Gentoo"]
        }))
        .unwrap();

        let strict = LoadOptions::default();
        assert!(LoadedModel::from_bytes(&model, &metadata, Provenance::Local, "mem", &strict).is_err());

        let lenient = LoadOptions {
            require_integrity: false,
            ..LoadOptions::default()
        };
        assert!(LoadedModel::from_bytes(&model, &metadata, Provenance::Local, "mem", &lenient).is_ok());
    }

    #[test]
    fn test_column_name_mismatch_is_rejected() {
        let model = tiny_model_bytes();
        let metadata = tiny_metadata(&model, &["bill_depth_mm"]);
        let err =
            LoadedModel::from_bytes(&model, &metadata, Provenance::Local, "mem", &LoadOptions::default())
                .unwrap_err();
        assert!(err.to_string().contains("column order differs"));
    }

    #[test]
    fn test_class_count_mismatch_is_rejected() {
        let model = tiny_model_bytes();
        let token = IntegrityToken::compute(crate::integrity::HashAlgorithm::Sha256, &model);
        let metadata = serde_json::to_vec(&json!({
            "feature_columns": ["bill_length_mm"],
            "class_labels": ["Adelie", "Chinstrap", "Gentoo"],
            "integrity": token.to_string()
        }))
        .unwrap();
        let err =
            LoadedModel::from_bytes(&model, &metadata, Provenance::Local, "mem", &LoadOptions::default())
                .unwrap_err();
        assert!(err.to_string().contains("2 classes"));
    }

    #[test]
    fn test_provenance_labels() {
        assert_eq!(Provenance::Remote.to_string(), "remote");
        assert_eq!(Provenance::LocalFallback.as_str(), "local-fallback");
        assert_eq!(
            serde_json::to_string(&Provenance::LocalFallback).unwrap(),
            "\"local-fallback\""
        );
    }

    #[tokio::test]
    async fn test_missing_local_file_is_a_fetch_error() {
        let loader = ArtifactLoader::new(LoadOptions::default());
        let source = SourceDescriptor::Local(LocalArtifact {
            model_path: "/nonexistent/model.json".into(),
            metadata_path: "/nonexistent/model_metadata.json".into(),
        });
        let err = loader.load(&source).await.unwrap_err();
        assert!(matches!(err, CoreError::ModelFetch { .. }));
    }

    #[tokio::test]
    async fn test_remote_without_store_is_a_configuration_error() {
        let loader = ArtifactLoader::new(LoadOptions::default());
        let source = SourceDescriptor::Remote(RemoteArtifact {
            bucket: "penguin-models".to_string(),
            model_object: "model.json".to_string(),
            metadata_object: "model_metadata.json".to_string(),
            fallback: None,
        });
        assert!(matches!(
            loader.load(&source).await,
            Err(CoreError::Configuration(_))
        ));
    }
}
