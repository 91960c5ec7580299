//! Artifact source resolution
//!
//! Decides once, from configuration, where the model and its metadata come
//! from. A configured bucket means the object store; no bucket means the
//! bundled local files.

use crate::errors::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_MODEL_OBJECT: &str = "model.json";
pub const DEFAULT_METADATA_OBJECT: &str = "model_metadata.json";
pub const DEFAULT_LOCAL_MODEL_PATH: &str = "models/model.json";
pub const DEFAULT_LOCAL_METADATA_PATH: &str = "models/model_metadata.json";

/// Where artifacts may be found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Object store bucket; blank or absent selects local files
    pub bucket: Option<String>,
    pub model_object: String,
    pub metadata_object: String,
    pub local_model_path: Option<PathBuf>,
    pub local_metadata_path: Option<PathBuf>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            model_object: DEFAULT_MODEL_OBJECT.to_string(),
            metadata_object: DEFAULT_METADATA_OBJECT.to_string(),
            local_model_path: Some(PathBuf::from(DEFAULT_LOCAL_MODEL_PATH)),
            local_metadata_path: Some(PathBuf::from(DEFAULT_LOCAL_METADATA_PATH)),
        }
    }
}

/// Model and metadata files on the local filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    pub model_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl LocalArtifact {
    /// Both files are present on disk
    pub fn exists(&self) -> bool {
        self.model_path.is_file() && self.metadata_path.is_file()
    }
}

/// Model and metadata objects in a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArtifact {
    pub bucket: String,
    pub model_object: String,
    pub metadata_object: String,
    pub fallback: Option<LocalArtifact>,
}

impl RemoteArtifact {
    pub fn model_uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.model_object)
    }

    pub fn metadata_uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.metadata_object)
    }
}

/// Resolved artifact source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    Local(LocalArtifact),
    Remote(RemoteArtifact),
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Local(local) => write!(
                f,
                "local {} + {}",
                local.model_path.display(),
                local.metadata_path.display()
            ),
            SourceDescriptor::Remote(remote) => {
                write!(f, "remote {} + {}", remote.model_uri(), remote.metadata_uri())?;
                if let Some(fallback) = &remote.fallback {
                    write!(f, " (fallback {})", fallback.model_path.display())?;
                }
                Ok(())
            }
        }
    }
}

/// Turn configuration into a source descriptor
pub fn resolve(config: &ArtifactConfig) -> Result<SourceDescriptor> {
    let local = local_artifact(config);

    let bucket = match config.bucket.as_deref().map(str::trim) {
        None | Some("") => {
            return local.map(SourceDescriptor::Local).ok_or_else(|| {
                CoreError::Configuration(
                    "no bucket configured and local model/metadata paths are unset".to_string(),
                )
            });
        }
        Some(bucket) => bucket,
    };

    validate_bucket_name(bucket)?;

    let model_object = config.model_object.trim();
    let metadata_object = config.metadata_object.trim();
    if model_object.is_empty() || metadata_object.is_empty() {
        return Err(CoreError::Configuration(format!(
            "bucket '{bucket}' is set but the model or metadata object path is empty"
        )));
    }

    Ok(SourceDescriptor::Remote(RemoteArtifact {
        bucket: bucket.to_string(),
        model_object: model_object.to_string(),
        metadata_object: metadata_object.to_string(),
        fallback: local,
    }))
}

fn local_artifact(config: &ArtifactConfig) -> Option<LocalArtifact> {
    let non_empty = |p: &Option<PathBuf>| p.clone().filter(|p| !p.as_os_str().is_empty());
    Some(LocalArtifact {
        model_path: non_empty(&config.local_model_path)?,
        metadata_path: non_empty(&config.local_metadata_path)?,
    })
}

/// Cloud Storage naming: 3-63 of `a-z 0-9 - _ .`, alphanumeric at both ends
pub fn validate_bucket_name(bucket: &str) -> Result<()> {
    let invalid = |why: &str| CoreError::Configuration(format!("invalid bucket name '{bucket}': {why}"));

    if !(3..=63).contains(&bucket.len()) {
        return Err(invalid("length must be between 3 and 63"));
    }
    if let Some(c) = bucket
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(&format!("character '{c}' is not allowed")));
    }
    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alnum(bucket.chars().next()) || !alnum(bucket.chars().last()) {
        return Err(invalid("must start and end with a letter or digit"));
    }
    Ok(())
}
