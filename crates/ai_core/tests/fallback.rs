use async_trait::async_trait;
use penguin_ai_core::{
    resolve, ArtifactConfig, ArtifactLoader, CoreError, FetchError, LoadOptions, LocalArtifact,
    ObjectStore, Provenance, RemoteArtifact, RetryPolicy, SourceDescriptor,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn bundle_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../models")
}

fn bundled_local() -> LocalArtifact {
    LocalArtifact {
        model_path: bundle_dir().join("model.json"),
        metadata_path: bundle_dir().join("model_metadata.json"),
    }
}

/// In-memory bucket; objects missing from the map answer with `default_error`
struct FakeStore {
    objects: HashMap<String, Vec<u8>>,
    transient_failures: Mutex<usize>,
    default_error: FetchError,
    calls: AtomicUsize,
}

impl FakeStore {
    fn empty(error: FetchError) -> Self {
        Self {
            objects: HashMap::new(),
            transient_failures: Mutex::new(0),
            default_error: error,
            calls: AtomicUsize::new(0),
        }
    }

    fn with_bundle() -> Self {
        let mut store = Self::empty(FetchError::NotFound);
        store.objects.insert(
            "model.json".to_string(),
            std::fs::read(bundle_dir().join("model.json")).unwrap(),
        );
        store.objects.insert(
            "model_metadata.json".to_string(),
            std::fs::read(bundle_dir().join("model_metadata.json")).unwrap(),
        );
        store
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn fetch(&self, _bucket: &str, object: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.transient_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(FetchError::Status(503));
            }
        }
        self.objects
            .get(object)
            .cloned()
            .ok_or_else(|| self.default_error.clone())
    }
}

fn remote(fallback: Option<LocalArtifact>) -> SourceDescriptor {
    SourceDescriptor::Remote(RemoteArtifact {
        bucket: "penguin-models".to_string(),
        model_object: "model.json".to_string(),
        metadata_object: "model_metadata.json".to_string(),
        fallback,
    })
}

fn loader(store: Arc<FakeStore>) -> ArtifactLoader {
    ArtifactLoader::new(LoadOptions {
        retry: RetryPolicy {
            retries: 2,
            backoff_ms: 0,
        },
        ..LoadOptions::default()
    })
    .with_store(store)
}

#[tokio::test]
async fn remote_artifact_is_preferred() {
    let store = Arc::new(FakeStore::with_bundle());
    let model = loader(store.clone())
        .load(&remote(Some(bundled_local())))
        .await
        .unwrap();
    assert_eq!(model.provenance(), Provenance::Remote);
    assert_eq!(model.location(), "gs://penguin-models/model.json");
    assert_eq!(store.calls(), 2);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let store = FakeStore::with_bundle();
    *store.transient_failures.lock().unwrap() = 2;
    let store = Arc::new(store);
    let model = loader(store.clone()).load(&remote(None)).await.unwrap();
    assert_eq!(model.provenance(), Provenance::Remote);
    assert_eq!(store.calls(), 4);
}

#[tokio::test]
async fn unreachable_remote_falls_back_to_local() {
    let store = Arc::new(FakeStore::empty(FetchError::Timeout));
    let model = loader(store.clone())
        .load(&remote(Some(bundled_local())))
        .await
        .unwrap();
    assert_eq!(model.provenance(), Provenance::LocalFallback);
    // three attempts on the model object, then the fallback
    assert_eq!(store.calls(), 3);
}

#[tokio::test]
async fn missing_object_falls_back_without_retry() {
    let store = Arc::new(FakeStore::empty(FetchError::NotFound));
    let model = loader(store.clone())
        .load(&remote(Some(bundled_local())))
        .await
        .unwrap();
    assert_eq!(model.provenance(), Provenance::LocalFallback);
    assert_eq!(store.calls(), 1);
}

#[tokio::test]
async fn no_fallback_is_fatal() {
    let store = Arc::new(FakeStore::empty(FetchError::PermissionDenied));
    let err = loader(store).load(&remote(None)).await.unwrap_err();
    match err {
        CoreError::ModelFetch { location, reason } => {
            assert_eq!(location, "gs://penguin-models/model.json");
            assert_eq!(reason, "permission denied");
        }
        other => panic!("expected fetch error, got {other:?}"),
    }
}

#[tokio::test]
async fn fallback_files_absent_is_fatal() {
    let store = Arc::new(FakeStore::empty(FetchError::NotFound));
    let fallback = LocalArtifact {
        model_path: "/nonexistent/model.json".into(),
        metadata_path: "/nonexistent/model_metadata.json".into(),
    };
    let err = loader(store).load(&remote(Some(fallback))).await.unwrap_err();
    assert!(matches!(err, CoreError::ModelFetch { .. }));
    assert!(!err.to_string().contains("local fallback"));
}

#[tokio::test]
async fn remote_and_fallback_failing_names_both_causes() {
    let dir = tempfile::tempdir().unwrap();
    let fallback = LocalArtifact {
        model_path: dir.path().join("model.json"),
        metadata_path: dir.path().join("model_metadata.json"),
    };
    std::fs::write(&fallback.model_path, b"{}").unwrap();
    std::fs::write(&fallback.metadata_path, b"not json").unwrap();

    let store = Arc::new(FakeStore::empty(FetchError::NotFound));
    let err = loader(store).load(&remote(Some(fallback))).await.unwrap_err();
    assert!(matches!(err, CoreError::ModelFetch { .. }));
    let message = err.to_string();
    assert!(message.contains("remote: "), "{message}");
    assert!(message.contains("local fallback: "), "{message}");
}

#[tokio::test]
async fn corrupt_remote_bytes_never_fall_back() {
    let mut store = FakeStore::with_bundle();
    store
        .objects
        .get_mut("model.json")
        .unwrap()
        .extend_from_slice(b"   ");
    let err = loader(Arc::new(store))
        .load(&remote(Some(bundled_local())))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ModelValidation(_)));
}

#[tokio::test]
async fn blank_bucket_never_contacts_the_store() {
    let local = bundled_local();
    let config = ArtifactConfig {
        bucket: Some("   ".to_string()),
        local_model_path: Some(local.model_path),
        local_metadata_path: Some(local.metadata_path),
        ..ArtifactConfig::default()
    };
    let source = resolve(&config).unwrap();

    let store = Arc::new(FakeStore::with_bundle());
    let model = loader(store.clone()).load(&source).await.unwrap();
    assert_eq!(model.provenance(), Provenance::Local);
    assert_eq!(store.calls(), 0);
}
