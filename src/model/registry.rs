// Model Registry for versioned price models

use super::artifact::{ModelArtifact, Predictor};
use crate::config::{CachePolicy, RegistryConfig};
use crate::error::{PriceError, Result};
use crate::features::Schema;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Source of persisted artifacts
pub trait ArtifactStore: Send + Sync {
    /// Load the artifact for `version`
    fn load(&self, version: &str) -> Result<ModelArtifact>;
}

/// Artifacts laid out as `<model_dir>/<version>/<artifact_file>`
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    model_dir: PathBuf,
    artifact_file: String,
}

impl FsArtifactStore {
    /// Creates a store rooted at `model_dir`
    pub fn new(model_dir: impl Into<PathBuf>, artifact_file: impl Into<String>) -> Self {
        Self {
            model_dir: model_dir.into(),
            artifact_file: artifact_file.into(),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.model_dir.clone(), config.artifact_file.clone())
    }

    /// Artifact path for a version
    pub fn path_for(&self, version: &str) -> PathBuf {
        self.model_dir.join(version).join(&self.artifact_file)
    }

    /// Write an artifact under its own version directory
    pub fn publish(&self, artifact: &ModelArtifact) -> Result<PathBuf> {
        let path = self.path_for(&artifact.version);
        artifact.save(&path)?;
        info!(version = %artifact.version, path = %path.display(), "Published model artifact");
        Ok(path)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn load(&self, version: &str) -> Result<ModelArtifact> {
        let path = self.path_for(version);
        if !path.exists() {
            return Err(PriceError::model_not_found(
                version,
                format!("no artifact at {}", path.display()),
            ));
        }

        let artifact = ModelArtifact::load(&path).map_err(|e| {
            PriceError::model_not_found(version, format!("unreadable artifact: {}", e))
        })?;

        if artifact.version != version {
            return Err(PriceError::model_not_found(
                version,
                format!("artifact at {} declares {}", path.display(), artifact.version),
            ));
        }

        Ok(artifact)
    }
}

/// A resolved model ready to serve
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub version: String,
    pub predictor: Arc<dyn Predictor>,
    pub schema: Schema,
}

struct CachedModel {
    artifact: Arc<ModelArtifact>,
    loaded_at: Instant,
}

/// Registry statistics
#[derive(Default)]
pub struct RegistryStats {
    /// Artifact loads from the store
    pub loads: AtomicU64,
    /// Resolutions served from cache
    pub cache_hits: AtomicU64,
    /// Failed resolutions
    pub failures: AtomicU64,
    /// Entries dropped by invalidation or expiry
    pub evictions: AtomicU64,
}

/// Point-in-time copy of [`RegistryStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RegistryStatsSnapshot {
    pub loads: u64,
    pub cache_hits: u64,
    pub failures: u64,
    pub evictions: u64,
}

/// Model registry
///
/// Maps version tags to loaded models. How long a loaded model is reused is
/// governed by the [`CachePolicy`]; concurrent misses for the same version may
/// each load the artifact, and the last insert wins.
pub struct ModelRegistry {
    /// Versions that may be resolved
    versions: Vec<String>,
    /// Cache policy
    policy: CachePolicy,
    /// Artifact source
    store: Arc<dyn ArtifactStore>,
    /// Loaded models by version
    cache: RwLock<HashMap<String, CachedModel>>,
    /// Statistics
    stats: RegistryStats,
}

impl ModelRegistry {
    /// Creates a registry backed by the filesystem store
    pub fn new(config: &RegistryConfig) -> Self {
        Self::with_store(
            config.versions.clone(),
            config.cache,
            Arc::new(FsArtifactStore::from_config(config)),
        )
    }

    /// Creates a registry with a custom store
    pub fn with_store(
        versions: Vec<String>,
        policy: CachePolicy,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            versions,
            policy,
            store,
            cache: RwLock::new(HashMap::new()),
            stats: RegistryStats::default(),
        }
    }

    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Whether `version` is one of the configured tags
    pub fn is_known(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    /// Resolve a version to its predictor and schema
    pub fn resolve(&self, version: &str) -> Result<ResolvedModel> {
        let artifact = self.resolve_artifact(version)?;
        Ok(ResolvedModel {
            version: version.to_string(),
            schema: artifact.schema.clone(),
            predictor: artifact,
        })
    }

    /// Resolve a version to the full artifact
    pub fn resolve_artifact(&self, version: &str) -> Result<Arc<ModelArtifact>> {
        if !self.is_known(version) {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
            return Err(PriceError::model_not_found(version, "unknown version"));
        }

        if let Some(artifact) = self.cached(version) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(artifact);
        }

        let artifact = match self.store.load(version) {
            Ok(artifact) => Arc::new(artifact),
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(version, error = %e, "Failed to load model artifact");
                return Err(e);
            }
        };
        self.stats.loads.fetch_add(1, Ordering::Relaxed);
        debug!(version, columns = artifact.schema.len(), "Loaded model artifact");

        if self.policy != CachePolicy::Reload {
            self.cache.write().insert(
                version.to_string(),
                CachedModel {
                    artifact: artifact.clone(),
                    loaded_at: Instant::now(),
                },
            );
        }

        Ok(artifact)
    }

    fn cached(&self, version: &str) -> Option<Arc<ModelArtifact>> {
        let ttl = match self.policy {
            CachePolicy::Reload => return None,
            CachePolicy::Ttl { ttl } => Some(ttl),
            CachePolicy::Manual => None,
        };

        {
            let cache = self.cache.read();
            let entry = cache.get(version)?;
            match ttl {
                Some(ttl) if entry.loaded_at.elapsed() >= ttl => {}
                _ => return Some(entry.artifact.clone()),
            }
        }

        // Expired; drop it unless a fresher entry was inserted meanwhile
        let mut cache = self.cache.write();
        if let (Some(entry), Some(ttl)) = (cache.get(version), ttl) {
            if entry.loaded_at.elapsed() >= ttl {
                cache.remove(version);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(version, "Cached model expired");
            }
        }
        None
    }

    /// Drop the cached model for a version. Returns whether one was cached.
    pub fn invalidate(&self, version: &str) -> bool {
        let removed = self.cache.write().remove(version).is_some();
        if removed {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            info!(version, "Invalidated cached model");
        }
        removed
    }

    /// Drop every cached model
    pub fn invalidate_all(&self) -> usize {
        let mut cache = self.cache.write();
        let count = cache.len();
        cache.clear();
        self.stats
            .evictions
            .fetch_add(count as u64, Ordering::Relaxed);
        info!(count, "Invalidated all cached models");
        count
    }

    /// Versions currently held in cache
    pub fn cached_versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self.cache.read().keys().cloned().collect();
        versions.sort();
        versions
    }

    /// Load every configured version once, logging failures
    pub fn warm_up(&self) -> usize {
        self.versions
            .iter()
            .filter(|version| self.resolve_artifact(version).is_ok())
            .count()
    }

    pub fn stats(&self) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            loads: self.stats.loads.load(Ordering::Relaxed),
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureLayout;
    use crate::model::LinearModel;
    use std::time::Duration;

    struct CountingStore {
        inner: FsArtifactStore,
        loads: AtomicU64,
    }

    impl ArtifactStore for CountingStore {
        fn load(&self, version: &str) -> Result<ModelArtifact> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load(version)
        }
    }

    fn artifact(version: &str, intercept: f64) -> ModelArtifact {
        let schema = FeatureLayout::standard().canonical_schema();
        ModelArtifact::new(
            version,
            schema.clone(),
            LinearModel {
                coefficients: vec![0.0; schema.len()],
                intercept,
            },
        )
        .unwrap()
    }

    fn setup(policy: CachePolicy) -> (tempfile::TempDir, Arc<CountingStore>, ModelRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsArtifactStore::new(dir.path(), "model.json");
        fs.publish(&artifact("v1", 100.0)).unwrap();
        let store = Arc::new(CountingStore {
            inner: fs,
            loads: AtomicU64::new(0),
        });
        let registry = ModelRegistry::with_store(
            vec!["v1".to_string(), "v2".to_string()],
            policy,
            store.clone(),
        );
        (dir, store, registry)
    }

    #[test]
    fn test_unknown_version() {
        let (_dir, store, registry) = setup(CachePolicy::Manual);
        let err = registry.resolve("v9").unwrap_err();
        assert!(matches!(err, PriceError::ModelNotFound { .. }));
        assert_eq!(store.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_artifact() {
        let (_dir, _store, registry) = setup(CachePolicy::Manual);
        let err = registry.resolve("v2").unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(registry.stats().failures, 1);
    }

    #[test]
    fn test_corrupt_artifact() {
        let (dir, _store, registry) = setup(CachePolicy::Manual);
        let path = dir.path().join("v2").join("model.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            registry.resolve("v2"),
            Err(PriceError::ModelNotFound { .. })
        ));
    }

    #[test]
    fn test_misplaced_artifact() {
        let (dir, _store, registry) = setup(CachePolicy::Manual);
        artifact("v1", 1.0)
            .save(&dir.path().join("v2").join("model.json"))
            .unwrap();

        assert!(matches!(
            registry.resolve("v2"),
            Err(PriceError::ModelNotFound { .. })
        ));
    }

    #[test]
    fn test_reload_policy_always_loads() {
        let (_dir, store, registry) = setup(CachePolicy::Reload);
        registry.resolve("v1").unwrap();
        registry.resolve("v1").unwrap();
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
        assert!(registry.cached_versions().is_empty());
    }

    #[test]
    fn test_manual_policy_caches_until_invalidated() {
        let (dir, store, registry) = setup(CachePolicy::Manual);
        let first = registry.resolve("v1").unwrap();
        registry.resolve("v1").unwrap();
        assert_eq!(store.loads.load(Ordering::SeqCst), 1);
        assert_eq!(registry.cached_versions(), vec!["v1".to_string()]);

        FsArtifactStore::new(dir.path(), "model.json")
            .publish(&artifact("v1", 200.0))
            .unwrap();
        let vector = crate::features::FeatureCodec::default()
            .encode(
                &crate::features::FeatureRecord {
                    stock_type: crate::features::StockType::New,
                    mileage: 0.0,
                    msrp: 1,
                    model_year: 2020,
                    make: crate::features::Make::new("Kia"),
                    transmission_from_vin: crate::features::Transmission::Automatic,
                },
                &first.schema,
            )
            .unwrap();
        assert_eq!(
            registry.resolve("v1").unwrap().predictor.predict(&vector).unwrap(),
            100.0
        );

        assert!(registry.invalidate("v1"));
        assert!(!registry.invalidate("v1"));
        let refreshed = registry.resolve("v1").unwrap();
        assert_eq!(refreshed.predictor.predict(&vector).unwrap(), 200.0);
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ttl_policy_expires() {
        let (_dir, store, registry) = setup(CachePolicy::Ttl {
            ttl: Duration::from_millis(20),
        });
        registry.resolve("v1").unwrap();
        registry.resolve("v1").unwrap();
        assert_eq!(store.loads.load(Ordering::SeqCst), 1);

        std::thread::sleep(Duration::from_millis(40));
        registry.resolve("v1").unwrap();
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
        assert_eq!(registry.stats().evictions, 1);
    }

    #[test]
    fn test_invalidate_all_and_warm_up() {
        let (_dir, _store, registry) = setup(CachePolicy::Manual);
        assert_eq!(registry.warm_up(), 1);
        assert_eq!(registry.cached_versions(), vec!["v1".to_string()]);
        assert_eq!(registry.invalidate_all(), 1);
        assert!(registry.cached_versions().is_empty());
    }
}
