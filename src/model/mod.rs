//! Versioned price models
//!
//! A model artifact is a fitted linear model plus the exact column schema it
//! was trained with. The [`ModelRegistry`] resolves a version tag to a
//! [`Predictor`] and that schema, caching loaded artifacts per the configured
//! [`CachePolicy`](crate::config::CachePolicy).

pub mod artifact;
pub mod registry;

pub use artifact::{LinearModel, ModelArtifact, Predictor};
pub use registry::{
    ArtifactStore, FsArtifactStore, ModelRegistry, RegistryStats, RegistryStatsSnapshot,
    ResolvedModel,
};
