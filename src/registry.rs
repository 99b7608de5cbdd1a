//! Versioned model artifacts on disk. Artifacts are immutable once
//! registered; the registry index carries the single mutable production
//! pointer and is swapped atomically on every change.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationParams, Metrics};
use crate::model::{FitOptions, ScalerParams, SoftmaxModel};

const INDEX_FILE: &str = "registry.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingWindow {
    pub from: Option<String>,
    pub until: Option<String>,
    pub train_events: usize,
    pub holdout_events: usize,
    pub skipped_events: usize,
}

/// One grid trial from the forward-chaining search, kept for audit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CvResult {
    pub learning_rate: f64,
    pub l2: f64,
    pub max_iters: usize,
    pub mean_log_loss: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetrics {
    pub train: Metrics,
    pub holdout_raw: Metrics,
    pub holdout_calibrated: Metrics,
}

/// Everything inference needs, frozen at training time: the ordered feature
/// schema, scaler statistics, model weights, and calibration maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: String,
    pub created_at: String,
    pub league_id: Option<u32>,
    pub feature_names: Vec<String>,
    pub scaler: ScalerParams,
    pub model: SoftmaxModel,
    pub calibration: CalibrationParams,
    pub hyperparams: FitOptions,
    pub training: TrainingWindow,
    #[serde(default)]
    pub cv_results: Vec<CvResult>,
    pub metrics: ArtifactMetrics,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    pub created_at: String,
    pub league_id: Option<u32>,
    pub test_log_loss: f64,
    pub test_accuracy: f64,
    pub train_events: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryIndex {
    #[serde(default)]
    versions: Vec<VersionEntry>,
    #[serde(default)]
    production: Option<String>,
    #[serde(default)]
    previous_production: Option<String>,
}

/// A model that should be servable could not be produced. Callers treat this
/// as fatal; there is no silent fallback to another version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelLoadError {
    NoVersions,
    NoProduction,
    NotFound { version: String },
    Unreadable { version: String, detail: String },
}

impl std::fmt::Display for ModelLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelLoadError::NoVersions => write!(f, "model registry has no versions"),
            ModelLoadError::NoProduction => write!(f, "no model has been promoted to production"),
            ModelLoadError::NotFound { version } => {
                write!(f, "model version {version} is not registered")
            }
            ModelLoadError::Unreadable { version, detail } => {
                write!(f, "model artifact {version} could not be loaded: {detail}")
            }
        }
    }
}

impl std::error::Error for ModelLoadError {}

pub struct ModelRegistry {
    dir: PathBuf,
    index: RegistryIndex,
}

pub fn default_registry_dir() -> PathBuf {
    env::var("MATCHCAST_MODEL_DIR")
        .ok()
        .map(|s| PathBuf::from(s.trim()))
        .unwrap_or_else(|| PathBuf::from("models"))
}

impl ModelRegistry {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create model registry dir {}", dir.display()))?;
        let index_path = dir.join(INDEX_FILE);
        let index = if index_path.exists() {
            let raw = fs::read_to_string(&index_path)
                .with_context(|| format!("read model registry index {}", index_path.display()))?;
            serde_json::from_str::<RegistryIndex>(&raw)
                .with_context(|| format!("parse model registry index {}", index_path.display()))?
        } else {
            RegistryIndex::default()
        };
        Ok(Self { dir, index })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn list_versions(&self) -> &[VersionEntry] {
        &self.index.versions
    }

    pub fn production_version(&self) -> Option<&str> {
        self.index.production.as_deref()
    }

    pub fn previous_production_version(&self) -> Option<&str> {
        self.index.previous_production.as_deref()
    }

    /// Registers an artifact under a collision-free version id and appends it
    /// to the index. Registration never touches the production pointer.
    pub fn register(&mut self, mut artifact: ModelArtifact) -> Result<String> {
        let version = self.unique_version(&artifact.version);
        artifact.version = version.clone();

        let raw = serde_json::to_string_pretty(&artifact).context("serialize model artifact")?;
        write_atomic(&self.artifact_path(&version), &raw)?;

        self.index.versions.push(VersionEntry {
            version: version.clone(),
            created_at: artifact.created_at.clone(),
            league_id: artifact.league_id,
            test_log_loss: artifact.metrics.holdout_calibrated.log_loss,
            test_accuracy: artifact.metrics.holdout_calibrated.accuracy,
            train_events: artifact.training.train_events,
        });
        self.save_index()?;
        Ok(version)
    }

    pub fn get(&self, version: &str) -> Result<ModelArtifact, ModelLoadError> {
        if !self.index.versions.iter().any(|v| v.version == version) {
            return Err(ModelLoadError::NotFound {
                version: version.to_string(),
            });
        }
        let path = self.artifact_path(version);
        let raw = fs::read_to_string(&path).map_err(|e| ModelLoadError::Unreadable {
            version: version.to_string(),
            detail: e.to_string(),
        })?;
        serde_json::from_str::<ModelArtifact>(&raw).map_err(|e| ModelLoadError::Unreadable {
            version: version.to_string(),
            detail: e.to_string(),
        })
    }

    pub fn get_latest(&self) -> Result<ModelArtifact, ModelLoadError> {
        let Some(entry) = self.index.versions.last() else {
            return Err(ModelLoadError::NoVersions);
        };
        self.get(&entry.version)
    }

    pub fn get_production(&self) -> Result<ModelArtifact, ModelLoadError> {
        let Some(version) = self.index.production.as_deref() else {
            return Err(ModelLoadError::NoProduction);
        };
        self.get(version)
    }

    /// Swaps the production pointer to `version` after verifying the artifact
    /// loads cleanly. The outgoing pointer is retained so the previous
    /// version stays one promotion away.
    pub fn promote(&mut self, version: &str) -> Result<()> {
        self.get(version)?;
        if self.index.production.as_deref() == Some(version) {
            return Ok(());
        }
        self.index.previous_production = self.index.production.take();
        self.index.production = Some(version.to_string());
        self.save_index()
    }

    /// Rolling back is promoting a previously-known-good version; there is no
    /// separate pointer path.
    pub fn rollback(&mut self, version: &str) -> Result<()> {
        self.promote(version)
    }

    fn artifact_path(&self, version: &str) -> PathBuf {
        self.dir.join(format!("model_{version}.json"))
    }

    fn unique_version(&self, base: &str) -> String {
        let taken =
            |candidate: &str| self.index.versions.iter().any(|v| v.version == candidate);
        if !taken(base) {
            return base.to_string();
        }
        let mut n = 2usize;
        loop {
            let candidate = format!("{base}_{n}");
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn save_index(&self) -> Result<()> {
        let raw =
            serde_json::to_string_pretty(&self.index).context("serialize model registry index")?;
        write_atomic(&self.dir.join(INDEX_FILE), &raw)
    }
}

fn write_atomic(path: &Path, raw: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, raw).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Metrics;

    fn sample_artifact(version: &str) -> ModelArtifact {
        ModelArtifact {
            version: version.to_string(),
            created_at: "2024-09-01T12:00:00+00:00".to_string(),
            league_id: Some(47),
            feature_names: vec!["home_points_last_5".to_string()],
            scaler: ScalerParams {
                mean: vec![6.5],
                std: vec![2.0],
            },
            model: SoftmaxModel::zeros(1),
            calibration: CalibrationParams::identity(),
            hyperparams: FitOptions {
                learning_rate: 0.1,
                l2: 0.01,
                max_iters: 300,
            },
            training: TrainingWindow {
                from: None,
                until: None,
                train_events: 200,
                holdout_events: 50,
                skipped_events: 0,
            },
            cv_results: Vec::new(),
            metrics: ArtifactMetrics {
                train: Metrics::empty(),
                holdout_raw: Metrics::empty(),
                holdout_calibrated: Metrics::empty(),
            },
            notes: Vec::new(),
        }
    }

    fn temp_registry(tag: &str) -> ModelRegistry {
        let dir = std::env::temp_dir().join(format!(
            "matchcast_registry_{tag}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        ModelRegistry::open(dir).unwrap()
    }

    #[test]
    fn register_then_get_round_trips() {
        let mut registry = temp_registry("round_trip");
        let version = registry.register(sample_artifact("v1")).unwrap();
        assert_eq!(version, "v1");

        let loaded = registry.get("v1").unwrap();
        assert_eq!(loaded.version, "v1");
        assert_eq!(loaded.feature_names, vec!["home_points_last_5"]);
        assert_eq!(loaded.training.train_events, 200);
    }

    #[test]
    fn colliding_versions_get_numeric_suffixes() {
        let mut registry = temp_registry("collide");
        assert_eq!(registry.register(sample_artifact("v")).unwrap(), "v");
        assert_eq!(registry.register(sample_artifact("v")).unwrap(), "v_2");
        assert_eq!(registry.register(sample_artifact("v")).unwrap(), "v_3");
        assert_eq!(registry.list_versions().len(), 3);
    }

    #[test]
    fn promote_then_rollback_restores_the_older_version() {
        let mut registry = temp_registry("rollback");
        registry.register(sample_artifact("v1")).unwrap();
        registry.register(sample_artifact("v2")).unwrap();

        registry.promote("v1").unwrap();
        registry.promote("v2").unwrap();
        assert_eq!(registry.production_version(), Some("v2"));
        assert_eq!(registry.previous_production_version(), Some("v1"));

        registry.rollback("v1").unwrap();
        assert_eq!(registry.production_version(), Some("v1"));
        // The rolled-back version stays registered.
        assert!(registry.list_versions().iter().any(|v| v.version == "v2"));
        assert!(registry.get("v2").is_ok());
    }

    #[test]
    fn promoting_an_unknown_version_fails_without_moving_the_pointer() {
        let mut registry = temp_registry("unknown");
        registry.register(sample_artifact("v1")).unwrap();
        registry.promote("v1").unwrap();

        assert!(registry.promote("ghost").is_err());
        assert_eq!(registry.production_version(), Some("v1"));
    }

    #[test]
    fn pointer_state_survives_reopen() {
        let mut registry = temp_registry("reopen");
        let dir = registry.dir().to_path_buf();
        registry.register(sample_artifact("v1")).unwrap();
        registry.promote("v1").unwrap();
        drop(registry);

        let reopened = ModelRegistry::open(dir).unwrap();
        assert_eq!(reopened.production_version(), Some("v1"));
        let artifact = reopened.get_production().unwrap();
        assert_eq!(artifact.version, "v1");
    }

    #[test]
    fn missing_production_is_a_typed_error() {
        let registry = temp_registry("no_production");
        assert_eq!(
            registry.get_production().unwrap_err(),
            ModelLoadError::NoProduction
        );
        assert_eq!(registry.get_latest().unwrap_err(), ModelLoadError::NoVersions);
        assert!(matches!(
            registry.get("nope").unwrap_err(),
            ModelLoadError::NotFound { .. }
        ));
    }
}
