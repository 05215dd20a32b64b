// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Registry of the farm's classifiers
//!
//! Each model is loaded on first use and kept for the life of the process.
//! A model that is disabled, missing or fails to load leaves its classifier
//! unavailable without affecting the others.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use super::onnx::OnnxModel;
use super::{classify_image, Classification, ClassifierKind, InferenceModel};
use crate::catalog::ReferenceCatalog;
use crate::{AppConfig, LepiError, Result};

type Slot = OnceLock<Option<Arc<dyn InferenceModel>>>;

/// Load state of one classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Not requested yet
    NotLoaded,
    Ready,
    /// Missing or failed to load
    Unavailable,
    /// Turned off in configuration
    Disabled,
}

impl ModelStatus {
    pub fn description(&self) -> &'static str {
        match self {
            ModelStatus::NotLoaded => "not loaded yet",
            ModelStatus::Ready => "ready",
            ModelStatus::Unavailable => "unavailable",
            ModelStatus::Disabled => "disabled",
        }
    }
}

/// A classification together with the catalog details of its label
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub kind: ClassifierKind,
    #[serde(flatten)]
    pub classification: Classification,
    pub details: Vec<(String, String)>,
}

struct ModelSpec {
    enabled: bool,
    path: PathBuf,
    input_size: (u32, u32),
}

/// The four classifiers with their catalogs and lazily loaded models
pub struct ModelRegistry {
    specs: [ModelSpec; 4],
    catalogs: [ReferenceCatalog; 4],
    slots: [Slot; 4],
}

impl ModelRegistry {
    pub fn new(config: &AppConfig) -> Self {
        let spec = |kind: ClassifierKind| {
            let c = config.classifiers.get(kind);
            ModelSpec {
                enabled: c.enabled,
                path: config.model_path(kind),
                input_size: (c.input_width, c.input_height),
            }
        };

        Self {
            specs: ClassifierKind::ALL.map(spec),
            catalogs: ClassifierKind::ALL.map(|kind| ReferenceCatalog::configured(config, kind)),
            slots: Default::default(),
        }
    }

    /// Install a model for a classifier that has not loaded one yet.
    ///
    /// Returns false if the classifier already has a model (or a failed load).
    pub fn insert(&self, kind: ClassifierKind, model: Arc<dyn InferenceModel>) -> bool {
        self.slots[kind.index()].set(Some(model)).is_ok()
    }

    /// Catalog whose order matches the classifier's outputs
    pub fn catalog(&self, kind: ClassifierKind) -> &ReferenceCatalog {
        &self.catalogs[kind.index()]
    }

    /// The classifier's model, loading it on first call
    pub fn model(&self, kind: ClassifierKind) -> Option<Arc<dyn InferenceModel>> {
        self.slots[kind.index()]
            .get_or_init(|| self.load(kind))
            .clone()
    }

    fn load(&self, kind: ClassifierKind) -> Option<Arc<dyn InferenceModel>> {
        let spec = &self.specs[kind.index()];
        if !spec.enabled {
            info!("{} classifier is disabled", kind);
            return None;
        }
        if !spec.path.exists() {
            warn!("{} model not found at {:?}; classifier disabled", kind, spec.path);
            return None;
        }

        match OnnxModel::load(&spec.path, spec.input_size) {
            Ok(model) => {
                info!("Loaded {} model from {:?}", kind, spec.path);
                Some(Arc::new(model))
            }
            Err(e) => {
                warn!("Failed to load {} model: {}; classifier disabled", kind, e);
                None
            }
        }
    }

    /// Try every enabled classifier once, returning how many are ready
    pub fn preload(&self) -> usize {
        ClassifierKind::ALL
            .iter()
            .filter(|kind| self.model(**kind).is_some())
            .count()
    }

    pub fn status(&self, kind: ClassifierKind) -> ModelStatus {
        if !self.specs[kind.index()].enabled {
            return ModelStatus::Disabled;
        }
        match self.slots[kind.index()].get() {
            None => ModelStatus::NotLoaded,
            Some(Some(_)) => ModelStatus::Ready,
            Some(None) => ModelStatus::Unavailable,
        }
    }

    /// Classify an encoded image with one of the classifiers
    pub fn classify(&self, kind: ClassifierKind, bytes: &[u8]) -> Result<Prediction> {
        let model = self
            .model(kind)
            .ok_or_else(|| LepiError::ModelNotLoaded(kind.label().to_string()))?;
        let catalog = self.catalog(kind);

        let classification = classify_image(bytes, model.as_ref(), &catalog.class_names())?;
        let details = classification
            .label()
            .and_then(|label| catalog.get(label))
            .map(|entry| entry.attributes.clone())
            .unwrap_or_default();

        Ok(Prediction {
            kind,
            classification,
            details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::tests::{png_bytes, FixedModel};
    use tempfile::TempDir;

    fn registry_in(dir: &TempDir) -> ModelRegistry {
        let mut config = AppConfig::default();
        config.paths.model_dir = dir.path().to_path_buf();
        ModelRegistry::new(&config)
    }

    #[test]
    fn test_missing_model_disables_only_that_classifier() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let model = Arc::new(FixedModel::new(vec![0.0, 0.0, 1.0, 0.0]));
        assert!(registry.insert(ClassifierKind::LifeStages, model));

        let image = png_bytes(4, 4, [0, 0, 0]);
        let err = registry.classify(ClassifierKind::Species, &image).unwrap_err();
        assert!(matches!(err, LepiError::ModelNotLoaded(ref name) if name == "Butterfly Species"));
        assert_eq!(registry.status(ClassifierKind::Species), ModelStatus::Unavailable);

        let prediction = registry.classify(ClassifierKind::LifeStages, &image).unwrap();
        assert_eq!(prediction.classification.label(), Some("Larvae"));
        assert_eq!(prediction.details[0].0, "stages_info");
        assert_eq!(registry.status(ClassifierKind::LifeStages), ModelStatus::Ready);
    }

    #[test]
    fn test_status_before_first_use() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        assert_eq!(registry.status(ClassifierKind::PupaeDefects), ModelStatus::NotLoaded);
        assert_eq!(registry.preload(), 0);
        assert_eq!(registry.status(ClassifierKind::PupaeDefects), ModelStatus::Unavailable);
    }

    #[test]
    fn test_disabled_classifier() {
        let mut config = AppConfig::default();
        config.classifiers.larval_diseases.enabled = false;
        let registry = ModelRegistry::new(&config);
        assert_eq!(registry.status(ClassifierKind::LarvalDiseases), ModelStatus::Disabled);
        assert!(registry.model(ClassifierKind::LarvalDiseases).is_none());
    }

    #[test]
    fn test_model_is_loaded_once() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        assert!(registry.model(ClassifierKind::Species).is_none());
        assert!(!registry.insert(ClassifierKind::Species, Arc::new(FixedModel::new(vec![1.0]))));
    }

    #[test]
    fn test_unknown_prediction_has_no_details() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let mut scores = vec![0.0; 40];
        scores[39] = 1.0;
        registry.insert(ClassifierKind::PupaeDefects, Arc::new(FixedModel::new(scores)));

        let image = png_bytes(4, 4, [1, 2, 3]);
        let prediction = registry.classify(ClassifierKind::PupaeDefects, &image).unwrap();
        assert_eq!(prediction.classification, Classification::Unknown { index: Some(39) });
        assert!(prediction.details.is_empty());
    }
}
