// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Lepidoptera

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classify::ClassifierKind;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Data, upload and model directories
    #[serde(default)]
    pub paths: PathConfig,

    /// Per-classifier model settings
    #[serde(default)]
    pub classifiers: ClassifiersConfig,

    /// Farm details recorded alongside log rows
    #[serde(default)]
    pub farm: FarmConfig,

    /// Login behaviour
    #[serde(default)]
    pub auth: AuthConfig,

    /// Web UI settings
    #[serde(default)]
    pub web: WebConfig,

    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClassifiersConfig {
    #[serde(default = "default_species")]
    pub species: ClassifierConfig,
    #[serde(default = "default_life_stages")]
    pub life_stages: ClassifierConfig,
    #[serde(default = "default_pupae_defects")]
    pub pupae_defects: ClassifierConfig,
    #[serde(default = "default_larval_diseases")]
    pub larval_diseases: ClassifierConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Model filename, relative to the model directory
    pub model_file: String,
    #[serde(default = "default_input_size")]
    pub input_width: u32,
    #[serde(default = "default_input_size")]
    pub input_height: u32,
    /// Classification log, relative to the data directory
    pub log_file: String,
    /// Catalog CSV replacing the built-in labels, relative to the data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_file: Option<String>,
    /// Label column of `catalog_file`
    #[serde(default = "default_catalog_key")]
    pub catalog_key: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FarmConfig {
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_seller")]
    pub default_seller: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    /// Sign in `auto_user` without a form
    #[serde(default)]
    pub auto_login: bool,
    #[serde(default = "default_auto_user")]
    pub auto_user: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// Largest accepted upload in bytes
    #[serde(default = "default_upload_limit")]
    pub upload_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

// Default value functions
fn default_true() -> bool { true }
fn default_data_dir() -> PathBuf { PathBuf::from("./Data") }
fn default_upload_dir() -> PathBuf { PathBuf::from("./upload") }
fn default_model_dir() -> PathBuf { PathBuf::from("./model") }
fn default_input_size() -> u32 { 180 }
fn default_catalog_key() -> String { "class_name".to_string() }
fn default_location() -> String { "Marinduque, Philippines".to_string() }
fn default_seller() -> String { "farm".to_string() }
fn default_auto_user() -> String { "auto_user".to_string() }
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 8501 }
fn default_upload_limit() -> usize { 10 * 1024 * 1024 }
fn default_db_path() -> String { "lepidoptera.db".to_string() }

fn classifier(model_file: &str, log_file: &str) -> ClassifierConfig {
    ClassifierConfig {
        enabled: true,
        model_file: model_file.to_string(),
        input_width: default_input_size(),
        input_height: default_input_size(),
        log_file: log_file.to_string(),
        catalog_file: None,
        catalog_key: default_catalog_key(),
    }
}

fn default_species() -> ClassifierConfig {
    classifier("model_Butterfly_Species.onnx", "butterfly_table_species.csv")
}

fn default_life_stages() -> ClassifierConfig {
    classifier("model_Life_Stages.onnx", "stages_records.csv")
}

fn default_pupae_defects() -> ClassifierConfig {
    classifier("model_Pupae_Defects.onnx", "pupae_defects_quality_info.csv")
}

fn default_larval_diseases() -> ClassifierConfig {
    classifier("model_Larval_Diseases.onnx", "larval_diseases_quality_records.csv")
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            upload_dir: default_upload_dir(),
            model_dir: default_model_dir(),
        }
    }
}

impl Default for ClassifiersConfig {
    fn default() -> Self {
        Self {
            species: default_species(),
            life_stages: default_life_stages(),
            pupae_defects: default_pupae_defects(),
            larval_diseases: default_larval_diseases(),
        }
    }
}

impl ClassifiersConfig {
    /// Settings for one classifier
    pub fn get(&self, kind: ClassifierKind) -> &ClassifierConfig {
        match kind {
            ClassifierKind::Species => &self.species,
            ClassifierKind::LifeStages => &self.life_stages,
            ClassifierKind::PupaeDefects => &self.pupae_defects,
            ClassifierKind::LarvalDiseases => &self.larval_diseases,
        }
    }
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            location: default_location(),
            default_seller: default_seller(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auto_login: false,
            auto_user: default_auto_user(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_web_host(),
            port: default_web_port(),
            upload_limit: default_upload_limit(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::LepiError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path of a file inside the data directory
    pub fn data_file(&self, name: &str) -> PathBuf {
        self.paths.data_dir.join(name)
    }

    /// Path of a classifier's model file
    pub fn model_path(&self, kind: ClassifierKind) -> PathBuf {
        self.paths.model_dir.join(&self.classifiers.get(kind).model_file)
    }

    /// Path of a classifier's log CSV
    pub fn classification_log_path(&self, kind: ClassifierKind) -> PathBuf {
        self.data_file(&self.classifiers.get(kind).log_file)
    }

    /// Path of a classifier's catalog CSV, if one is configured
    pub fn catalog_path(&self, kind: ClassifierKind) -> Option<PathBuf> {
        self.classifiers.get(kind).catalog_file.as_deref().map(|f| self.data_file(f))
    }

    /// Create the data and upload directories if missing
    pub fn ensure_dirs(&self) -> crate::Result<()> {
        std::fs::create_dir_all(&self.paths.data_dir)?;
        std::fs::create_dir_all(&self.paths.upload_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.web.port, 8501);
        assert_eq!(config.classifiers.species.input_width, 180);
        assert_eq!(
            config.classification_log_path(ClassifierKind::LifeStages),
            PathBuf::from("./Data/stages_records.csv")
        );
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let json = r#"{ "web": { "port": 9000 }, "farm": { "location": "Gasan" } }"#;
        std::fs::write(&path, json).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.web.port, 9000);
        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.farm.location, "Gasan");
        assert_eq!(config.farm.default_seller, "farm");
        assert_eq!(config.classifiers.pupae_defects.model_file, "model_Pupae_Defects.onnx");
        assert_eq!(config.catalog_path(ClassifierKind::Species), None);
    }

    #[test]
    fn test_catalog_file_is_relative_to_data_dir() {
        let json = r#"{ "classifiers": { "species": {
            "model_file": "s.onnx",
            "log_file": "s.csv",
            "catalog_file": "species_catalog.csv"
        } } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.catalog_path(ClassifierKind::Species),
            Some(PathBuf::from("./Data/species_catalog.csv"))
        );
        assert_eq!(config.classifiers.species.catalog_key, "class_name");
        assert_eq!(config.catalog_path(ClassifierKind::LifeStages), None);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.auth.auto_login = true;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert!(loaded.auth.auto_login);
        assert_eq!(loaded.auth.auto_user, "auto_user");
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(crate::LepiError::Config(_))));
    }
}
