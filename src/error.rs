// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Lepidoptera

use thiserror::Error;

/// Result type alias for Lepidoptera operations
pub type Result<T> = std::result::Result<T, LepiError>;

/// Lepidoptera error types
#[derive(Error, Debug)]
pub enum LepiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("{0} model is not loaded")]
    ModelNotLoaded(String),

    #[error("CSV header mismatch in {path}: expected [{expected}], found [{found}]")]
    SchemaMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Username '{0}' is already taken")]
    DuplicateUser(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("{0}")]
    Validation(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl LepiError {
    /// Whether the error was caused by user input rather than the system
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            LepiError::DuplicateUser(_)
                | LepiError::InvalidCredentials
                | LepiError::Validation(_)
                | LepiError::Image(_)
        )
    }
}
