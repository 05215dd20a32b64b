// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Sign-up, login verification and the login attempt log
//!
//! Passwords are hashed with Argon2id and a fresh random salt; the PHC string
//! holds the salt and parameters used for verification.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::db::Database;
use crate::store::{self, CsvRecord};
use crate::{LepiError, Result};

pub const LOGIN_RECORDS_FILE: &str = "login_records.csv";

/// Hash a password using Argon2id, returning the PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| LepiError::PasswordHash(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored PHC hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| LepiError::PasswordHash(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Outcome of a login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "AUTO_SUCCESS")]
    AutoSuccess,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRecord {
    pub timestamp: String,
    pub username: String,
    pub status: LoginStatus,
}

impl CsvRecord for LoginRecord {
    const HEADERS: &'static [&'static str] = &["timestamp", "username", "status"];
}

fn record_attempt(log: &Path, username: &str, status: LoginStatus, at: DateTime<Local>) {
    let record = LoginRecord {
        timestamp: at.format("%Y-%m-%d %H:%M:%S").to_string(),
        username: username.to_string(),
        status,
    };
    if let Err(e) = store::append_record(log, &record) {
        warn!("Could not record login attempt for {}: {}", username, e);
    }
}

pub fn login_records(log: &Path) -> Result<Vec<LoginRecord>> {
    store::load_records(log)
}

/// Register a new account
pub fn sign_up(db: &Database, username: &str, password: &str) -> Result<()> {
    let username = username.trim();
    if username.is_empty() {
        return Err(LepiError::Validation("Username is required.".to_string()));
    }
    if password.is_empty() {
        return Err(LepiError::Validation("Password is required.".to_string()));
    }

    let hash = hash_password(password)?;
    db.create_user(username, &hash)?;
    info!("Created account for {}", username);
    Ok(())
}

/// Verify credentials and log the attempt.
///
/// Unknown users and wrong passwords both yield `InvalidCredentials`.
pub fn login(db: &Database, log: &Path, username: &str, password: &str) -> Result<String> {
    let username = username.trim();
    let verified = match db.password_hash(username)? {
        Some(hash) => verify_password(password, &hash)?,
        None => false,
    };

    if verified {
        record_attempt(log, username, LoginStatus::Success, Local::now());
        Ok(username.to_string())
    } else {
        record_attempt(log, username, LoginStatus::Failed, Local::now());
        Err(LepiError::InvalidCredentials)
    }
}

/// Sign in the configured user without a form, if enabled
pub fn auto_login(config: &AuthConfig, log: &Path) -> Option<String> {
    if !config.auto_login {
        return None;
    }
    record_attempt(log, &config.auto_user, LoginStatus::AutoSuccess, Local::now());
    Some(config.auto_user.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("swallowtail").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("swallowtail", &hash).unwrap());
        assert!(!verify_password("birdwing", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same", &b).unwrap());
    }

    #[test]
    fn test_invalid_hash_format() {
        assert!(matches!(verify_password("x", "plain"), Err(LepiError::PasswordHash(_))));
    }

    #[test]
    fn test_sign_up_and_login_are_logged() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join(LOGIN_RECORDS_FILE);
        let db = Database::in_memory().unwrap();

        sign_up(&db, " maria ", "pupa-2024").unwrap();
        assert!(matches!(sign_up(&db, "maria", "other"), Err(LepiError::DuplicateUser(_))));
        assert!(sign_up(&db, "  ", "x").is_err());

        assert_eq!(login(&db, &log, "maria", "pupa-2024").unwrap(), "maria");
        let wrong = login(&db, &log, "maria", "wrong");
        assert!(matches!(wrong, Err(LepiError::InvalidCredentials)));
        let ghost = login(&db, &log, "ghost", "pupa-2024");
        assert!(matches!(ghost, Err(LepiError::InvalidCredentials)));

        let statuses: Vec<LoginStatus> =
            login_records(&log).unwrap().into_iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![LoginStatus::Success, LoginStatus::Failed, LoginStatus::Failed]);
    }

    #[test]
    fn test_auto_login() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join(LOGIN_RECORDS_FILE);

        assert_eq!(auto_login(&AuthConfig::default(), &log), None);
        assert!(!log.exists());

        let config = AuthConfig { auto_login: true, auto_user: "auto_user".to_string() };
        assert_eq!(auto_login(&config, &log).as_deref(), Some("auto_user"));

        let text = std::fs::read_to_string(&log).unwrap();
        assert!(text.starts_with("timestamp,username,status\n"));
        assert!(text.trim_end().ends_with(",auto_user,AUTO_SUCCESS"));
    }
}
