// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Lepidoptera: butterfly-farm dashboard
//!
//! Reference data for farmed butterfly and moth species, task and care logs,
//! sales records, a point of sale, and four ONNX image classifiers (species,
//! life stages, pupae defects, larval diseases), served as a web UI, a JSON
//! API and a CLI.

pub mod auth;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod sales;
pub mod store;
pub mod tasks;
pub mod web;

pub use config::AppConfig;
pub use error::{LepiError, Result};
