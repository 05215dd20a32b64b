// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Storage of uploaded and camera-captured images

use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::Result;

/// Name given to a camera capture taken at `at`
pub fn webcam_capture_name(at: DateTime<Local>) -> String {
    at.format("webcam_capture_%Y%m%d_%H%M%S.jpg").to_string()
}

/// Reduce a client-supplied filename to a safe basename
pub fn clean_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let clean: String = base
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let clean = clean.trim_matches('.').to_string();

    if clean.is_empty() {
        "upload".to_string()
    } else {
        clean
    }
}

/// Save image bytes under the upload directory.
///
/// The file is prefixed with a short content hash so repeated uploads of the
/// same image reuse one file. Returns the stored path.
pub fn save_upload(upload_dir: &Path, original_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(upload_dir)?;

    let hash = blake3::hash(bytes).to_hex();
    let name = format!("{}_{}", &hash.as_str()[..12], clean_filename(original_name));
    let path = upload_dir.join(name);

    if !path.exists() {
        fs::write(&path, bytes)?;
        debug!("Saved upload to {:?}", path);
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_webcam_capture_name() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(webcam_capture_name(at), "webcam_capture_20240309_140507.jpg");
    }

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("../../etc/passwd"), "passwd");
        assert_eq!(clean_filename("C:\\photos\\my pupa.png"), "my_pupa.png");
        assert_eq!(clean_filename(".."), "upload");
        assert_eq!(clean_filename(""), "upload");
    }

    #[test]
    fn test_same_bytes_share_a_file() {
        let dir = TempDir::new().unwrap();
        let a = save_upload(dir.path(), "a.jpg", b"wings").unwrap();
        let again = save_upload(dir.path(), "a.jpg", b"wings").unwrap();
        let other = save_upload(dir.path(), "a.jpg", b"antennae").unwrap();

        assert_eq!(a, again);
        assert_ne!(a, other);
        assert!(a.starts_with(dir.path()));
        assert!(a.file_name().unwrap().to_string_lossy().ends_with("_a.jpg"));
        assert_eq!(fs::read(&a).unwrap(), b"wings");
    }
}
