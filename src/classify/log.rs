// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Per-classifier CSV log of classification events

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Classification, Prediction};
use crate::catalog::ReferenceCatalog;
use crate::store;
use crate::Result;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const EVENT_COLUMNS: [&str; 5] = ["class_name", "score", "date_time", "location", "image_path"];

/// One classification event, ready to append
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationRecord {
    pub class_name: String,
    /// Catalog attributes of the label, in catalog column order
    pub details: Vec<(String, String)>,
    /// Confidence in percent
    pub score: f64,
    pub date_time: String,
    pub location: String,
    pub image_path: String,
}

impl ClassificationRecord {
    /// Build a record from a prediction; unknown results produce none
    pub fn from_prediction(
        prediction: &Prediction,
        image_name: &str,
        location: &str,
        at: DateTime<Local>,
    ) -> Option<Self> {
        let Classification::Label { label, confidence } = &prediction.classification else {
            return None;
        };

        Some(Self {
            class_name: label.clone(),
            details: prediction.details.clone(),
            score: *confidence,
            date_time: at.format(TIMESTAMP_FORMAT).to_string(),
            location: location.to_string(),
            image_path: image_name.to_string(),
        })
    }

    fn values(&self, attribute_names: &[String]) -> Vec<String> {
        let mut values = vec![
            self.class_name.clone(),
            format!("{:.2}", self.score),
            self.date_time.clone(),
            self.location.clone(),
            self.image_path.clone(),
        ];
        for name in attribute_names {
            let value = self
                .details
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .unwrap_or_default();
            values.push(value);
        }
        values
    }
}

/// Append-only log for one classifier
pub struct ClassificationLog {
    path: PathBuf,
    attribute_names: Vec<String>,
}

impl ClassificationLog {
    pub fn new(path: impl Into<PathBuf>, catalog: &ReferenceCatalog) -> Self {
        Self {
            path: path.into(),
            attribute_names: catalog.attribute_names(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Column names of the log file: event columns, then catalog attributes
    pub fn headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = EVENT_COLUMNS.iter().map(|c| c.to_string()).collect();
        headers.extend(self.attribute_names.iter().cloned());
        headers
    }

    pub fn append(&self, record: &ClassificationRecord) -> Result<()> {
        store::append_row(&self.path, &self.headers(), &record.values(&self.attribute_names))?;
        debug!("Logged {} ({:.2}%) to {:?}", record.class_name, record.score, self.path);
        Ok(())
    }

    /// Log a prediction; returns whether a row was written
    pub fn record(
        &self,
        prediction: &Prediction,
        image_name: &str,
        location: &str,
    ) -> Result<bool> {
        let at = Local::now();
        match ClassificationRecord::from_prediction(prediction, image_name, location, at) {
            Some(record) => {
                self.append(&record)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ClassifierKind;
    use crate::store::load_table;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn prediction(classification: Classification, details: Vec<(&str, &str)>) -> Prediction {
        Prediction {
            kind: ClassifierKind::LarvalDiseases,
            classification,
            details: details.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    fn larval_log(dir: &TempDir) -> ClassificationLog {
        ClassificationLog::new(dir.path().join("larval.csv"), &ReferenceCatalog::larval_diseases())
    }

    #[test]
    fn test_record_writes_header_and_row() {
        let dir = TempDir::new().unwrap();
        let log = larval_log(&dir);
        let at = Local.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();

        let p = prediction(
            Classification::Label { label: "Healthy".to_string(), confidence: 97.5 },
            vec![("treatment_info", "None needed")],
        );
        let record = ClassificationRecord::from_prediction(&p, "larva.jpg", "Gasan", at).unwrap();
        log.append(&record).unwrap();
        log.append(&record).unwrap();

        let table = load_table(log.path());
        assert_eq!(
            table.headers,
            vec!["class_name", "score", "date_time", "location", "image_path", "treatment_info"]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.rows[0],
            vec!["Healthy", "97.50", "2024-05-01 08:30:00", "Gasan", "larva.jpg", "None needed"]
        );
    }

    #[test]
    fn test_appends_to_existing_dashboard_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("butterfly_table_species.csv");
        let existing = concat!(
            "class_name,score,date_time,location,image_path,",
            "scientific_name,family,discovered,year\n",
            "Moth-Atlas,88.10,2024-04-30 17:00:00,Gasan,atlas.jpg,",
            "Attacus atlas,Saturniidae,Linnaeus,1758\n",
        );
        std::fs::write(&path, existing).unwrap();
        let log = ClassificationLog::new(&path, &ReferenceCatalog::species());

        let p = Prediction {
            kind: ClassifierKind::Species,
            classification: Classification::Label {
                label: "Moth-Atlas".to_string(),
                confidence: 91.0,
            },
            details: vec![("family".to_string(), "Saturniidae".to_string())],
        };
        assert!(log.record(&p, "atlas2.jpg", "Boac").unwrap());

        let table = load_table(&path);
        assert_eq!(table.len(), 2);
        let row = &table.rows[1];
        assert_eq!((row[0].as_str(), row[1].as_str()), ("Moth-Atlas", "91.00"));
        assert_eq!((row[3].as_str(), row[4].as_str()), ("Boac", "atlas2.jpg"));
        assert_eq!(row[6], "Saturniidae");
    }

    #[test]
    fn test_unknown_is_not_logged() {
        let dir = TempDir::new().unwrap();
        let log = larval_log(&dir);

        let unknown = prediction(Classification::Unknown { index: Some(7) }, vec![]);
        assert!(!log.record(&unknown, "x.jpg", "Gasan").unwrap());
        assert!(!log.path().exists());
    }

    #[test]
    fn test_species_log_columns() {
        let log = ClassificationLog::new("species.csv", &ReferenceCatalog::species());
        assert_eq!(
            log.headers(),
            vec![
                "class_name",
                "score",
                "date_time",
                "location",
                "image_path",
                "scientific_name",
                "family",
                "discovered",
                "year"
            ]
        );
    }
}
