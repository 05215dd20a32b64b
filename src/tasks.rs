// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Farm task and care records, and the daily change schedule
//!
//! Records are held in memory and persisted by rewriting the whole backing
//! file after every addition. A failed write keeps the record in memory and
//! reports the error to the caller.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::catalog::{species_info, ACTIVITY_TYPES};
use crate::store::{self, CsvRecord};
use crate::{LepiError, Result};

pub const TASKS_FILE: &str = "tasks.csv";
pub const CARE_FILE: &str = "care_data.csv";
pub const SCHEDULE_FILE: &str = "daily_changes_schedule.csv";

/// Change scheduled automatically for the current day
pub const DEFAULT_DAILY_CHANGE: &str = "Today's change: Refresh the sugar syrup.";

const DAY_FORMAT: &str = "%Y-%m-%d";
const HOUR_FORMAT: &str = "%H:%M:%S";

fn require_species(species: &str) -> Result<()> {
    if species_info(species).is_none() {
        return Err(LepiError::Validation(format!("Unknown species: {}", species)));
    }
    Ok(())
}

/// Parse a `YYYY-MM-DD` date from a form
pub fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DAY_FORMAT)
        .map_err(|_| LepiError::Validation(format!("Invalid date: {}", value)))
}

/// Parse an `HH:MM:SS` or `HH:MM` time from a form
pub fn parse_hour(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, HOUR_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| LepiError::Validation(format!("Invalid time: {}", value)))
}

/// A scheduled farm task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(rename = "Day")]
    pub day: String,
    #[serde(rename = "Hour")]
    pub hour: String,
    #[serde(rename = "Activity")]
    pub activity: String,
    #[serde(rename = "Details", default)]
    pub details: String,
    #[serde(rename = "Species")]
    pub species: String,
}

impl CsvRecord for TaskRecord {
    const HEADERS: &'static [&'static str] = &["Day", "Hour", "Activity", "Details", "Species"];
}

impl TaskRecord {
    pub fn new(
        day: NaiveDate,
        hour: NaiveTime,
        activity: &str,
        details: &str,
        species: &str,
    ) -> Result<Self> {
        if !ACTIVITY_TYPES.iter().any(|a| *a == activity) {
            return Err(LepiError::Validation(format!("Unknown activity: {}", activity)));
        }
        require_species(species)?;

        Ok(Self {
            day: day.format(DAY_FORMAT).to_string(),
            hour: hour.format(HOUR_FORMAT).to_string(),
            activity: activity.to_string(),
            details: details.trim().to_string(),
            species: species.to_string(),
        })
    }
}

/// Task as submitted by a form or the API
#[derive(Debug, Clone, Deserialize)]
pub struct TaskForm {
    pub day: String,
    pub hour: String,
    pub activity: String,
    #[serde(default)]
    pub details: String,
    pub species: String,
}

impl TaskForm {
    pub fn into_record(self) -> Result<TaskRecord> {
        TaskRecord::new(
            parse_day(&self.day)?,
            parse_hour(&self.hour)?,
            &self.activity,
            &self.details,
            &self.species,
        )
    }
}

/// A care activity carried out for a species
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareRecord {
    #[serde(rename = "Day")]
    pub day: String,
    #[serde(rename = "Hour")]
    pub hour: String,
    #[serde(rename = "Species")]
    pub species: String,
    #[serde(rename = "Activity")]
    pub activity: String,
}

impl CsvRecord for CareRecord {
    const HEADERS: &'static [&'static str] = &["Day", "Hour", "Species", "Activity"];
}

impl CareRecord {
    pub fn new(day: NaiveDate, hour: NaiveTime, species: &str, activity: &str) -> Result<Self> {
        require_species(species)?;
        if activity.trim().is_empty() {
            return Err(LepiError::Validation("Please describe the care activity.".to_string()));
        }

        Ok(Self {
            day: day.format(DAY_FORMAT).to_string(),
            hour: hour.format(HOUR_FORMAT).to_string(),
            species: species.to_string(),
            activity: activity.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CareForm {
    pub day: String,
    pub hour: String,
    pub species: String,
    pub activity: String,
}

impl CareForm {
    pub fn into_record(self) -> Result<CareRecord> {
        let (day, hour) = (parse_day(&self.day)?, parse_hour(&self.hour)?);
        CareRecord::new(day, hour, &self.species, &self.activity)
    }
}

/// In-memory records mirrored to a CSV file
#[derive(Debug)]
pub struct RecordBook<T: CsvRecord> {
    path: PathBuf,
    records: Vec<T>,
}

pub type TaskBook = RecordBook<TaskRecord>;
pub type CareBook = RecordBook<CareRecord>;

impl<T: CsvRecord> RecordBook<T> {
    /// Load existing records; an unreadable file starts an empty book
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = store::load_records(&path).unwrap_or_else(|e| {
            warn!("Could not read {:?}: {}. Starting with no records", path, e);
            Vec::new()
        });
        debug!("Loaded {} records from {:?}", records.len(), path);
        Self { path, records }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add a record and rewrite the file.
    ///
    /// On a write error the record stays in memory.
    pub fn add(&mut self, record: T) -> Result<()> {
        self.records.push(record);
        store::rewrite_records(&self.path, &self.records)
    }
}

/// Counts per value, most frequent first; ties keep first-seen order
pub fn distribution<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value.to_string(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

impl TaskBook {
    pub fn activity_distribution(&self) -> Vec<(String, usize)> {
        distribution(self.records.iter().map(|t| t.activity.as_str()))
    }

    pub fn species_distribution(&self) -> Vec<(String, usize)> {
        distribution(self.records.iter().map(|t| t.species.as_str()))
    }
}

/// A dated change to the butterfly house routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledChange {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Message")]
    pub message: String,
}

impl CsvRecord for ScheduledChange {
    const HEADERS: &'static [&'static str] = &["Date", "Message"];
}

/// The daily change schedule
#[derive(Debug)]
pub struct Schedule {
    book: RecordBook<ScheduledChange>,
}

impl Schedule {
    /// Load the schedule and make sure today's default change is present
    pub fn load(path: impl Into<PathBuf>, today: NaiveDate) -> Self {
        let book: RecordBook<ScheduledChange> = RecordBook::load(path);
        let mut schedule = Self { book };
        schedule.ensure_default(today);
        schedule
    }

    /// Add the default change for `today` if it is not listed yet.
    ///
    /// Returns whether a change was added.
    pub fn ensure_default(&mut self, today: NaiveDate) -> bool {
        let has_default = self
            .book
            .records
            .iter()
            .any(|c: &ScheduledChange| c.date == today && c.message == DEFAULT_DAILY_CHANGE);
        if !has_default {
            self.book.records.push(ScheduledChange {
                date: today,
                message: DEFAULT_DAILY_CHANGE.to_string(),
            });
        }
        !has_default
    }

    pub fn changes(&self) -> &[ScheduledChange] {
        self.book.records()
    }

    /// Schedule a custom change for today or a later date
    pub fn schedule(&mut self, date: NaiveDate, message: &str, today: NaiveDate) -> Result<()> {
        if message.trim().is_empty() {
            return Err(LepiError::Validation(
                "Please enter a valid message for the custom change.".to_string(),
            ));
        }
        if date < today {
            return Err(LepiError::Validation(
                "Custom changes cannot be scheduled in the past.".to_string(),
            ));
        }

        self.book.add(ScheduledChange {
            date,
            message: message.trim().to_string(),
        })
    }

    /// Write the schedule, including the default change, to disk
    pub fn save(&self) -> Result<()> {
        store::rewrite_records(self.book.path(), self.book.records())
    }

    pub fn path(&self) -> &Path {
        self.book.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    fn task(activity: &str, species: &str) -> TaskRecord {
        TaskRecord::new(day(1), nine(), activity, "", species).unwrap()
    }

    #[test]
    fn test_task_validation() {
        let jay = "Butterfly-Common Jay";
        let t = TaskRecord::new(day(3), nine(), "Feeding Larvae", "  leaves ", jay).unwrap();
        assert_eq!(t.day, "2024-06-03");
        assert_eq!(t.hour, "09:00:00");
        assert_eq!(t.details, "leaves");

        assert!(TaskRecord::new(day(3), nine(), "Napping", "", "Butterfly-Common Jay").is_err());
        assert!(TaskRecord::new(day(3), nine(), "Pest Control", "", "Dragon").is_err());
    }

    #[test]
    fn test_form_times_accept_optional_seconds() {
        assert_eq!(parse_hour("07:30").unwrap(), NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        assert_eq!(parse_hour("07:30:15").unwrap(), NaiveTime::from_hms_opt(7, 30, 15).unwrap());
        assert!(parse_hour("7pm").is_err());
        assert!(parse_day("2024-13-01").is_err());

        let form = TaskForm {
            day: "2024-06-02".to_string(),
            hour: "16:45".to_string(),
            activity: "Butterfly Foraging".to_string(),
            details: String::new(),
            species: "Moth-Atlas".to_string(),
        };
        let task = form.into_record().unwrap();
        assert_eq!((task.day.as_str(), task.hour.as_str()), ("2024-06-02", "16:45:00"));
    }

    #[test]
    fn test_care_requires_description() {
        assert!(CareRecord::new(day(1), nine(), "Butterfly-Plain Tiger", "  ").is_err());
        let care =
            CareRecord::new(day(1), nine(), "Butterfly-Plain Tiger", "Misted enclosure").unwrap();
        assert_eq!(care.activity, "Misted enclosure");
    }

    #[test]
    fn test_add_persists_whole_book() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(TASKS_FILE);

        let mut book = TaskBook::load(&path);
        assert!(book.is_empty());
        book.add(task("Health Check", "Butterfly-Clippers")).unwrap();
        book.add(task("Pest Control", "Butterfly-Clippers")).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Day,Hour,Activity,Details,Species\n"));

        let reloaded = TaskBook::load(&path);
        assert_eq!(reloaded.records(), book.records());
    }

    #[test]
    fn test_failed_save_keeps_record_in_memory() {
        let dir = TempDir::new().unwrap();
        let mut book = CareBook::load(dir.path());

        let care = CareRecord::new(day(1), nine(), "Butterfly-Paper Kite", "Fed nectar").unwrap();
        assert!(book.add(care.clone()).is_err());
        assert_eq!(book.records(), &[care]);
    }

    #[test]
    fn test_distribution_counts_descending() {
        let dir = TempDir::new().unwrap();
        let mut book = TaskBook::load(dir.path().join(TASKS_FILE));
        book.add(task("Health Check", "Butterfly-Clippers")).unwrap();
        book.add(task("Pest Control", "Butterfly-Tailed Jay")).unwrap();
        book.add(task("Pest Control", "Butterfly-Clippers")).unwrap();
        book.add(task("Pest Control", "Butterfly-Clippers")).unwrap();

        assert_eq!(
            book.activity_distribution(),
            vec![("Pest Control".to_string(), 3), ("Health Check".to_string(), 1)]
        );
        assert_eq!(
            book.species_distribution(),
            vec![("Butterfly-Clippers".to_string(), 3), ("Butterfly-Tailed Jay".to_string(), 1)]
        );
    }

    #[test]
    fn test_distribution_ties_keep_first_seen_order() {
        assert_eq!(
            distribution(["b", "a", "a", "b", "c"]),
            vec![("b".to_string(), 2), ("a".to_string(), 2), ("c".to_string(), 1)]
        );
    }

    #[test]
    fn test_schedule_default_and_custom_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SCHEDULE_FILE);

        let mut schedule = Schedule::load(&path, day(10));
        assert_eq!(schedule.changes().len(), 1);
        assert_eq!(schedule.changes()[0].message, DEFAULT_DAILY_CHANGE);

        assert!(schedule.schedule(day(12), "   ", day(10)).is_err());
        assert!(schedule.schedule(day(9), "Prune lantana", day(10)).is_err());
        schedule.schedule(day(10), "Prune lantana", day(10)).unwrap();

        let reloaded = Schedule::load(&path, day(10));
        assert_eq!(reloaded.changes().len(), 2);
        assert_eq!(reloaded.changes()[1].date, day(10));

        let next_day = Schedule::load(&path, day(11));
        assert_eq!(next_day.changes().len(), 3);
    }

    #[test]
    fn test_schedule_adds_default_when_day_rolls_over() {
        let dir = TempDir::new().unwrap();
        let mut schedule = Schedule::load(dir.path().join(SCHEDULE_FILE), day(10));

        assert!(!schedule.ensure_default(day(10)));
        assert!(schedule.ensure_default(day(11)));
        assert!(!schedule.ensure_default(day(11)));

        let dates: Vec<_> = schedule.changes().iter().map(|c| c.date).collect();
        assert_eq!(dates, vec![day(10), day(11)]);
    }

    #[test]
    fn test_schedule_save_writes_dates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SCHEDULE_FILE);
        Schedule::load(&path, day(5)).save().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!("Date,Message\n2024-06-05,{}\n", DEFAULT_DAILY_CHANGE)
        );
    }
}
