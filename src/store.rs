// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! CSV-backed tables and append-only record files

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, warn};

use crate::{LepiError, Result};

/// A record type with a fixed CSV header
pub trait CsvRecord: Serialize + DeserializeOwned {
    /// Column names, in serialization order
    const HEADERS: &'static [&'static str];
}

/// An untyped CSV table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Index of a column by name
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Mean of a numeric column grouped by a label column, in first-seen order.
    ///
    /// Cells that do not parse as numbers are left out of the mean; a label
    /// with no numeric cells averages to zero.
    pub fn mean_by(&self, label_col: &str, value_col: &str) -> Vec<(String, f64)> {
        let (Some(label_idx), Some(value_idx)) = (self.column(label_col), self.column(value_col))
        else {
            return Vec::new();
        };

        let mut groups: Vec<(String, f64, u32)> = Vec::new();
        for row in &self.rows {
            let label = row.get(label_idx).cloned().unwrap_or_default();
            let value = row.get(value_idx).and_then(|v| v.trim().parse::<f64>().ok());
            let idx = match groups.iter().position(|(l, _, _)| *l == label) {
                Some(idx) => idx,
                None => {
                    groups.push((label, 0.0, 0));
                    groups.len() - 1
                }
            };
            if let Some(value) = value {
                groups[idx].1 += value;
                groups[idx].2 += 1;
            }
        }

        groups
            .into_iter()
            .map(|(label, total, n)| (label, if n > 0 { total / f64::from(n) } else { 0.0 }))
            .collect()
    }

    /// Serialize the table back to CSV text
    pub fn to_csv_string(&self) -> Result<String> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        if !self.headers.is_empty() {
            wtr.write_record(&self.headers)?;
        }
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        let data = wtr.into_inner().map_err(|e| e.into_error())?;
        String::from_utf8(data).map_err(|e| LepiError::Validation(e.to_string()))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn is_missing_or_empty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true)
}

/// Load a CSV table, returning an empty table if the file is missing,
/// empty or unreadable
pub fn load_table(path: &Path) -> Table {
    if is_missing_or_empty(path) {
        warn!("'{}' not found or empty", file_name(path));
        return Table::default();
    }

    match read_table(path) {
        Ok(table) => table,
        Err(e) => {
            warn!("Error loading '{}': {}. Using an empty table", file_name(path), e);
            Table::default()
        }
    }
}

fn read_table(path: &Path) -> Result<Table> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.iter().map(String::from).collect();
    let rows = rdr
        .records()
        .map(|r| r.map(|rec| rec.iter().map(String::from).collect()))
        .collect::<std::result::Result<Vec<Vec<String>>, csv::Error>>()?;
    Ok(Table { headers, rows })
}

/// Load typed records; a missing or empty file yields no records
pub fn load_records<T: CsvRecord>(path: &Path) -> Result<Vec<T>> {
    if is_missing_or_empty(path) {
        debug!("No records at {:?}", path);
        return Ok(Vec::new());
    }

    let mut rdr = csv::Reader::from_path(path)?;
    let records = rdr.deserialize().collect::<std::result::Result<Vec<T>, csv::Error>>()?;
    Ok(records)
}

/// Append one typed record, writing the header first if the file is new
pub fn append_record<T: CsvRecord>(path: &Path, record: &T) -> Result<()> {
    let headers: Vec<String> = T::HEADERS.iter().map(|h| h.to_string()).collect();
    prepare_for_append(path, &headers)?;

    let file = OpenOptions::new().append(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    wtr.serialize(record)?;
    wtr.flush()?;
    Ok(())
}

/// Append one untyped row under the given header
pub fn append_row(path: &Path, headers: &[String], values: &[String]) -> Result<()> {
    if headers.len() != values.len() {
        return Err(LepiError::Validation(format!(
            "Row has {} values for {} columns",
            values.len(),
            headers.len()
        )));
    }
    prepare_for_append(path, headers)?;

    let file = OpenOptions::new().append(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    wtr.write_record(values)?;
    wtr.flush()?;
    Ok(())
}

/// Replace the file with the header and every record
pub fn rewrite_records<T: CsvRecord>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    wtr.write_record(T::HEADERS)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Create the file with its header, or check the existing header matches
fn prepare_for_append(path: &Path, headers: &[String]) -> Result<()> {
    if is_missing_or_empty(path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(headers)?;
        wtr.flush()?;
        debug!("Created {:?} with header", path);
        return Ok(());
    }

    let mut rdr = csv::Reader::from_path(path)?;
    let found: Vec<String> = rdr.headers()?.iter().map(String::from).collect();
    if found != headers {
        return Err(LepiError::SchemaMismatch {
            path: path.display().to_string(),
            expected: headers.join(","),
            found: found.join(","),
        });
    }

    if !ends_with_newline(path)? {
        let mut file = OpenOptions::new().append(true).open(path)?;
        file.write_all(b"\n")?;
        debug!("Terminated the last line of {:?}", path);
    }
    Ok(())
}

fn ends_with_newline(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Visit {
        #[serde(rename = "Day")]
        day: String,
        #[serde(rename = "Count")]
        count: u32,
    }

    impl CsvRecord for Visit {
        const HEADERS: &'static [&'static str] = &["Day", "Count"];
    }

    fn visit(day: &str, count: u32) -> Visit {
        Visit { day: day.to_string(), count }
    }

    #[test]
    fn test_load_missing_table_is_empty() {
        let dir = TempDir::new().unwrap();
        let table = load_table(&dir.path().join("nope.csv"));
        assert!(table.is_empty());
        assert!(table.headers.is_empty());
    }

    #[test]
    fn test_load_empty_and_corrupt_tables_are_empty() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("empty.csv");
        fs::write(&empty, "").unwrap();
        assert!(load_table(&empty).is_empty());

        let corrupt = dir.path().join("corrupt.csv");
        fs::write(&corrupt, "a,b\n1,2,3\n").unwrap();
        assert_eq!(load_table(&corrupt), Table::default());
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("visits.csv");

        append_record(&path, &visit("Mon", 1)).unwrap();
        append_record(&path, &visit("Tue", 2)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Day,Count\nMon,1\nTue,2\n");
        assert_eq!(load_records::<Visit>(&path).unwrap(), vec![visit("Mon", 1), visit("Tue", 2)]);
    }

    #[test]
    fn test_append_to_empty_file_writes_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("visits.csv");
        fs::write(&path, "").unwrap();

        append_record(&path, &visit("Mon", 1)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "Day,Count\nMon,1\n");
    }

    #[test]
    fn test_append_rejects_mismatched_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("visits.csv");
        fs::write(&path, "Day,Hour\nMon,09:00\n").unwrap();

        let err = append_record(&path, &visit("Tue", 2)).unwrap_err();
        assert!(matches!(err, LepiError::SchemaMismatch { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "Day,Hour\nMon,09:00\n");
    }

    #[test]
    fn test_append_row_checks_width() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.csv");
        let headers = vec!["a".to_string(), "b".to_string()];

        append_row(&path, &headers, &["1".to_string(), "x, y".to_string()]).unwrap();
        assert!(append_row(&path, &headers, &["1".to_string()]).is_err());

        let table = load_table(&path);
        assert_eq!(table.headers, headers);
        assert_eq!(table.rows, vec![vec!["1".to_string(), "x, y".to_string()]]);
    }

    #[test]
    fn test_append_after_unterminated_last_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.csv");
        fs::write(&path, "a,b\n1,2").unwrap();
        let headers = vec!["a".to_string(), "b".to_string()];

        append_row(&path, &headers, &["3".to_string(), "4".to_string()]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n1,2\n3,4\n");
        assert_eq!(load_table(&path).len(), 2);

        let visits = dir.path().join("visits.csv");
        fs::write(&visits, "Day,Count").unwrap();
        append_record(&visits, &visit("Mon", 1)).unwrap();
        assert_eq!(fs::read_to_string(&visits).unwrap(), "Day,Count\nMon,1\n");
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("visits.csv");
        append_record(&path, &visit("Mon", 1)).unwrap();

        rewrite_records(&path, &[visit("Wed", 3)]).unwrap();
        assert_eq!(load_records::<Visit>(&path).unwrap(), vec![visit("Wed", 3)]);

        rewrite_records::<Visit>(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "Day,Count\n");
        assert!(load_records::<Visit>(&path).unwrap().is_empty());
    }

    #[test]
    fn test_mean_by_groups_in_first_seen_order() {
        let table = Table {
            headers: vec!["class_name".into(), "score".into()],
            rows: vec![
                vec!["Pupae".into(), "90.5".into()],
                vec!["Eggs".into(), "10".into()],
                vec!["Pupae".into(), "79.5".into()],
                vec!["Eggs".into(), "n/a".into()],
                vec!["Larvae".into(), "".into()],
            ],
        };
        assert_eq!(
            table.mean_by("class_name", "score"),
            vec![
                ("Pupae".to_string(), 85.0),
                ("Eggs".to_string(), 10.0),
                ("Larvae".to_string(), 0.0)
            ]
        );
        assert!(table.mean_by("missing", "score").is_empty());
    }

    #[test]
    fn test_to_csv_string_quotes_fields() {
        let table = Table {
            headers: vec!["name".into()],
            rows: vec![vec!["a, b".into()]],
        };
        assert_eq!(table.to_csv_string().unwrap(), "name\n\"a, b\"\n");
    }
}
