//! Persistence for summary tables and rendered artifacts.
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! crash never leaves a half-written table behind.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes `bytes` to `path` atomically, creating parent directories.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let tmp = temp_sibling(path);
    fs::write(&tmp, bytes).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    Ok(())
}

/// Serializes `rows` as CSV with a header row and writes them atomically.
pub fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_writer(Vec::new());

    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush CSV buffer: {}", e))?;

    debug!(path = %path.display(), rows = rows.len(), bytes = bytes.len(), "Writing table");
    write_atomic(path, &bytes)
}

/// Reads every row of a CSV table written by [`write_table`].
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: T = result.with_context(|| format!("malformed row in {}", path.display()))?;
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregators::types::BarRow;
    use std::env;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir()
            .join(format!("course_grades_output_{}", std::process::id()))
            .join(name)
    }

    fn bar(letter: &str, points: Option<f64>, count: u64) -> BarRow {
        BarRow {
            college: "Natural Sciences".to_string(),
            prefix: "C S".to_string(),
            course_number: "312".to_string(),
            department: "Computer Science".to_string(),
            course_name: "C S 312".to_string(),
            letter_grade: letter.to_string(),
            grade_points: points,
            total_students: count,
            semester: "All".to_string(),
        }
    }

    #[test]
    fn test_write_table_creates_parent_and_header() {
        let path = temp_path("nested/bar_df.csv");
        let _ = fs::remove_file(&path);

        write_table(&path, &[bar("A", Some(4.0), 3)]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(
            lines[0],
            "College,Course Prefix,Course Number,Department,Course Name,Letter Grade,Grade Points,Total Students,semester"
        );
        assert_eq!(
            lines[1],
            "Natural Sciences,C S,312,Computer Science,C S 312,A,4.0,3,All"
        );
        assert!(!temp_sibling(&path).exists());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_table_restores_rows() {
        let path = temp_path("read_back.csv");
        let rows = vec![bar("B+", Some(3.33), 7), bar("Other", None, 1)];

        write_table(&path, &rows).unwrap();
        let read: Vec<BarRow> = read_table(&path).unwrap();
        assert_eq!(read, rows);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_table_replaces_existing_file() {
        let path = temp_path("replace.csv");
        write_table(&path, &[bar("A", Some(4.0), 1), bar("B", Some(3.0), 1)]).unwrap();
        write_table(&path, &[bar("F", Some(0.0), 9)]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains(",F,0.0,9,"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_missing_table_fails() {
        let path = temp_path("does_not_exist.csv");
        assert!(read_table::<BarRow>(&path).is_err());
    }
}
