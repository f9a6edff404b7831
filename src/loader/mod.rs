//! Raw grade file ingestion.
//!
//! Reads every raw grade CSV in a directory, resolves column aliases per file,
//! and merges rows into one [`GradeRecord`] per semester and section. Rows that
//! cannot be normalized are dropped and tallied in a [`LoadReport`].

pub mod college;
pub mod columns;
pub mod record;

pub use college::CollegeMap;
pub use record::{Division, GradeRecord, Semester, Term};

use anyhow::{Context, Result};
use csv::StringRecord;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::aggregators::grade::{GradeCounts, LetterGrade};
use crate::config::{COLLEGE_MAP_FILE, require_dir};
use crate::error::PipelineError;
use columns::{ColumnMap, Layout, cell, parse_count, section_from_full_name};
use record::OTHER_COLLEGE;

/// Departments for prefixes whose source rows leave the name blank.
static NULL_DEPARTMENTS: &[(&str, &str)] = &[
    ("UDN", "Urban Design"),
    ("ECE", "Electrical Engineering"),
];

/// Why a raw row was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
    MalformedRecord,
    UnusableFile,
    MissingSemester,
    UnknownSemester,
    MissingPrefix,
    MissingCourseNumber,
    InvalidCourseNumber,
    MissingGrade,
    InvalidCount,
    CountOverflow,
    EnrollmentMismatch,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::MalformedRecord => "malformed_record",
            DropReason::UnusableFile => "unusable_file",
            DropReason::MissingSemester => "missing_semester",
            DropReason::UnknownSemester => "unknown_semester",
            DropReason::MissingPrefix => "missing_prefix",
            DropReason::MissingCourseNumber => "missing_course_number",
            DropReason::InvalidCourseNumber => "invalid_course_number",
            DropReason::MissingGrade => "missing_grade",
            DropReason::InvalidCount => "invalid_count",
            DropReason::CountOverflow => "count_overflow",
            DropReason::EnrollmentMismatch => "enrollment_mismatch",
        };
        f.write_str(s)
    }
}

/// Tally of what the loader read and discarded.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub files: usize,
    pub rows_read: usize,
    pub rows_dropped: usize,
    pub drops: BTreeMap<DropReason, usize>,
}

impl LoadReport {
    fn drop_row(&mut self, reason: DropReason) {
        self.rows_dropped += 1;
        *self.drops.entry(reason).or_default() += 1;
    }

    pub fn dropped(&self, reason: DropReason) -> usize {
        self.drops.get(&reason).copied().unwrap_or(0)
    }
}

/// The normalized, concatenated grade table across all semesters.
#[derive(Debug, Clone)]
pub struct GradeTable {
    /// Sorted by semester, prefix, course number, section.
    pub records: Vec<GradeRecord>,
    /// Chronological, deduplicated.
    pub semesters: Vec<Semester>,
    pub report: LoadReport,
}

type SectionKey = (Semester, String, String, String);

struct SectionRow {
    key: SectionKey,
    department: Option<String>,
    instructor: Option<String>,
    division: Division,
    counts: GradeCounts,
}

/// Loads every raw grade file in `raw_dir`.
///
/// # Errors
///
/// Fails when the directory is missing or holds no grade files, when a file
/// cannot be opened, or when no row survives normalization.
#[tracing::instrument(skip_all, fields(raw_dir = %raw_dir.display()))]
pub fn load_grade_table(raw_dir: &Path) -> Result<GradeTable> {
    require_dir(raw_dir)?;

    let files = raw_grade_files(raw_dir)?;
    if files.is_empty() {
        return Err(PipelineError::NoRawFiles(raw_dir.to_path_buf()).into());
    }

    let college_path = raw_dir.join(COLLEGE_MAP_FILE);
    let colleges = if college_path.exists() {
        Some(CollegeMap::load(&college_path)?)
    } else {
        warn!(
            path = %college_path.display(),
            "College mapping not found, every prefix is assigned to '{}'", OTHER_COLLEGE
        );
        None
    };

    let mut report = LoadReport::default();
    let mut sections: BTreeMap<SectionKey, GradeRecord> = BTreeMap::new();

    for path in &files {
        load_file(path, &mut report, &mut sections)?;
    }

    let records = finish_records(sections, colleges.as_ref());

    if records.is_empty() {
        return Err(PipelineError::NoValidRows {
            files: report.files,
            dropped: report.rows_dropped,
        }
        .into());
    }

    let semesters: Vec<Semester> = records
        .iter()
        .map(|r| r.semester)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if report.rows_dropped > 0 {
        let reasons: Vec<String> = report
            .drops
            .iter()
            .map(|(reason, n)| format!("{}={}", reason, n))
            .collect();
        warn!(
            rows_dropped = report.rows_dropped,
            reasons = %reasons.join(","),
            "Dropped rows that could not be normalized"
        );
    }

    info!(
        files = report.files,
        rows_read = report.rows_read,
        records = records.len(),
        semesters = semesters.len(),
        first = ?semesters.first().and_then(Semester::start_date),
        last = ?semesters.last().and_then(Semester::start_date),
        "Grade table loaded"
    );

    Ok(GradeTable {
        records,
        semesters,
        report,
    })
}

/// Raw grade files in `raw_dir`, sorted by name, excluding the college mapping.
pub fn raw_grade_files(raw_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(raw_dir)
        .with_context(|| format!("failed to read {}", raw_dir.display()))?
    {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        if path.file_name().and_then(|n| n.to_str()) == Some(COLLEGE_MAP_FILE) {
            continue;
        }
        files.push(path);
    }

    files.sort();
    Ok(files)
}

fn load_file(
    path: &Path,
    report: &mut LoadReport,
    sections: &mut BTreeMap<SectionKey, GradeRecord>,
) -> Result<()> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open raw grade file {}", path.display()))?;

    let headers = rdr
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .clone();

    report.files += 1;

    let columns = ColumnMap::resolve(&headers);
    let file_semester = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(Semester::parse);

    let missing = columns.missing_required(file_semester.is_some());
    let layout = match columns.layout() {
        Some(layout) if missing.is_empty() => layout,
        _ => {
            let rows = rdr.records().count();
            warn!(
                path = %path.display(),
                missing = %missing.join(", "),
                rows,
                "Raw file has no usable schema, skipping"
            );
            report.rows_read += rows;
            for _ in 0..rows {
                report.drop_row(DropReason::UnusableFile);
            }
            return Ok(());
        }
    };

    debug!(path = %path.display(), layout = ?layout, "Reading raw grade file");

    for result in rdr.records() {
        report.rows_read += 1;

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Malformed CSV record");
                report.drop_row(DropReason::MalformedRecord);
                continue;
            }
        };

        match normalize_row(&record, &columns, &layout, file_semester)
            .and_then(|row| merge_row(sections, row))
        {
            Ok(()) => {}
            Err(reason) => {
                debug!(
                    path = %path.display(),
                    line = record.position().map(|p| p.line()).unwrap_or(0),
                    %reason,
                    "Dropping row"
                );
                report.drop_row(reason);
            }
        }
    }

    Ok(())
}

fn normalize_row(
    record: &StringRecord,
    columns: &ColumnMap,
    layout: &Layout,
    file_semester: Option<Semester>,
) -> Result<SectionRow, DropReason> {
    let semester = match cell(record, columns.semester) {
        Some(raw) => Semester::parse(raw).ok_or(DropReason::UnknownSemester)?,
        None => file_semester.ok_or(DropReason::MissingSemester)?,
    };

    let prefix = cell(record, columns.prefix).ok_or(DropReason::MissingPrefix)?;
    let course_number =
        cell(record, columns.course_number).ok_or(DropReason::MissingCourseNumber)?;
    let division =
        Division::from_course_number(course_number).ok_or(DropReason::InvalidCourseNumber)?;

    let section = cell(record, columns.section)
        .map(str::to_string)
        .or_else(|| cell(record, columns.course_full_name).and_then(section_from_full_name))
        .unwrap_or_default();

    let counts = match layout {
        Layout::Long { grade, count } => {
            let grade = cell(record, Some(*grade))
                .and_then(LetterGrade::parse)
                .ok_or(DropReason::MissingGrade)?;
            let count = cell(record, Some(*count))
                .and_then(parse_count)
                .ok_or(DropReason::InvalidCount)?;
            GradeCounts::single(grade, count)
        }
        Layout::Wide(grade_columns) => {
            let mut counts = GradeCounts::default();
            for (idx, grade) in grade_columns {
                let count = match cell(record, Some(*idx)) {
                    Some(raw) => parse_count(raw).ok_or(DropReason::InvalidCount)?,
                    None => 0,
                };
                counts
                    .add(*grade, count)
                    .map_err(|_| DropReason::CountOverflow)?;
            }
            if let Some(raw) = cell(record, columns.enrollment) {
                let enrollment = parse_count(raw).ok_or(DropReason::InvalidCount)?;
                if enrollment != counts.total() {
                    return Err(DropReason::EnrollmentMismatch);
                }
            }
            counts
        }
    };

    Ok(SectionRow {
        key: (
            semester,
            prefix.to_string(),
            course_number.to_string(),
            section,
        ),
        department: cell(record, columns.department).map(str::to_string),
        instructor: cell(record, columns.instructor).map(str::to_string),
        division,
        counts,
    })
}

/// Folds a row into its section. A row whose counts would overflow the
/// section's tally is rejected without touching the section.
fn merge_row(
    sections: &mut BTreeMap<SectionKey, GradeRecord>,
    row: SectionRow,
) -> Result<(), DropReason> {
    let entry = sections.entry(row.key.clone()).or_insert_with(|| {
        let (semester, prefix, course_number, section) = row.key;
        GradeRecord {
            semester,
            prefix,
            course_number,
            section,
            department: String::new(),
            instructor: None,
            college: None,
            division: row.division,
            counts: GradeCounts::default(),
        }
    });

    entry
        .counts
        .merge(&row.counts)
        .map_err(|_| DropReason::CountOverflow)?;
    if entry.department.is_empty() {
        if let Some(department) = row.department {
            entry.department = department;
        }
    }
    if entry.instructor.is_none() {
        entry.instructor = row.instructor;
    }
    Ok(())
}

fn finish_records(
    sections: BTreeMap<SectionKey, GradeRecord>,
    colleges: Option<&CollegeMap>,
) -> Vec<GradeRecord> {
    sections
        .into_values()
        .map(|mut record| {
            record.college = match colleges {
                Some(map) => map.college_for(&record.prefix).map(str::to_string),
                None => Some(OTHER_COLLEGE.to_string()),
            };
            if record.department.is_empty() {
                if let Some((_, name)) = NULL_DEPARTMENTS
                    .iter()
                    .find(|(prefix, _)| *prefix == record.prefix)
                {
                    record.department = name.to_string();
                }
            }
            record
        })
        .collect()
}
