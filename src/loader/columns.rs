//! Header alias table for raw grade files.
//!
//! Raw files changed column names many times over the years. Each header is
//! normalized and matched against the aliases below; the first match for a
//! field wins.

use csv::StringRecord;

use crate::aggregators::grade::LetterGrade;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Semester,
    Prefix,
    CourseNumber,
    Section,
    CourseFullName,
    Department,
    Instructor,
    LetterGrade,
    Count,
    Enrollment,
}

static ALIASES: &[(Field, &[&str])] = &[
    (
        Field::Semester,
        &["semester", "semester_long", "sem", "term", "ccyys"],
    ),
    (
        Field::Prefix,
        &["course_prefix", "prefix", "crs_prefix", "subject", "subject_code"],
    ),
    (
        Field::CourseNumber,
        &[
            "course_number",
            "crs_nbr",
            "course_nbr",
            "course_num",
            "catalog_number",
            "number",
        ],
    ),
    (
        Field::Section,
        &[
            "section",
            "section_number",
            "section_nbr",
            "unique",
            "unique_number",
        ],
    ),
    (Field::CourseFullName, &["course_full_name", "course"]),
    (
        Field::Department,
        &["department", "department_name", "dept_name", "dept"],
    ),
    (
        Field::Instructor,
        &["instructor", "instructor_name", "faculty"],
    ),
    (Field::LetterGrade, &["letter_grade", "grade", "let_grade"]),
    (
        Field::Count,
        &[
            "num_students",
            "count_of_letter_grade",
            "count",
            "students",
            "grade_count",
        ],
    ),
    (
        Field::Enrollment,
        &["enrollment", "total_enrollment", "total_students", "enrolled"],
    ),
];

/// Lowercases and collapses every run of non-alphanumeric characters to `_`.
pub fn normalize_header(raw: &str) -> String {
    let raw = raw.trim_start_matches('\u{feff}');
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;

    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    out
}

fn field_for(normalized: &str) -> Option<Field> {
    ALIASES
        .iter()
        .find(|(_, aliases)| aliases.contains(&normalized))
        .map(|(field, _)| *field)
}

/// How grade counts are laid out in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// One row per letter grade, with a count column.
    Long { grade: usize, count: usize },
    /// One column per grade symbol.
    Wide(Vec<(usize, LetterGrade)>),
}

/// Resolved column positions for one file.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    pub semester: Option<usize>,
    pub prefix: Option<usize>,
    pub course_number: Option<usize>,
    pub section: Option<usize>,
    pub course_full_name: Option<usize>,
    pub department: Option<usize>,
    pub instructor: Option<usize>,
    pub letter_grade: Option<usize>,
    pub count: Option<usize>,
    pub enrollment: Option<usize>,
    pub grade_columns: Vec<(usize, LetterGrade)>,
}

impl ColumnMap {
    pub fn resolve(headers: &StringRecord) -> Self {
        let mut map = ColumnMap::default();

        for (idx, raw) in headers.iter().enumerate() {
            let normalized = normalize_header(raw);

            if let Some(field) = field_for(&normalized) {
                let slot = map.slot_mut(field);
                if slot.is_none() {
                    *slot = Some(idx);
                }
                continue;
            }

            if let Some(grade) = LetterGrade::from_symbol(raw.trim_start_matches('\u{feff}')) {
                map.grade_columns.push((idx, grade));
            }
        }

        map
    }

    fn slot_mut(&mut self, field: Field) -> &mut Option<usize> {
        match field {
            Field::Semester => &mut self.semester,
            Field::Prefix => &mut self.prefix,
            Field::CourseNumber => &mut self.course_number,
            Field::Section => &mut self.section,
            Field::CourseFullName => &mut self.course_full_name,
            Field::Department => &mut self.department,
            Field::Instructor => &mut self.instructor,
            Field::LetterGrade => &mut self.letter_grade,
            Field::Count => &mut self.count,
            Field::Enrollment => &mut self.enrollment,
        }
    }

    /// Long layout wins when both a grade and a count column exist.
    pub fn layout(&self) -> Option<Layout> {
        match (self.letter_grade, self.count) {
            (Some(grade), Some(count)) => Some(Layout::Long { grade, count }),
            _ if !self.grade_columns.is_empty() => Some(Layout::Wide(self.grade_columns.clone())),
            _ => None,
        }
    }

    /// Names of the fields a file lacks to be usable at all.
    pub fn missing_required(&self, has_semester_fallback: bool) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.semester.is_none() && !has_semester_fallback {
            missing.push("semester");
        }
        if self.prefix.is_none() {
            missing.push("course prefix");
        }
        if self.course_number.is_none() {
            missing.push("course number");
        }
        if self.layout().is_none() {
            missing.push("letter grade counts");
        }
        missing
    }
}

/// Reads a trimmed cell, treating absent or blank cells as `None`.
pub fn cell<'r>(record: &'r StringRecord, idx: Option<usize>) -> Option<&'r str> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Largest integer an `f64` holds exactly.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Parses a student count such as `"1,234"` or `"12.0"`.
///
/// Decimal spellings are accepted only while they are exact integers.
pub fn parse_count(raw: &str) -> Option<u64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(n) = cleaned.parse::<u64>() {
        return Some(n);
    }
    let f: f64 = cleaned.parse().ok()?;
    if (0.0..=MAX_EXACT_FLOAT).contains(&f) && f.fract() == 0.0 {
        Some(f as u64)
    } else {
        None
    }
}

/// Section number from a full course name such as `"C S 312 no. 51235"`.
pub fn section_from_full_name(full_name: &str) -> Option<String> {
    full_name
        .rsplit_once("no.")
        .map(|(_, section)| section.trim().to_string())
        .filter(|s| !s.is_empty())
}
