//! Normalized grade rows and the keys they are grouped by.

use chrono::NaiveDate;
use std::fmt;

use crate::aggregators::grade::GradeCounts;

/// College label used for prefixes without a mapping.
pub const OTHER_COLLEGE: &str = "Other";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Spring,
    Summer,
    Fall,
}

impl Term {
    fn parse(raw: &str) -> Option<Term> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "spring" | "spr" => Some(Term::Spring),
            "summer" | "sum" => Some(Term::Summer),
            "fall" | "autumn" => Some(Term::Fall),
            _ => None,
        }
    }

    /// Last digit of the registrar's `CCYYS` semester code.
    fn from_code(digit: char) -> Option<Term> {
        match digit {
            '2' => Some(Term::Spring),
            '6' => Some(Term::Summer),
            '9' => Some(Term::Fall),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Term::Spring => "Spring",
            Term::Summer => "Summer",
            Term::Fall => "Fall",
        }
    }
}

/// An academic semester, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Semester {
    pub year: i32,
    pub term: Term,
}

impl Semester {
    pub fn new(term: Term, year: i32) -> Self {
        Self { year, term }
    }

    /// Accepts `"Fall 2021"`, `"2021 Fall"`, `"fall_2021"` and `"20219"`.
    pub fn parse(raw: &str) -> Option<Semester> {
        let raw = raw.trim();

        if raw.len() == 5 && raw.chars().all(|c| c.is_ascii_digit()) {
            let year = raw[..4].parse().ok()?;
            let term = Term::from_code(raw.chars().last()?)?;
            return Some(Semester::new(term, year));
        }

        let parts: Vec<&str> = raw
            .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() != 2 {
            return None;
        }

        if let (Some(term), Ok(year)) = (Term::parse(parts[0]), parts[1].parse()) {
            return Some(Semester::new(term, year));
        }
        if let (Ok(year), Some(term)) = (parts[0].parse(), Term::parse(parts[1])) {
            return Some(Semester::new(term, year));
        }
        None
    }

    pub fn label(&self) -> String {
        self.to_string()
    }

    /// Nominal first day of classes.
    pub fn start_date(&self) -> Option<NaiveDate> {
        let (month, day) = match self.term {
            Term::Spring => (1, 20),
            Term::Summer => (6, 1),
            Term::Fall => (8, 25),
        };
        NaiveDate::from_ymd_opt(self.year, month, day)
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.term.name(), self.year)
    }
}

/// Course level derived from the course number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Division {
    Lower,
    Upper,
    Graduate,
}

impl Division {
    /// The first digit of a course number is its credit hours; the remaining
    /// digits give the level. `"309K"` is Lower, `"378"` Upper, `"380P"` Graduate.
    pub fn from_course_number(number: &str) -> Option<Division> {
        let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() < 2 {
            return None;
        }
        let level: u32 = digits[1..].parse().ok()?;
        Some(match level {
            l if l > 79 => Division::Graduate,
            l if l > 19 => Division::Upper,
            _ => Division::Lower,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Division::Lower => "Lower",
            Division::Upper => "Upper",
            Division::Graduate => "Graduate",
        }
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One section's grade counts for one semester.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeRecord {
    pub semester: Semester,
    pub prefix: String,
    pub course_number: String,
    pub section: String,
    pub department: String,
    pub instructor: Option<String>,
    /// `None` when a college mapping is loaded and does not list the prefix.
    pub college: Option<String>,
    pub division: Division,
    pub counts: GradeCounts,
}

impl GradeRecord {
    pub fn enrollment(&self) -> u64 {
        self.counts.total()
    }

    pub fn college_label(&self) -> &str {
        self.college.as_deref().unwrap_or(OTHER_COLLEGE)
    }

    pub fn prefix_recognized(&self) -> bool {
        self.college.is_some()
    }
}

pub fn course_display_name(prefix: &str, course_number: &str) -> String {
    format!("{} {}", prefix, course_number)
}
