//! Data types produced by the aggregation pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::aggregators::grade::GradeCounts;
use crate::loader::{Division, Semester};

/// Label used for the all-semesters scope in output tables.
pub const ALL_SEMESTERS: &str = "All";

/// The span of semesters a summary covers. `All` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    All,
    Semester(Semester),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::All => f.write_str(ALL_SEMESTERS),
            Scope::Semester(s) => write!(f, "{}", s),
        }
    }
}

/// Rollup for one course prefix within a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefixSummary {
    pub scope: Scope,
    pub prefix: String,
    pub college: String,
    pub department: String,
    pub counts: GradeCounts,
}

impl PrefixSummary {
    pub fn enrollment(&self) -> u64 {
        self.counts.total()
    }

    pub fn average_grade(&self) -> Option<f64> {
        self.counts.mean_grade_points()
    }
}

/// Rollup for one course (prefix and number) within a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseSummary {
    pub scope: Scope,
    pub prefix: String,
    pub course_number: String,
    pub college: String,
    pub department: String,
    pub division: Division,
    pub counts: GradeCounts,
}

impl CourseSummary {
    pub fn enrollment(&self) -> u64 {
        self.counts.total()
    }

    pub fn average_grade(&self) -> Option<f64> {
        self.counts.mean_grade_points()
    }
}

/// Letter-grade counts for one course within a scope. Kept even when every
/// count is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeDistribution {
    pub scope: Scope,
    pub prefix: String,
    pub course_number: String,
    pub college: String,
    pub department: String,
    pub counts: GradeCounts,
}

/// A row of `prefix_scatter_df.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixScatterRow {
    #[serde(rename = "College")]
    pub college: String,
    #[serde(rename = "Course Prefix")]
    pub prefix: String,
    #[serde(rename = "Department")]
    pub department: String,
    #[serde(rename = "Total Students")]
    pub total_students: u64,
    #[serde(rename = "Average Grade")]
    pub average_grade: f64,
    pub semester: String,
}

/// A row of `course_scatter_df.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseScatterRow {
    #[serde(rename = "College")]
    pub college: String,
    #[serde(rename = "Course Prefix")]
    pub prefix: String,
    #[serde(rename = "Course Number")]
    pub course_number: String,
    #[serde(rename = "Department")]
    pub department: String,
    #[serde(rename = "Course Name")]
    pub course_name: String,
    #[serde(rename = "Division")]
    pub division: String,
    #[serde(rename = "Total Students")]
    pub total_students: u64,
    #[serde(rename = "Average Grade")]
    pub average_grade: f64,
    pub semester: String,
}

/// A row of `bar_df.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRow {
    #[serde(rename = "College")]
    pub college: String,
    #[serde(rename = "Course Prefix")]
    pub prefix: String,
    #[serde(rename = "Course Number")]
    pub course_number: String,
    #[serde(rename = "Department")]
    pub department: String,
    #[serde(rename = "Course Name")]
    pub course_name: String,
    #[serde(rename = "Letter Grade")]
    pub letter_grade: String,
    #[serde(rename = "Grade Points")]
    pub grade_points: Option<f64>,
    #[serde(rename = "Total Students")]
    pub total_students: u64,
    pub semester: String,
}
