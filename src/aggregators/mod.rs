//! Grade aggregation.
//!
//! Turns the normalized grade table into prefix rollups, course trends and
//! letter-grade distributions, each computed for all semesters and for every
//! individual semester, and flattens them into the rows written to disk.

pub mod aggregate;
pub mod grade;
pub mod types;
pub mod utility;

pub use aggregate::SummaryTables;
