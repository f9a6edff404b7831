use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::columns::{cell, normalize_header};

/// Maps course prefixes to the college that owns them.
///
/// Loaded from a two-column CSV:
/// ```text
/// COURSE_CODE,COLLEGE
/// C S,Natural Sciences
/// ```
#[derive(Debug, Default, Clone)]
pub struct CollegeMap {
    entries: HashMap<String, String>,
}

impl CollegeMap {
    pub fn load(path: &Path) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("failed to open college mapping {}", path.display()))?;

        let headers = rdr.headers()?.clone();
        let position = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.contains(&normalize_header(h).as_str()))
        };
        let code_idx = position(&["course_code", "prefix", "course_prefix"]).unwrap_or(0);
        let college_idx = position(&["college", "college_name"]).unwrap_or(1);

        let mut entries = HashMap::new();
        for result in rdr.records() {
            let record = result
                .with_context(|| format!("malformed row in {}", path.display()))?;
            if let (Some(code), Some(college)) =
                (cell(&record, Some(code_idx)), cell(&record, Some(college_idx)))
            {
                entries.insert(code.to_string(), college.to_string());
            }
        }

        debug!(path = %path.display(), prefixes = entries.len(), "College mapping loaded");
        Ok(Self { entries })
    }

    pub fn college_for(&self, prefix: &str) -> Option<&str> {
        self.entries.get(prefix).map(String::as_str)
    }
}
