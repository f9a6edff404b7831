//! Paths, file names, and environment-driven settings.

use crate::error::PipelineError;
use std::fmt;
use std::path::{Path, PathBuf};

pub const RAW_DIR: &str = "raw";
pub const PROCESSED_DIR: &str = "processed";

pub const COLLEGE_MAP_FILE: &str = "prefix_to_college.csv";
pub const PREFIX_SCATTER_FILE: &str = "prefix_scatter_df.csv";
pub const COURSE_SCATTER_FILE: &str = "course_scatter_df.csv";
pub const BAR_FILE: &str = "bar_df.csv";
pub const DASHBOARD_FILE: &str = "UT_historical_class_grades.html";

pub const DEFAULT_PUBLIC_BASE_URL: &str = "https://pub-2b49819eca18477991a35a5e2ff85330.r2.dev";
pub const DEFAULT_RAW_FILES: &[&str] = &["all_years_grade_distribution.csv", COLLEGE_MAP_FILE];
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Local layout and public URLs for one pipeline run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub public_base_url: String,
    pub raw_files: Vec<String>,
}

impl Settings {
    pub fn new(data_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            output_dir: output_dir.into(),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            raw_files: DEFAULT_RAW_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Builds settings, overriding defaults with `PUBLIC_DATA_BASE_URL` and
    /// `RAW_DATA_FILES` when set.
    pub fn from_env(data_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self::from_lookup(data_dir, output_dir, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        data_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut settings = Self::new(data_dir, output_dir);

        if let Some(url) = non_empty(lookup("PUBLIC_DATA_BASE_URL")) {
            settings.public_base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(files) = non_empty(lookup("RAW_DATA_FILES")) {
            settings.raw_files = files
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        settings
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join(RAW_DIR)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join(PROCESSED_DIR)
    }

    pub fn processed_path(&self, file: &str) -> PathBuf {
        self.processed_dir().join(file)
    }

    pub fn dashboard_path(&self) -> PathBuf {
        self.output_dir.join(DASHBOARD_FILE)
    }

    /// Public URL a file of the given name is served from.
    pub fn public_url(&self, file: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), file)
    }
}

/// Credentials and target for the processed-table upload.
#[derive(Clone)]
pub struct S3Settings {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint_url: Option<String>,
    pub region: String,
    pub bucket: String,
}

impl S3Settings {
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let access_key_id = non_empty(lookup("S3_ACCESS_KEY_ID"));
        let secret_access_key = non_empty(lookup("S3_SECRET_ACCESS_KEY"));

        let (Some(access_key_id), Some(secret_access_key)) = (access_key_id, secret_access_key)
        else {
            return Err(PipelineError::Config(
                "missing S3_ACCESS_KEY_ID and/or S3_SECRET_ACCESS_KEY (set them in the environment or a .env file)"
                    .to_string(),
            ));
        };

        let bucket = non_empty(lookup("S3_BUCKET_NAME")).ok_or_else(|| {
            PipelineError::Config("S3_BUCKET_NAME environment variable not set".to_string())
        })?;

        Ok(Self {
            access_key_id,
            secret_access_key,
            endpoint_url: non_empty(lookup("S3_ENDPOINT_URL")),
            region: non_empty(lookup("S3_REGION")).unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
            bucket,
        })
    }
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Returns `path` if it exists as a directory, otherwise a configuration error.
pub fn require_dir(path: &Path) -> Result<&Path, PipelineError> {
    if path.is_dir() {
        Ok(path)
    } else {
        Err(PipelineError::MissingInput(path.to_path_buf()))
    }
}
