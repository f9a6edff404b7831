//! Stage orchestration: download, prepare, visualize, upload.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::aggregators::SummaryTables;
use crate::config::{BAR_FILE, COURSE_SCATTER_FILE, PREFIX_SCATTER_FILE, Settings, require_dir};
use crate::dashboard::create_dashboard;
use crate::error::PipelineError;
use crate::fetch::{HttpClient, fetch_bytes};
use crate::loader::{LoadReport, load_grade_table};
use crate::output::{write_atomic, write_table};
use crate::services::object_store::ObjectStore;

/// The four command-line switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageFlags {
    pub prepare_only: bool,
    pub visualize_only: bool,
    pub download_raw: bool,
    pub upload_processed: bool,
}

/// Which stages a run executes, derived from [`StageFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub download: bool,
    pub prepare: bool,
    pub visualize: bool,
    pub upload: bool,
}

impl Plan {
    pub fn from_flags(flags: StageFlags) -> Self {
        Self {
            download: flags.download_raw && !flags.visualize_only,
            prepare: !flags.visualize_only,
            visualize: !flags.prepare_only,
            upload: flags.upload_processed && !flags.visualize_only,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.download || self.prepare || self.visualize || self.upload)
    }
}

/// What the prepare stage produced.
#[derive(Debug, Clone)]
pub struct PrepareReport {
    pub load: LoadReport,
    pub records: usize,
    pub semesters: usize,
    pub prefix_rows: usize,
    pub course_rows: usize,
    pub bar_rows: usize,
}

/// Per-file outcome of a download or upload stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl TransferReport {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Turns the tally into an error when files were attempted and none made it.
    fn into_result(self, last_error: Option<anyhow::Error>, what: &str) -> Result<Self> {
        match last_error {
            Some(e) if self.succeeded == 0 => {
                Err(e.context(format!("all {} {} failed", self.failed, what)))
            }
            _ => Ok(self),
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub downloaded: TransferReport,
    pub prepared: Option<PrepareReport>,
    pub dashboard: Option<PathBuf>,
    pub uploaded: TransferReport,
}

/// Loads raw files, builds the three summary tables and writes them.
///
/// All tables are computed before the first file is written.
#[tracing::instrument(skip_all, fields(data_dir = %settings.data_dir.display()))]
pub fn prepare_data(settings: &Settings) -> Result<PrepareReport> {
    let table = load_grade_table(&settings.raw_dir())?;
    let tables = SummaryTables::build(&table)?;

    let prefix_rows = tables.prefix_scatter_rows();
    let course_rows = tables.course_scatter_rows();
    let bar_rows = tables.bar_rows();

    write_table(&settings.processed_path(PREFIX_SCATTER_FILE), &prefix_rows)?;
    write_table(&settings.processed_path(COURSE_SCATTER_FILE), &course_rows)?;
    write_table(&settings.processed_path(BAR_FILE), &bar_rows)?;

    info!(
        records = table.records.len(),
        semesters = table.semesters.len(),
        prefix_rows = prefix_rows.len(),
        course_rows = course_rows.len(),
        bar_rows = bar_rows.len(),
        dir = %settings.processed_dir().display(),
        "Summary tables written"
    );

    Ok(PrepareReport {
        records: table.records.len(),
        semesters: table.semesters.len(),
        load: table.report,
        prefix_rows: prefix_rows.len(),
        course_rows: course_rows.len(),
        bar_rows: bar_rows.len(),
    })
}

/// Downloads each configured raw file from the public base URL into the raw
/// directory.
///
/// A failed file is logged and skipped; the stage errors only when every
/// file failed.
#[tracing::instrument(skip_all, fields(base_url = %settings.public_base_url))]
pub async fn download_raw_data<C: HttpClient>(
    client: &C,
    settings: &Settings,
) -> Result<TransferReport> {
    let raw_dir = settings.raw_dir();
    fs::create_dir_all(&raw_dir)
        .with_context(|| format!("failed to create {}", raw_dir.display()))?;

    let mut report = TransferReport::default();
    let mut last_error = None;

    for name in &settings.raw_files {
        let url = settings.public_url(name);
        info!(%url, "Downloading raw file");

        let result = match fetch_bytes(client, &url).await {
            Ok(bytes) => write_atomic(&raw_dir.join(name), &bytes).map(|()| bytes.len()),
            Err(e) => Err(e),
        };

        match result {
            Ok(bytes) => {
                report.succeeded += 1;
                info!(file = %name, bytes, "Downloaded");
            }
            Err(e) => {
                report.failed += 1;
                error!(file = %name, error = %format!("{:#}", e), "Download failed");
                last_error = Some(e);
            }
        }
    }

    info!(
        successful = report.succeeded,
        failed = report.failed,
        "Download complete"
    );
    report.into_result(last_error, "downloads")
}

/// Uploads every processed CSV, keyed by file name.
///
/// Every file is attempted; the stage errors only when all of them failed.
#[tracing::instrument(skip_all, fields(store = %store.location()))]
pub async fn upload_processed_data(
    store: &dyn ObjectStore,
    settings: &Settings,
) -> Result<TransferReport> {
    let processed = settings.processed_dir();
    require_dir(&processed)?;

    let mut files: Vec<PathBuf> = fs::read_dir(&processed)
        .with_context(|| format!("failed to read {}", processed.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("csv"))
        .collect();
    files.sort();

    if files.is_empty() {
        warn!(dir = %processed.display(), "No processed tables to upload");
        return Ok(TransferReport::default());
    }

    let mut report = TransferReport::default();
    let mut last_error = None;

    for path in &files {
        match upload_file(store, path).await {
            Ok(key) => {
                report.succeeded += 1;
                info!(%key, "Uploaded");
            }
            Err(e) => {
                report.failed += 1;
                error!(path = %path.display(), error = %format!("{:#}", e), "Upload failed");
                last_error = Some(e);
            }
        }
    }

    info!(
        successful = report.succeeded,
        failed = report.failed,
        "Upload complete"
    );
    report.into_result(last_error, "uploads")
}

async fn upload_file(store: &dyn ObjectStore, path: &Path) -> Result<String> {
    let key = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("non UTF-8 file name: {}", path.display()))?;
    let body = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;

    store.put_object(key, body, "text/csv").await?;
    Ok(key.to_string())
}

/// Runs the planned stages in order.
///
/// `store` must be provided when the plan uploads; it is resolved by the
/// caller before any stage runs so missing credentials fail early.
pub async fn run<C: HttpClient>(
    plan: Plan,
    settings: &Settings,
    http: &C,
    store: Option<&dyn ObjectStore>,
) -> Result<RunSummary> {
    let store = match (plan.upload, store) {
        (true, None) => {
            return Err(PipelineError::Config(
                "upload requested but no object store is configured".to_string(),
            )
            .into());
        }
        (_, store) => store,
    };

    if plan.is_empty() {
        warn!("--prepare-only and --visualize-only together leave nothing to run");
    }

    let mut summary = RunSummary::default();
    let mut step = 1;

    if plan.download {
        info!(step, "Download raw data");
        match download_raw_data(http, settings).await {
            Ok(report) => summary.downloaded = report,
            Err(e) => {
                error!(
                    error = %format!("{:#}", e),
                    "Raw data download failed, continuing with local data if available"
                );
                summary.downloaded.failed = settings.raw_files.len();
            }
        }
        step += 1;
    }

    if plan.prepare {
        info!(step, "Data preparation");
        summary.prepared = Some(prepare_data(settings)?);
        step += 1;
    }

    if plan.visualize {
        info!(step, "Visualization");
        summary.dashboard = Some(create_dashboard(settings)?);
        step += 1;
    }

    if let (true, Some(store)) = (plan.upload, store) {
        info!(step, "Upload processed data");
        summary.uploaded = upload_processed_data(store, settings).await?;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<BTreeMap<String, (Vec<u8>, String)>>,
        rejected: Vec<String>,
    }

    impl MemoryStore {
        fn rejecting(keys: &[&str]) -> Self {
            Self {
                rejected: keys.iter().map(|k| k.to_string()).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl ObjectStore for MemoryStore {
        fn location(&self) -> String {
            "memory://test".to_string()
        }

        async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
            if self.rejected.iter().any(|k| k == key) {
                anyhow::bail!("access denied for {}", key);
            }
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), (body, content_type.to_string()));
            Ok(())
        }
    }

    fn flags(prepare_only: bool, visualize_only: bool, download: bool, upload: bool) -> StageFlags {
        StageFlags {
            prepare_only,
            visualize_only,
            download_raw: download,
            upload_processed: upload,
        }
    }

    #[test]
    fn test_default_plan_prepares_and_visualizes() {
        let plan = Plan::from_flags(StageFlags::default());
        assert_eq!(
            plan,
            Plan {
                download: false,
                prepare: true,
                visualize: true,
                upload: false
            }
        );
    }

    #[test]
    fn test_visualize_only_skips_network_stages() {
        let plan = Plan::from_flags(flags(false, true, true, true));
        assert!(!plan.download);
        assert!(!plan.prepare);
        assert!(plan.visualize);
        assert!(!plan.upload);
    }

    #[test]
    fn test_prepare_only_with_transfers() {
        let plan = Plan::from_flags(flags(true, false, true, true));
        assert!(plan.download && plan.prepare && plan.upload);
        assert!(!plan.visualize);
    }

    #[test]
    fn test_both_only_flags_run_nothing() {
        assert!(Plan::from_flags(flags(true, true, false, false)).is_empty());
    }

    #[tokio::test]
    async fn test_upload_sends_every_csv_in_name_order() {
        let base = std::env::temp_dir().join(format!(
            "course_grades_upload_{}",
            std::process::id()
        ));
        let settings = Settings::new(base.join("data"), base.join("output"));
        let processed = settings.processed_dir();
        fs::create_dir_all(&processed).unwrap();
        fs::write(processed.join(BAR_FILE), "a\n1\n").unwrap();
        fs::write(processed.join(PREFIX_SCATTER_FILE), "b\n2\n").unwrap();
        fs::write(processed.join("notes.txt"), "skip me").unwrap();

        let store = MemoryStore::default();
        let uploaded = upload_processed_data(&store, &settings).await.unwrap();
        assert_eq!(
            uploaded,
            TransferReport {
                succeeded: 2,
                failed: 0
            }
        );

        let objects = store.objects.lock().unwrap();
        let keys: Vec<&String> = objects.keys().collect();
        assert_eq!(keys, vec![BAR_FILE, PREFIX_SCATTER_FILE]);
        assert_eq!(objects[BAR_FILE], (b"a\n1\n".to_vec(), "text/csv".to_string()));
        drop(objects);

        fs::remove_dir_all(&base).unwrap();
    }

    fn processed_fixture(name: &str) -> (PathBuf, Settings) {
        let base = std::env::temp_dir().join(format!(
            "course_grades_{}_{}",
            name,
            std::process::id()
        ));
        let settings = Settings::new(base.join("data"), base.join("output"));
        let processed = settings.processed_dir();
        fs::create_dir_all(&processed).unwrap();
        fs::write(processed.join(BAR_FILE), "a\n1\n").unwrap();
        fs::write(processed.join(COURSE_SCATTER_FILE), "c\n3\n").unwrap();
        fs::write(processed.join(PREFIX_SCATTER_FILE), "b\n2\n").unwrap();
        (base, settings)
    }

    #[tokio::test]
    async fn test_upload_continues_past_a_failed_file() {
        let (base, settings) = processed_fixture("upload_partial");
        let store = MemoryStore::rejecting(&[COURSE_SCATTER_FILE]);

        let uploaded = upload_processed_data(&store, &settings).await.unwrap();
        assert_eq!(uploaded.succeeded, 2);
        assert_eq!(uploaded.failed, 1);
        assert_eq!(uploaded.attempted(), 3);

        let objects = store.objects.lock().unwrap();
        let keys: Vec<&String> = objects.keys().collect();
        assert_eq!(keys, vec![BAR_FILE, PREFIX_SCATTER_FILE]);
        drop(objects);

        fs::remove_dir_all(&base).unwrap();
    }

    #[tokio::test]
    async fn test_upload_errors_when_every_file_fails() {
        let (base, settings) = processed_fixture("upload_all_fail");
        let store =
            MemoryStore::rejecting(&[BAR_FILE, COURSE_SCATTER_FILE, PREFIX_SCATTER_FILE]);

        let err = upload_processed_data(&store, &settings).await.unwrap_err();
        assert!(err.to_string().contains("all 3 uploads failed"));
        assert!(format!("{:#}", err).contains("access denied"));

        fs::remove_dir_all(&base).unwrap();
    }

    #[tokio::test]
    async fn test_upload_without_processed_dir_is_config_error() {
        let base = std::env::temp_dir().join("course_grades_upload_missing_dir");
        let settings = Settings::new(base.join("data"), base.join("output"));

        let err = upload_processed_data(&MemoryStore::default(), &settings)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingInput(_))
        ));
    }

    #[tokio::test]
    async fn test_download_failure_leaves_no_raw_file() {
        let base = std::env::temp_dir().join(format!(
            "course_grades_download_{}",
            std::process::id()
        ));
        let mut settings = Settings::new(base.join("data"), base.join("output"));
        settings.public_base_url = "not a url".to_string();
        settings.raw_files = vec!["grades.csv".to_string()];

        let err = download_raw_data(&crate::fetch::BasicClient::new(), &settings)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("all 1 downloads failed"));
        assert!(format!("{:#}", err).contains("invalid URL"));
        assert!(settings.raw_dir().is_dir());
        assert!(!settings.raw_dir().join("grades.csv").exists());

        fs::remove_dir_all(&base).unwrap();
    }

    #[tokio::test]
    async fn test_run_prepares_local_data_after_failed_download() {
        let base = std::env::temp_dir().join(format!(
            "course_grades_download_fallback_{}",
            std::process::id()
        ));
        let mut settings = Settings::new(base.join("data"), base.join("output"));
        settings.public_base_url = "not a url".to_string();
        settings.raw_files = vec!["remote.csv".to_string()];

        fs::create_dir_all(settings.raw_dir()).unwrap();
        fs::write(
            settings.raw_dir().join("local.csv"),
            "semester,course_prefix,course_number,letter_grade,num_students\n\
             Fall 2020,C S,312,A,4\n",
        )
        .unwrap();

        let plan = Plan::from_flags(flags(true, false, true, false));
        let summary = run(plan, &settings, &crate::fetch::BasicClient::new(), None)
            .await
            .unwrap();

        assert_eq!(summary.downloaded.succeeded, 0);
        assert_eq!(summary.downloaded.failed, 1);
        let prepared = summary.prepared.unwrap();
        assert_eq!(prepared.records, 1);
        assert!(settings.processed_path(BAR_FILE).is_file());

        fs::remove_dir_all(&base).unwrap();
    }

    #[tokio::test]
    async fn test_run_upload_without_store_fails_before_any_stage() {
        let base = std::env::temp_dir().join(format!(
            "course_grades_run_no_store_{}",
            std::process::id()
        ));
        let settings = Settings::new(base.join("data"), base.join("output"));
        let plan = Plan::from_flags(flags(true, false, false, true));

        let err = run(plan, &settings, &crate::fetch::BasicClient::new(), None)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<PipelineError>().unwrap().is_config());
        assert!(!settings.processed_dir().exists());
    }
}
