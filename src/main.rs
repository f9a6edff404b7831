//! CLI entry point for the historical course grades pipeline.
//!
//! With no flags the pipeline prepares the summary tables from raw data and
//! then renders the dashboard. Flags narrow the run or add the download and
//! upload steps.

use anyhow::Result;
use clap::Parser;
use course_grades::config::{S3Settings, Settings};
use course_grades::fetch::BasicClient;
use course_grades::infra::s3::S3ObjectStore;
use course_grades::pipeline::{Plan, StageFlags, run};
use course_grades::services::object_store::ObjectStore;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "course_grades")]
#[command(about = "Historical course grades dashboard pipeline", long_about = None)]
struct Cli {
    /// Only run data preparation
    #[arg(long)]
    prepare_only: bool,

    /// Only run visualization (requires processed data)
    #[arg(long)]
    visualize_only: bool,

    /// Download raw data from the public bucket before processing
    #[arg(long)]
    download_raw: bool,

    /// Upload processed tables to S3 after processing
    #[arg(long)]
    upload_processed: bool,

    /// Directory holding raw/ and processed/
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory the dashboard HTML is written to
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,
}

impl Cli {
    fn flags(&self) -> StageFlags {
        StageFlags {
            prepare_only: self.prepare_only,
            visualize_only: self.visualize_only,
            download_raw: self.download_raw,
            upload_processed: self.upload_processed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/course_grades.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("course_grades.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let plan = Plan::from_flags(cli.flags());
    let settings = Settings::from_env(&cli.data_dir, &cli.output_dir);

    info!(?plan, data_dir = %settings.data_dir.display(), "Starting pipeline");

    // Resolve upload credentials before doing any work
    let store = if plan.upload {
        let s3 = S3Settings::from_env()?;
        info!(bucket = %s3.bucket, endpoint = ?s3.endpoint_url, "S3 upload enabled");
        Some(S3ObjectStore::connect(&s3).await)
    } else {
        None
    };

    let http = BasicClient::new();
    let summary = run(
        plan,
        &settings,
        &http,
        store.as_ref().map(|s| s as &dyn ObjectStore),
    )
    .await?;

    if let Some(prepared) = &summary.prepared {
        info!(
            records = prepared.records,
            semesters = prepared.semesters,
            rows_dropped = prepared.load.rows_dropped,
            "Preparation finished"
        );
    }
    if let Some(path) = &summary.dashboard {
        info!(path = %path.display(), "Open the dashboard in a browser");
    }

    for (stage, transfer) in [("download", summary.downloaded), ("upload", summary.uploaded)] {
        if transfer.failed > 0 {
            warn!(
                stage,
                failed = transfer.failed,
                attempted = transfer.attempted(),
                "Some transfers failed"
            );
        }
    }

    info!(
        downloaded = summary.downloaded.succeeded,
        uploaded = summary.uploaded.succeeded,
        "Pipeline complete"
    );
    Ok(())
}
