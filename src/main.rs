//! CLI entry point for the TTS asset archiver.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tts_archiver_core::{
    Database, Downloader, HttpClient, IngestConfig, Pipeline, SqliteStore, audit,
};

mod cli;

use cli::{Cli, Command, DownloadArgs, StoreArgs};

/// Exit code when the audit finds missing files.
const EXIT_MISSING_FILES: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    if dotenvy::dotenv().is_ok() {
        debug!("loaded .env");
    }

    debug!(?cli, "CLI arguments parsed");

    let mut config = IngestConfig::from_env().context("invalid environment configuration")?;

    match cli.command {
        Command::Download(args) => {
            apply_download_args(&mut config, &args);
            config.validate()?;
            run_download(&config).await
        }
        Command::Audit(args) => {
            apply_store_args(&mut config, &args);
            config.validate()?;
            run_audit(&config).await
        }
    }
}

fn apply_store_args(config: &mut IngestConfig, args: &StoreArgs) {
    if let Some(dir) = &args.output_dir {
        config.output_dir.clone_from(dir);
    }
    if let Some(path) = &args.database {
        config.database_path.clone_from(path);
    }
}

fn apply_download_args(config: &mut IngestConfig, args: &DownloadArgs) {
    apply_store_args(config, &args.store);
    if let Some(dir) = &args.input_dir {
        config.input_dir = Some(dir.clone());
    }
    if let Some(concurrency) = args.concurrency {
        config.download_concurrency = usize::from(concurrency);
    }
    if let Some(concurrency) = args.scan_concurrency {
        config.scan_concurrency = usize::from(concurrency);
    }
}

async fn open_database(path: &Path) -> Result<Database> {
    Database::new(path)
        .await
        .with_context(|| format!("failed to open database {}", path.display()))
}

async fn run_download(config: &IngestConfig) -> Result<ExitCode> {
    let input_dir = config.require_input_dir()?;
    info!(
        input_dir = %input_dir.display(),
        output_dir = %config.output_dir.display(),
        "TTS archiver starting"
    );

    let db = open_database(&config.database_path).await?;
    let store = Arc::new(SqliteStore::new(db.clone()));
    let client = HttpClient::with_timeouts(config.connect_timeout_secs, config.read_timeout_secs);
    let downloader = Downloader::new(client, &config.output_dir, config.download_concurrency)?;
    let pipeline = Pipeline::new(store, downloader, config.pipeline_options())?;

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current module");
            cancel_on_signal.cancel();
        }
    });

    let summary = pipeline
        .run(input_dir, &cancel)
        .await
        .context("ingestion failed")?;
    db.close().await;

    info!(%summary, "done");
    Ok(ExitCode::SUCCESS)
}

async fn run_audit(config: &IngestConfig) -> Result<ExitCode> {
    let db = open_database(&config.database_path).await?;
    let store = SqliteStore::new(db.clone());
    let report = audit(&store, &config.output_dir)
        .await
        .context("audit failed")?;
    db.close().await;

    for missing in &report.missing {
        println!(
            "missing\t{}\t{}\t{}",
            missing.module_id,
            missing.url,
            missing.expected_path.display()
        );
    }
    println!(
        "{} modules, {} files checked, {} missing",
        report.modules_checked,
        report.files_checked,
        report.missing.len()
    );

    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_MISSING_FILES))
    }
}
