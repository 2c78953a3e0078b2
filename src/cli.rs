//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Archive the external assets of Tabletop Simulator module exports.
///
/// Scans a directory of `<workshop id>.json` exports, downloads every
/// referenced mesh, image, PDF, audio track and asset bundle, and records
/// what was archived in a local database.
#[derive(Parser, Debug)]
#[command(name = "tts-archiver")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan module exports and download their assets
    Download(DownloadArgs),

    /// Check that every archived file is present on disk
    Audit(StoreArgs),
}

/// Output and database locations shared by all subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Root directory for downloaded assets [env: TTS_OUTPUT_DIR, default: tmp/]
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// SQLite database file [env: TTS_DATABASE_PATH, default: tmp/tts.db]
    #[arg(long)]
    pub database: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// Directory containing `<workshop id>.json` exports [env: TTS_INPUT_DIR]
    #[arg(short, long)]
    pub input_dir: Option<PathBuf>,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Maximum concurrent downloads (1-32) [env: TTS_DOWNLOAD_CONCURRENCY, default: 3]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub concurrency: Option<u8>,

    /// Maximum export files scanned at once (1-64) [env: TTS_SCAN_CONCURRENCY, default: 10]
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub scan_concurrency: Option<u8>,
}
