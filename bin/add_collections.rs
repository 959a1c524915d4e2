//! Add a `Collection` row for every collection referenced by the Image, Video
//! and Audio rows of a Bulkrax import sheet.
//!
//! Each collection's MODS record is fetched once and projected onto the sheet's columns.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use exodus_collections::{add_collections, default_output_path, FetchConfig, HttpSource, RecordExtractor};

#[derive(Parser)]
#[command(name = "add_collections")]
#[command(about = "Add collections to sheet.")]
#[command(version)]
struct Cli {
  /// Specify the initial sheet.
  #[arg(short, long)]
  sheet: PathBuf,

  /// Optional: specify collections sheet. Defaults to `<sheet>_with_collections.csv`.
  #[arg(short, long, alias = "collections_sheet")]
  collections_sheet: Option<PathBuf>,

  /// MODS URL template; `{pid}` is replaced by the collection identifier.
  #[arg(long, value_parser = parse_endpoint)]
  endpoint: Option<String>,

  /// Log level: error, warn, info, debug, trace
  #[arg(long, default_value = "info", value_enum)]
  log_level: LogLevel,
}

#[derive(Clone, clap::ValueEnum)]
enum LogLevel {
  Error,
  Warn,
  Info,
  Debug,
  Trace,
}

fn parse_endpoint(value: &str) -> std::result::Result<String, String> {
  if value.contains("{pid}") {
    Ok(value.to_string())
  } else {
    Err(String::from("the endpoint template must contain `{pid}`"))
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let level = match cli.log_level {
    LogLevel::Error => "error",
    LogLevel::Warn => "warn",
    LogLevel::Info => "info",
    LogLevel::Debug => "debug,hyper=info,reqwest=info",
    LogLevel::Trace => "trace,hyper=info",
  };
  let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_writer(std::io::stderr)
    .init();

  let output = cli
    .collections_sheet
    .unwrap_or_else(|| default_output_path(&cli.sheet));
  let mut config = FetchConfig::default();
  if let Some(endpoint) = cli.endpoint {
    config.endpoint = endpoint;
  }

  let extractor = RecordExtractor::new(HttpSource::new(config)?);
  let summary = add_collections(&cli.sheet, &output, &extractor).with_context(|| {
    format!(
      "Failed to add collections from {} to {}",
      cli.sheet.display(),
      output.display()
    )
  })?;

  tracing::info!(
    rows = summary.original_rows,
    collections = summary.collections,
    new_columns = summary.new_columns.len(),
    path = %output.display(),
    "Wrote sheet with collections"
  );
  Ok(())
}
