mod app;
mod cache;
mod classify;
mod commands;
mod config;
mod db;
mod error;
mod event;
mod fetch;
mod request;
#[cfg(test)]
mod testing;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "swcache")]
#[command(about = "An offline-first request cache with per-route caching strategies")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/swcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Path to the cache database (overrides config and SWCACHE_DB_PATH)
  #[arg(long)]
  db: Option<PathBuf>,

  /// Write logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Populate the static partition from the manifest
  Install,
  /// Delete partitions left over from previous versions
  Activate,
  /// Resolve a request through its caching strategy and print the body
  Fetch {
    /// Absolute URL, or a path resolved against the configured origin
    url: String,
    /// Request method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Print status and headers before the body
    #[arg(short, long)]
    include: bool,
  },
  /// Send a command message, e.g. '{"action":"clearCache"}'
  Message { payload: String },
  /// List partitions and their entries
  Partitions,
  /// Handle JSON events from stdin, one per line
  Run,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing(args.log_file.as_deref())?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let db_path = match args.db {
    Some(path) => path,
    None => config.db_path()?,
  };

  let app = app::App::new(&config, &db_path)?;
  match args.command {
    Cmd::Install => app.install().await?,
    Cmd::Activate => app.activate().await?,
    Cmd::Fetch {
      url,
      method,
      include,
    } => app.fetch(&method, &url, include).await?,
    Cmd::Message { payload } => app.message(&payload).await?,
    Cmd::Partitions => app.partitions().await?,
    Cmd::Run => app.run().await?,
  }

  Ok(())
}

/// Log to stderr, or to `log_file` through a background writer. The returned
/// guard flushes the file on drop.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("swcache=info"));

  let Some(path) = log_file else {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    return Ok(None);
  };

  let file_name = path
    .file_name()
    .ok_or_else(|| eyre!("Log file path has no file name: {}", path.display()))?;
  let dir = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."));

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(Some(guard))
}
