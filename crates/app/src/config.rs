use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use services::TrackerConfig;

/// Course progress HTTP server.
#[derive(Debug, Parser)]
#[command(name = "course-progress", version)]
pub struct Args {
    /// SQLite database URL or file path.
    #[arg(long = "db", env = "LEARN_DB_URL", default_value = "sqlite://dev.sqlite3")]
    pub db_url: String,

    #[arg(short = 'H', long, env = "LEARN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, env = "LEARN_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Upper bound on a single store call, in milliseconds.
    #[arg(long, env = "LEARN_STORE_TIMEOUT_MS", default_value_t = 5_000)]
    pub store_timeout_ms: u64,

    /// Extra attempts after a concurrent-update conflict.
    #[arg(long, env = "LEARN_CONFLICT_RETRIES", default_value_t = 1)]
    pub conflict_retries: u32,
}

impl Args {
    #[must_use]
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig::default()
            .with_store_timeout(Duration::from_millis(self.store_timeout_ms))
            .with_conflict_retries(self.conflict_retries)
    }

    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Turn a bare path or relative `sqlite:` URL into an absolute `sqlite://` URL.
///
/// In-memory URLs and URLs that are already absolute pass through.
pub fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("sqlite::memory:")
        || trimmed.starts_with("sqlite://")
        || trimmed.starts_with("sqlite:file:")
    {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Make sure the database file and its directory exist before connecting.
///
/// # Errors
///
/// Returns an error if the URL has no path or the file cannot be created.
pub fn prepare_sqlite_file(db_url: &str) -> anyhow::Result<()> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        anyhow::bail!("invalid database url: {db_url}");
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}
