use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const LOGFILE_NAME: &str = "spookyappx.log";

#[derive(Debug, thiserror::Error)]
#[error("{}: {source}", .path.display())]
pub struct LogError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

impl LogError {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `<home>/spookyappx.log`, or `./spookyappx.log` when the platform has no
/// notion of a home directory.
pub fn get_log_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(LOGFILE_NAME))
        .unwrap_or_else(|| PathBuf::from(LOGFILE_NAME))
}

/// Appends one entry to the default log file.
pub fn write_log(message: &str) -> Result<PathBuf, LogError> {
    LogFile::default_location().append(message)
}

/// An append-only log file. Each `append` opens, writes one line and closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    path: PathBuf,
}

impl LogFile {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Self {
        Self::at(get_log_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, message: &str) -> Result<PathBuf, LogError> {
        let line = format_entry(&timestamp(), message);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            // Single write per entry.
            .and_then(|mut f| f.write_all(line.as_bytes()))
            .map(|()| self.path.clone())
            .map_err(|source| {
                tracing::debug!(path = %self.path.display(), error = %source, "log write failed");
                LogError {
                    path: self.path.clone(),
                    source,
                }
            })
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn format_entry(ts: &str, message: &str) -> String {
    let message = message.replace(['\r', '\n'], " ");
    format!("{} UTC\t{}\n", ts, message)
}
