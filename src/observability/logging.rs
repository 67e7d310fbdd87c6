//! Structured logging.
//!
//! # Responsibilities
//! - Install the global `tracing` subscriber
//! - Mirror log output into a size-rotated file when configured
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - Rotation never fails a log call; problems are reported on stderr

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("failed to open log file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to install subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Install the global subscriber.
pub fn init(config: &ObservabilityConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)?,
    };

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = RotatingFile::open(path, config.log_max_bytes, config.log_backups).map_err(|source| {
                LoggingError::File {
                    path: path.clone(),
                    source,
                }
            })?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()?;
    Ok(())
}

/// Append-only log file rotated by size.
///
/// When a write would push the file past `max_bytes` the file is renamed to
/// `<path>.1`, older backups shift up by one and the oldest beyond `backups`
/// is deleted. With no backups the file is truncated instead.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    backups: u32,
}

impl RotatingFile {
    pub fn open(path: impl AsRef<Path>, max_bytes: u64, backups: u32) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            written,
            max_bytes,
            backups,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup(&self, index: u32) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        if self.backups == 0 {
            self.file.set_len(0)?;
            self.written = 0;
            return Ok(());
        }

        let oldest = self.backup(self.backups);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.backups).rev() {
            let from = self.backup(index);
            if from.exists() {
                fs::rename(&from, self.backup(index + 1))?;
            }
        }
        self.file.flush()?;
        fs::rename(&self.path, self.backup(1))?;
        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            if let Err(e) = self.rotate() {
                eprintln!("log rotation of {} failed: {}", self.path.display(), e);
            }
        }
        let written = self.file.write(buf)?;
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
