//! Filesystem history store.
//!
//! Implements [`HistoryStore`] with one JSON file per channel,
//! `<root>/<name>.turbhistory`.
//!
//! - Atomic writes: each save goes to a temporary sibling which is flushed,
//!   synced and renamed over the target, so readers never see half a log.
//! - Contention: history folders are often shared with sync clients or
//!   analysis scripts.  Transient I/O failures retry the whole operation
//!   after a fixed backoff, forever unless an attempt bound is set.
//! - Only interrupted, would-block, timed-out and unclassified (`Other`)
//!   failures are retried.  Everything else (root is a file, permission
//!   denied, name too long, disk full, missing or undecodable record) is
//!   returned immediately.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::app::ports::HistoryStore;
use crate::config::SystemConfig;
use crate::control::HistoryLog;
use crate::error::{Error, Result, StorageError};

pub const EXTENSION: &str = "turbhistory";
const DEFAULT_BACKOFF: Duration = Duration::from_secs(30);

pub struct FsHistoryStore {
    root: PathBuf,
    backoff: Duration,
    max_attempts: Option<u32>,
}

impl FsHistoryStore {
    /// Store rooted at `root`, retrying transient failures forever.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            backoff: DEFAULT_BACKOFF,
            max_attempts: None,
        }
    }

    pub fn from_config(cfg: &SystemConfig) -> Self {
        Self::new(&cfg.history_dir)
            .with_backoff(Duration::from_millis(cfg.retry_backoff_ms))
            .with_max_attempts(cfg.max_storage_attempts)
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Bound the number of attempts per operation; `None` retries forever.
    pub fn with_max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `name`.  Path separators in names are replaced.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let file: String = name
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        self.root.join(format!("{file}.{EXTENSION}"))
    }

    /// `Ok(false)` when the root does not exist yet; an error when it
    /// exists but cannot hold records.
    fn root_exists(&self) -> Result<bool> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(true),
            Ok(_) => Err(StorageError::NotADirectory(self.root.display().to_string()).into()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(classify(e, &self.root)),
        }
    }

    fn ensure_root(&self) -> Result<()> {
        if !self.root_exists()? {
            self.with_retry("create", &self.root, || fs::create_dir_all(&self.root))
                .map_err(|e| classify(e, &self.root))?;
            info!("FsHistoryStore: created {}", self.root.display());
        }
        Ok(())
    }

    fn with_retry<T>(
        &self,
        what: &str,
        path: &Path,
        op: impl FnMut() -> io::Result<T>,
    ) -> io::Result<T> {
        retry_io(self.backoff, self.max_attempts, what, path, op)
    }
}

/// Run `op` until it succeeds, fails fatally, or exhausts `max_attempts`.
pub(crate) fn retry_io<T>(
    backoff: Duration,
    max_attempts: Option<u32>,
    what: &str,
    path: &Path,
    mut op: impl FnMut() -> io::Result<T>,
) -> io::Result<T> {
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && max_attempts.is_none_or(|max| attempt < max) => {
                warn!(
                    "{what} {} failed ({e}), retry {attempt} in {backoff:?}",
                    path.display()
                );
                thread::sleep(backoff);
            }
            Err(e) => return Err(e),
        }
    }
}

impl HistoryStore for FsHistoryStore {
    fn save(&self, name: &str, history: &HistoryLog) -> Result<()> {
        let bytes = history
            .to_json()
            .map_err(|e| StorageError::Encode(e.to_string()))?;
        self.ensure_root()?;

        let path = self.path_for(name);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        self.with_retry("save", &path, || write_atomically(&tmp, &path, &bytes))
            .map_err(|e| classify(e, &path))?;
        debug!("FsHistoryStore: wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<HistoryLog> {
        let path = self.path_for(name);
        if !self.root_exists()? || !path.is_file() {
            return Err(Error::NotFound {
                name: name.to_owned(),
            });
        }
        let bytes = self
            .with_retry("load", &path, || fs::read(&path))
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => Error::NotFound {
                    name: name.to_owned(),
                },
                _ => classify(e, &path),
            })?;
        HistoryLog::from_json(&bytes).map_err(|e| Error::Corrupted {
            name: name.to_owned(),
            reason: e.to_string(),
        })
    }

    fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }
}

fn write_atomically(tmp: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let result = (|| -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(tmp)?);
        writer.write_all(bytes)?;
        let file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.sync_all()?;
        fs::rename(tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(tmp);
    }
    result
}

pub(crate) fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Other
    )
}

pub(crate) fn classify(e: io::Error, path: &Path) -> Error {
    let shown = path.display().to_string();
    match e.kind() {
        io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
            StorageError::PermissionDenied(shown).into()
        }
        io::ErrorKind::NotADirectory => StorageError::NotADirectory(shown).into(),
        _ => StorageError::Io {
            path: shown,
            source: e,
        }
        .into(),
    }
}
