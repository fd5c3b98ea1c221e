//! Error taxonomy for the tail engine core.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors the core can surface. An attach or add-subscriber attempt that
/// fails outright reports any of these three back to the originating
/// session; an `Io` error in an already-running stream's change loop is
/// instead logged and the loop keeps retrying on the next change signal.
#[derive(Error, Debug)]
pub enum TailError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not acquire a file watcher for {0}")]
    WatchUnavailable(PathBuf),
}

impl TailError {
    /// Classify a raw `io::Error` encountered while operating on `path`.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            TailError::NotFound(path.to_path_buf())
        } else {
            TailError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// The short, user-facing message for the `error` protocol notice.
    /// Used for every variant when an attach or add-subscriber attempt
    /// fails outright, including `Io` — a failure to even open the file
    /// for that session's own request is that session's to know about,
    /// not a background condition to swallow. An `Io` failure in an
    /// already-running stream's change loop is a different matter: that
    /// one is logged and retried instead (`PerFileStream::run_loop`),
    /// never surfaced as a notice.
    pub fn notice(&self) -> String {
        match self {
            TailError::NotFound(path) => format!("File not found: {}", path.display()),
            TailError::WatchUnavailable(path) => {
                format!("Unable to watch file: {}", path.display())
            }
            TailError::Io { path, source } => {
                format!("IO error reading {}: {}", path.display(), source)
            }
        }
    }
}
