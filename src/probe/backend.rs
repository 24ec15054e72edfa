//! Probe trait and shared error type.
//!
//! The [`MediaProbe`] trait has one operation per media kind. Image probes
//! are synchronous header reads; video probes are futures so a page can
//! have several in flight at once.
//!
//! The production implementation is [`FsProbe`](super::fs_probe::FsProbe).

use crate::types::Dimensions;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("media not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("unsupported media format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("corrupt media {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("probe of {} timed out after {}ms", path.display(), timeout.as_millis())]
    TimedOut { path: PathBuf, timeout: Duration },
}

impl ProbeError {
    /// Classify an IO failure while reading `path`.
    ///
    /// Truncated or malformed data is `Corrupt`; a missing file is
    /// `NotFound`; anything else stays an IO error.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ProbeError::NotFound(path.to_path_buf()),
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => ProbeError::Corrupt {
                path: path.to_path_buf(),
                reason: err.to_string(),
            },
            _ => ProbeError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    pub fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        ProbeError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Reads intrinsic dimensions of local media files.
///
/// `Sync` so one probe can serve every page transform of a parallel build.
pub trait MediaProbe: Sync {
    /// Read the pixel size of an image file.
    fn probe_image(&self, path: &Path) -> Result<Dimensions, ProbeError>;

    /// Read the display size of a video file.
    fn probe_video(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<Dimensions, ProbeError>> + Send;
}
