//! Shared test utilities for the media-sizer test suite.
//!
//! Builds small rendered sites on disk: real encoded images (so the
//! filesystem probe reads genuine headers) and HTML pages at nested paths.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_image(tmp.path(), "media/a.png", 100, 50);
//! write_file(&tmp.path().join("index.html"), r#"<img src="/media/a.png">"#);
//! ```

use image::{ImageBuffer, Rgb};
use std::fs;
use std::path::{Path, PathBuf};

/// Encode a `width` x `height` gradient at `dir/name`; the format follows
/// the extension. Parent directories are created.
pub fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    img.save(&path).unwrap();
    path
}

/// Write `content` to `path`, creating parent directories.
pub fn write_file(path: &Path, content: impl AsRef<[u8]>) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Create a named pipe at `path`. Opening it for reading blocks until a
/// writer appears, which stands in for a read that never completes.
#[cfg(unix)]
pub fn make_fifo(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let status = std::process::Command::new("mkfifo")
        .arg(path)
        .status()
        .unwrap();
    assert!(status.success(), "mkfifo failed for {}", path.display());
}
