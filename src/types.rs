//! Shared types used across the cache, probe, and transform modules.
//!
//! [`Dimensions`] is serialized into the cache store, so its field names are
//! part of the on-disk format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Intrinsic pixel size of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Same size with the axes swapped (for rotated video tracks).
    pub fn transposed(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The two kinds of element the transform sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn tag(self) -> &'static str {
        match self {
            MediaKind::Image => "img",
            MediaKind::Video => "video",
        }
    }
}

/// Where a rendered page came from and where it is going.
///
/// Relative media references resolve against the input location; the
/// output location decides whether the page is HTML at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

impl PageContext {
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
        }
    }

    /// A page that was rendered in place: input and output are the same file.
    pub fn in_place(path: &Path) -> Self {
        Self::new(path, path)
    }

    /// Only `.html` outputs go through the transform.
    pub fn is_html(&self) -> bool {
        self.output_path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("html"))
    }
}

impl fmt::Display for PageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.input_path.display())
    }
}
