//! Filesystem probe: reads dimensions from media headers on disk.
//!
//! Images never get decoded. `image` reads just enough of the header to
//! know the size, and AVIF goes through `avif-parse` because the `image`
//! crate has no pure-Rust AVIF decoder. Videos go through the container
//! readers in [`video`](super::video) on the blocking pool, each bounded by
//! a timeout.

use super::backend::{MediaProbe, ProbeError};
use super::video;
use crate::types::Dimensions;
use image::{ImageError, ImageFormat, ImageReader};
use std::future::Future;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

/// Default bound on a single video probe.
pub const DEFAULT_VIDEO_TIMEOUT: Duration = Duration::from_secs(10);

/// Extensions whose header readers are compiled into the `image` crate.
const IMAGE_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("gif", ImageFormat::Gif),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let mut exts: Vec<&'static str> = IMAGE_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect();
    // AVIF goes through avif-parse, not the image crate
    exts.push("avif");
    exts
});

/// Image file extensions the probe can read, lowercase.
pub fn supported_image_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Whether `path` has an image extension the probe understands.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            supported_image_extensions()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(e))
        })
}

/// Production probe over the local filesystem.
#[derive(Debug, Clone, Copy)]
pub struct FsProbe {
    video_timeout: Duration,
}

impl FsProbe {
    pub fn new(video_timeout: Duration) -> Self {
        Self { video_timeout }
    }

    pub fn video_timeout(&self) -> Duration {
        self.video_timeout
    }
}

impl Default for FsProbe {
    fn default() -> Self {
        Self::new(DEFAULT_VIDEO_TIMEOUT)
    }
}

fn is_avif(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("avif"))
}

fn map_image_error(path: &Path, err: ImageError) -> ProbeError {
    match err {
        ImageError::IoError(e) => ProbeError::from_io(path, e),
        ImageError::Unsupported(_) => ProbeError::UnsupportedFormat(path.to_path_buf()),
        other => ProbeError::corrupt(path, other.to_string()),
    }
}

/// Dimensions from an AVIF file's container metadata (no AV1 decode).
fn identify_avif(path: &Path) -> Result<Dimensions, ProbeError> {
    let file_data = std::fs::read(path).map_err(|e| ProbeError::from_io(path, e))?;
    let avif = avif_parse::read_avif(&mut std::io::Cursor::new(&file_data))
        .map_err(|e| ProbeError::corrupt(path, format!("failed to parse AVIF: {e:?}")))?;
    let meta = avif
        .primary_item_metadata()
        .map_err(|e| ProbeError::corrupt(path, format!("failed to read AVIF metadata: {e:?}")))?;
    Ok(Dimensions::new(
        meta.max_frame_width.get(),
        meta.max_frame_height.get(),
    ))
}

impl MediaProbe for FsProbe {
    fn probe_image(&self, path: &Path) -> Result<Dimensions, ProbeError> {
        if is_avif(path) {
            return identify_avif(path);
        }
        // Content sniffing first, so a JPEG saved as .png still reads.
        let (width, height) = ImageReader::open(path)
            .map_err(|e| ProbeError::from_io(path, e))?
            .with_guessed_format()
            .map_err(|e| ProbeError::from_io(path, e))?
            .into_dimensions()
            .map_err(|e| map_image_error(path, e))?;
        Ok(Dimensions::new(width, height))
    }

    fn probe_video(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<Dimensions, ProbeError>> + Send {
        let path = path.to_path_buf();
        let timeout = self.video_timeout;
        async move {
            let task_path = path.clone();
            let task =
                tokio::task::spawn_blocking(move || video::read_video_dimensions(&task_path));
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(ProbeError::corrupt(
                    &path,
                    format!("probe task failed: {join_err}"),
                )),
                Err(_) => {
                    debug!(path = %path.display(), "video probe timed out");
                    Err(ProbeError::TimedOut { path, timeout })
                }
            }
        }
    }
}
