//! Media dimension probing: pure Rust, no ffprobe, no ImageMagick.
//!
//! | Media | Crate / function |
//! |---|---|
//! | **JPEG, PNG, GIF, TIFF, WebP** | `image::image_dimensions` (header only) |
//! | **AVIF** | `avif-parse` container metadata |
//! | **MP4, M4V, MOV** | custom ISO-BMFF reader (`tkhd` box) |
//! | **WebM, MKV** | custom EBML reader (`Video` element) |
//!
//! The module is split into:
//! - **Backend**: [`MediaProbe`] trait, [`ProbeError`]
//! - **Filesystem**: [`FsProbe`], the production implementation
//! - **Video**: container readers used by [`FsProbe::probe_video`](MediaProbe::probe_video)

pub mod backend;
pub mod fs_probe;
pub(crate) mod video;

pub use backend::{MediaProbe, ProbeError};
pub use fs_probe::{FsProbe, is_image_path, supported_image_extensions};
