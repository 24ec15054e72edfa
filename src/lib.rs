//! # Media Sizer
//!
//! A post-processing step for static sites: after a generator has rendered
//! its HTML, media-sizer gives every `<img>` and `<video>` its intrinsic
//! `width` and `height` and tidies the markup that markdown renderers wrap
//! around media.
//!
//! # Architecture: Page-at-a-Time Transform
//!
//! ```text
//! dist/**/*.html ──► parse ──► promote ──► size ──► unwrap ──► serialize ──► dist/**/*.html
//!                                           │
//!                               cache ◄─────┴────► probe (image / video)
//! ```
//!
//! Every page is independent. The only shared state is the dimension cache,
//! which is loaded once before the first page and written once after the
//! last, so a build reads each media file at most once and later builds not
//! at all.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | Walks the output directory, runs pages in parallel, loads and flushes the cache |
//! | [`transform`] | HTML restructuring and sizing of one page |
//! | [`resolve`] | Maps a media reference from the HTML to a file on disk |
//! | [`probe`] | Reads intrinsic sizes from image and video files |
//! | [`cache`] | Persistent reference → size store |
//! | [`config`] | `media-sizer.toml` loading, validation, and merging |
//! | [`types`] | Shared value types (`Dimensions`, `PageContext`) |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Keyed by Reference, Not by File
//!
//! The cache key is the reference exactly as written in the HTML. Looking
//! up a reference never touches the filesystem, which is what makes a warm
//! build fast. The price is that a file replaced in place keeps its old
//! size until the store is cleared (`media-sizer cache clear`).
//!
//! ## Failures Are Local
//!
//! A media file that is missing, unreadable, or in an unknown format is
//! logged and left unsized. The page is still rewritten and the build still
//! succeeds. Only problems with the build itself (an unreadable page, a
//! corrupt store) stop it.
//!
//! ## Production Leaves Images Alone
//!
//! In production an asset pipeline downstream rewrites and resizes images,
//! so sizes recorded here would be wrong. Images are skipped; videos are
//! always sized. The structural edits happen in both modes so the markup
//! is identical apart from the size attributes.
//!
//! ## Pure-Rust Probing (No FFprobe)
//!
//! Image headers go through the `image` crate and `avif-parse`. Video sizes
//! come from small readers for the ISO-BMFF `tkhd` box and the Matroska
//! `Video` element, so the binary has no system dependencies.

pub mod cache;
pub mod config;
pub mod output;
pub mod pipeline;
pub mod probe;
pub mod resolve;
pub mod transform;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
