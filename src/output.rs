//! CLI output formatting.
//!
//! Output is **reference-centric**: each page lists the media references it
//! contains, exactly as written in the HTML, with the size that was applied
//! and where it came from. Reading the build log tells you which references
//! were served from the store and which ones hit the disk.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! blog/post/index.html (rewritten)
//!     img /media/a.png: 100x50 (cached)
//!     img photo.jpg: 1600x1200 (probed)
//!     video /media/clip.mp4: 1920x1080 (probed)
//!     img missing.png: failed: media not found: dist/blog/post/missing.png
//!     img /media/icon.png: skipped (favicon)
//!     promoted 1 link, unwrapped 2 paragraphs
//!
//! 12 pages, 3 rewritten
//! Cache: 40 cached, 3 probed, 1 failed (44 total)
//! Store: 43 entries
//! ```
//!
//! ## Probe
//!
//! ```text
//! media/a.png: 100x50
//! media/clip.mp4: 1920x1080
//! media/notes.txt: unsupported media format: media/notes.txt
//! ```
//!
//! ## Cache list
//!
//! ```text
//! /media/a.png 100x50
//! /media/clip.mp4 1920x1080
//! 2 entries
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::pipeline::{BuildEvent, BuildResult};
use crate::probe::ProbeError;
use crate::transform::{MediaRecord, Outcome, PageReport};
use crate::types::Dimensions;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 link`, `2 links`.
fn plural(n: usize, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural}")
    }
}

/// One media line: kind tag, reference as written, then what happened.
///
/// ```text
/// img /media/a.png: 100x50 (cached)
/// video clip.mp4: failed: probe of dist/clip.mp4 timed out after 10000ms
/// ```
fn media_line(record: &MediaRecord) -> String {
    let status = match &record.outcome {
        Outcome::Cached(dims) => format!("{dims} (cached)"),
        Outcome::Probed(dims) => format!("{dims} (probed)"),
        Outcome::Failed(reason) => format!("failed: {reason}"),
        Outcome::Skipped(reason) => format!("skipped ({reason})"),
    };
    format!("{} {}: {}", record.kind.tag(), record.reference, status)
}

/// Structural edits made to a page, or `None` when there were none.
fn restructure_line(report: &PageReport) -> Option<String> {
    let mut parts = Vec::new();
    if report.promoted > 0 {
        parts.push(format!("promoted {}", plural(report.promoted, "link", "links")));
    }
    if report.unwrapped > 0 {
        parts.push(format!(
            "unwrapped {}",
            plural(report.unwrapped, "paragraph", "paragraphs")
        ));
    }
    (!parts.is_empty()).then(|| parts.join(", "))
}

// ============================================================================
// Build output
// ============================================================================

/// Format a single build progress event as display lines.
///
/// Pages without media or structural edits produce no lines, so a large
/// site of plain text pages stays quiet.
pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    match event {
        BuildEvent::Page { path, report } => {
            let restructure = restructure_line(report);
            if report.media.is_empty() && restructure.is_none() {
                return Vec::new();
            }

            let state = if report.changed {
                "rewritten"
            } else {
                "unchanged"
            };
            let mut lines = vec![format!("{} ({})", path.display(), state)];
            lines.extend(
                report
                    .media
                    .iter()
                    .map(|record| format!("{}{}", indent(1), media_line(record))),
            );
            if let Some(line) = restructure {
                lines.push(format!("{}{}", indent(1), line));
            }
            lines
        }
    }
}

/// Format the end-of-build summary.
pub fn format_build_summary(result: &BuildResult) -> Vec<String> {
    vec![
        format!(
            "{}, {} rewritten",
            plural(result.pages, "page", "pages"),
            result.rewritten
        ),
        format!("Cache: {}", result.stats),
        format!("Store: {}", plural(result.cache_entries, "entry", "entries")),
    ]
}

pub fn print_build_summary(result: &BuildResult) {
    println!();
    for line in format_build_summary(result) {
        println!("{}", line);
    }
}

// ============================================================================
// Probe output
// ============================================================================

/// Format the result of probing one file.
pub fn format_probe_line(path: &Path, result: &Result<Dimensions, ProbeError>) -> String {
    match result {
        Ok(dims) => format!("{}: {}", path.display(), dims),
        Err(e) => format!("{}: {}", path.display(), e),
    }
}

// ============================================================================
// Cache output
// ============================================================================

/// Format store entries, one per line, sorted by reference.
pub fn format_cache_list(entries: &[(String, Dimensions)]) -> Vec<String> {
    let mut lines: Vec<String> = entries
        .iter()
        .map(|(reference, dims)| format!("{} {}", reference, dims))
        .collect();
    lines.push(plural(entries.len(), "entry", "entries"));
    lines
}

pub fn print_cache_list(entries: &[(String, Dimensions)]) {
    for line in format_cache_list(entries) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStats;
    use crate::types::MediaKind;
    use std::path::PathBuf;
    use std::time::Duration;

    fn record(kind: MediaKind, reference: &str, outcome: Outcome) -> MediaRecord {
        MediaRecord {
            kind,
            reference: reference.to_string(),
            outcome,
        }
    }

    fn page(report: PageReport) -> BuildEvent {
        BuildEvent::Page {
            path: PathBuf::from("blog/post/index.html"),
            report,
        }
    }

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn plural_forms() {
        assert_eq!(plural(1, "page", "pages"), "1 page");
        assert_eq!(plural(0, "page", "pages"), "0 pages");
        assert_eq!(plural(3, "entry", "entries"), "3 entries");
    }

    #[test]
    fn indent_depths() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "        ");
    }

    #[test]
    fn media_line_variants() {
        let dims = Dimensions::new(100, 50);
        assert_eq!(
            media_line(&record(MediaKind::Image, "/media/a.png", Outcome::Cached(dims))),
            "img /media/a.png: 100x50 (cached)"
        );
        assert_eq!(
            media_line(&record(MediaKind::Video, "clip.mp4", Outcome::Probed(dims))),
            "video clip.mp4: 100x50 (probed)"
        );
        assert_eq!(
            media_line(&record(
                MediaKind::Image,
                "gone.png",
                Outcome::Failed("file not found".into())
            )),
            "img gone.png: failed: file not found"
        );
        assert_eq!(
            media_line(&record(
                MediaKind::Image,
                "/media/icon.png",
                Outcome::Skipped("favicon".into())
            )),
            "img /media/icon.png: skipped (favicon)"
        );
    }

    // =========================================================================
    // Build event tests
    // =========================================================================

    #[test]
    fn page_event_lists_media_under_path() {
        let report = PageReport {
            media: vec![
                record(
                    MediaKind::Image,
                    "/media/a.png",
                    Outcome::Cached(Dimensions::new(100, 50)),
                ),
                record(
                    MediaKind::Video,
                    "clip.mp4",
                    Outcome::Probed(Dimensions::new(1920, 1080)),
                ),
            ],
            promoted: 1,
            unwrapped: 2,
            changed: true,
        };
        let lines = format_build_event(&page(report));
        assert_eq!(
            lines,
            vec![
                "blog/post/index.html (rewritten)",
                "    img /media/a.png: 100x50 (cached)",
                "    video clip.mp4: 1920x1080 (probed)",
                "    promoted 1 link, unwrapped 2 paragraphs",
            ]
        );
    }

    #[test]
    fn page_without_media_is_silent() {
        assert!(format_build_event(&page(PageReport::default())).is_empty());
    }

    #[test]
    fn page_with_only_restructure_is_shown() {
        let report = PageReport {
            unwrapped: 1,
            changed: true,
            ..PageReport::default()
        };
        let lines = format_build_event(&page(report));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "    unwrapped 1 paragraph");
    }

    #[test]
    fn unchanged_page_is_labelled() {
        let report = PageReport {
            media: vec![record(
                MediaKind::Image,
                "a.png",
                Outcome::Cached(Dimensions::new(1, 1)),
            )],
            ..PageReport::default()
        };
        let lines = format_build_event(&page(report));
        assert_eq!(lines[0], "blog/post/index.html (unchanged)");
    }

    // =========================================================================
    // Summary tests
    // =========================================================================

    #[test]
    fn build_summary_lines() {
        let result = BuildResult {
            pages: 12,
            rewritten: 3,
            stats: CacheStats {
                hits: 40,
                probes: 3,
                failures: 1,
            },
            cache_entries: 43,
        };
        assert_eq!(
            format_build_summary(&result),
            vec![
                "12 pages, 3 rewritten",
                "Cache: 40 cached, 3 probed, 1 failed (44 total)",
                "Store: 43 entries",
            ]
        );
    }

    #[test]
    fn build_summary_empty_site() {
        let lines = format_build_summary(&BuildResult::default());
        assert_eq!(lines[0], "0 pages, 0 rewritten");
        assert_eq!(lines[1], "Cache: no media");
        assert_eq!(lines[2], "Store: 0 entries");
    }

    // =========================================================================
    // Probe and cache tests
    // =========================================================================

    #[test]
    fn probe_line_success_and_error() {
        let path = Path::new("media/a.png");
        assert_eq!(
            format_probe_line(path, &Ok(Dimensions::new(100, 50))),
            "media/a.png: 100x50"
        );
        let err = ProbeError::TimedOut {
            path: PathBuf::from("media/clip.mp4"),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(
            format_probe_line(Path::new("media/clip.mp4"), &Err(err)),
            "media/clip.mp4: probe of media/clip.mp4 timed out after 10000ms"
        );
    }

    #[test]
    fn failed_media_line_carries_error_text() {
        let err = ProbeError::NotFound(PathBuf::from("dist/blog/post/missing.png"));
        let line = media_line(&record(
            MediaKind::Image,
            "missing.png",
            Outcome::Failed(err.to_string()),
        ));
        assert_eq!(
            line,
            "img missing.png: failed: media not found: dist/blog/post/missing.png"
        );
    }

    #[test]
    fn cache_list_with_count() {
        let entries = vec![
            ("/media/a.png".to_string(), Dimensions::new(100, 50)),
            ("clip.mp4".to_string(), Dimensions::new(1920, 1080)),
        ];
        assert_eq!(
            format_cache_list(&entries),
            vec!["/media/a.png 100x50", "clip.mp4 1920x1080", "2 entries"]
        );
    }

    #[test]
    fn cache_list_empty() {
        assert_eq!(format_cache_list(&[]), vec!["0 entries"]);
    }
}
