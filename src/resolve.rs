//! Media reference resolution: markup `src` → filesystem path.
//!
//! References are resolved lexically (no existence check, no symlink
//! resolution); the probe reports missing files. Three kinds are refused
//! up front so they never reach the probe:
//!
//! - the site favicon, which is not a standard image format
//! - external URLs (`https://...`, `data:...`, `//cdn/...`)
//! - empty references
//!
//! Site-absolute references (`/media/a.png`) are rooted at the media root:
//! the configured site root, or the grandparent of the page's input file
//! (`<root>/<section>/<page>.md`). Everything else is relative to the
//! directory of the page's input file.

use crate::types::PageContext;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Reference of the site icon, exempt from probing in every mode.
pub const DEFAULT_FAVICON: &str = "/media/icon.png";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("empty media reference")]
    Empty,
    #[error("exempt media reference: {0}")]
    Exempt(String),
    #[error("external media reference: {0}")]
    External(String),
}

#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    favicon: String,
    site_root: Option<PathBuf>,
}

impl Default for ReferenceResolver {
    fn default() -> Self {
        Self::new(DEFAULT_FAVICON, None)
    }
}

impl ReferenceResolver {
    pub fn new(favicon: impl Into<String>, site_root: Option<PathBuf>) -> Self {
        Self {
            favicon: favicon.into(),
            site_root,
        }
    }

    pub fn with_site_root(mut self, site_root: impl Into<PathBuf>) -> Self {
        self.site_root = Some(site_root.into());
        self
    }

    /// Whether `reference` is the favicon. Compared after trimming.
    pub fn is_exempt(&self, reference: &str) -> bool {
        reference.trim() == self.favicon
    }

    /// Map a reference as authored to the file the probe should read.
    pub fn resolve(&self, reference: &str, page: &PageContext) -> Result<PathBuf, ResolveError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ResolveError::Empty);
        }
        if self.is_exempt(reference) {
            return Err(ResolveError::Exempt(reference.to_string()));
        }
        if is_external(reference) {
            return Err(ResolveError::External(reference.to_string()));
        }

        let path = strip_query_and_fragment(reference);
        if path.is_empty() {
            return Err(ResolveError::Empty);
        }

        Ok(match path.strip_prefix('/') {
            Some(site_path) => join_lexical(&self.media_root(page), site_path),
            None => {
                let page_dir = page.input_path.parent().unwrap_or(Path::new(""));
                join_lexical(page_dir, path)
            }
        })
    }

    fn media_root(&self, page: &PageContext) -> PathBuf {
        if let Some(root) = &self.site_root {
            return root.clone();
        }
        page.input_path
            .parent()
            .and_then(Path::parent)
            .unwrap_or(Path::new(""))
            .to_path_buf()
    }
}

/// `scheme:` (RFC 3986 scheme syntax) or protocol-relative `//host`.
fn is_external(reference: &str) -> bool {
    if reference.starts_with("//") {
        return true;
    }
    let Some((scheme, _)) = reference.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn strip_query_and_fragment(reference: &str) -> &str {
    reference
        .split_once(['?', '#'])
        .map_or(reference, |(path, _)| path)
}

/// Append a `/`-separated relative path to `base`, applying `.` and `..`.
///
/// `..` never climbs above an empty base; it is dropped instead.
pub fn join_lexical(base: &Path, rel: &str) -> PathBuf {
    let mut result = base.to_path_buf();
    for part in rel.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                result.pop();
            }
            _ => result.push(part),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> PageContext {
        PageContext::new("/site/src/posts/hello.md", "/site/dist/posts/hello/index.html")
    }

    // =========================================================================
    // Site-absolute references
    // =========================================================================

    #[test]
    fn site_absolute_uses_input_grandparent() {
        let resolver = ReferenceResolver::default();
        let path = resolver.resolve("/media/a.png", &page()).unwrap();
        assert_eq!(path, PathBuf::from("/site/src/media/a.png"));
    }

    #[test]
    fn site_absolute_uses_configured_root() {
        let resolver = ReferenceResolver::default().with_site_root("/site/dist");
        let path = resolver.resolve("/media/a.png", &page()).unwrap();
        assert_eq!(path, PathBuf::from("/site/dist/media/a.png"));
    }

    #[test]
    fn site_absolute_cannot_escape_with_dotdot_past_filesystem_root() {
        let resolver = ReferenceResolver::default().with_site_root("/");
        let path = resolver.resolve("/../../media/a.png", &page()).unwrap();
        assert_eq!(path, PathBuf::from("/media/a.png"));
    }

    // =========================================================================
    // Relative references
    // =========================================================================

    #[test]
    fn relative_resolves_against_page_directory() {
        let resolver = ReferenceResolver::default();
        let path = resolver.resolve("./figures/plot.png", &page()).unwrap();
        assert_eq!(path, PathBuf::from("/site/src/posts/figures/plot.png"));
    }

    #[test]
    fn relative_dotdot_pops_components() {
        let resolver = ReferenceResolver::default();
        let path = resolver.resolve("../media/b.webp", &page()).unwrap();
        assert_eq!(path, PathBuf::from("/site/src/media/b.webp"));
    }

    #[test]
    fn query_and_fragment_are_stripped() {
        let resolver = ReferenceResolver::default();
        assert_eq!(
            resolver.resolve("/media/clip.mp4#t=10", &page()).unwrap(),
            PathBuf::from("/site/src/media/clip.mp4")
        );
        assert_eq!(
            resolver.resolve("/media/a.png?v=2", &page()).unwrap(),
            PathBuf::from("/site/src/media/a.png")
        );
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let resolver = ReferenceResolver::default();
        assert_eq!(
            resolver.resolve("  /media/a.png\n", &page()).unwrap(),
            PathBuf::from("/site/src/media/a.png")
        );
    }

    // =========================================================================
    // Refused references
    // =========================================================================

    #[test]
    fn favicon_is_exempt() {
        let resolver = ReferenceResolver::default();
        assert_eq!(
            resolver.resolve("/media/icon.png", &page()),
            Err(ResolveError::Exempt("/media/icon.png".into()))
        );
        assert!(resolver.is_exempt(" /media/icon.png "));
    }

    #[test]
    fn custom_favicon_is_exempt() {
        let resolver = ReferenceResolver::new("/favicon.ico", None);
        assert!(resolver.is_exempt("/favicon.ico"));
        assert!(!resolver.is_exempt("/media/icon.png"));
    }

    #[test]
    fn external_references_are_refused() {
        let resolver = ReferenceResolver::default();
        for r in [
            "https://example.com/a.png",
            "http://example.com/a.png",
            "data:image/png;base64,AAAA",
            "//cdn.example.com/a.png",
        ] {
            assert_eq!(
                resolver.resolve(r, &page()),
                Err(ResolveError::External(r.to_string())),
                "{r}"
            );
        }
    }

    #[test]
    fn colon_in_path_is_not_a_scheme() {
        let resolver = ReferenceResolver::default();
        assert!(resolver.resolve("./a:b.png", &page()).is_ok());
        assert!(resolver.resolve("/media/12:30.png", &page()).is_ok());
    }

    #[test]
    fn empty_reference_is_refused() {
        let resolver = ReferenceResolver::default();
        assert_eq!(resolver.resolve("", &page()), Err(ResolveError::Empty));
        assert_eq!(resolver.resolve("   ", &page()), Err(ResolveError::Empty));
        assert_eq!(resolver.resolve("#top", &page()), Err(ResolveError::Empty));
    }
}
