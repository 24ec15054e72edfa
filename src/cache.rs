//! Persistent media dimension cache for incremental builds.
//!
//! Reading a video container or an image header is cheap once, but a site
//! with a few hundred pages references the same media over and over, and
//! every build would re-read all of it. This module memoizes the result of
//! each probe under the reference string exactly as it appears in markup and
//! persists the mapping between builds.
//!
//! # Design
//!
//! ## Cache keys
//!
//! The cache is **reference-addressed**: the key is the literal `src` value
//! (`/media/photo.png`), not the resolved filesystem path and not a content
//! hash. Two pages that spell the same file differently get two entries, and
//! a file whose pixels change under an unchanged reference keeps its old
//! entry. Media is treated as immutable once published; delete the store to
//! force a full re-probe.
//!
//! ## Lifecycle
//!
//! ```text
//! load(store)  →  get / put from every page transform  →  flush(store)
//! ```
//!
//! [`DimensionCache::load`] runs once before the first page and
//! [`DimensionCache::flush`] consumes the cache after the last one, so a
//! flush can never interleave with a transform still holding a reference.
//! A failed build never reaches the flush; the previous store stays as it
//! was.
//!
//! ## Storage
//!
//! The store is a JSON array of `[reference, {"width", "height"}]` pairs,
//! sorted by reference so that load→flush without changes is byte-stable.
//! Flushing writes a sibling temp file and renames it over the store.
//!
//! A store that exists but cannot be parsed is an error, not an empty
//! cache: silently dropping it would hide the problem and re-probe every
//! file on every build.

use crate::types::Dimensions;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, instrument};

/// Default store location, relative to the working directory.
pub const DEFAULT_STORE: &str = ".mediasizecache";

/// One cached probe result.
pub type CacheEntry = Dimensions;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache store IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cache store {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize cache store {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reference → dimensions mapping shared by all page transforms of a build.
///
/// All methods take `&self`; concurrent transforms share one instance.
/// Writes to the same key are last-write-wins, which is fine because two
/// probes of the same reference return the same size.
#[derive(Debug, Default)]
pub struct DimensionCache {
    entries: RwLock<BTreeMap<String, CacheEntry>>,
}

impl DimensionCache {
    /// Create an empty cache (used for `--no-cache` or first build).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from the store file. A missing store yields an empty cache.
    #[instrument(level = "debug", skip(store), fields(store = %store.display()))]
    pub fn load(store: &Path) -> Result<Self, CacheError> {
        let content = match std::fs::read_to_string(store) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no cache store, starting empty");
                return Ok(Self::empty());
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: store.to_path_buf(),
                    source,
                });
            }
        };
        let pairs: Vec<(String, CacheEntry)> =
            serde_json::from_str(&content).map_err(|source| CacheError::Corrupt {
                path: store.to_path_buf(),
                source,
            })?;
        debug!(entries = pairs.len(), "loaded cache store");
        Ok(Self {
            entries: RwLock::new(pairs.into_iter().collect()),
        })
    }

    /// Write every entry back to the store, superseding its contents.
    ///
    /// Takes `self`: this is the last thing that happens to a cache.
    #[instrument(level = "debug", skip(self, store), fields(store = %store.display()))]
    pub fn flush(self, store: &Path) -> Result<(), CacheError> {
        let entries = self
            .entries
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let json = to_store_json(&entries).map_err(|source| CacheError::Serialize {
            path: store.to_path_buf(),
            source,
        })?;

        let io_err = |source| CacheError::Io {
            path: store.to_path_buf(),
            source,
        };
        if let Some(parent) = store.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = temp_path(store);
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, store).map_err(io_err)?;
        debug!(entries = entries.len(), "flushed cache store");
        Ok(())
    }

    /// Look up a reference.
    pub fn get(&self, reference: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(reference)
            .copied()
    }

    /// Record a probe result, replacing any previous entry.
    pub fn put(&self, reference: impl Into<String>, entry: CacheEntry) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reference.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of all entries.
    pub fn entries(&self) -> Vec<(String, CacheEntry)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}

fn to_store_json(entries: &BTreeMap<String, CacheEntry>) -> serde_json::Result<String> {
    let pairs: Vec<(&String, &CacheEntry)> = entries.iter().collect();
    serde_json::to_string_pretty(&pairs)
}

/// `.mediasizecache` → `.mediasizecache.tmp`, in the same directory so the
/// rename stays on one filesystem.
fn temp_path(store: &Path) -> PathBuf {
    let mut name = store.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    store.with_file_name(name)
}

/// Summary of cache performance for a build run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub probes: u32,
    pub failures: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn probe(&mut self) {
        self.probes += 1;
    }

    pub fn failure(&mut self) {
        self.failures += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.probes + self.failures
    }

    pub fn absorb(&mut self, other: CacheStats) {
        self.hits += other.hits;
        self.probes += other.probes;
        self.failures += other.failures;
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total() == 0 {
            return write!(f, "no media");
        }
        if self.hits > 0 || self.failures > 0 {
            if self.failures > 0 {
                write!(
                    f,
                    "{} cached, {} probed, {} failed ({} total)",
                    self.hits,
                    self.probes,
                    self.failures,
                    self.total()
                )
            } else {
                write!(
                    f,
                    "{} cached, {} probed ({} total)",
                    self.hits,
                    self.probes,
                    self.total()
                )
            }
        } else {
            write!(f, "{} probed", self.probes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn dims(width: u32, height: u32) -> CacheEntry {
        Dimensions { width, height }
    }

    // =========================================================================
    // In-memory behaviour
    // =========================================================================

    #[test]
    fn empty_cache_has_no_entries() {
        let c = DimensionCache::empty();
        assert!(c.is_empty());
        assert_eq!(c.get("/media/a.png"), None);
    }

    #[test]
    fn put_then_get() {
        let c = DimensionCache::empty();
        c.put("/media/a.png", dims(100, 50));
        assert_eq!(c.get("/media/a.png"), Some(dims(100, 50)));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn put_overwrites_existing_entry() {
        let c = DimensionCache::empty();
        c.put("/media/a.png", dims(100, 50));
        c.put("/media/a.png", dims(200, 100));
        assert_eq!(c.get("/media/a.png"), Some(dims(200, 100)));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn keys_are_literal_references() {
        let c = DimensionCache::empty();
        c.put("/media/a.png", dims(1, 1));
        assert_eq!(c.get("media/a.png"), None);
        assert_eq!(c.get("/media/a.png?v=2"), None);
    }

    #[test]
    fn concurrent_puts_are_not_lost() {
        let c = DimensionCache::empty();
        std::thread::scope(|s| {
            for t in 0..4u32 {
                let c = &c;
                s.spawn(move || {
                    for i in 0..50u32 {
                        c.put(format!("/media/{t}-{i}.png"), dims(t, i));
                    }
                });
            }
        });
        assert_eq!(c.len(), 200);
        assert_eq!(c.get("/media/3-49.png"), Some(dims(3, 49)));
    }

    // =========================================================================
    // Load / flush
    // =========================================================================

    #[test]
    fn load_missing_file_returns_empty() {
        let tmp = TempDir::new().unwrap();
        let c = DimensionCache::load(&tmp.path().join(DEFAULT_STORE)).unwrap();
        assert!(c.is_empty());
    }

    #[test]
    fn load_corrupt_json_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join(DEFAULT_STORE);
        fs::write(&store, "not json").unwrap();
        let err = DimensionCache::load(&store).unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }));
    }

    #[test]
    fn load_wrong_shape_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join(DEFAULT_STORE);
        fs::write(&store, r#"{"/media/a.png": {"width": 1, "height": 2}}"#).unwrap();
        assert!(DimensionCache::load(&store).is_err());
    }

    #[test]
    fn load_accepts_height_before_width() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join(DEFAULT_STORE);
        fs::write(&store, r#"[["/media/a.png", {"height": 50, "width": 100}]]"#).unwrap();
        let c = DimensionCache::load(&store).unwrap();
        assert_eq!(c.get("/media/a.png"), Some(dims(100, 50)));
    }

    #[test]
    fn flush_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join(DEFAULT_STORE);
        let c = DimensionCache::empty();
        c.put("A", dims(10, 20));
        c.put("B", dims(5, 5));
        c.flush(&store).unwrap();

        let loaded = DimensionCache::load(&store).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("A"), Some(dims(10, 20)));
        assert_eq!(loaded.get("B"), Some(dims(5, 5)));
    }

    #[test]
    fn flush_is_idempotent_across_reload() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join(DEFAULT_STORE);
        let c = DimensionCache::empty();
        c.put("B", dims(5, 5));
        c.put("A", dims(10, 20));
        c.flush(&store).unwrap();
        let first = fs::read_to_string(&store).unwrap();

        DimensionCache::load(&store).unwrap().flush(&store).unwrap();
        let second = fs::read_to_string(&store).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn flush_writes_sorted_array_of_pairs() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join(DEFAULT_STORE);
        let c = DimensionCache::empty();
        c.put("B", dims(5, 5));
        c.put("A", dims(10, 20));
        c.flush(&store).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&store).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                ["A", {"width": 10, "height": 20}],
                ["B", {"width": 5, "height": 5}],
            ])
        );
    }

    #[test]
    fn untouched_entries_survive_a_build() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join(DEFAULT_STORE);
        let c = DimensionCache::empty();
        c.put("/media/old.png", dims(1, 2));
        c.flush(&store).unwrap();

        let next = DimensionCache::load(&store).unwrap();
        next.put("/media/new.png", dims(3, 4));
        next.flush(&store).unwrap();

        let last = DimensionCache::load(&store).unwrap();
        assert_eq!(last.get("/media/old.png"), Some(dims(1, 2)));
        assert_eq!(last.get("/media/new.png"), Some(dims(3, 4)));
    }

    #[test]
    fn flush_creates_parent_directory_and_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join("nested/dir").join(DEFAULT_STORE);
        let c = DimensionCache::empty();
        c.put("A", dims(1, 1));
        c.flush(&store).unwrap();

        assert!(store.exists());
        assert!(!temp_path(&store).exists());
    }

    #[test]
    fn temp_path_is_a_sibling() {
        assert_eq!(
            temp_path(Path::new("build/.mediasizecache")),
            PathBuf::from("build/.mediasizecache.tmp")
        );
    }

    #[test]
    fn write_side_errors_are_not_reported_as_corrupt() {
        let source = serde_json::from_str::<u32>("x").unwrap_err();
        let err = CacheError::Serialize {
            path: PathBuf::from(".mediasizecache"),
            source,
        };
        let message = err.to_string();
        assert!(message.starts_with("failed to serialize cache store .mediasizecache"));
        assert!(!message.contains("corrupt"));
    }

    // =========================================================================
    // CacheStats
    // =========================================================================

    #[test]
    fn cache_stats_display_with_hits() {
        let s = CacheStats {
            hits: 5,
            probes: 2,
            failures: 0,
        };
        assert_eq!(format!("{}", s), "5 cached, 2 probed (7 total)");
    }

    #[test]
    fn cache_stats_display_with_failures() {
        let s = CacheStats {
            hits: 3,
            probes: 2,
            failures: 1,
        };
        assert_eq!(format!("{}", s), "3 cached, 2 probed, 1 failed (6 total)");
    }

    #[test]
    fn cache_stats_display_no_hits() {
        let mut s = CacheStats::default();
        s.probe();
        s.probe();
        s.probe();
        assert_eq!(format!("{}", s), "3 probed");
    }

    #[test]
    fn cache_stats_display_empty() {
        assert_eq!(CacheStats::default().to_string(), "no media");
    }

    #[test]
    fn cache_stats_absorb_sums_fields() {
        let mut a = CacheStats {
            hits: 1,
            probes: 2,
            failures: 3,
        };
        a.absorb(CacheStats {
            hits: 10,
            probes: 20,
            failures: 30,
        });
        assert_eq!(a.total(), 66);
    }
}
