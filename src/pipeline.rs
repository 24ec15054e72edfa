//! Build driver: run the transform over every rendered page of a site.
//!
//! ```text
//! load cache  →  find *.html under the output dir  →  transform pages (parallel)  →  flush cache
//! ```
//!
//! Pages are rewritten in place and only when the transform changed them.
//! The cache is flushed only if every page was read and written
//! successfully; a failed build leaves the previous store as it was.
//!
//! ## Parallelism
//!
//! Pages are spread over the rayon pool. Each page's video probes run on a
//! tokio runtime shared by the whole build: a rayon worker blocks on its
//! page's future (`Handle::block_on`) while the probes for that page run
//! concurrently on the runtime's blocking pool.
//!
//! Progress is reported through an optional [`BuildEvent`] channel so the
//! CLI can print from its own thread while workers keep going.

use crate::cache::{CacheError, CacheStats, DimensionCache};
use crate::config::{ConfigError, SiteConfig};
use crate::probe::{FsProbe, MediaProbe};
use crate::resolve::ReferenceResolver;
use crate::transform::{PageReport, TransformOptions, Transformer};
use crate::types::PageContext;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to walk output directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Output directory not found: {}", .0.display())]
    OutputNotFound(PathBuf),
    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Everything the driver needs to know, resolved from config and flags.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Directory of rendered pages, rewritten in place.
    pub output_dir: PathBuf,
    /// Cache store; `None` disables caching for this build.
    pub store: Option<PathBuf>,
    /// Root for site-absolute references; defaults to `output_dir`.
    pub site_root: Option<PathBuf>,
    pub favicon: String,
    pub transform: TransformOptions,
    pub video_timeout: Duration,
}

impl BuildOptions {
    /// Options for building `output_dir` with a loaded config.
    ///
    /// `force_production` overrides the environment check.
    pub fn from_config(
        config: &SiteConfig,
        output_dir: &Path,
        use_cache: bool,
        force_production: bool,
    ) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            store: use_cache.then(|| PathBuf::from(&config.store)),
            site_root: config.site_root.clone(),
            favicon: config.favicon.clone(),
            transform: TransformOptions {
                production: force_production || config.production.is_active(),
                container_class: config.media_container_class.clone(),
            },
            video_timeout: config.probe.video_timeout(),
        }
    }

    fn resolver(&self) -> ReferenceResolver {
        let root = self
            .site_root
            .clone()
            .unwrap_or_else(|| self.output_dir.clone());
        ReferenceResolver::new(self.favicon.clone(), Some(root))
    }
}

/// Progress events sent while pages complete (in completion order).
#[derive(Debug, Clone)]
pub enum BuildEvent {
    Page {
        /// Path relative to the output directory.
        path: PathBuf,
        report: PageReport,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildResult {
    /// HTML pages found.
    pub pages: usize,
    /// Pages whose content changed and was written back.
    pub rewritten: usize,
    pub stats: CacheStats,
    /// Entries in the cache at the end of the build.
    pub cache_entries: usize,
}

/// Build with the filesystem probe.
pub fn build(
    options: &BuildOptions,
    events: Option<Sender<BuildEvent>>,
) -> Result<BuildResult, BuildError> {
    let probe = FsProbe::new(options.video_timeout);
    build_with_probe(&probe, options, events)
}

/// Build with a specific probe (allows testing with a mock).
#[instrument(level = "debug", skip_all, fields(output = %options.output_dir.display()))]
pub fn build_with_probe(
    probe: &impl MediaProbe,
    options: &BuildOptions,
    events: Option<Sender<BuildEvent>>,
) -> Result<BuildResult, BuildError> {
    if !options.output_dir.is_dir() {
        return Err(BuildError::OutputNotFound(options.output_dir.clone()));
    }

    let cache = match &options.store {
        Some(store) => DimensionCache::load(store)?,
        None => DimensionCache::empty(),
    };
    let pages = discover_pages(&options.output_dir)?;
    debug!(pages = pages.len(), cached = cache.len(), "starting build");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()
        .map_err(BuildError::Runtime)?;
    let handle = runtime.handle().clone();

    let resolver = options.resolver();
    let transformer = Transformer::new(probe, &cache, &resolver, &options.transform);

    let outcomes: Vec<(bool, CacheStats)> = pages
        .par_iter()
        .map(|path| {
            let content = std::fs::read_to_string(path).map_err(|source| BuildError::Io {
                path: path.clone(),
                source,
            })?;
            let page = PageContext::in_place(path);
            let transformed = handle.block_on(transformer.transform(&content, &page));
            let report = transformed.report;
            if report.changed {
                std::fs::write(path, &transformed.html).map_err(|source| BuildError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
            let changed = report.changed;
            let stats = report.stats();
            if let Some(tx) = &events {
                let relative = path
                    .strip_prefix(&options.output_dir)
                    .unwrap_or(path)
                    .to_path_buf();
                // A closed receiver only means nobody is listening.
                let _ = tx.send(BuildEvent::Page {
                    path: relative,
                    report,
                });
            }
            Ok((changed, stats))
        })
        .collect::<Result<_, BuildError>>()?;

    drop(events);
    // A timed-out video read may still be blocked in the filesystem; don't wait on it.
    runtime.shutdown_background();

    let mut result = BuildResult {
        pages: pages.len(),
        cache_entries: cache.len(),
        ..BuildResult::default()
    };
    for (changed, stats) in outcomes {
        result.rewritten += usize::from(changed);
        result.stats.absorb(stats);
    }

    if let Some(store) = &options.store {
        cache.flush(store)?;
    }
    info!(
        pages = result.pages,
        rewritten = result.rewritten,
        cache = %result.stats,
        "build complete"
    );
    Ok(result)
}

/// Every `.html` file under `root`, sorted.
pub fn discover_pages(root: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut pages = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        if entry.file_type().is_file() && PageContext::in_place(entry.path()).is_html() {
            pages.push(entry.into_path());
        }
    }
    pages.sort();
    Ok(pages)
}
