//! Per-page HTML restructuring: size media, undo markdown paragraph wrapping.
//!
//! Markdown renderers wrap everything inline in `<p>`, including images and
//! videos meant to be blocks, and nothing in the source knows the pixel
//! size of the media. One pass over each rendered page fixes both, as four
//! ordered rewrites over a single parsed tree:
//!
//! 1. **Promote linked images**: `<p><a><img></a></p>` becomes
//!    `<a class="media-container"><img></a>`.
//! 2. **Size images** (skipped in production mode): `width`/`height` from
//!    the cache, probing on a miss.
//! 3. **Size videos** (always): same, with every probe the page needs
//!    dispatched at once and awaited together before anything is written.
//! 4. **Unwrap lone media**: `<p><img></p>` becomes `<img>`, taking the
//!    paragraph's attributes along.
//!
//! Step 1 runs first so step 4 only sees media whose parent is still a
//! paragraph. A probe failure costs one element its dimensions and nothing
//! else: it is logged and recorded in the [`PageReport`].
//!
//! Pages that come out structurally unchanged are returned byte-for-byte
//! as they came in; otherwise the tree is serialized in the mode it was
//! parsed in (full document or fragment).

pub mod dom;

use crate::cache::{CacheStats, DimensionCache};
use crate::probe::MediaProbe;
use crate::resolve::ReferenceResolver;
use crate::types::{Dimensions, MediaKind, PageContext};
use dom::AttrList;
use ego_tree::NodeId;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{debug, instrument, warn};

/// Class added to anchors promoted in step 1.
pub const DEFAULT_CONTAINER_CLASS: &str = "media-container";

macro_rules! selector {
    ($name:ident, $css:expr) => {
        static $name: LazyLock<Selector> =
            LazyLock::new(|| Selector::parse($css).expect(concat!("invalid selector: ", $css)));
    };
}

selector!(LINKED_IMAGE, "p > a > img");
selector!(IMAGE, "img");
selector!(VIDEO, "video");
selector!(VIDEO_SOURCE, "source[src]");
selector!(PARAGRAPH_MEDIA, "p > img, p > video");

#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Leave image sizing to a downstream asset pipeline.
    pub production: bool,
    pub container_class: String,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            production: false,
            container_class: DEFAULT_CONTAINER_CLASS.to_string(),
        }
    }
}

/// What happened to one media element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Cached(Dimensions),
    Probed(Dimensions),
    /// Probe failed; the element keeps whatever size attributes it had.
    Failed(String),
    /// Not probed on purpose: favicon, external URL, empty reference.
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRecord {
    pub kind: MediaKind,
    pub reference: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageReport {
    pub media: Vec<MediaRecord>,
    /// Anchors promoted out of a paragraph.
    pub promoted: usize,
    /// Paragraphs removed around lone media.
    pub unwrapped: usize,
    /// Whether the returned HTML differs from the input.
    pub changed: bool,
}

impl PageReport {
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for record in &self.media {
            match record.outcome {
                Outcome::Cached(_) => stats.hit(),
                Outcome::Probed(_) => stats.probe(),
                Outcome::Failed(_) => stats.failure(),
                Outcome::Skipped(_) => {}
            }
        }
        stats
    }

    pub fn failures(&self) -> impl Iterator<Item = &MediaRecord> {
        self.media
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed(_)))
    }
}

/// Result of transforming one page.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub html: String,
    pub report: PageReport,
}

/// A pending lookup: either already answered or waiting on a video probe.
enum Lookup {
    Done(Outcome),
    Pending(usize),
}

/// Everything a page transform needs, shared by all pages of a build.
pub struct Transformer<'a, P: MediaProbe> {
    probe: &'a P,
    cache: &'a DimensionCache,
    resolver: &'a ReferenceResolver,
    options: &'a TransformOptions,
}

impl<'a, P: MediaProbe> Transformer<'a, P> {
    pub fn new(
        probe: &'a P,
        cache: &'a DimensionCache,
        resolver: &'a ReferenceResolver,
        options: &'a TransformOptions,
    ) -> Self {
        Self {
            probe,
            cache,
            resolver,
            options,
        }
    }

    /// Transform one rendered page.
    ///
    /// Outputs that are not `.html` pass through untouched. The returned
    /// future completes only once every video probe of the page settled.
    #[instrument(level = "debug", skip_all, fields(page = %page))]
    pub async fn transform(&self, content: &str, page: &PageContext) -> Transformed {
        let mut report = PageReport::default();
        if !page.is_html() {
            return Transformed {
                html: content.to_string(),
                report,
            };
        }

        let full_document = is_full_document(content);
        let mut html = if full_document {
            Html::parse_document(content)
        } else {
            Html::parse_fragment(content)
        };

        let mut changed = self.promote_linked_images(&mut html, &mut report);
        if !self.options.production {
            changed |= self.size_images(&mut html, page, &mut report);
        }
        changed |= self.size_videos(&mut html, page, &mut report).await;
        changed |= unwrap_lone_media(&mut html, &mut report);

        report.changed = changed;
        let html = if !changed {
            content.to_string()
        } else if full_document {
            html.html()
        } else {
            html.root_element().inner_html()
        };
        Transformed { html, report }
    }

    fn promote_linked_images(&self, html: &mut Html, report: &mut PageReport) -> bool {
        let images: Vec<NodeId> = html.select(&LINKED_IMAGE).map(|e| e.id()).collect();
        for img in images {
            let Some(anchor) = dom::sole_content_of(&html.tree, img, "a") else {
                continue;
            };
            let Some(paragraph) = dom::sole_content_of(&html.tree, anchor, "p") else {
                continue;
            };
            let class = self.options.container_class.as_str();
            dom::edit_attrs(&mut html.tree, anchor, |attrs| attrs.add_classes([class]));
            if dom::replace_with_child(&mut html.tree, paragraph, anchor) {
                report.promoted += 1;
            }
        }
        report.promoted > 0
    }

    fn size_images(&self, html: &mut Html, page: &PageContext, report: &mut PageReport) -> bool {
        let images: Vec<(NodeId, String)> = html
            .select(&IMAGE)
            .filter_map(|e| Some((e.id(), e.value().attr("src")?.to_string())))
            .collect();

        let mut changed = false;
        for (id, reference) in images {
            let outcome = self.lookup_image(&reference, page);
            changed |= apply_outcome(html, id, &outcome);
            report.media.push(MediaRecord {
                kind: MediaKind::Image,
                reference,
                outcome,
            });
        }
        changed
    }

    fn lookup_image(&self, reference: &str, page: &PageContext) -> Outcome {
        let path = match self.resolver.resolve(reference, page) {
            Ok(path) => path,
            Err(e) => {
                debug!(reference, reason = %e, "image not probed");
                return Outcome::Skipped(e.to_string());
            }
        };
        if let Some(dims) = self.cache.get(reference) {
            debug!(reference, %dims, "image size cached");
            return Outcome::Cached(dims);
        }
        match self.probe.probe_image(&path) {
            Ok(dims) => {
                self.cache.put(reference, dims);
                Outcome::Probed(dims)
            }
            Err(error) => {
                warn!(
                    page = %page,
                    reference,
                    path = %path.display(),
                    %error,
                    "failed to read image size"
                );
                Outcome::Failed(error.to_string())
            }
        }
    }

    /// Plan every video lookup, probe the misses together, then apply.
    async fn size_videos(
        &self,
        html: &mut Html,
        page: &PageContext,
        report: &mut PageReport,
    ) -> bool {
        let videos: Vec<(NodeId, String)> = html
            .select(&VIDEO)
            .filter_map(|video| {
                let src = video.value().attr("src").or_else(|| {
                    video
                        .select(&VIDEO_SOURCE)
                        .next()
                        .and_then(|s| s.value().attr("src"))
                })?;
                Some((video.id(), src.to_string()))
            })
            .collect();
        if videos.is_empty() {
            return false;
        }

        let mut pending: Vec<(String, PathBuf)> = Vec::new();
        let mut pending_index: HashMap<String, usize> = HashMap::new();
        let mut lookups = Vec::with_capacity(videos.len());
        for (_, reference) in &videos {
            let lookup = match self.resolver.resolve(reference, page) {
                Err(e) => {
                    debug!(reference, reason = %e, "video not probed");
                    Lookup::Done(Outcome::Skipped(e.to_string()))
                }
                Ok(path) => match self.cache.get(reference) {
                    Some(dims) => {
                        debug!(reference, %dims, "video size cached");
                        Lookup::Done(Outcome::Cached(dims))
                    }
                    None => {
                        let index = *pending_index.entry(reference.clone()).or_insert_with(|| {
                            pending.push((reference.clone(), path));
                            pending.len() - 1
                        });
                        Lookup::Pending(index)
                    }
                },
            };
            lookups.push(lookup);
        }

        let results =
            futures::future::join_all(pending.iter().map(|(_, path)| self.probe.probe_video(path)))
                .await;

        let mut settled: Vec<Outcome> = Vec::with_capacity(results.len());
        for ((reference, path), result) in pending.iter().zip(results) {
            settled.push(match result {
                Ok(dims) => {
                    self.cache.put(reference.as_str(), dims);
                    Outcome::Probed(dims)
                }
                Err(error) => {
                    warn!(
                        page = %page,
                        reference = reference.as_str(),
                        path = %path.display(),
                        %error,
                        "failed to read video size"
                    );
                    Outcome::Failed(error.to_string())
                }
            });
        }

        let mut first_use = vec![true; settled.len()];
        let mut changed = false;
        for ((id, reference), lookup) in videos.into_iter().zip(lookups) {
            let outcome = match lookup {
                Lookup::Done(outcome) => outcome,
                Lookup::Pending(index) => {
                    // Later uses of a reference probed on this page count as hits.
                    let first = std::mem::replace(&mut first_use[index], false);
                    match &settled[index] {
                        Outcome::Probed(dims) if !first => Outcome::Cached(*dims),
                        other => other.clone(),
                    }
                }
            };
            changed |= apply_outcome(html, id, &outcome);
            report.media.push(MediaRecord {
                kind: MediaKind::Video,
                reference,
                outcome,
            });
        }
        changed
    }
}

/// Write `width`/`height` for a resolved outcome.
fn apply_outcome(html: &mut Html, id: NodeId, outcome: &Outcome) -> bool {
    let dims = match outcome {
        Outcome::Cached(dims) | Outcome::Probed(dims) => *dims,
        Outcome::Failed(_) | Outcome::Skipped(_) => return false,
    };
    dom::edit_attrs(&mut html.tree, id, |attrs| {
        attrs.set("width", dims.width.to_string());
        attrs.set("height", dims.height.to_string());
    })
}

fn unwrap_lone_media(html: &mut Html, report: &mut PageReport) -> bool {
    let media: Vec<NodeId> = html.select(&PARAGRAPH_MEDIA).map(|e| e.id()).collect();
    let before = report.unwrapped;
    for id in media {
        let Some(paragraph) = dom::sole_content_of(&html.tree, id, "p") else {
            continue;
        };
        let wrapper = match dom::element(&html.tree, paragraph) {
            Some(p) => AttrList::from_element(p),
            None => continue,
        };
        dom::edit_attrs(&mut html.tree, id, |attrs| attrs.merge_wrapper(&wrapper));
        if dom::replace_with_child(&mut html.tree, paragraph, id) {
            report.unwrapped += 1;
        }
    }
    report.unwrapped > before
}

/// Full documents keep their `<html>`/doctype; anything else is a fragment.
///
/// Only the start of the input counts: leading whitespace and comments are
/// skipped, then a doctype or `<html` tag must follow.
fn is_full_document(content: &str) -> bool {
    let mut rest = content.trim_start_matches('\u{feff}').trim_start();
    while let Some(comment) = rest.strip_prefix("<!--") {
        match comment.find("-->") {
            Some(end) => rest = comment[end + 3..].trim_start(),
            None => return false,
        }
    }
    starts_with_ignore_case(rest, "<!doctype") || starts_with_ignore_case(rest, "<html")
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.as_bytes()
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
}
