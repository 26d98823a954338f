use extract::{Annotator, Extractor};
use ingest::{Chunk, PageRenderer, PageSource};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::entity::{Entity, ExpandOutcome, NodeId, PageRoot};
use crate::error::ForestError;
use crate::store::{ForestStore, LoadedForest};
use crate::view::{NodeView, PageView};

/// Cache locations derived from a paper's file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperPaths {
    pub stem: String,
    pub image_dir: PathBuf,
    pub entity_cache: PathBuf,
}

impl PaperPaths {
    pub fn derive(cache_dir: &Path, filename: &str) -> Self {
        let stem = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename)
            .to_string();

        Self {
            image_dir: cache_dir.join("images").join(&stem),
            entity_cache: cache_dir.join("entities").join(format!("{}.entities.json", stem)),
            stem,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Previous,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpandReport {
    pub outcome: ExpandOutcome,
    /// Set when the expansion could not be persisted.
    pub warning: Option<String>,
}

// Where a node sits: page index, then child indices from the root down.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NodePath {
    page: usize,
    indices: Vec<usize>,
}

/// One paper: its page-root forest, page cursor and cache files.
pub struct Paper {
    filename: String,
    source_path: PathBuf,
    paths: PaperPaths,
    store: ForestStore,
    roots: Vec<PageRoot>,
    current: usize,
    locator: HashMap<NodeId, NodePath>,
    closed: HashSet<NodeId>,
    notices: Vec<String>,
}

impl Paper {
    /// Load the paper's forest from its entity cache, or extract it page by
    /// page and persist it right away.
    pub async fn open<A: Annotator>(
        filename: &str,
        source_path: PathBuf,
        paths: PaperPaths,
        source: &dyn PageSource,
        extractor: &mut Extractor<A>,
    ) -> Result<Self, ForestError> {
        let page_count = source.page_count();
        let store = ForestStore::new(paths.entity_cache.clone());
        let mut notices = Vec::new();

        let (roots, fresh) = match store.load(page_count) {
            LoadedForest::Found(mut roots) => {
                tracing::info!(path = %store.path().display(), pages = roots.len(), "Loaded entity cache");
                let retried = Self::retry_failed_pages(filename, source, extractor, &mut roots).await?;
                (roots, retried > 0)
            }
            LoadedForest::Missing => {
                tracing::info!(filename, pages = page_count, "No entity cache, extracting entities");
                (Self::extract_forest(filename, source, extractor).await?, true)
            }
            LoadedForest::Corrupt(reason) => {
                let notice = match store.quarantine() {
                    Ok(moved) => format!(
                        "Entity cache for {} was unusable ({}); moved to {} and re-extracting",
                        filename,
                        reason,
                        moved.display()
                    ),
                    Err(e) => format!(
                        "Entity cache for {} was unusable ({}) and could not be moved aside ({}); it will be overwritten",
                        filename, reason, e
                    ),
                };
                tracing::warn!("{}", notice);
                notices.push(notice);
                (Self::extract_forest(filename, source, extractor).await?, true)
            }
        };

        let mut paper = Self {
            filename: filename.to_string(),
            source_path,
            paths,
            store,
            roots,
            current: 0,
            locator: HashMap::new(),
            closed: HashSet::new(),
            notices,
        };
        paper.relink();

        let failed = paper.roots.iter().filter(|r| r.failed).count();
        if failed > 0 {
            let notice = format!(
                "Entity extraction failed on {} of {} pages of {}; they will be retried the next time the paper is opened",
                failed, page_count, filename
            );
            tracing::warn!("{}", notice);
            paper.notices.push(notice);
        }

        if fresh {
            if let Err(e) = paper.save() {
                tracing::warn!(error = %e, "Could not persist freshly extracted entities");
                paper.notices.push(e.to_string());
            }
        }

        Ok(paper)
    }

    async fn extract_forest<A: Annotator>(
        filename: &str,
        source: &dyn PageSource,
        extractor: &mut Extractor<A>,
    ) -> Result<Vec<PageRoot>, ForestError> {
        let pages = ingest::chunk_pages(source, extractor.chunker()).map_err(|e| {
            ForestError::Document {
                filename: filename.to_string(),
                reason: format!("{:#}", e),
            }
        })?;

        let total: usize = pages.iter().map(Vec::len).sum();
        let mut done = 0;
        let mut roots = Vec::with_capacity(pages.len());

        for (page, chunks) in pages.iter().enumerate() {
            roots.push(Self::extract_page(page, chunks, extractor).await);
            done += chunks.len();
            tracing::info!(page, chunks_done = done, chunks_total = total, "Extraction progress");
        }

        Ok(roots)
    }

    /// Extract again every cached page whose extraction failed outright.
    async fn retry_failed_pages<A: Annotator>(
        filename: &str,
        source: &dyn PageSource,
        extractor: &mut Extractor<A>,
        roots: &mut [PageRoot],
    ) -> Result<usize, ForestError> {
        let mut retried = 0;

        for root in roots.iter_mut().filter(|r| r.failed) {
            tracing::info!(filename, page = root.page, "Retrying failed page extraction");
            let text = source.page_text(root.page).map_err(|e| ForestError::Document {
                filename: filename.to_string(),
                reason: format!("{:#}", e),
            })?;
            let chunks = extractor.chunker().chunk_text(&text);
            *root = Self::extract_page(root.page, &chunks, extractor).await;
            retried += 1;
        }

        Ok(retried)
    }

    async fn extract_page<A: Annotator>(
        page: usize,
        chunks: &[Chunk],
        extractor: &mut Extractor<A>,
    ) -> PageRoot {
        let extraction = extractor.extract_chunks(chunks).await;
        let root = PageRoot::from_extraction(page, extraction);

        if root.failed {
            tracing::warn!(page, chunks = chunks.len(), "Every extraction call for the page failed");
        } else {
            tracing::info!(page, entities = root.children.len(), "Page extracted");
        }
        root
    }

    /// Rebuild the transient id index over the whole forest.
    ///
    /// Runs once after every load; nothing it produces is persisted.
    fn relink(&mut self) {
        fn visit(
            entity: &Entity,
            path: NodePath,
            locator: &mut HashMap<NodeId, NodePath>,
        ) {
            if entity.depth != path.indices.len() {
                tracing::warn!(
                    entity = %entity.name,
                    stored = entity.depth,
                    actual = path.indices.len(),
                    "Stored depth disagrees with tree position"
                );
            }
            for (i, child) in entity.children().iter().enumerate() {
                let mut indices = path.indices.clone();
                indices.push(i);
                visit(child, NodePath { page: path.page, indices }, locator);
            }
            locator.insert(entity.id, path);
        }

        self.locator.clear();
        self.closed.clear();

        for root in &self.roots {
            self.locator.insert(
                root.id,
                NodePath {
                    page: root.page,
                    indices: Vec::new(),
                },
            );
            for (i, child) in root.children.iter().enumerate() {
                let path = NodePath {
                    page: root.page,
                    indices: vec![i],
                };
                visit(child, path, &mut self.locator);
            }
            if let Some(path) = root.find_repeated_name() {
                tracing::warn!(page = root.page, path = ?path, "Entity name repeats along a path");
            }
        }
    }

    fn entity_mut(&mut self, path: &NodePath) -> Option<&mut Entity> {
        let (last, init) = path.indices.split_last()?;
        let mut siblings = &mut self.roots.get_mut(path.page)?.children;
        for &i in init {
            siblings = siblings.get_mut(i)?.children.as_mut()?;
        }
        siblings.get_mut(*last)
    }

    pub fn entity(&self, id: NodeId) -> Option<&Entity> {
        let path = self.locator.get(&id)?;
        let (last, init) = path.indices.split_last()?;
        let mut siblings = self.roots.get(path.page)?.children.as_slice();
        for &i in init {
            siblings = siblings.get(i)?.children();
        }
        siblings.get(*last)
    }

    /// Expand one entity and persist the forest before returning.
    ///
    /// Re-expanding only reopens the node. A failed save does not undo the
    /// expansion; it is reported as a warning.
    pub async fn expand<A: Annotator>(
        &mut self,
        id: NodeId,
        extractor: &mut Extractor<A>,
    ) -> Result<ExpandReport, ForestError> {
        let path = self.locator.get(&id).cloned().ok_or(ForestError::UnknownNode(id))?;
        self.closed.remove(&id);

        if path.indices.is_empty() {
            return Ok(ExpandReport {
                outcome: ExpandOutcome::AlreadyExpanded,
                warning: None,
            });
        }

        let entity = self.entity_mut(&path).ok_or(ForestError::UnknownNode(id))?;
        let outcome = entity.expand(extractor).await;
        let child_ids: Vec<NodeId> = entity.children().iter().map(|c| c.id).collect();

        let mut warning = None;
        if let ExpandOutcome::Expanded { .. } = outcome {
            for (i, child_id) in child_ids.into_iter().enumerate() {
                let mut indices = path.indices.clone();
                indices.push(i);
                self.locator.insert(
                    child_id,
                    NodePath {
                        page: path.page,
                        indices,
                    },
                );
            }

            if let Err(e) = self.save() {
                tracing::warn!(error = %e, "Expansion kept in memory but not persisted");
                warning = Some(e.to_string());
            }
        }

        Ok(ExpandReport { outcome, warning })
    }

    /// Hide a node's children in the view. Data is untouched.
    pub fn close(&mut self, id: NodeId) -> Result<(), ForestError> {
        if !self.locator.contains_key(&id) {
            return Err(ForestError::UnknownNode(id));
        }
        self.closed.insert(id);
        Ok(())
    }

    /// Move one page forward or back, clamped to the paper.
    ///
    /// The previous page's view state is discarded; its entities are not.
    pub fn navigate(&mut self, direction: Direction) -> usize {
        let previous = self.current;
        self.current = match direction {
            Direction::Next => (self.current + 1).min(self.roots.len().saturating_sub(1)),
            Direction::Previous => self.current.saturating_sub(1),
        };
        self.closed.clear();

        tracing::debug!(from = previous, to = self.current, "Navigated");
        self.current
    }

    /// Write the whole forest to the entity cache.
    pub fn save(&self) -> Result<(), ForestError> {
        tracing::info!(path = %self.store.path().display(), "Saving entity cache");
        self.store.save(&self.filename, &self.roots)
    }

    /// Render missing page images; failures become notices.
    pub async fn cache_images(&mut self, renderer: Arc<dyn PageRenderer>, zoom: f32) {
        if let Err(e) = ingest::ensure_image_cache(
            &self.source_path,
            &self.paths.image_dir,
            self.roots.len(),
            zoom,
            renderer,
        )
        .await
        {
            tracing::warn!(error = %e, "Page image cache unavailable");
            self.notices.push(format!("{:#}", e));
        }
    }

    pub fn view(&self) -> PageView {
        let image = ingest::page_image_path(&self.paths.image_dir, self.current);

        PageView {
            filename: self.filename.clone(),
            page: self.current,
            page_count: self.roots.len(),
            image: image.exists().then_some(image),
            root: match self.roots.get(self.current) {
                Some(root) => NodeView::of_root(root, &self.closed),
                // a paper without pages still gets an empty root to draw
                None => NodeView::of_root(&PageRoot::from_extraction(0, Default::default()), &self.closed),
            },
        }
    }

    /// Warnings for the user gathered since the last call.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn paths(&self) -> &PaperPaths {
        &self.paths
    }

    pub fn page_count(&self) -> usize {
        self.roots.len()
    }

    pub fn current_page(&self) -> usize {
        self.current
    }

    pub fn roots(&self) -> &[PageRoot] {
        &self.roots
    }
}
