use extract::{Annotator, Extractor, UsageSnapshot};
use ingest::{PageRenderer, PageSource, PdfDocument};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::entity::NodeId;
use crate::error::ForestError;
use crate::paper::{Direction, ExpandReport, Paper, PaperPaths};
use crate::view::PageView;

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub papers_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub zoom: f32,
}

/// Session coordinator: at most one active paper at a time.
pub struct PaperClient<A> {
    library: LibraryConfig,
    extractor: Extractor<A>,
    renderer: Option<Arc<dyn PageRenderer>>,
    active: Option<Paper>,
}

impl<A: Annotator> PaperClient<A> {
    pub fn new(library: LibraryConfig, extractor: Extractor<A>) -> Self {
        Self {
            library,
            extractor,
            renderer: None,
            active: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub async fn available_papers(&self) -> Result<Vec<String>, ForestError> {
        ingest::list_papers(&self.library.papers_dir)
            .await
            .map_err(|e| ForestError::Document {
                filename: self.library.papers_dir.display().to_string(),
                reason: format!("{:#}", e),
            })
    }

    /// Open a PDF from the papers directory and make it the active paper.
    pub async fn select(&mut self, filename: &str) -> Result<&mut Paper, ForestError> {
        validate_filename(filename)?;

        let path = self.library.papers_dir.join(filename);
        let document = PdfDocument::open(&path)
            .await
            .map_err(|e| ForestError::Document {
                filename: filename.to_string(),
                reason: format!("{:#}", e),
            })?;

        self.select_with_source(filename, &document).await
    }

    /// Make `filename` the active paper, reading pages from `source`.
    ///
    /// The outgoing paper is saved first. If that save fails the switch is
    /// refused and the outgoing paper stays active.
    pub async fn select_with_source(
        &mut self,
        filename: &str,
        source: &dyn PageSource,
    ) -> Result<&mut Paper, ForestError> {
        validate_filename(filename)?;

        if let Some(outgoing) = &self.active {
            outgoing.save()?;
            tracing::info!(filename = outgoing.filename(), "Saved outgoing paper");
        }

        let paths = PaperPaths::derive(&self.library.cache_dir, filename);
        let source_path = self.library.papers_dir.join(filename);
        let mut paper =
            Paper::open(filename, source_path, paths, source, &mut self.extractor).await?;

        if let Some(renderer) = &self.renderer {
            paper.cache_images(Arc::clone(renderer), self.library.zoom).await;
        }

        tracing::info!(filename, pages = paper.page_count(), "Paper active");
        Ok(self.active.insert(paper))
    }

    pub fn active(&self) -> Option<&Paper> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Result<&mut Paper, ForestError> {
        self.active.as_mut().ok_or(ForestError::NoActivePaper)
    }

    pub fn view(&self) -> Result<PageView, ForestError> {
        self.active()
            .map(Paper::view)
            .ok_or(ForestError::NoActivePaper)
    }

    pub fn navigate(&mut self, direction: Direction) -> Result<PageView, ForestError> {
        let paper = self.active_mut()?;
        paper.navigate(direction);
        Ok(paper.view())
    }

    pub async fn expand(&mut self, id: NodeId) -> Result<ExpandReport, ForestError> {
        let paper = self.active.as_mut().ok_or(ForestError::NoActivePaper)?;
        paper.expand(id, &mut self.extractor).await
    }

    pub fn close(&mut self, id: NodeId) -> Result<PageView, ForestError> {
        let paper = self.active_mut()?;
        paper.close(id)?;
        Ok(paper.view())
    }

    pub fn save(&self) -> Result<(), ForestError> {
        self.active()
            .ok_or(ForestError::NoActivePaper)?
            .save()
    }

    pub fn usage(&self) -> Option<UsageSnapshot> {
        self.extractor.usage()
    }

    /// Save and drop the active paper, if any.
    pub fn shutdown(&mut self) -> Result<(), ForestError> {
        if let Some(paper) = &self.active {
            paper.save()?;
            tracing::info!(filename = paper.filename(), "Saved paper on shutdown");
        }
        self.active = None;
        Ok(())
    }

    pub fn papers_dir(&self) -> &Path {
        &self.library.papers_dir
    }
}

// Only bare file names inside the papers directory are accepted.
fn validate_filename(filename: &str) -> Result<(), ForestError> {
    let path = Path::new(filename);
    let bare = path.file_name().and_then(|n| n.to_str()) == Some(filename);

    if filename.is_empty() || !bare || filename == ".." {
        return Err(ForestError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}
