use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Where a paper's page count and per-page plain text come from.
pub trait PageSource: Send + Sync {
    fn page_count(&self) -> usize;

    fn page_text(&self, index: usize) -> Result<String>;
}

/// A PDF whose page texts were read once at open time.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    path: PathBuf,
    pages: Vec<String>,
}

impl PdfDocument {
    pub async fn open(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        if !extension.eq_ignore_ascii_case("pdf") {
            anyhow::bail!("Unsupported file format: {}", extension);
        }

        let owned = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_by_pages(&owned).map_err(|e| e.to_string())
        })
        .await
        .context("PDF text extraction task panicked")?
        .map_err(|e| anyhow::anyhow!("Failed to read PDF {:?}: {}", path, e))?;

        tracing::info!(path = %path.display(), pages = pages.len(), "Opened PDF");

        Ok(Self {
            path: path.to_path_buf(),
            pages,
        })
    }

    /// Build a document from already extracted page texts.
    pub fn from_pages(path: impl Into<PathBuf>, pages: Vec<String>) -> Self {
        Self {
            path: path.into(),
            pages,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PageSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, index: usize) -> Result<String> {
        self.pages.get(index).cloned().with_context(|| {
            format!(
                "Page {} out of range for {:?} ({} pages)",
                index,
                self.path,
                self.pages.len()
            )
        })
    }
}

/// File names of every PDF directly inside `dir`, sorted.
pub async fn list_papers(dir: &Path) -> Result<Vec<String>> {
    let mut papers = Vec::new();

    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read paper directory: {:?}", dir))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        if path.is_file() {
            let is_pdf = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
            if let (true, Some(name)) = (is_pdf, path.file_name().and_then(|n| n.to_str())) {
                papers.push(name.to_string());
            }
        }
    }

    papers.sort();
    Ok(papers)
}
