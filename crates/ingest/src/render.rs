use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// Rasterizes a single PDF page to a PNG file.
pub trait PageRenderer: Send + Sync {
    fn render_page(&self, pdf: &Path, page: usize, zoom: f32, dest: &Path) -> Result<()>;
}

/// Renders through poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    program: String,
}

impl PdftoppmRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn render_page(&self, pdf: &Path, page: usize, zoom: f32, dest: &Path) -> Result<()> {
        // pdftoppm pages are 1-based and it appends ".png" itself
        let page_arg = (page + 1).to_string();
        let dpi = (72.0 * zoom.max(0.1)).round() as u32;
        let stem = dest.with_extension("");

        let output = Command::new(&self.program)
            .args(["-png", "-singlefile", "-r"])
            .arg(dpi.to_string())
            .args(["-f", page_arg.as_str(), "-l", page_arg.as_str()])
            .arg(pdf)
            .arg(&stem)
            .output()
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} failed on page {}: {}",
                self.program,
                page,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(())
    }
}

pub fn page_image_path(image_dir: &Path, page: usize) -> PathBuf {
    image_dir.join(format!("page-{}.png", page))
}

/// Make sure every page has a rendered image in `image_dir`.
///
/// Only pages without an image file are rendered, so a directory left
/// half-built by an interrupted run is completed on the next call. A page that
/// fails to render is logged and skipped. Rendering runs on the blocking pool.
pub async fn ensure_image_cache(
    pdf: &Path,
    image_dir: &Path,
    page_count: usize,
    zoom: f32,
    renderer: Arc<dyn PageRenderer>,
) -> Result<usize> {
    let pdf = pdf.to_path_buf();
    let image_dir = image_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        fill_image_cache(&pdf, &image_dir, page_count, zoom, renderer.as_ref())
    })
    .await
    .context("Page rendering task panicked")?
}

fn fill_image_cache(
    pdf: &Path,
    image_dir: &Path,
    page_count: usize,
    zoom: f32,
    renderer: &dyn PageRenderer,
) -> Result<usize> {
    let missing: Vec<usize> = (0..page_count)
        .filter(|&page| !page_image_path(image_dir, page).exists())
        .collect();

    if missing.is_empty() {
        tracing::debug!(dir = %image_dir.display(), "Reusing page image cache");
        return Ok(0);
    }

    std::fs::create_dir_all(image_dir)
        .with_context(|| format!("Failed to create image cache: {:?}", image_dir))?;

    let mut rendered = 0;
    for &page in &missing {
        let dest = page_image_path(image_dir, page);
        match renderer.render_page(pdf, page, zoom, &dest) {
            Ok(()) => rendered += 1,
            Err(e) => tracing::warn!(page, error = %e, "Page render failed"),
        }
    }

    tracing::info!(
        dir = %image_dir.display(),
        rendered,
        missing = missing.len(),
        page_count,
        "Page image cache built"
    );
    Ok(rendered)
}
