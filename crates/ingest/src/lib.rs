pub mod chunk;
pub mod chunker;
pub mod reader;
pub mod render;

pub use chunk::Chunk;
pub use chunker::{Chunker, ChunkerConfig, DEFAULT_MAX_CHARS};
pub use reader::{list_papers, PageSource, PdfDocument};
pub use render::{ensure_image_cache, page_image_path, PageRenderer, PdftoppmRenderer};

use anyhow::Result;

/// Read every page of a source and split each into chunks.
pub fn chunk_pages(source: &dyn PageSource, chunker: &Chunker) -> Result<Vec<Vec<Chunk>>> {
    let mut pages = Vec::with_capacity(source.page_count());

    for index in 0..source.page_count() {
        let text = source.page_text(index)?;
        pages.push(chunker.chunk_text(&text));
    }

    Ok(pages)
}
