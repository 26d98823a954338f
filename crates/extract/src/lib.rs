pub mod dandelion;
pub mod error;
pub mod schema;
pub mod usage;

pub use dandelion::{DandelionClient, DandelionConfig, TOKEN_ENV};
pub use error::ExtractError;
pub use schema::{Annotation, EntityRef, Extraction};
pub use usage::{UsageMeter, UsageSnapshot};

use ingest::{Chunk, Chunker};
use std::future::Future;

/// A remote entity annotation service: one call per chunk of text.
pub trait Annotator: Send + Sync {
    fn annotate(
        &mut self,
        text: &str,
    ) -> impl Future<Output = Result<Vec<Annotation>, ExtractError>> + Send;

    /// Quota consumption so far, if the service reports any.
    fn usage(&self) -> Option<UsageSnapshot> {
        None
    }
}

pub struct Extractor<A> {
    annotator: A,
    chunker: Chunker,
}

impl<A: Annotator> Extractor<A> {
    pub fn new(annotator: A, chunker: Chunker) -> Self {
        Self { annotator, chunker }
    }

    /// Extract entities from one logical scope of text (a page or an abstract).
    ///
    /// Oversized text is chunked first and every chunk's result is unioned.
    pub async fn extract_scope(&mut self, text: &str) -> Extraction {
        let chunks = self.chunker.chunk_text(text);
        self.extract_chunks(&chunks).await
    }

    /// Annotate already chunked text as a single scope.
    ///
    /// A failing chunk is logged and contributes nothing; the remaining chunks
    /// still run. Nothing is retried.
    pub async fn extract_chunks(&mut self, chunks: &[Chunk]) -> Extraction {
        let mut extraction = Extraction::default();

        for chunk in chunks {
            extraction.chunks += 1;

            match self.annotator.annotate(&chunk.text).await {
                Ok(annotations) => {
                    tracing::debug!(
                        chunk_id = %chunk.chunk_id,
                        found = annotations.len(),
                        "Chunk annotated"
                    );
                    extraction.absorb(annotations);
                }
                Err(e) => {
                    extraction.failed_chunks += 1;
                    tracing::warn!(
                        chunk_id = %chunk.chunk_id,
                        chunk_index = chunk.index,
                        error = %e,
                        raw = e.raw_body().unwrap_or(""),
                        "Chunk extraction failed, treating as empty"
                    );
                }
            }
        }

        extraction
    }

    pub fn usage(&self) -> Option<UsageSnapshot> {
        self.annotator.usage()
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    pub fn annotator(&self) -> &A {
        &self.annotator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest::ChunkerConfig;

    /// Answers by chunk position; `None` simulates a malformed response.
    struct ScriptedAnnotator {
        replies: Vec<Option<Vec<&'static str>>>,
        calls: usize,
    }

    impl Annotator for ScriptedAnnotator {
        async fn annotate(&mut self, _text: &str) -> Result<Vec<Annotation>, ExtractError> {
            let reply = self.replies.get(self.calls).cloned().flatten();
            self.calls += 1;

            match reply {
                Some(labels) => Ok(labels
                    .into_iter()
                    .map(|l| Annotation {
                        label: l.to_string(),
                        uri: format!("uri:{}", l),
                        summary: format!("about {}", l),
                        confidence: None,
                    })
                    .collect()),
                None => Err(ExtractError::Malformed {
                    reason: "missing `annotations` field".into(),
                    raw: "{}".into(),
                }),
            }
        }
    }

    fn extractor(replies: Vec<Option<Vec<&'static str>>>) -> Extractor<ScriptedAnnotator> {
        Extractor::new(
            ScriptedAnnotator { replies, calls: 0 },
            Chunker::new(ChunkerConfig { max_chars: 5 }),
        )
    }

    #[tokio::test]
    async fn test_chunks_are_unioned() {
        let mut extractor = extractor(vec![Some(vec!["A", "B"]), Some(vec!["B", "C"])]);

        let extraction = extractor.extract_scope("0123456789").await;

        assert_eq!(extractor.annotator().calls, 2);
        assert_eq!(extraction.chunks, 2);
        assert_eq!(extraction.failed_chunks, 0);
        let names: Vec<_> = extraction.names().into_iter().collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_malformed_chunk_does_not_stop_siblings() {
        let mut extractor = extractor(vec![None, Some(vec!["C"]), None]);

        let extraction = extractor.extract_scope("0123456789ab").await;

        assert_eq!(extractor.annotator().calls, 3);
        assert_eq!(extraction.failed_chunks, 2);
        assert!(!extraction.all_failed());
        assert_eq!(extraction.names().len(), 1);
        assert!(extraction.entities.contains_key("C"));
    }

    #[tokio::test]
    async fn test_single_malformed_call_is_empty() {
        let mut extractor = extractor(vec![None]);

        let extraction = extractor.extract_scope("tiny").await;

        assert!(extraction.is_empty());
        assert!(extraction.all_failed());
    }

    #[tokio::test]
    async fn test_blank_scope_makes_no_calls() {
        let mut extractor = extractor(vec![Some(vec!["A"])]);

        let extraction = extractor.extract_scope("   ").await;

        assert_eq!(extractor.annotator().calls, 0);
        assert!(extraction.is_empty());
        assert!(!extraction.all_failed());
        assert!(extractor.usage().is_none());
    }
}
