//! Scripted in-memory annotator for tests.

use extract::{Annotation, Annotator, ExtractError, Extractor};
use ingest::Chunker;
use std::collections::{HashMap, HashSet};

/// Replies by exact chunk text. Unknown text annotates to nothing.
#[derive(Default)]
pub(crate) struct MapAnnotator {
    replies: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    pub calls: Vec<String>,
}

impl MapAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, text: &str, labels: &[&str]) -> Self {
        self.replies
            .insert(text.to_string(), labels.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn fail(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }
}

/// Abstract text the scripted annotator attaches to `label`.
pub(crate) fn summary_of(label: &str) -> String {
    format!("{} abstract", label)
}

impl Annotator for MapAnnotator {
    async fn annotate(&mut self, text: &str) -> Result<Vec<Annotation>, ExtractError> {
        self.calls.push(text.to_string());

        if self.failing.contains(text) {
            return Err(ExtractError::Malformed {
                reason: "missing `annotations` field".into(),
                raw: r#"{"error":true}"#.into(),
            });
        }

        Ok(self
            .replies
            .get(text)
            .into_iter()
            .flatten()
            .map(|label| Annotation {
                label: label.clone(),
                uri: format!("https://en.wikipedia.org/wiki/{}", label.replace(' ', "_")),
                summary: summary_of(label),
                confidence: Some(0.9),
            })
            .collect())
    }
}

pub(crate) fn extractor(annotator: MapAnnotator) -> Extractor<MapAnnotator> {
    Extractor::new(annotator, Chunker::default())
}
