use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::error::ExtractError;

/// One entity mention as returned by the annotation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub label: String,
    pub uri: String,
    pub summary: String,
    pub confidence: Option<f64>,
}

/// Reference data carried by an extracted entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub url: String,
    pub summary: String,
}

/// Union of every chunk of one logical extraction scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    pub entities: BTreeMap<String, EntityRef>,
    pub chunks: usize,
    pub failed_chunks: usize,
}

impl Extraction {
    /// Fold one chunk's annotations in. First occurrence of a name wins.
    pub fn absorb(&mut self, annotations: Vec<Annotation>) {
        for a in annotations {
            self.entities.entry(a.label).or_insert(EntityRef {
                url: a.uri,
                summary: a.summary,
            });
        }
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.entities.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Every chunk was sent and every one of them failed.
    pub fn all_failed(&self) -> bool {
        self.chunks > 0 && self.failed_chunks == self.chunks
    }
}

// Wire format. Every field optional: the response is untrusted.
#[derive(Deserialize)]
struct NexResponse {
    annotations: Option<Vec<RawAnnotation>>,
}

#[derive(Deserialize)]
struct RawAnnotation {
    label: Option<String>,
    uri: Option<String>,
    #[serde(rename = "abstract")]
    summary: Option<String>,
    confidence: Option<f64>,
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Trim and collapse internal whitespace runs.
pub fn clean_label(label: &str) -> String {
    whitespace().replace_all(label.trim(), " ").into_owned()
}

/// Parse an annotation response body.
///
/// A body that is not JSON or lacks `annotations` is malformed. Individual
/// annotations missing a label, uri or abstract are skipped, as are those
/// reported below `min_confidence`.
pub fn parse_annotations(body: &str, min_confidence: f64) -> Result<Vec<Annotation>, ExtractError> {
    let response: NexResponse = serde_json::from_str(body).map_err(|_| ExtractError::Malformed {
        reason: "response is not a JSON object".to_string(),
        raw: body.to_string(),
    })?;

    let raw = response.annotations.ok_or_else(|| ExtractError::Malformed {
        reason: "missing `annotations` field".to_string(),
        raw: body.to_string(),
    })?;

    let mut annotations = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;

    for item in raw {
        let (Some(label), Some(uri), Some(summary)) = (item.label, item.uri, item.summary) else {
            skipped += 1;
            continue;
        };

        if item.confidence.is_some_and(|c| c < min_confidence) {
            continue;
        }

        let label = clean_label(&label);
        if label.is_empty() {
            skipped += 1;
            continue;
        }

        annotations.push(Annotation {
            label,
            uri,
            summary,
            confidence: item.confidence,
        });
    }

    if skipped > 0 {
        tracing::warn!(skipped, "Skipped incomplete annotations");
    }

    Ok(annotations)
}
