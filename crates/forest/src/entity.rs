use extract::{Annotator, EntityRef, Extraction, Extractor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Stable address of a node, independent of its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A named concept extracted from text, expandable into further entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: NodeId,
    pub name: String,
    pub url: String,
    /// Description text; also the input of this entity's own expansion.
    #[serde(rename = "abstract")]
    pub summary: String,
    pub depth: usize,
    /// Names already seen on the path from the page root down to here.
    pub found: BTreeSet<String>,
    /// `None` until expanded. An expansion that finds nothing new leaves
    /// `Some(vec![])`, which is final.
    pub children: Option<Vec<Entity>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExpandOutcome {
    Expanded { added: usize },
    AlreadyExpanded,
    /// Every remote call for the abstract failed; the entity stays unexpanded.
    Failed,
}

impl Entity {
    pub fn new(name: String, reference: EntityRef, depth: usize, found: BTreeSet<String>) -> Self {
        Self {
            id: NodeId::new(),
            name,
            url: reference.url,
            summary: reference.summary,
            depth,
            found,
            children: None,
        }
    }

    pub fn is_expanded(&self) -> bool {
        self.children.is_some()
    }

    pub fn children(&self) -> &[Entity] {
        self.children.as_deref().unwrap_or_default()
    }

    /// Run extraction over this entity's abstract and adopt whatever is new.
    ///
    /// The abstract is one extraction scope: all of its chunks are unioned
    /// before names already in `found` are dropped. Once children are set
    /// they never change, so a second call performs no remote work.
    pub async fn expand<A: Annotator>(&mut self, extractor: &mut Extractor<A>) -> ExpandOutcome {
        if self.is_expanded() {
            return ExpandOutcome::AlreadyExpanded;
        }

        tracing::info!(entity = %self.name, depth = self.depth, "Expanding entity");
        let extraction = extractor.extract_scope(&self.summary).await;

        if extraction.all_failed() {
            tracing::warn!(entity = %self.name, "Every extraction call failed, leaving entity unexpanded");
            return ExpandOutcome::Failed;
        }

        let (children, _) = spawn_children(extraction, &self.found, self.depth + 1);
        let added = children.len();
        tracing::info!(entity = %self.name, added, "Entity expanded");

        self.children = Some(children);
        ExpandOutcome::Expanded { added }
    }

    /// Number of entities in this subtree, self included.
    pub fn subtree_len(&self) -> usize {
        1 + self.children().iter().map(Entity::subtree_len).sum::<usize>()
    }
}

/// Turn an extraction into child entities at `depth`.
///
/// Names already in `found` are dropped; the survivors are merged into a new
/// ledger and every child receives its own copy of it. Children come back
/// ordered by name.
pub(crate) fn spawn_children(
    extraction: Extraction,
    found: &BTreeSet<String>,
    depth: usize,
) -> (Vec<Entity>, BTreeSet<String>) {
    let fresh: Vec<(String, EntityRef)> = extraction
        .entities
        .into_iter()
        .filter(|(name, _)| !found.contains(name))
        .collect();

    let mut ledger = found.clone();
    ledger.extend(fresh.iter().map(|(name, _)| name.clone()));

    let children = fresh
        .into_iter()
        .map(|(name, reference)| Entity::new(name, reference, depth, ledger.clone()))
        .collect();

    (children, ledger)
}

/// Synthetic depth-0 node holding everything extracted from one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRoot {
    pub id: NodeId,
    pub page: usize,
    pub found: BTreeSet<String>,
    pub children: Vec<Entity>,
    /// Every extraction call for the page failed. Such pages are extracted
    /// again the next time the paper is opened.
    #[serde(default)]
    pub failed: bool,
}

impl PageRoot {
    /// Build the root for `page`; its ledger is seeded from the page's own names.
    pub fn from_extraction(page: usize, extraction: Extraction) -> Self {
        let failed = extraction.all_failed();
        let (children, found) = spawn_children(extraction, &BTreeSet::new(), 1);

        Self {
            id: NodeId::new(),
            page,
            found,
            children,
            failed,
        }
    }

    pub fn label(&self) -> String {
        format!("Page {}", self.page + 1)
    }

    pub fn entity_count(&self) -> usize {
        self.children.iter().map(Entity::subtree_len).sum()
    }

    /// First root-to-leaf path on which some name occurs twice.
    pub fn find_repeated_name(&self) -> Option<Vec<String>> {
        fn walk(entity: &Entity, path: &mut Vec<String>) -> Option<Vec<String>> {
            let repeated = path.contains(&entity.name);
            path.push(entity.name.clone());
            if repeated {
                return Some(path.clone());
            }

            for child in entity.children() {
                if let Some(hit) = walk(child, path) {
                    return Some(hit);
                }
            }

            path.pop();
            None
        }

        let mut path = Vec::new();
        self.children.iter().find_map(|child| walk(child, &mut path))
    }
}
