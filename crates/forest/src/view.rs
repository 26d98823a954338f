use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::entity::{Entity, NodeId, PageRoot};

/// What the host UI needs to draw the current page.
#[derive(Debug, Clone, Serialize)]
pub struct PageView {
    pub filename: String,
    pub page: usize,
    pub page_count: usize,
    pub image: Option<PathBuf>,
    pub root: NodeView,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub id: NodeId,
    pub name: String,
    pub url: String,
    #[serde(rename = "abstract")]
    pub summary: String,
    pub depth: usize,
    pub expanded: bool,
    pub open: bool,
    /// Only listed when the node is open.
    pub children: Vec<NodeView>,
}

impl NodeView {
    pub(crate) fn of_root(root: &PageRoot, closed: &HashSet<NodeId>) -> Self {
        Self {
            id: root.id,
            name: root.label(),
            url: String::new(),
            summary: String::new(),
            depth: 0,
            expanded: true,
            open: true,
            children: root
                .children
                .iter()
                .map(|child| Self::of_entity(child, closed))
                .collect(),
        }
    }

    fn of_entity(entity: &Entity, closed: &HashSet<NodeId>) -> Self {
        let open = entity.is_expanded() && !closed.contains(&entity.id);
        let children = if open {
            entity
                .children()
                .iter()
                .map(|child| Self::of_entity(child, closed))
                .collect()
        } else {
            Vec::new()
        };

        Self {
            id: entity.id,
            name: entity.name.clone(),
            url: entity.url.clone(),
            summary: entity.summary.clone(),
            depth: entity.depth,
            expanded: entity.is_expanded(),
            open,
            children,
        }
    }

    pub fn find(&self, id: NodeId) -> Option<&NodeView> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }
}
