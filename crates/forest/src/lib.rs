//! The entity expansion forest of a paper.
//!
//! Each page of a paper owns a [`PageRoot`] whose children are the entities
//! extracted from that page. Any entity can be expanded once, on demand, by
//! extracting entities from its own abstract; names already seen on the path
//! from the page root are suppressed. The whole forest is persisted after
//! every expansion.

pub mod client;
pub mod entity;
pub mod error;
pub mod paper;
pub mod store;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{LibraryConfig, PaperClient};
pub use entity::{Entity, ExpandOutcome, NodeId, PageRoot};
pub use error::ForestError;
pub use paper::{Direction, ExpandReport, Paper, PaperPaths};
pub use store::{ForestStore, LoadedForest};
pub use view::{NodeView, PageView};
