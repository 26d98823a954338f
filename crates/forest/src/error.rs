use std::path::PathBuf;
use thiserror::Error;

use crate::entity::NodeId;

#[derive(Debug, Error)]
pub enum ForestError {
    #[error("no entity with id {0}")]
    UnknownNode(NodeId),

    #[error("no paper is open")]
    NoActivePaper,

    #[error("invalid paper file name: {0:?}")]
    InvalidFilename(String),

    #[error("failed to read paper {filename}: {reason}")]
    Document { filename: String, reason: String },

    #[error("failed to write entity cache {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode entity forest: {0}")]
    Encode(#[from] serde_json::Error),
}
