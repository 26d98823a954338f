use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub chunk_id: String,
    pub text: String,
    pub offset: (usize, usize), // [start, end) character positions
}

impl Chunk {
    pub fn new(index: usize, text: String, offset: (usize, usize)) -> Self {
        // Generate stable chunk_id from content
        let chunk_id = Self::generate_chunk_id(&text, offset);

        Self {
            index,
            chunk_id,
            text,
            offset,
        }
    }

    fn generate_chunk_id(text: &str, offset: (usize, usize)) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(offset.0.to_string().as_bytes());
        hasher.update(offset.1.to_string().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..8]) // first 8 bytes is plenty for log correlation
    }

    /// Length in characters, not bytes.
    pub fn char_len(&self) -> usize {
        self.offset.1 - self.offset.0
    }
}
