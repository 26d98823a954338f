use crate::chunk::Chunk;

/// Practical input ceiling of the annotation service, in characters.
pub const DEFAULT_MAX_CHARS: usize = 3000;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub max_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        // A zero-width chunk would never make progress.
        let max_chars = config.max_chars.max(1);
        Self {
            config: ChunkerConfig { max_chars },
        }
    }

    pub fn max_chars(&self) -> usize {
        self.config.max_chars
    }

    /// Split text into sequential chunks of at most `max_chars` characters.
    ///
    /// Boundaries fall on `char` boundaries, never inside a UTF-8 sequence.
    /// The final chunk carries whatever remains, however short. Blank text
    /// produces no chunks at all.
    pub fn chunk_text(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut buffer = String::new();
        let mut buffer_chars = 0;
        let mut start = 0;

        for ch in text.chars() {
            buffer.push(ch);
            buffer_chars += 1;

            if buffer_chars == self.config.max_chars {
                let end = start + buffer_chars;
                chunks.push(Chunk::new(chunks.len(), std::mem::take(&mut buffer), (start, end)));
                start = end;
                buffer_chars = 0;
            }
        }

        // Flush the tail
        if buffer_chars > 0 {
            let end = start + buffer_chars;
            chunks.push(Chunk::new(chunks.len(), buffer, (start, end)));
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_limit_is_one_chunk() {
        let chunker = Chunker::default();
        let text = "a".repeat(3000);
        let chunks = chunker.chunk_text(&text);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text.chars().count(), 3000);
        assert_eq!(chunks[0].offset, (0, 3000));
    }

    #[test]
    fn test_one_over_limit_is_two_chunks() {
        let chunker = Chunker::default();
        let text = "b".repeat(3001);
        let chunks = chunker.chunk_text(&text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.chars().count(), 3000);
        assert_eq!(chunks[1].text, "b");
        assert_eq!(chunks[1].offset, (3000, 3001));
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn test_tail_is_kept() {
        let chunker = Chunker::new(ChunkerConfig { max_chars: 4 });
        let chunks = chunker.chunk_text("abcdefghij");

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "efgh", "ij"]);
        assert_eq!(texts.concat(), "abcdefghij");
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let chunker = Chunker::new(ChunkerConfig { max_chars: 3 });
        let chunks = chunker.chunk_text("αβγδ");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "αβγ");
        assert_eq!(chunks[0].char_len(), 3);
        assert_eq!(chunks[1].text, "δ");
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        let chunker = Chunker::default();
        assert!(chunker.chunk_text("").is_empty());
        assert!(chunker.chunk_text(" \n\t ").is_empty());
    }

    #[test]
    fn test_chunk_ids_are_stable() {
        let chunker = Chunker::default();
        let a = chunker.chunk_text("Quantum entanglement");
        let b = chunker.chunk_text("Quantum entanglement");

        assert_eq!(a[0].chunk_id, b[0].chunk_id);
        assert_eq!(a[0].chunk_id.len(), 16);
    }
}
