use crate::error::IngestError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Words and standalone punctuation marks, so `"Hello, world."` yields four tokens.
pub const DEFAULT_WORD_PATTERN: &str = r"\w+(?:[-'’]\w+)*|[^\w\s]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 300,
            overlap: 50,
        }
    }
}

impl ChunkingConfig {
    /// Distance between consecutive window starts. Never zero.
    pub fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }
}

/// A window over the document's word sequence; `end_word` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub start_word: usize,
    pub end_word: usize,
}

impl Chunk {
    pub fn word_count(&self) -> usize {
        self.end_word - self.start_word
    }
}

pub trait Tokenizer {
    fn tokenize<'a>(&self, text: &'a str) -> Result<Vec<&'a str>, IngestError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize<'a>(&self, text: &'a str) -> Result<Vec<&'a str>, IngestError> {
        Ok(text.split_whitespace().collect())
    }
}

/// Regex-driven tokenizer. The pattern is compiled on first use, so a bad
/// pattern surfaces as [`IngestError::Tokenization`] from `tokenize`.
#[derive(Debug)]
pub struct RegexTokenizer {
    pattern: String,
    compiled: OnceLock<Result<Regex, regex::Error>>,
}

impl RegexTokenizer {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            compiled: OnceLock::new(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Default for RegexTokenizer {
    fn default() -> Self {
        Self::new(DEFAULT_WORD_PATTERN)
    }
}

impl Tokenizer for RegexTokenizer {
    fn tokenize<'a>(&self, text: &'a str) -> Result<Vec<&'a str>, IngestError> {
        let regex = self
            .compiled
            .get_or_init(|| Regex::new(&self.pattern))
            .as_ref()
            .map_err(|error| IngestError::from(error.clone()))?;
        Ok(regex.find_iter(text).map(|found| found.as_str()).collect())
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct Chunker {
    config: ChunkingConfig,
    tokenizer: Box<dyn Tokenizer + Send + Sync>,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            config,
            tokenizer: Box::new(RegexTokenizer::default()),
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: impl Tokenizer + Send + Sync + 'static) -> Self {
        self.tokenizer = Box::new(tokenizer);
        self
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn chunk(&self, text: &str) -> Result<Vec<Chunk>, IngestError> {
        if self.config.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Err(IngestError::EmptyContent(
                "No content available for chunking.".to_string(),
            ));
        }

        let words = self.tokenizer.tokenize(text)?;
        if words.is_empty() {
            return Err(IngestError::EmptyContent(
                "Tokenization failed, no words found.".to_string(),
            ));
        }

        let step = self.config.step();
        let mut chunks = Vec::with_capacity(words.len().div_ceil(step));
        let mut start = 0;
        while start < words.len() {
            let end = (start + self.config.chunk_size).min(words.len());
            chunks.push(Chunk {
                text: words[start..end].join(" "),
                start_word: start,
                end_word: end,
            });
            start += step;
        }

        Ok(chunks)
    }
}

/// Chunks `text` with the default tokenizer and returns only the chunk strings.
pub fn chunk_words(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    Ok(Chunker::new(config)
        .chunk(text)?
        .into_iter()
        .map(|chunk| chunk.text)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(count: usize) -> String {
        (0..count)
            .map(|index| format!("w{index}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        assert_eq!(normalize_whitespace(input), "A lot of spacing");
    }

    #[test]
    fn non_breaking_space_is_a_separator() {
        assert_eq!(normalize_whitespace("pump\u{a0}\u{a0}seal\u{a0}"), "pump seal");
    }

    #[test]
    fn short_text_produces_single_chunk() {
        let chunks = chunk_words("just a few words", ChunkingConfig::default())
            .expect("chunking should succeed");
        assert_eq!(chunks, vec!["just a few words".to_string()]);
    }

    #[test]
    fn punctuation_is_split_into_tokens() {
        let chunks = chunk_words(
            "Hello, world. It's fine.",
            ChunkingConfig {
                chunk_size: 3,
                overlap: 1,
            },
        )
        .expect("chunking should succeed");
        assert_eq!(chunks, vec!["Hello , world", "world . It's", "It's fine .", "."]);
    }

    #[test]
    fn windows_cover_every_word_with_exact_overlap() {
        for (words, chunk_size, overlap) in [(10, 4, 1), (23, 5, 2), (7, 3, 0), (300, 50, 10), (5, 5, 4)] {
            let text = numbered_words(words);
            let config = ChunkingConfig {
                chunk_size,
                overlap,
            };
            let chunker = Chunker::new(config).with_tokenizer(WhitespaceTokenizer);
            let chunks = chunker.chunk(&text).expect("chunking should succeed");

            assert_eq!(chunks[0].start_word, 0);
            assert!(chunks.iter().any(|chunk| chunk.end_word == words));
            for pair in chunks.windows(2) {
                assert_eq!(pair[1].start_word - pair[0].start_word, chunk_size - overlap);
                if pair[0].word_count() == chunk_size {
                    assert_eq!(pair[0].end_word - pair[1].start_word, overlap);
                }
            }
            for chunk in &chunks {
                assert!(chunk.word_count() <= chunk_size);
                let expected = (chunk.start_word..chunk.end_word)
                    .map(|index| format!("w{index}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                assert_eq!(chunk.text, expected);
            }
            assert!(chunks.len() <= words.div_ceil(chunk_size - overlap));
        }
    }

    #[test]
    fn overlap_not_smaller_than_size_advances_one_word() {
        let chunker = Chunker::new(ChunkingConfig {
            chunk_size: 3,
            overlap: 5,
        })
        .with_tokenizer(WhitespaceTokenizer);
        let chunks = chunker.chunk("a b c d").expect("chunking should succeed");
        let texts: Vec<_> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["a b c", "b c d", "c d", "d"]);
    }

    #[test]
    fn empty_text_is_rejected() {
        let error = chunk_words("   \n ", ChunkingConfig::default()).unwrap_err();
        assert!(matches!(error, IngestError::EmptyContent(_)));
    }

    #[test]
    fn text_without_tokens_is_rejected() {
        let chunker = Chunker::default().with_tokenizer(RegexTokenizer::new("[0-9]+"));
        let error = chunker.chunk("no digits here").unwrap_err();
        assert!(matches!(error, IngestError::EmptyContent(_)));
    }

    #[test]
    fn invalid_token_pattern_surfaces_tokenization_error() {
        let chunker = Chunker::default().with_tokenizer(RegexTokenizer::new("(unclosed"));
        let error = chunker.chunk("some text").unwrap_err();
        assert!(matches!(error, IngestError::Tokenization(_)));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let error = chunk_words(
            "some text",
            ChunkingConfig {
                chunk_size: 0,
                overlap: 0,
            },
        )
        .unwrap_err();
        assert!(matches!(error, IngestError::InvalidChunkConfig(_)));
    }
}
