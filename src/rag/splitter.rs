//! Recursive character splitter.
//!
//! Text is cut at the highest-priority separator it contains; pieces that
//! are still too long are cut again with the next separators, down to single
//! characters. Pieces that fit are merged greedily into chunks, and the tail
//! of each chunk is carried into the next one as overlap.

use std::collections::VecDeque;

use crate::core::config::ChunkingSettings;
use crate::core::errors::ApiError;

/// Separators in priority order. Character slicing follows the last one.
pub const DEFAULT_SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "? ", "! ", " "];

/// Configuration for the splitter.
#[derive(Debug, Clone)]
pub struct SplitterConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks, at most
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self::new(500, 100)
    }
}

impl SplitterConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.chunk_size == 0 {
            return Err(ApiError::BadRequest(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ApiError::BadRequest(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl From<&ChunkingSettings> for SplitterConfig {
    fn from(settings: &ChunkingSettings) -> Self {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    pub fn new(config: SplitterConfig) -> Result<Self, ApiError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Split text into trimmed, non-empty, overlapping chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        let separators: Vec<&str> = self
            .config
            .separators
            .iter()
            .map(String::as_str)
            .filter(|sep| !sep.is_empty())
            .collect();
        self.split_recursive(text, &separators)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();

        let position = separators.iter().position(|sep| text.contains(sep));
        let (pieces, remaining): (Vec<&str>, &[&str]) = match position {
            Some(idx) => (
                split_keeping_separator(text, separators[idx]),
                &separators[idx + 1..],
            ),
            None => (split_chars(text), &[]),
        };

        let mut pending: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) <= self.config.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            // Only reachable with a separator, since single chars always fit.
            chunks.extend(self.split_recursive(piece, remaining));
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }

        chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > size && !window.is_empty() {
                push_chunk(&mut chunks, &window);

                while total > overlap || (total + len > size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += len;
        }

        push_chunk(&mut chunks, &window);
        chunks
    }
}

fn push_chunk(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split after every occurrence of `separator`, keeping it on the left piece.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    text.split_inclusive(separator)
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn split_chars(text: &str) -> Vec<&str> {
    text.char_indices()
        .map(|(idx, ch)| &text[idx..idx + ch.len_utf8()])
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
