//! Recursive text splitting with overlap.
//!
//! Page text is segmented by `semchunk-rs`, which prefers the largest semantic boundary
//! available (blank lines, then lines, sentences, words) and only falls back to hard cuts when a
//! single word exceeds the budget. Overlap is then layered on top: every chunk after the first in
//! a page starts with the tail of the previous segment. Segments are sized so that the prefixed
//! result still fits within `chunk_size`.
//!
//! Length is measured in characters by default, or in BPE tokens via `tiktoken-rs`.

use super::types::{Chunk, SplitError, SplitUnit, SplitterConfig};
use crate::document::Page;
use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

/// Separators tried, coarsest first, when a segment has to be re-split.
const FIT_SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Length function shared by the semantic chunker and the overlap logic.
#[derive(Clone)]
enum Measure {
    Characters,
    Tokens(Arc<CoreBPE>),
}

impl Measure {
    fn len(&self, segment: &str) -> usize {
        match self {
            Self::Characters => segment.chars().count(),
            Self::Tokens(encoding) => encoding.encode_ordinary(segment).len(),
        }
    }

    /// Longest suffix of `text` whose length stays within `budget`.
    fn tail<'a>(&self, text: &'a str, budget: usize) -> &'a str {
        if budget == 0 {
            return "";
        }
        if let Self::Characters = self {
            let count = text.chars().count();
            if count <= budget {
                return text;
            }
            return text
                .char_indices()
                .nth(count - budget)
                .map(|(offset, _)| &text[offset..])
                .unwrap_or("");
        }

        let mut best = "";
        for (offset, _) in text.char_indices().rev() {
            let candidate = &text[offset..];
            if self.len(candidate) > budget {
                break;
            }
            best = candidate;
        }
        best
    }

}

/// Splits extracted pages into overlapping, size-bounded chunks.
#[derive(Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
    measure: Measure,
}

impl std::fmt::Debug for TextSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextSplitter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            config: SplitterConfig::default(),
            measure: Measure::Characters,
        }
    }
}

impl TextSplitter {
    /// Validate `config` and prepare the length function.
    pub fn new(config: SplitterConfig) -> Result<Self, SplitError> {
        if config.chunk_size == 0 {
            return Err(SplitError::InvalidChunkSize);
        }
        // One unit is reserved for the separator between the overlap and the new segment.
        if config.chunk_overlap > 0 && config.chunk_overlap + 2 > config.chunk_size {
            return Err(SplitError::InvalidOverlap {
                overlap: config.chunk_overlap,
                chunk_size: config.chunk_size,
            });
        }

        let measure = match &config.unit {
            SplitUnit::Characters => Measure::Characters,
            SplitUnit::Tokens { encoding } => {
                let name = encoding.trim();
                let name = if name.is_empty() { "cl100k_base" } else { name };
                let bpe = resolve_encoding(name).map_err(|source| SplitError::Tokenizer {
                    encoding: name.to_string(),
                    source,
                })?;
                Measure::Tokens(Arc::new(bpe))
            }
        };

        Ok(Self { config, measure })
    }

    /// Active configuration.
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Length of `text` in the configured unit.
    pub fn measure(&self, text: &str) -> usize {
        self.measure.len(text)
    }

    /// Split `pages` into chunks, tagging each with `source`, page number, position and hash.
    ///
    /// Pages without text yield no chunks. The same input always yields the same output.
    pub fn split(&self, source: &str, pages: &[Page]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in pages {
            if page.text.trim().is_empty() {
                tracing::trace!(source, page = page.page_number, "Skipping empty page");
                continue;
            }
            for text in self.split_text(&page.text) {
                let chunk_hash = compute_chunk_hash(&text);
                let chunk_index = chunks.len();
                chunks.push(
                    Chunk::new(text)
                        .with_metadata("source", source)
                        .with_metadata("page", page.page_number)
                        .with_metadata("chunk_index", chunk_index)
                        .with_metadata("chunk_hash", chunk_hash),
                );
            }
        }

        tracing::debug!(
            source,
            pages = pages.len(),
            chunks = chunks.len(),
            chunk_size = self.config.chunk_size,
            overlap = self.config.chunk_overlap,
            "Split document"
        );
        chunks
    }

    /// Split a single text unit.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let budget = self.segment_budget();
        let measure = self.measure.clone();
        let chunker = Chunker::new(budget, Box::new(move |segment: &str| measure.len(segment)));
        let mut segments = Vec::new();
        for segment in chunker.chunk(text) {
            self.fit_to_budget(&segment, budget, &FIT_SEPARATORS, &mut segments);
        }
        self.apply_overlap(segments)
            .into_iter()
            .filter(|chunk| !chunk.trim().is_empty())
            .collect()
    }

    fn segment_budget(&self) -> usize {
        let SplitterConfig {
            chunk_size,
            chunk_overlap,
            ..
        } = self.config;
        if chunk_overlap == 0 {
            chunk_size
        } else {
            chunk_size - chunk_overlap - 1
        }
    }

    /// Re-split `text` until every piece fits within `budget`.
    ///
    /// The semantic chunker may overshoot its budget by one split, so its segments are checked
    /// again here. Pieces are merged greedily on the coarsest separator present; a single word
    /// still over budget is cut by characters.
    fn fit_to_budget(
        &self,
        text: &str,
        budget: usize,
        separators: &[&str],
        out: &mut Vec<String>,
    ) {
        if self.measure.len(text) <= budget {
            if !text.trim().is_empty() {
                out.push(text.to_string());
            }
            return;
        }
        let Some(position) = separators.iter().position(|sep| text.contains(sep)) else {
            self.hard_cut(text, budget, out);
            return;
        };
        let separator = separators[position];
        let finer = &separators[position + 1..];

        let mut current = String::new();
        for piece in text.split(separator).filter(|piece| !piece.is_empty()) {
            let candidate = if current.is_empty() {
                piece.to_string()
            } else {
                format!("{current}{separator}{piece}")
            };
            if self.measure.len(&candidate) <= budget {
                current = candidate;
                continue;
            }
            if !current.trim().is_empty() {
                out.push(std::mem::take(&mut current));
            }
            current.clear();
            if self.measure.len(piece) <= budget {
                current = piece.to_string();
            } else {
                self.fit_to_budget(piece, budget, finer, out);
            }
        }
        if !current.trim().is_empty() {
            out.push(current);
        }
    }

    fn hard_cut(&self, text: &str, budget: usize, out: &mut Vec<String>) {
        let mut current = String::new();
        for ch in text.chars() {
            current.push(ch);
            if current.chars().count() > 1 && self.measure.len(&current) > budget {
                current.pop();
                out.push(std::mem::take(&mut current));
                current.push(ch);
            }
        }
        if !current.trim().is_empty() {
            out.push(current);
        }
    }

    fn apply_overlap(&self, segments: Vec<String>) -> Vec<String> {
        let overlap = self.config.chunk_overlap;
        if overlap == 0 {
            return segments;
        }

        let mut overlapped = Vec::with_capacity(segments.len());
        let mut previous: Option<String> = None;
        for current in segments {
            let chunk = match previous.as_deref() {
                Some(prev) => self.build_overlapped_chunk(prev, &current, overlap),
                None => current.clone(),
            };
            overlapped.push(chunk);
            previous = Some(current);
        }
        overlapped
    }

    fn build_overlapped_chunk(&self, previous: &str, current: &str, overlap: usize) -> String {
        // Segments already fit, so only the overlap tail is ever shortened.
        let mut budget = overlap;
        loop {
            let combined = join_overlap(self.measure.tail(previous, budget), current);
            if budget == 0 || self.measure.len(&combined) <= self.config.chunk_size {
                return combined;
            }
            budget -= 1;
        }
    }
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn resolve_encoding(name: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(name) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                encoding = name,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            match encoding_from_name(name) {
                Some(candidate) => candidate,
                None => {
                    tracing::warn!(
                        encoding = name,
                        "Falling back to 'cl100k_base' encoding for token counting"
                    );
                    cl100k_base()
                }
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

fn join_overlap(tail: &str, current: &str) -> String {
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);
    if !tail.is_empty() {
        combined.push_str(tail);
        if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
            combined.push(' ');
        }
    }
    combined.push_str(current);
    combined
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(chunk_size: usize, chunk_overlap: usize) -> TextSplitter {
        TextSplitter::new(SplitterConfig {
            chunk_size,
            chunk_overlap,
            unit: SplitUnit::Characters,
        })
        .expect("valid config")
    }

    fn last_chars(text: &str, count: usize) -> String {
        let chars: Vec<char> = text.chars().collect();
        chars[chars.len().saturating_sub(count)..].iter().collect()
    }

    fn words(chunks: &[String]) -> Vec<String> {
        chunks
            .iter()
            .flat_map(|chunk| chunk.split_whitespace().map(str::to_string))
            .collect()
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let error = TextSplitter::new(SplitterConfig {
            chunk_size: 0,
            ..SplitterConfig::default()
        })
        .unwrap_err();
        assert!(matches!(error, SplitError::InvalidChunkSize));
    }

    #[test]
    fn rejects_overlap_without_room_for_content() {
        let error = TextSplitter::new(SplitterConfig {
            chunk_size: 10,
            chunk_overlap: 9,
            unit: SplitUnit::Characters,
        })
        .unwrap_err();
        assert!(matches!(
            error,
            SplitError::InvalidOverlap {
                overlap: 9,
                chunk_size: 10
            }
        ));
    }

    #[test]
    fn defaults_match_document_qa_settings() {
        let config = TextSplitter::default().config().clone();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 20);
        assert_eq!(config.unit, SplitUnit::Characters);
    }

    #[test]
    fn short_text_stays_in_one_chunk() {
        let chunks = TextSplitter::default().split_text("A short handbook page.");
        assert_eq!(chunks, vec!["A short handbook page."]);
    }

    #[test]
    fn whitespace_only_text_yields_nothing() {
        assert!(splitter(10, 0).split_text(" \n\t ").is_empty());
    }

    #[test]
    fn chunks_respect_size_and_keep_every_word_without_overlap() {
        let text = "one two three four five";
        let chunks = splitter(9, 0).split_text(text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 9, "chunk too long: {chunk:?}");
        }
        let original: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        assert_eq!(words(&chunks), original);
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let text = "alpha beta gamma delta omega sigma theta kappa";
        let overlap = 3;
        let chunks = splitter(10, overlap).split_text(text);
        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 10, "chunk too long: {chunk:?}");
        }
        for pair in chunks.windows(2) {
            let shared = last_chars(&pair[0], overlap);
            assert!(
                pair[1].starts_with(&shared),
                "{:?} should start with {:?}",
                pair[1],
                shared
            );
        }
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let text = "First paragraph sentence.\n\nSecond paragraph sentence.";
        let chunks = splitter(30, 0).split_text(text);
        assert_eq!(
            chunks,
            vec!["First paragraph sentence.", "Second paragraph sentence."]
        );
    }

    #[test]
    fn split_is_deterministic_and_tags_metadata() {
        let pages = vec![
            Page::new("alpha beta gamma delta omega sigma", 1),
            Page::new("", 2),
            Page::new("theta kappa lambda", 3),
        ];
        let splitter = splitter(12, 2);
        let first = splitter.split("handbook.pdf", &pages);
        let second = splitter.split("handbook.pdf", &pages);
        assert_eq!(first, second);

        assert!(first.iter().all(|chunk| chunk.page() != Some(2)));
        assert_eq!(first.last().and_then(Chunk::page), Some(3));
        for (index, chunk) in first.iter().enumerate() {
            assert_eq!(chunk.metadata["source"], "handbook.pdf");
            assert_eq!(chunk.metadata["chunk_index"], index);
            assert_eq!(chunk.metadata["chunk_hash"], compute_chunk_hash(&chunk.text));
        }
    }

    #[test]
    fn overlap_never_crosses_pages() {
        let pages = vec![Page::new("alpha beta", 1), Page::new("gamma delta", 2)];
        let chunks = splitter(20, 5).split("doc", &pages);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "gamma delta");
    }

    #[test]
    fn token_unit_bounds_chunks_by_tokens() {
        let splitter = TextSplitter::new(SplitterConfig {
            chunk_size: 8,
            chunk_overlap: 2,
            unit: SplitUnit::Tokens {
                encoding: "cl100k_base".into(),
            },
        })
        .expect("token splitter");
        let text = "The quick brown fox jumps over the lazy dog while the cat sleeps.";
        let chunks = splitter.split_text(text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(splitter.measure(chunk) <= 8, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn chunk_hash_is_stable() {
        let h1 = compute_chunk_hash("Hello world");
        let h2 = compute_chunk_hash("Hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn default_settings_keep_overlap_and_every_word_with_long_words() {
        let text = (0..3000)
            .map(|i| {
                if i % 7 == 0 {
                    format!("{}{i}", "x".repeat(60 + i % 13))
                } else {
                    format!("word{i}")
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        let splitter = TextSplitter::default();
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000, "chunk too long");
        }

        let mut recovered = vec![chunks[0].clone()];
        for pair in chunks.windows(2) {
            let shared = last_chars(&pair[0], 20);
            assert!(
                pair[1].starts_with(&shared),
                "{:?} should start with {:?}",
                pair[1].chars().take(40).collect::<String>(),
                shared
            );
            recovered.push(pair[1][shared.len()..].trim_start().to_string());
        }
        let original: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        assert_eq!(words(&recovered), original);
    }

    #[test]
    fn word_longer_than_budget_is_cut_without_losing_characters() {
        let word = "y".repeat(25);
        let chunks = splitter(10, 0).split_text(&format!("short {word} end"));
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 10, "chunk too long: {chunk:?}");
        }
        let joined: String = chunks.concat().split_whitespace().collect();
        assert_eq!(joined, format!("short{word}end"));
    }

    #[test]
    fn character_tail_takes_exact_suffix() {
        assert_eq!(Measure::Characters.tail("héllo world", 5), "world");
        assert_eq!(Measure::Characters.tail("abc", 5), "abc");
        assert_eq!(Measure::Characters.tail("abc", 0), "");
    }
}
