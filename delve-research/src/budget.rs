//! Prompt budgeting
//!
//! Trims arbitrarily long text so that its encoded length fits a token
//! budget. Trimming is deterministic, recursive, and idempotent: cutting an
//! already trimmed text again returns it unchanged.

use crate::ResearchResult;
use delve_core::config_error;
use std::sync::Arc;
use tiktoken_rs::{get_bpe_from_model, o200k_base, CoreBPE};
use tracing::{debug, warn};

/// Structural boundaries tried in order: paragraph, line, sentence, word,
/// then a plain character cut.
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Token counter for a tokenizer model
pub struct TokenCounter {
    encoder: CoreBPE,
}

impl TokenCounter {
    /// Create a counter for `model_name`, falling back to `o200k_base` for
    /// models tiktoken does not know.
    pub fn new(model_name: &str) -> ResearchResult<Self> {
        let encoder = match get_bpe_from_model(model_name) {
            Ok(encoder) => encoder,
            Err(e) => {
                warn!(
                    model = model_name,
                    error = %e,
                    "Unknown tokenizer model, falling back to o200k_base"
                );
                o200k_base().map_err(|e| {
                    config_error!(format!("Failed to load tokenizer: {}", e), "budget")
                })?
            }
        };

        Ok(Self { encoder })
    }

    /// Count tokens in a text string
    pub fn count_tokens(&self, text: &str) -> usize {
        self.encoder.encode_with_special_tokens(text).len()
    }
}

/// Fits prompt material into token budgets
#[derive(Clone)]
pub struct PromptBudgeter {
    counter: Arc<TokenCounter>,
    min_chunk_chars: usize,
}

impl PromptBudgeter {
    pub fn new(counter: Arc<TokenCounter>, min_chunk_chars: usize) -> Self {
        Self {
            counter,
            min_chunk_chars: min_chunk_chars.max(1),
        }
    }

    pub fn for_model(model_name: &str, min_chunk_chars: usize) -> ResearchResult<Self> {
        Ok(Self::new(
            Arc::new(TokenCounter::new(model_name)?),
            min_chunk_chars,
        ))
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.counter.count_tokens(text)
    }

    /// Trim `text` until it encodes to at most `budget` tokens.
    ///
    /// Never cuts below `min_chunk_chars` characters: if the budget cannot be
    /// met above that floor, the floor-sized prefix is returned instead.
    pub fn trim(&self, text: &str, budget: usize) -> String {
        let tokens = self.counter.count_tokens(text);
        if tokens <= budget {
            return text.to_string();
        }

        let chars = text.chars().count();
        if chars <= self.min_chunk_chars {
            return text.to_string();
        }

        let ratio = chars as f64 / tokens as f64;
        let chunk_chars = ((budget as f64 * ratio).floor() as usize).min(chars - 1);
        if chunk_chars < self.min_chunk_chars {
            return char_prefix(text, self.min_chunk_chars).to_string();
        }

        let mut chunk = first_chunk(text, chunk_chars, &SEPARATORS);
        if chunk.chars().count() >= chars {
            // Splitter made no progress
            chunk = char_prefix(text, chunk_chars);
        }

        debug!(
            tokens = tokens,
            budget = budget,
            from_chars = chars,
            to_chars = chunk_chars,
            "Trimming prompt text"
        );

        self.trim(chunk, budget)
    }

    /// Join `items` with newlines, then trim the result to `budget`
    pub fn trim_joined(&self, items: &[String], budget: usize) -> String {
        self.trim(&items.join("\n"), budget)
    }
}

/// Longest prefix of `text` that ends on a separator boundary and holds at
/// most `max_chars` characters. Falls through to finer separators when even
/// the first piece is too long.
fn first_chunk<'a>(text: &'a str, max_chars: usize, separators: &[&str]) -> &'a str {
    let Some((separator, finer)) = separators.split_first() else {
        return char_prefix(text, max_chars);
    };
    if separator.is_empty() {
        return char_prefix(text, max_chars);
    }

    let mut best = None;
    let mut counted_to = 0;
    let mut chars = 0;
    for (index, _) in text.match_indices(separator) {
        chars += text[counted_to..index].chars().count();
        counted_to = index;
        if chars > max_chars {
            break;
        }
        if index > 0 {
            best = Some(index);
        }
    }

    match best {
        Some(end) => &text[..end],
        None => {
            let first_piece_end = text
                .match_indices(separator)
                .map(|(index, _)| index)
                .find(|&index| index > 0)
                .unwrap_or(text.len());
            first_chunk(&text[..first_piece_end], max_chars, finer)
        }
    }
}

/// The first `max_chars` characters of `text`
fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budgeter() -> PromptBudgeter {
        PromptBudgeter::for_model("gpt-4o", 140).unwrap()
    }

    fn long_text() -> String {
        let paragraph = "Rust guarantees memory safety without a garbage collector. \
                         Ownership rules are checked at compile time. \
                         The borrow checker rejects data races before the program runs.";
        (0..40)
            .map(|i| format!("Paragraph {}. {}", i, paragraph))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn test_text_within_budget_is_unchanged() {
        let budgeter = budgeter();
        let text = "A short sentence.";
        assert_eq!(budgeter.trim(text, 100), text);
    }

    #[test]
    fn test_trim_fits_budget() {
        let budgeter = budgeter();
        let text = long_text();
        assert!(budgeter.count_tokens(&text) > 200);

        let trimmed = budgeter.trim(&text, 200);
        assert!(budgeter.count_tokens(&trimmed) <= 200);
        assert!(text.starts_with(&trimmed));
        assert!(!trimmed.is_empty());
    }

    #[test]
    fn test_trim_is_idempotent() {
        let budgeter = budgeter();
        let text = long_text();

        for budget in [0, 10, 75, 200, 1_000] {
            let once = budgeter.trim(&text, budget);
            let twice = budgeter.trim(&once, budget);
            assert_eq!(once, twice, "budget {}", budget);
        }
    }

    #[test]
    fn test_tiny_budget_returns_floor_prefix() {
        let budgeter = budgeter();
        let text = long_text();

        let trimmed = budgeter.trim(&text, 0);
        assert_eq!(trimmed.chars().count(), 140);
        assert!(text.starts_with(&trimmed));
    }

    #[test]
    fn test_text_without_separators_is_hard_cut() {
        let budgeter = budgeter();
        let text = "é".repeat(5_000);

        let trimmed = budgeter.trim(&text, 300);
        assert!(budgeter.count_tokens(&trimmed) <= 300 || trimmed.chars().count() <= 140);
        assert!(trimmed.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_first_chunk_prefers_paragraphs() {
        let text = "first paragraph\n\nsecond paragraph\n\nthird";
        assert_eq!(first_chunk(text, 20, &SEPARATORS), "first paragraph");
        assert_eq!(first_chunk(text, 40, &SEPARATORS), "first paragraph\n\nsecond paragraph");
        assert_eq!(first_chunk(text, 8, &SEPARATORS), "first");
        assert_eq!(first_chunk(text, 3, &SEPARATORS), "fir");
    }

    #[test]
    fn test_unknown_tokenizer_falls_back() {
        let counter = TokenCounter::new("not-a-real-model").unwrap();
        assert!(counter.count_tokens("hello world") > 0);
    }
}
