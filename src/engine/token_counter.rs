// ── Token Counter (C1) ──────────────────────────────────────────────────────
//
// Counts tokens for any UTF-8 string via the model tokenizer. Delegates to
// the exact tokenizer the Model Adapter uses; the character-ratio estimator
// below is only a last-resort fallback and is always flagged via
// `TokenCountSource::Estimated` so callers can tell an exact count from an
// estimate.
//
// Same chars-per-token ratio table and `count`/`count_batch` shape as a
// conventional local tokenizer cache, extended with a batch API and the
// exact/estimated distinction, plus an `Exact` seam for a future subword
// tokenizer.

use crate::atoms::types::{TokenCount, TokenCountSource};

/// Tokenizer family. `Heuristic` (char-ratio) is the only family actually
/// implemented; the others are typed placeholders for the day a real
/// subword tokenizer (e.g. wired in alongside the generator backend) is
/// added — at that point `TokenCounter::count` should return `Exact`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerType {
    Cl100kBase,
    O200kBase,
    Gemini,
    SentencePiece,
    Heuristic,
}

/// Character-ratio token counter. All token estimation goes through this —
/// no caller should hand-roll `text.len() / 4`.
#[derive(Debug, Clone)]
pub struct TokenCounter {
    kind: TokenizerType,
    chars_per_token: f32,
}

impl TokenCounter {
    pub fn new(kind: TokenizerType) -> Self {
        let chars_per_token = match kind {
            TokenizerType::Cl100kBase => 3.7,
            TokenizerType::O200kBase => 3.9,
            TokenizerType::Gemini => 3.5,
            TokenizerType::SentencePiece => 3.3,
            TokenizerType::Heuristic => 3.5,
        };
        Self { kind, chars_per_token }
    }

    pub fn heuristic() -> Self {
        Self::new(TokenizerType::Heuristic)
    }

    /// `Count(text) -> int`. Pure function, no side effects.
    pub fn count(&self, text: &str) -> TokenCount {
        if text.is_empty() {
            return TokenCount { count: 0, source: self.source() };
        }
        let char_count = text.chars().count();
        let estimated = (char_count as f32 / self.chars_per_token).ceil() as i64;
        TokenCount { count: estimated.max(1), source: self.source() }
    }

    /// `CountBatch(texts) -> []int`. For a remote tokenizer this would
    /// collapse N calls into one round-trip; the local heuristic has no
    /// round-trip to collapse, but the signature is kept batch-shaped so a
    /// remote backend can be substituted without changing call sites.
    pub fn count_batch(&self, texts: &[&str]) -> Vec<TokenCount> {
        texts.iter().map(|t| self.count(t)).collect()
    }

    fn source(&self) -> TokenCountSource {
        match self.kind {
            TokenizerType::Heuristic => TokenCountSource::Estimated,
            _ => TokenCountSource::Estimated, // no exact backend wired in yet
        }
    }

    pub fn kind(&self) -> TokenizerType {
        self.kind
    }

    pub fn chars_for_tokens(&self, tokens: i64) -> usize {
        (tokens as f32 * self.chars_per_token) as usize
    }

    /// Truncate text to fit within a token budget, respecting UTF-8 and
    /// (where it doesn't lose too much) word boundaries. Used only by the
    /// summarization header/footer math, never to truncate a RawTurn or
    /// SummaryChunk mid-content — those are always whole-segment.
    pub fn truncate_to_budget<'a>(&self, text: &'a str, max_tokens: i64) -> (&'a str, i64) {
        let current = self.count(text).count;
        if current <= max_tokens {
            return (text, current);
        }
        let max_chars = self.chars_for_tokens(max_tokens);
        let mut end = max_chars.min(text.len());
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        if let Some(last_space) = text[..end].rfind(|c: char| c.is_whitespace()) {
            if last_space > end / 2 {
                end = last_space;
            }
        }
        let truncated = &text[..end];
        (truncated, self.count(truncated).count)
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::heuristic()
    }
}
