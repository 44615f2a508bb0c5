//! Token-budgeted context assembly.
//!
//! Turns ranked retrieval results into the prompt-ready context block
//! handed to the completion layer. The budget is enforced with the same
//! [`TokenCounter`] the retrieval service used, and accumulation is
//! strictly highest-ranked-first: the first chunk that does not fit stops
//! assembly rather than skipping ahead to a smaller chunk that might.

use std::sync::Arc;

use tracing::debug;

use crate::retrieval::tokenizer::TokenCounter;
use crate::retrieval::ContextChunk;

/// Marker appended when the first chunk alone exceeds the budget and has
/// to be cut down.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Default label prefixed to each assembled chunk.
const DEFAULT_LABEL: &str = "Source";

/// Assembles ranked chunks into a bounded context string.
pub struct ContextAssembler {
    tokens: Arc<dyn TokenCounter>,
    label: String,
}

impl ContextAssembler {
    /// Creates an assembler with the default chunk label.
    #[must_use]
    pub fn new(tokens: Arc<dyn TokenCounter>) -> Self {
        Self::with_label(tokens, DEFAULT_LABEL)
    }

    /// Creates an assembler with a custom chunk label.
    #[must_use]
    pub fn with_label(tokens: Arc<dyn TokenCounter>, label: impl Into<String>) -> Self {
        Self {
            tokens,
            label: label.into(),
        }
    }

    fn format_chunk(&self, source_id: &str, text: &str) -> String {
        format!("{} [ID: {}]:\n{}\n\n", self.label, source_id, text)
    }

    /// Assembles chunks (sorted by score descending) into a context block
    /// measuring at most `max_tokens`.
    ///
    /// Chunks are taken in the given order. The first chunk that would
    /// push the accumulated block over the budget stops accumulation,
    /// preserving the highest-ranked-first guarantee over total greedy
    /// packing. If the very first chunk alone exceeds the budget, its
    /// text is truncated on a char boundary to fit with headroom for
    /// [`TRUNCATION_MARKER`], and the marker is appended.
    ///
    /// Empty input yields an empty string, never an error.
    #[must_use]
    pub fn assemble(&self, chunks: &[ContextChunk], max_tokens: usize) -> String {
        let mut context = String::new();
        let mut used = 0;

        for chunk in chunks {
            let block = self.format_chunk(&chunk.source_id, &chunk.text);
            let mut candidate = String::with_capacity(context.len() + block.len());
            candidate.push_str(&context);
            candidate.push_str(&block);

            let total = self.tokens.count_tokens(&candidate);
            if total <= max_tokens {
                context = candidate;
                used += 1;
            } else if context.is_empty() {
                return self.truncate_first(chunk, max_tokens);
            } else {
                break;
            }
        }

        debug!(
            chunks_offered = chunks.len(),
            chunks_used = used,
            max_tokens,
            "context assembled"
        );
        context
    }

    /// Cuts the first chunk's text to the largest char-boundary prefix
    /// whose formatted form, marker included, still fits the budget.
    fn truncate_first(&self, chunk: &ContextChunk, max_tokens: usize) -> String {
        let text = chunk.text.as_str();
        let fits = |prefix_end: usize| {
            let formatted = self.format_chunk(
                &chunk.source_id,
                &format!("{}{TRUNCATION_MARKER}", &text[..prefix_end]),
            );
            self.tokens.count_tokens(&formatted) <= max_tokens
        };

        // Not even the bare marker fits: nothing useful can be emitted
        if !fits(0) {
            debug!(max_tokens, "budget too small for any truncated chunk");
            return String::new();
        }

        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();

        let (mut lo, mut hi) = (0usize, boundaries.len() - 1);
        while lo < hi {
            let mid = (lo + hi + 1) / 2;
            if fits(boundaries[mid]) {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        self.format_chunk(
            &chunk.source_id,
            &format!("{}{TRUNCATION_MARKER}", &text[..boundaries[lo]]),
        )
    }
}

impl std::fmt::Debug for ContextAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAssembler")
            .field("label", &self.label)
            .field("tokens", &"<TokenCounter>")
            .finish()
    }
}
