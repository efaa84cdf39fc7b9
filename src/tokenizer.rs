//! Token counting collaborator.
//!
//! The engine never tokenizes for model input; it only needs a stable,
//! deterministic count per document so that budgets computed at assembly
//! time agree with counts stored at write time.

/// Deterministic token counter. Pure: the same text always yields the
/// same count, and there is no failure mode.
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// The usual estimation heuristic: one token per four characters,
/// rounded up. Good enough for budgeting; exact tokenization belongs to
/// whatever model consumes the assembled context.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl Tokenizer for HeuristicTokenizer {
    fn count(&self, text: &str) -> usize {
        let chars = text.chars().count();
        (chars + 3) / 4
    }
}
