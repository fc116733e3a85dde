use std::fmt;
use std::sync::Arc;
use tiktoken_rs::{get_bpe_from_model, CoreBPE};

/// Approximate model-token counter.
///
/// Uses the BPE of a reference model when it can be loaded and falls back to
/// ~4 characters per token otherwise. `estimate` never fails.
#[derive(Clone)]
pub struct TokenEstimator {
    bpe: Option<Arc<CoreBPE>>,
    model: String,
}

impl TokenEstimator {
    /// Build an estimator backed by the tokenizer of `model` (e.g. "gpt-4").
    ///
    /// If the tokenizer cannot be loaded the estimator silently degrades to
    /// the character heuristic for its whole lifetime.
    pub fn for_model(model: &str) -> Self {
        match get_bpe_from_model(model) {
            Ok(bpe) => Self {
                bpe: Some(Arc::new(bpe)),
                model: model.to_string(),
            },
            Err(e) => {
                log::warn!(
                    "Tokenizer for {} unavailable ({}), using chars/4 estimate",
                    model,
                    e
                );
                Self::heuristic()
            }
        }
    }

    /// Estimator with the exact tokenizer disabled.
    pub fn heuristic() -> Self {
        Self {
            bpe: None,
            model: "heuristic".to_string(),
        }
    }

    pub fn is_exact(&self) -> bool {
        self.bpe.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn estimate(&self, text: &str) -> usize {
        match &self.bpe {
            // Ordinary encoding treats special-token text as plain text, so it cannot fail.
            Some(bpe) => bpe.encode_ordinary(text).len(),
            None => heuristic_tokens(text),
        }
    }
}

impl fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("model", &self.model)
            .field("exact", &self.is_exact())
            .finish()
    }
}

/// Character-count heuristic: 1 token ≈ 4 characters (rounded down).
pub fn heuristic_tokens(text: &str) -> usize {
    text.chars().count() / 4
}
