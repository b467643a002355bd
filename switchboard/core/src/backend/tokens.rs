//! Token counting for usage accounting.
//!
//! OpenAI models are counted with their own byte-pair encoding, falling back
//! to `cl100k_base` for models the tokenizer does not know. Anthropic and
//! Google publish no local tokenizer, so their text is estimated at four
//! characters per token.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tiktoken_rs::CoreBPE;

/// Counts tokens in prompt and response text
pub enum TokenCounter {
    /// A model's byte-pair encoding
    Bpe(CoreBPE),
    /// Four characters per token
    CharEstimate,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bpe(_) => write!(f, "TokenCounter::Bpe"),
            Self::CharEstimate => write!(f, "TokenCounter::CharEstimate"),
        }
    }
}

impl TokenCounter {
    /// Counter for an OpenAI model
    ///
    /// Uses the encoding registered for the model, then `cl100k_base`. The
    /// character estimate is only used if neither encoding can be loaded.
    #[must_use]
    pub fn for_openai_model(model: &str) -> Self {
        match tiktoken_rs::get_bpe_from_model(model).or_else(|_| tiktoken_rs::cl100k_base()) {
            Ok(bpe) => Self::Bpe(bpe),
            Err(e) => {
                tracing::warn!(model = %model, error = %e, "Tokenizer unavailable, estimating tokens");
                Self::CharEstimate
            }
        }
    }

    /// Number of tokens in `text`
    #[must_use]
    pub fn count(&self, text: &str) -> u64 {
        match self {
            Self::Bpe(bpe) => bpe.encode_with_special_tokens(text).len() as u64,
            Self::CharEstimate => estimate_tokens(text),
        }
    }
}

/// Rough token count: four characters per token
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / 4) as u64
}

/// OpenAI counters by model, built on first use
///
/// Loading an encoding parses its whole vocabulary, so each one is kept for
/// the life of the adapter.
#[derive(Default)]
pub(crate) struct OpenAiCounters {
    by_model: Mutex<HashMap<String, Arc<TokenCounter>>>,
}

impl OpenAiCounters {
    pub fn get(&self, model: &str) -> Arc<TokenCounter> {
        let mut by_model = self.by_model.lock();
        let counter = by_model
            .entry(model.to_string())
            .or_insert_with(|| Arc::new(TokenCounter::for_openai_model(model)));
        Arc::clone(counter)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 0);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens("ééééé"), 1);
        assert_eq!(TokenCounter::CharEstimate.count("abcdefgh"), 2);
    }

    #[test]
    fn test_openai_models_use_bpe() {
        let counter = TokenCounter::for_openai_model("gpt-4");
        assert!(matches!(counter, TokenCounter::Bpe(_)));

        assert_eq!(counter.count("hello world"), 2);
        // code splits into many more tokens than four characters each
        let code = "def f(x):\n    return x * 2";
        assert_eq!(counter.count(code), 10);
        assert!(counter.count(code) > estimate_tokens(code));
    }

    #[test]
    fn test_unknown_openai_model_uses_cl100k() {
        let counter = TokenCounter::for_openai_model("my-private-finetune");
        assert!(matches!(counter, TokenCounter::Bpe(_)));

        let text = "The quick brown fox jumps over the lazy dog";
        assert_eq!(
            counter.count(text),
            TokenCounter::for_openai_model("gpt-4").count(text)
        );
    }

    #[test]
    fn test_counters_are_cached_per_model() {
        let counters = OpenAiCounters::default();
        let first = counters.get("gpt-4");
        let second = counters.get("gpt-4");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &counters.get("gpt-3.5-turbo")));
    }
}
