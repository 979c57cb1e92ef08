use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

/// Anything that can put a token count on a piece of text.
///
/// The summarizer and chunker only see this trait, so the exact encoder,
/// the word-count estimate, or a test double can sit behind it.
pub trait CountTokens {
    fn count(&self, text: &str) -> usize;
}

/// Which counter the preferences ask for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerMode {
    #[default]
    Exact,
    Approximate,
}

static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();

/// The `cl100k_base` encoder, loaded once per process. `None` if it could
/// not be built, in which case callers fall back to the estimate.
fn shared_encoder() -> Option<&'static CoreBPE> {
    ENCODER
        .get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(err) => {
                tracing::debug!("exact tokenizer unavailable, using estimate: {err:#}");
                None
            }
        })
        .as_ref()
}

/// Token counter: exact byte-pair encoding when available, otherwise
/// `words * 1.3`.
#[derive(Clone, Copy)]
pub struct TokenCounter {
    encoder: Option<&'static CoreBPE>,
}

impl TokenCounter {
    pub fn new(mode: TokenizerMode) -> Self {
        match mode {
            TokenizerMode::Exact => Self::exact(),
            TokenizerMode::Approximate => Self::approximate(),
        }
    }

    /// Exact counter, silently degrading to the estimate if the encoder
    /// can't be loaded.
    pub fn exact() -> Self {
        Self {
            encoder: shared_encoder(),
        }
    }

    pub fn approximate() -> Self {
        Self { encoder: None }
    }

    pub fn is_exact(&self) -> bool {
        self.encoder.is_some()
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("exact", &self.is_exact())
            .finish()
    }
}

impl CountTokens for TokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.encoder {
            Some(bpe) => bpe.encode_ordinary(text).len(),
            None => estimate_tokens(text),
        }
    }
}

/// `floor(whitespace_words * 1.3)`, in integer arithmetic.
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count() * 13 / 10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_scales_word_count() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("   \n\t "), 0);
        assert_eq!(estimate_tokens("one"), 1);
        assert_eq!(estimate_tokens("one two"), 2);
        assert_eq!(estimate_tokens("a b c d e f g h i j"), 13);
    }

    #[test]
    fn approximate_counter_uses_estimate() {
        let counter = TokenCounter::approximate();
        assert!(!counter.is_exact());
        assert_eq!(counter.count("fn main() { println!(\"hi\"); }"), 6);
    }

    #[test]
    fn counters_accept_arbitrary_unicode() {
        let text = "héllo wörld 你好世界 🦀🦀 \u{0}\u{202e} \u{feff}";
        for counter in [TokenCounter::exact(), TokenCounter::approximate()] {
            let n = counter.count(text);
            assert!(n > 0, "{counter:?} returned zero");
        }
    }

    #[test]
    fn exact_counter_is_deterministic() {
        let counter = TokenCounter::exact();
        let text = "The quick brown fox jumps over the lazy dog.";
        assert_eq!(counter.count(text), counter.count(text));
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn mode_selects_counter() {
        assert!(!TokenCounter::new(TokenizerMode::Approximate).is_exact());
        assert_eq!(
            TokenCounter::new(TokenizerMode::Exact).is_exact(),
            TokenCounter::exact().is_exact()
        );
    }
}
