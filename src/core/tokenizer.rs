use log::{debug, trace};
use lru::LruCache;
use rayon::prelude::*;
use regexr::{Regex as RegexrRegex, RegexBuilder};
use rustc_hash::FxHashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::bpe::{bpe_merge, MergeRanks};
use super::byte_level::{byte_level_encode, get_byte_level_byte};
use super::normalize::{basic_clean, whitespace_clean, NfcFixer, TextFixer};
use super::vocab::{
    MergeRule, VocabConfig, VocabError, Vocabulary, END_OF_WORD, SPECIAL_TOKENS,
};

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("Regex compilation error (regexr): {0}")]
    Regex(#[from] regexr::Error),
    #[error("Vocabulary error: {0}")]
    Vocab(#[from] VocabError),
    #[error("Unknown token id: {0}")]
    UnknownTokenId(u32),
    #[error("Token {id} contains {symbol:?}, which is not a byte-level symbol")]
    InvalidSymbol { id: u32, symbol: char },
}

/// Pre-tokenization pattern, tried left to right at each position:
///
/// - the literal special tokens
/// - English contractions (`'s`, `'t`, `'re`, `'ve`, `'m`, `'ll`, `'d`)
/// - a run of letters
/// - a single digit
/// - a run of anything that is not whitespace, a letter or a digit
///
/// Whitespace between matches is skipped.
pub const CLIP_PATTERN: &str = r"<\|startoftext\|>|<\|endoftext\|>|(?i:'s|'t|'re|'ve|'m|'ll|'d)|\p{L}+|\p{N}|[^\s\p{L}\p{N}]+";

/// Tokenizer construction options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenizerConfig {
    /// How much of the merge artifact to read.
    pub vocab: VocabConfig,
    /// Maximum number of cached BPE results. `None` keeps every result for the
    /// lifetime of the tokenizer; a bound switches the cache to LRU eviction.
    pub cache_capacity: Option<NonZeroUsize>,
    /// Try JIT compilation for the pre-tokenization pattern.
    pub jit: bool,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            vocab: VocabConfig::default(),
            cache_capacity: None,
            jit: true,
        }
    }
}

fn compile_pattern(use_jit: bool) -> Result<RegexrRegex, TokenizerError> {
    Ok(RegexBuilder::new(CLIP_PATTERN).jit(use_jit).build()?)
}

fn new_cache(capacity: Option<NonZeroUsize>) -> LruCache<String, String> {
    let mut cache = match capacity {
        Some(capacity) => LruCache::new(capacity),
        None => LruCache::unbounded(),
    };
    for special in SPECIAL_TOKENS {
        cache.put(special.to_string(), special.to_string());
    }
    cache
}

/// Byte-level BPE tokenizer with an end-of-word marker.
///
/// Encoding cleans and lowercases the input, splits it with [`CLIP_PATTERN`],
/// maps each chunk's UTF-8 bytes into the byte-level alphabet, merges it with the
/// rank table and looks every resulting unit up in the vocabulary. Decoding runs
/// the same tables backwards and turns every `</w>` into a space.
///
/// The vocabulary, rank table and compiled pattern are immutable and shared
/// between clones. The BPE cache belongs to one instance and sits behind a
/// mutex, so a tokenizer can be shared across threads; clones start with a
/// fresh cache.
///
/// # Example
///
/// ```
/// use mergetok::{Tokenizer, TokenizerConfig, VocabConfig};
///
/// let merges = "#version: 0.2\nh i</w>\n";
/// let config = TokenizerConfig {
///     vocab: VocabConfig::unlimited(),
///     ..Default::default()
/// };
/// let tokenizer = Tokenizer::from_merges_str(merges, &config).unwrap();
///
/// let ids = tokenizer.encode("Hi!");
/// assert_eq!(tokenizer.decode(&ids).unwrap(), "hi ! ");
/// ```
pub struct Tokenizer {
    vocab: Arc<Vocabulary>,
    ranks: Arc<MergeRanks>,
    regex: Arc<RegexrRegex>,
    fixer: Arc<dyn TextFixer>,
    cache: Mutex<LruCache<String, String>>,
    cache_capacity: Option<NonZeroUsize>,
    use_jit: bool,
}

impl Tokenizer {
    /// Create a tokenizer from a built vocabulary with default options.
    pub fn new(vocab: Vocabulary) -> Result<Self, TokenizerError> {
        Self::from_vocabulary(vocab, &TokenizerConfig::default())
    }

    /// Create a tokenizer from a built vocabulary.
    ///
    /// `config.vocab` is not consulted here; the vocabulary is used as given.
    pub fn from_vocabulary(
        vocab: Vocabulary,
        config: &TokenizerConfig,
    ) -> Result<Self, TokenizerError> {
        let ranks = MergeRanks::new(vocab.merges());
        let regex = compile_pattern(config.jit)?;

        debug!(
            "tokenizer ready: vocab_size={}, merge_rules={}, cache_capacity={:?}",
            vocab.len(),
            ranks.len(),
            config.cache_capacity
        );

        Ok(Self {
            vocab: Arc::new(vocab),
            ranks: Arc::new(ranks),
            regex: Arc::new(regex),
            fixer: Arc::new(NfcFixer),
            cache: Mutex::new(new_cache(config.cache_capacity)),
            cache_capacity: config.cache_capacity,
            use_jit: config.jit,
        })
    }

    /// Create a tokenizer from an ordered merge table.
    pub fn from_merges(
        merges: Vec<MergeRule>,
        config: &TokenizerConfig,
    ) -> Result<Self, TokenizerError> {
        Self::from_vocabulary(Vocabulary::from_merges(merges), config)
    }

    /// Create a tokenizer from merge artifact text (header line first).
    pub fn from_merges_str(data: &str, config: &TokenizerConfig) -> Result<Self, TokenizerError> {
        let vocab = Vocabulary::from_merges_str(data, &config.vocab)?;
        Self::from_vocabulary(vocab, config)
    }

    /// Create a tokenizer from a decompressed merge artifact on disk.
    pub fn from_file(
        path: impl AsRef<Path>,
        config: &TokenizerConfig,
    ) -> Result<Self, TokenizerError> {
        let vocab = Vocabulary::from_file(path, &config.vocab)?;
        Self::from_vocabulary(vocab, config)
    }

    /// Replace the text fixer used by [`encode`](Self::encode).
    ///
    /// Cached BPE results depend only on symbol strings, so the cache is kept.
    pub fn with_fixer(mut self, fixer: impl TextFixer + 'static) -> Self {
        self.fixer = Arc::new(fixer);
        self
    }

    /// Enable or disable JIT compilation for the pre-tokenization pattern.
    pub fn jit(mut self, use_jit: bool) -> Result<Self, TokenizerError> {
        self.use_jit = use_jit;
        self.regex = Arc::new(compile_pattern(use_jit)?);
        Ok(self)
    }

    /// Clean, lowercase and split text into the chunks fed to BPE.
    pub fn pre_tokenize(&self, text: &str) -> Vec<String> {
        let cleaned = whitespace_clean(&basic_clean(text, self.fixer.as_ref())).to_lowercase();
        self.regex
            .find_iter(&cleaned)
            .map(|m| cleaned[m.start()..m.end()].to_string())
            .collect()
    }

    /// Merge a symbol string, consulting and filling the cache.
    ///
    /// `token` must be in the byte-level alphabet. The result is the merged units
    /// joined by single spaces. Single-symbol tokens bypass the cache.
    pub fn bpe(&self, token: &str) -> String {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(cached) = cache.get(token) {
                return cached.clone();
            }
        }

        let mut chars = token.chars();
        if chars.next().is_none() || chars.next().is_none() {
            return bpe_merge(token, &self.ranks);
        }

        // Special tokens may have been evicted from a bounded cache
        let result = if SPECIAL_TOKENS.contains(&token) {
            token.to_string()
        } else {
            trace!("bpe cache miss: {:?}", token);
            bpe_merge(token, &self.ranks)
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(token.to_string(), result.clone());
        }

        result
    }

    /// Encode text to token IDs.
    ///
    /// Special tokens written literally in the text map to their reserved IDs.
    /// Start/end markers are not added automatically.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        let mut ids = Vec::new();

        for chunk in self.pre_tokenize(text) {
            let symbols = byte_level_encode(chunk.as_bytes());
            for unit in self.bpe(&symbols).split(' ') {
                // Every merge result and every base symbol has an entry
                let id = self.vocab.token_to_id(unit);
                debug_assert!(id.is_some(), "merged unit {unit:?} is not in the vocabulary");
                ids.extend(id);
            }
        }

        ids
    }

    /// Decode token IDs to raw bytes.
    ///
    /// End-of-word markers are still present as the bytes of `</w>`.
    ///
    /// # Errors
    /// Returns [`TokenizerError::UnknownTokenId`] for an ID outside `0..vocab_size`
    /// and [`TokenizerError::InvalidSymbol`] when a token string holds a character
    /// outside the byte-level alphabet (only possible with a merge artifact that
    /// names such characters).
    pub fn decode_bytes(&self, tokens: &[u32]) -> Result<Vec<u8>, TokenizerError> {
        let mut result = Vec::with_capacity(tokens.len() * 4);

        for &token in tokens {
            let text = self
                .vocab
                .id_to_token(token)
                .ok_or(TokenizerError::UnknownTokenId(token))?;
            for ch in text.chars() {
                let b = get_byte_level_byte(ch).ok_or(TokenizerError::InvalidSymbol {
                    id: token,
                    symbol: ch,
                })?;
                result.push(b);
            }
        }

        Ok(result)
    }

    /// Decode token IDs to a string.
    ///
    /// Invalid UTF-8 is replaced with U+FFFD and every `</w>` becomes a space, so
    /// a decoded word sequence ends with a trailing space.
    ///
    /// # Errors
    /// Same as [`decode_bytes`](Self::decode_bytes).
    pub fn decode(&self, tokens: &[u32]) -> Result<String, TokenizerError> {
        let bytes = self.decode_bytes(tokens)?;
        Ok(String::from_utf8_lossy(&bytes).replace(END_OF_WORD, " "))
    }

    /// Batch encode multiple texts in parallel.
    pub fn encode_batch(&self, texts: &[String]) -> Vec<Vec<u32>> {
        texts.par_iter().map(|text| self.encode(text)).collect()
    }

    /// Batch decode multiple token lists in parallel.
    pub fn decode_batch(&self, token_lists: &[Vec<u32>]) -> Result<Vec<String>, TokenizerError> {
        token_lists
            .par_iter()
            .map(|tokens| self.decode(tokens))
            .collect()
    }

    /// Get the vocabulary size (number of token IDs, including special tokens).
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Get the vocabulary.
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Get the encoder map (token string -> ID).
    pub fn encoder(&self) -> &FxHashMap<String, u32> {
        self.vocab.encoder()
    }

    /// Get the decoder table (ID -> token string), indexed by ID.
    pub fn decoder(&self) -> &[String] {
        self.vocab.tokens()
    }

    /// Get the merge table in priority order.
    pub fn merges(&self) -> &[MergeRule] {
        self.vocab.merges()
    }

    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.vocab.token_to_id(token)
    }

    pub fn id_to_token(&self, id: u32) -> Option<&str> {
        self.vocab.id_to_token(id)
    }

    /// ID of `<|startoftext|>`. Special tokens are appended last, so nothing
    /// shadows them.
    pub fn start_of_text_id(&self) -> u32 {
        (self.vocab.len() - 2) as u32
    }

    /// ID of `<|endoftext|>`.
    pub fn end_of_text_id(&self) -> u32 {
        (self.vocab.len() - 1) as u32
    }

    /// Clear the BPE cache, keeping the special token entries.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = new_cache(self.cache_capacity);
        }
    }

    /// Get the current number of cache entries.
    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Clone for Tokenizer {
    fn clone(&self) -> Self {
        // Tables are shared; caches are not
        Self {
            vocab: Arc::clone(&self.vocab),
            ranks: Arc::clone(&self.ranks),
            regex: Arc::clone(&self.regex),
            fixer: Arc::clone(&self.fixer),
            cache: Mutex::new(new_cache(self.cache_capacity)),
            cache_capacity: self.cache_capacity,
            use_jit: self.use_jit,
        }
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("vocab_size", &self.vocab.len())
            .field("merge_rules", &self.ranks.len())
            .field("fixer", &self.fixer)
            .field("cache_len", &self.cache_len())
            .field("cache_capacity", &self.cache_capacity)
            .field("use_jit", &self.use_jit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::byte_level::alphabet;
    use crate::core::normalize::Passthrough;
    use std::borrow::Cow;

    const MERGES: &str = "#version: 0.2\n\
        l o\nlo w\ne r</w>\nh e\nl l\nhe ll\nhell o</w>\n\
        w o\nwo r\nwor l\nworl d</w>\n";

    fn make_test_tokenizer() -> Tokenizer {
        let config = TokenizerConfig {
            vocab: VocabConfig::unlimited(),
            ..Default::default()
        };
        Tokenizer::from_merges_str(MERGES, &config).unwrap()
    }

    fn base_id(ch: char) -> u32 {
        alphabet().position(|c| c == ch).unwrap() as u32
    }

    #[test]
    fn test_vocab_size() {
        let tokenizer = make_test_tokenizer();
        assert_eq!(tokenizer.vocab_size(), 512 + 11 + 2);
        assert_eq!(tokenizer.start_of_text_id(), 523);
        assert_eq!(tokenizer.end_of_text_id(), 524);
        assert_eq!(tokenizer.token_to_id("<|endoftext|>"), Some(524));
    }

    #[test]
    fn test_encode_words() {
        let tokenizer = make_test_tokenizer();
        assert_eq!(tokenizer.encode("hello world"), vec![518, 522]);
        assert_eq!(tokenizer.encode("Hello   World"), vec![518, 522]);
    }

    #[test]
    fn test_encode_decode() {
        let tokenizer = make_test_tokenizer();
        let tokens = tokenizer.encode("Hello   World");
        let decoded = tokenizer.decode(&tokens).unwrap();
        assert_eq!(decoded, "hello world ");
    }

    #[test]
    fn test_pre_tokenize() {
        let tokenizer = make_test_tokenizer();
        assert_eq!(
            tokenizer.pre_tokenize("Don't  STOP, 42!"),
            vec!["don", "'t", "stop", ",", "4", "2", "!"]
        );
        assert_eq!(
            tokenizer.pre_tokenize("hi<|endoftext|>there"),
            vec!["hi", "<|endoftext|>", "there"]
        );
        assert!(tokenizer.pre_tokenize("  \n\t ").is_empty());
    }

    #[test]
    fn test_encode_special_token_literal() {
        let tokenizer = make_test_tokenizer();
        let tokens = tokenizer.encode("hello<|endoftext|>");
        assert_eq!(tokens, vec![518, tokenizer.end_of_text_id()]);

        let tokens = tokenizer.encode("<|startoftext|>world");
        assert_eq!(tokens, vec![tokenizer.start_of_text_id(), 522]);
    }

    #[test]
    fn test_encode_digits_and_punctuation() {
        let tokenizer = make_test_tokenizer();
        assert_eq!(
            tokenizer.encode("42"),
            vec![256 + base_id('4'), 256 + base_id('2')]
        );
        assert_eq!(tokenizer.encode("!!"), vec![base_id('!'), 256 + base_id('!')]);
    }

    #[test]
    fn test_bpe_cache_works() {
        let tokenizer = make_test_tokenizer();
        // Special tokens are pre-seeded
        assert_eq!(tokenizer.cache_len(), 2);

        let first = tokenizer.bpe("hello");
        assert_eq!(first, "hello</w>");
        assert_eq!(tokenizer.cache_len(), 3);

        let second = tokenizer.bpe("hello");
        assert_eq!(first, second);
        assert_eq!(tokenizer.cache_len(), 3);
    }

    #[test]
    fn test_bpe_single_symbol_not_cached() {
        let tokenizer = make_test_tokenizer();
        assert_eq!(tokenizer.bpe("a"), "a</w>");
        assert_eq!(tokenizer.cache_len(), 2);
    }

    #[test]
    fn test_bpe_special_token_is_identity() {
        let tokenizer = make_test_tokenizer();
        assert_eq!(tokenizer.bpe("<|startoftext|>"), "<|startoftext|>");
    }

    #[test]
    fn test_bounded_cache_keeps_special_tokens_working() {
        let config = TokenizerConfig {
            vocab: VocabConfig::unlimited(),
            cache_capacity: NonZeroUsize::new(1),
            ..Default::default()
        };
        let tokenizer = Tokenizer::from_merges_str(MERGES, &config).unwrap();
        tokenizer.bpe("hello");
        tokenizer.bpe("world");
        assert_eq!(tokenizer.cache_len(), 1);
        assert_eq!(
            tokenizer.encode("<|endoftext|>"),
            vec![tokenizer.end_of_text_id()]
        );
    }

    #[test]
    fn test_clear_cache() {
        let tokenizer = make_test_tokenizer();
        tokenizer.encode("hello world");
        assert_eq!(tokenizer.cache_len(), 4);
        tokenizer.clear_cache();
        assert_eq!(tokenizer.cache_len(), 2);
    }

    #[test]
    fn test_clone_has_fresh_cache() {
        let tokenizer = make_test_tokenizer();
        tokenizer.encode("hello world");
        let cloned = tokenizer.clone();
        assert_eq!(cloned.cache_len(), 2);
        assert_eq!(cloned.encode("hello world"), tokenizer.encode("hello world"));
    }

    #[test]
    fn test_decode_unknown_id() {
        let tokenizer = make_test_tokenizer();
        let size = tokenizer.vocab_size() as u32;
        assert!(matches!(
            tokenizer.decode(&[size]),
            Err(TokenizerError::UnknownTokenId(id)) if id == size
        ));
    }

    #[test]
    fn test_decode_rejects_symbol_outside_alphabet() {
        let config = TokenizerConfig {
            vocab: VocabConfig::unlimited(),
            ..Default::default()
        };
        let tokenizer = Tokenizer::from_merges_str("#version: 0.2\na \u{4e16}\n", &config).unwrap();
        assert_eq!(tokenizer.id_to_token(512), Some("a\u{4e16}"));
        assert!(matches!(
            tokenizer.decode(&[512]),
            Err(TokenizerError::InvalidSymbol { id: 512, symbol: '\u{4e16}' })
        ));
        // Base symbols still decode
        assert_eq!(tokenizer.decode(&[base_id('a')]).unwrap(), "a");
    }

    #[test]
    fn test_encode_emits_one_id_per_merged_unit() {
        let tokenizer = make_test_tokenizer();
        for text in ["hello world", "lower 42!!", "caf\u{e9} \u{4e16}\u{754c}", "a\u{0}b"] {
            let expected: usize = tokenizer
                .pre_tokenize(text)
                .iter()
                .map(|chunk| tokenizer.bpe(&byte_level_encode(chunk.as_bytes())).split(' ').count())
                .sum();
            assert_eq!(tokenizer.encode(text).len(), expected, "{text:?}");
        }
    }

    #[test]
    fn test_encode_named_entity_outside_ascii() {
        let tokenizer = make_test_tokenizer();
        assert_eq!(tokenizer.pre_tokenize("caf&eacute;"), vec!["caf\u{e9}"]);
        assert_eq!(tokenizer.pre_tokenize("I &hearts; it"), vec!["i", "\u{2665}", "it"]);
        let tokens = tokenizer.encode("caf&eacute;");
        assert_eq!(tokenizer.decode(&tokens).unwrap(), "caf\u{e9} ");
    }

    #[test]
    fn test_decode_invalid_utf8_is_lossy() {
        let tokenizer = make_test_tokenizer();
        // 0xC3 alone is a truncated two-byte sequence
        let lead = tokenizer.token_to_id("\u{c3}").unwrap();
        assert_eq!(tokenizer.decode(&[lead]).unwrap(), "\u{fffd}");
    }

    #[test]
    fn test_decode_special_tokens() {
        let tokenizer = make_test_tokenizer();
        let ids = [tokenizer.start_of_text_id(), 518, tokenizer.end_of_text_id()];
        assert_eq!(
            tokenizer.decode(&ids).unwrap(),
            "<|startoftext|>hello <|endoftext|>"
        );
    }

    #[test]
    fn test_unicode_roundtrip() {
        let tokenizer = make_test_tokenizer();
        let tokens = tokenizer.encode("Café 世界");
        assert_eq!(tokenizer.decode(&tokens).unwrap(), "café 世界 ");
    }

    #[test]
    fn test_html_entities_unescaped() {
        let tokenizer = make_test_tokenizer();
        assert_eq!(tokenizer.pre_tokenize("a &amp;amp; b"), vec!["a", "&", "b"]);
    }

    #[test]
    fn test_batch_encode() {
        let tokenizer = make_test_tokenizer();
        let texts = vec!["hello".to_string(), "world".to_string()];
        let batch_tokens = tokenizer.encode_batch(&texts);
        assert_eq!(batch_tokens, vec![vec![518], vec![522]]);

        let decoded = tokenizer.decode_batch(&batch_tokens).unwrap();
        assert_eq!(decoded, vec!["hello ", "world "]);
    }

    #[test]
    fn test_custom_fixer() {
        #[derive(Debug)]
        struct Replace;
        impl TextFixer for Replace {
            fn fix_text<'a>(&self, text: &'a str) -> Cow<'a, str> {
                Cow::Owned(text.replace("wrld", "world"))
            }
        }

        let tokenizer = make_test_tokenizer().with_fixer(Replace);
        assert_eq!(tokenizer.encode("hello wrld"), vec![518, 522]);

        let tokenizer = tokenizer.with_fixer(Passthrough);
        assert_ne!(tokenizer.encode("hello wrld"), vec![518, 522]);
    }

    #[test]
    fn test_jit_disable() {
        let tokenizer = make_test_tokenizer().jit(false).unwrap();
        let tokens = tokenizer.encode("hello world");
        assert_eq!(tokenizer.decode(&tokens).unwrap(), "hello world ");
    }
}
