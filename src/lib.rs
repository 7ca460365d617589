//! mergetok - byte-level BPE tokenizer with end-of-word markers.
//!
//! - Fixed byte ↔ printable-symbol alphabet, so every input is representable
//! - Merge-rank table loaded from a plain-text merge artifact
//! - Regexr pre-tokenization with literal special tokens
//! - Per-instance BPE cache (unbounded, or LRU when capped)
//! - Rayon batch encode/decode
//! - Optional Python bindings (`python` feature)

pub mod core;
#[cfg(feature = "python")]
mod python;

pub use core::{
    MergeRule, TextFixer, Tokenizer, TokenizerConfig, TokenizerError, VocabConfig, VocabError,
    Vocabulary, CLIP_PATTERN, END_OF_TEXT, END_OF_WORD, START_OF_TEXT,
};
