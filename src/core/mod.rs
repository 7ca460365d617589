//! Core tokenization engine for mergetok.
//!
//! The core is layered leaves-first:
//!
//! - [`byte_level`]: the fixed byte ↔ symbol alphabet
//! - [`vocab`]: merge artifact parsing and the token ↔ ID tables
//! - [`bpe`]: rank-driven pairwise merging of one pre-token
//! - [`normalize`]: input cleanup and the pluggable [`TextFixer`]
//! - [`Tokenizer`]: the encode/decode pipeline with its per-instance BPE cache

pub mod bpe;
pub mod byte_level;
pub mod normalize;
mod tokenizer;
pub mod vocab;

pub use bpe::{bpe_merge, get_pairs, MergeRanks};
pub use byte_level::{byte_level_decode, byte_level_encode, NUM_BASE_SYMBOLS};
pub use normalize::{basic_clean, whitespace_clean, NfcFixer, Passthrough, TextFixer};
pub use tokenizer::{Tokenizer, TokenizerConfig, TokenizerError, CLIP_PATTERN};
pub use vocab::{
    load_merges, load_merges_file, MergeRule, VocabConfig, VocabError, Vocabulary,
    DEFAULT_MAX_MERGES, END_OF_TEXT, END_OF_WORD, SPECIAL_TOKENS, START_OF_TEXT,
};
