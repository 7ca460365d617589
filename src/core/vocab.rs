//! Vocabulary loading from a merge-rule artifact.
//!
//! The artifact is plain UTF-8 text. The first line is a version header and is
//! discarded; every following line holds one merge rule, its two sides separated
//! by whitespace. Line order is merge priority: earlier lines merge first.
//!
//! # Example Format
//!
//! ```text
//! #version: 0.2
//! i n
//! t h
//! a n
//! th e</w>
//! ```
//!
//! # Vocabulary Layout
//!
//! Token IDs are dense and assigned by position:
//!
//! | IDs                       | Tokens                                      |
//! |---------------------------|---------------------------------------------|
//! | `0..256`                  | base symbols, in alphabet order             |
//! | `256..512`                | base symbols suffixed with `</w>`           |
//! | `512..512+M`              | one concatenated entry per merge rule       |
//! | `512+M`, `512+M+1`        | `<|startoftext|>`, `<|endoftext|>`          |

use log::debug;
use rustc_hash::FxHashMap;
use std::path::Path;
use thiserror::Error;

use super::byte_level::{alphabet, NUM_BASE_SYMBOLS};

/// Marker appended to the final symbol of every word.
pub const END_OF_WORD: &str = "</w>";

/// Reserved start-of-sequence token.
pub const START_OF_TEXT: &str = "<|startoftext|>";

/// Reserved end-of-sequence token.
pub const END_OF_TEXT: &str = "<|endoftext|>";

/// Special tokens, in the order they are appended to the vocabulary.
pub const SPECIAL_TOKENS: [&str; 2] = [START_OF_TEXT, END_OF_TEXT];

/// Number of merge rules kept from the published CLIP artifact
/// (49152 total minus 256 base symbols minus 2 special tokens).
pub const DEFAULT_MAX_MERGES: usize = 49152 - NUM_BASE_SYMBOLS - SPECIAL_TOKENS.len();

/// An ordered pair of symbol strings: merge `.0` followed by `.1` into `.0‖.1`.
pub type MergeRule = (String, String);

/// Errors that can occur when loading a merge artifact.
#[derive(Error, Debug)]
pub enum VocabError {
    #[error("Merge artifact is empty (missing header line)")]
    Empty,
    #[error("Invalid merge rule on line {line}: {reason}")]
    Format { line: usize, reason: String },
    #[error("Merge artifact truncated: expected {expected} merge rules, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options controlling how much of the artifact is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VocabConfig {
    /// Number of merge rules to keep after the header.
    ///
    /// `None` keeps every remaining line; a trailing empty line is ignored.
    pub max_merges: Option<usize>,
}

impl Default for VocabConfig {
    fn default() -> Self {
        Self {
            max_merges: Some(DEFAULT_MAX_MERGES),
        }
    }
}

impl VocabConfig {
    /// Keep every merge rule in the artifact.
    pub fn unlimited() -> Self {
        Self { max_merges: None }
    }

    /// Keep exactly `max_merges` merge rules.
    pub fn with_max_merges(max_merges: usize) -> Self {
        Self {
            max_merges: Some(max_merges),
        }
    }
}

/// Parse one merge line into its two sides.
fn parse_merge_line(line: &str, line_no: usize) -> Result<MergeRule, VocabError> {
    let mut fields = line.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(left), Some(right), None) => Ok((left.to_string(), right.to_string())),
        (_, _, Some(_)) => Err(VocabError::Format {
            line: line_no,
            reason: format!("expected 2 fields, found more in {:?}", line),
        }),
        _ => Err(VocabError::Format {
            line: line_no,
            reason: format!("expected 2 fields in {:?}", line),
        }),
    }
}

/// Parse the merge table from artifact text.
///
/// Line numbers in errors are 1-based and count the header.
pub fn load_merges(data: &str, config: &VocabConfig) -> Result<Vec<MergeRule>, VocabError> {
    if data.trim().is_empty() {
        return Err(VocabError::Empty);
    }

    let mut lines = data.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
    // Header
    lines.next();

    let mut merges = Vec::with_capacity(config.max_merges.unwrap_or(0));
    match config.max_merges {
        Some(expected) => {
            for (idx, line) in lines.take(expected).enumerate() {
                if line.is_empty() {
                    // An empty line before the cutoff means the artifact ran out
                    break;
                }
                merges.push(parse_merge_line(line, idx + 2)?);
            }
            if merges.len() < expected {
                return Err(VocabError::Truncated {
                    expected,
                    found: merges.len(),
                });
            }
        }
        None => {
            let rest: Vec<&str> = lines.collect();
            let end = match rest.last() {
                Some(last) if last.is_empty() => rest.len() - 1,
                _ => rest.len(),
            };
            for (idx, line) in rest[..end].iter().enumerate() {
                merges.push(parse_merge_line(line, idx + 2)?);
            }
        }
    }

    Ok(merges)
}

/// Read a merge artifact from a file path.
///
/// The file must already be decompressed UTF-8 text.
pub fn load_merges_file(
    path: impl AsRef<Path>,
    config: &VocabConfig,
) -> Result<Vec<MergeRule>, VocabError> {
    let data = std::fs::read_to_string(path)?;
    load_merges(&data, config)
}

/// The token table derived from a merge table.
///
/// `tokens` is positional (ID = index), so every ID decodes to the string it was
/// built from. `encoder` is built by inserting tokens in ID order, so when two
/// positions hold the same string the later ID wins on the encode side.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: Vec<String>,
    encoder: FxHashMap<String, u32>,
    merges: Vec<MergeRule>,
}

impl Vocabulary {
    /// Build the vocabulary from an ordered merge table.
    pub fn from_merges(merges: Vec<MergeRule>) -> Self {
        let mut tokens: Vec<String> =
            Vec::with_capacity(2 * NUM_BASE_SYMBOLS + merges.len() + SPECIAL_TOKENS.len());

        tokens.extend(alphabet().map(String::from));
        tokens.extend(alphabet().map(|ch| format!("{ch}{END_OF_WORD}")));
        tokens.extend(merges.iter().map(|(left, right)| format!("{left}{right}")));
        tokens.extend(SPECIAL_TOKENS.iter().map(|s| s.to_string()));

        let encoder = build_encoder(&tokens);

        debug!(
            "built vocabulary: {} merges, {} tokens ({} distinct)",
            merges.len(),
            tokens.len(),
            encoder.len()
        );

        Self {
            tokens,
            encoder,
            merges,
        }
    }

    /// Parse artifact text and build the vocabulary.
    pub fn from_merges_str(data: &str, config: &VocabConfig) -> Result<Self, VocabError> {
        Ok(Self::from_merges(load_merges(data, config)?))
    }

    /// Read an artifact file and build the vocabulary.
    pub fn from_file(path: impl AsRef<Path>, config: &VocabConfig) -> Result<Self, VocabError> {
        Ok(Self::from_merges(load_merges_file(path, config)?))
    }

    /// Number of token IDs (`0..len`).
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Always false: the base symbols and special tokens are always present.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Look up the ID of a token string.
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.encoder.get(token).copied()
    }

    /// Look up the token string of an ID.
    pub fn id_to_token(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    /// Token strings indexed by ID.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Map of token string to ID.
    pub fn encoder(&self) -> &FxHashMap<String, u32> {
        &self.encoder
    }

    /// The merge table, in priority order.
    pub fn merges(&self) -> &[MergeRule] {
        &self.merges
    }
}

/// Build the token → ID map from a positional token list.
///
/// Later duplicates overwrite earlier ones.
pub fn build_encoder(tokens: &[String]) -> FxHashMap<String, u32> {
    tokens
        .iter()
        .enumerate()
        .map(|(id, token)| (token.clone(), id as u32))
        .collect()
}
