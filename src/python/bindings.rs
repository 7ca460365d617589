//! Python bindings for the mergetok tokenizer.
//!
//! # Thread Safety
//!
//! The tokenizer can be shared across Python threads; the BPE cache is
//! mutex-guarded. Batch operations run on Rayon with the GIL released.
//!
//! # Example
//!
//! ```python
//! from mergetok import Tokenizer
//!
//! tokenizer = Tokenizer("bpe_simple_vocab_16e6.txt")
//! tokens = [tokenizer.sot_token] + tokenizer.encode("a photo of a cat") + [tokenizer.eot_token]
//! text = tokenizer.decode(tokens)
//! ```

use pyo3::exceptions::{PyIOError, PyKeyError, PyValueError};
use pyo3::prelude::*;

use crate::core::{Tokenizer, TokenizerConfig, TokenizerError, VocabConfig, VocabError};

fn config_for(max_merges: Option<usize>, all_merges: bool) -> TokenizerConfig {
    let vocab = if all_merges {
        VocabConfig::unlimited()
    } else {
        max_merges.map_or_else(VocabConfig::default, VocabConfig::with_max_merges)
    };
    TokenizerConfig {
        vocab,
        ..Default::default()
    }
}

fn to_py_err(err: TokenizerError) -> PyErr {
    match err {
        TokenizerError::UnknownTokenId(id) => PyKeyError::new_err(id),
        TokenizerError::Vocab(VocabError::Io(e)) => PyIOError::new_err(e.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

/// Python wrapper for the Rust Tokenizer.
#[pyclass(name = "Tokenizer")]
pub struct PyTokenizer {
    inner: Tokenizer,
}

#[pymethods]
impl PyTokenizer {
    /// Create a tokenizer from a decompressed merge file.
    ///
    /// Args:
    ///     path: Path to the merge file (header line, then one "left right" rule per line)
    ///     max_merges: Number of merge rules to keep (default: 48894)
    ///     all_merges: Keep every rule in the file, ignoring max_merges
    #[new]
    #[pyo3(signature = (path, max_merges=None, all_merges=false))]
    fn new(path: &str, max_merges: Option<usize>, all_merges: bool) -> PyResult<Self> {
        let inner = Tokenizer::from_file(path, &config_for(max_merges, all_merges))
            .map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Create a tokenizer from merge file contents.
    #[staticmethod]
    #[pyo3(signature = (text, max_merges=None, all_merges=false))]
    fn from_merges(text: &str, max_merges: Option<usize>, all_merges: bool) -> PyResult<Self> {
        let inner = Tokenizer::from_merges_str(text, &config_for(max_merges, all_merges))
            .map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Encode text to token IDs.
    ///
    /// Start/end tokens are not added.
    fn encode(&self, text: &str) -> Vec<u32> {
        self.inner.encode(text)
    }

    /// Decode token IDs to a string.
    ///
    /// Raises:
    ///     KeyError: If a token ID is outside the vocabulary
    fn decode(&self, tokens: Vec<u32>) -> PyResult<String> {
        self.inner.decode(&tokens).map_err(to_py_err)
    }

    /// Apply BPE merges to a string already in the byte-level alphabet.
    fn bpe(&self, token: &str) -> String {
        self.inner.bpe(token)
    }

    /// Batch encode multiple texts in parallel.
    fn encode_batch(&self, py: Python<'_>, texts: Vec<String>) -> Vec<Vec<u32>> {
        py.allow_threads(|| self.inner.encode_batch(&texts))
    }

    /// Batch decode multiple token lists in parallel.
    fn decode_batch(&self, py: Python<'_>, token_lists: Vec<Vec<u32>>) -> PyResult<Vec<String>> {
        py.allow_threads(|| self.inner.decode_batch(&token_lists))
            .map_err(to_py_err)
    }

    /// Get the vocabulary size (including special tokens).
    #[getter]
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    /// ID of `<|startoftext|>`.
    #[getter]
    fn sot_token(&self) -> u32 {
        self.inner.start_of_text_id()
    }

    /// ID of `<|endoftext|>`.
    #[getter]
    fn eot_token(&self) -> u32 {
        self.inner.end_of_text_id()
    }

    /// Number of cached BPE results.
    fn cache_len(&self) -> usize {
        self.inner.cache_len()
    }

    fn clear_cache(&self) {
        self.inner.clear_cache()
    }

    fn __repr__(&self) -> String {
        format!("Tokenizer(vocab_size={})", self.inner.vocab_size())
    }
}
