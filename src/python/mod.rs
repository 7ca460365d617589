mod bindings;

use crate::core::{CLIP_PATTERN, END_OF_TEXT, START_OF_TEXT};
pub use bindings::PyTokenizer;

use pyo3::prelude::*;

/// mergetok - byte-level BPE tokenizer with Python bindings
///
/// - Regexr pre-tokenization with literal special tokens
/// - Per-instance BPE cache
/// - Rayon parallelism for batch encode/decode
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTokenizer>()?;
    m.add("CLIP_PATTERN", CLIP_PATTERN)?;
    m.add("START_OF_TEXT", START_OF_TEXT)?;
    m.add("END_OF_TEXT", END_OF_TEXT)?;
    Ok(())
}
