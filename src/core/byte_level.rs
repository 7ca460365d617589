//! Byte-to-symbol alphabet for the merge engine.
//!
//! BPE merges operate on strings of "symbols", so every one of the 256 byte values
//! needs a printable single-character stand-in. The mapping keeps printable ASCII and
//! printable Latin-1 as-is and moves everything else (control bytes, space, NBSP,
//! soft hyphen) up to code points starting at U+0100:
//!
//! - Bytes 33-126 (`!` to `~`): map to themselves
//! - Bytes 161-172 (`¡` to `¬`): map to themselves
//! - Bytes 174-255 (`®` to `ÿ`): map to themselves
//! - Other bytes (0-32, 127-160, 173): map to U+0100 onwards, in byte order
//!
//! The tables are built once on first use and shared read-only afterwards.
//!
//! # Example
//!
//! ```
//! use mergetok::core::byte_level::{byte_level_decode, byte_level_encode};
//!
//! // Space (0x20) maps to 'Ġ' (U+0120)
//! assert_eq!(byte_level_encode(b" a"), "\u{120}a");
//! assert_eq!(byte_level_decode("\u{120}a").unwrap(), b" a");
//! ```

use rustc_hash::FxHashMap;
use std::sync::LazyLock;

/// Number of base symbols in the alphabet (one per byte value).
pub const NUM_BASE_SYMBOLS: usize = 256;

/// Bytes that are already printable and stand for themselves.
fn is_direct_byte(b: u8) -> bool {
    matches!(b, 33..=126 | 161..=172 | 174..=255)
}

/// Alphabet entries in construction order: every direct byte first (ascending),
/// then every remapped byte (ascending). The vocabulary uses this order for its
/// base symbol IDs.
static ALPHABET: LazyLock<[(u8, char); NUM_BASE_SYMBOLS]> = LazyLock::new(|| {
    let mut entries = [(0u8, '\0'); NUM_BASE_SYMBOLS];
    let mut slot = 0;

    for b in (0u8..=255).filter(|&b| is_direct_byte(b)) {
        entries[slot] = (b, char::from(b));
        slot += 1;
    }

    // U+0100 + offset is always a valid scalar value (offset < 256)
    let mut offset = 0u32;
    for b in (0u8..=255).filter(|&b| !is_direct_byte(b)) {
        let ch = char::from_u32(256 + offset).unwrap_or(char::REPLACEMENT_CHARACTER);
        entries[slot] = (b, ch);
        slot += 1;
        offset += 1;
    }

    entries
});

/// Byte to symbol mapping, indexed by byte value.
static BYTE_TO_CHAR: LazyLock<[char; NUM_BASE_SYMBOLS]> = LazyLock::new(|| {
    let mut mapping = ['\0'; NUM_BASE_SYMBOLS];
    for &(b, ch) in ALPHABET.iter() {
        mapping[b as usize] = ch;
    }
    mapping
});

/// Symbol to byte mapping (reverse of BYTE_TO_CHAR).
static CHAR_TO_BYTE: LazyLock<FxHashMap<char, u8>> =
    LazyLock::new(|| ALPHABET.iter().map(|&(b, ch)| (ch, b)).collect());

/// The alphabet symbols in construction order.
///
/// This is the order in which base symbols receive token IDs.
pub fn alphabet() -> impl Iterator<Item = char> {
    ALPHABET.iter().map(|&(_, ch)| ch)
}

/// Encode raw bytes into their symbol string, one character per byte.
#[inline]
pub fn byte_level_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| BYTE_TO_CHAR[b as usize]).collect()
}

/// Decode a symbol string back to raw bytes.
///
/// Returns `None` if any character is outside the alphabet.
#[inline]
pub fn byte_level_decode(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|ch| CHAR_TO_BYTE.get(&ch).copied())
        .collect()
}

/// Check if a character is part of the alphabet.
#[inline]
pub fn is_byte_level_char(ch: char) -> bool {
    CHAR_TO_BYTE.contains_key(&ch)
}

/// Get the symbol for a specific byte value.
#[inline]
pub fn get_byte_level_char(byte: u8) -> char {
    BYTE_TO_CHAR[byte as usize]
}

/// Get the byte value for a symbol.
#[inline]
pub fn get_byte_level_byte(ch: char) -> Option<u8> {
    CHAR_TO_BYTE.get(&ch).copied()
}
