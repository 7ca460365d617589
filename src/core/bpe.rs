//! Rank-driven pairwise merging of a single pre-token.
//!
//! A word starts as one unit per symbol, with the end-of-word marker glued onto the
//! last one. Each round picks the adjacent pair whose merge rule has the lowest rank,
//! fuses every non-overlapping occurrence of it in one left-to-right pass, and repeats
//! until no adjacent pair has a rule or only one unit remains.

use rustc_hash::{FxHashMap, FxHashSet};

use super::vocab::{MergeRule, END_OF_WORD};

/// Merge priority lookup: lower rank merges first.
///
/// Keyed left side first so lookups can borrow both sides as `&str`. A rule that
/// appears twice in the table keeps its later rank.
#[derive(Debug, Clone, Default)]
pub struct MergeRanks {
    ranks: FxHashMap<String, FxHashMap<String, u32>>,
    len: usize,
}

impl MergeRanks {
    /// Build the rank table from an ordered merge table.
    pub fn new(merges: &[MergeRule]) -> Self {
        let mut ranks: FxHashMap<String, FxHashMap<String, u32>> = FxHashMap::default();
        let mut len = 0;
        for (rank, (left, right)) in merges.iter().enumerate() {
            let previous = ranks
                .entry(left.clone())
                .or_default()
                .insert(right.clone(), rank as u32);
            if previous.is_none() {
                len += 1;
            }
        }
        Self { ranks, len }
    }

    /// Rank of the rule merging `left` then `right`, if one exists.
    #[inline]
    pub fn rank(&self, left: &str, right: &str) -> Option<u32> {
        self.ranks.get(left)?.get(right).copied()
    }

    /// Number of distinct merge rules.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Set of adjacent `(left, right)` symbol pairs in a word.
pub fn get_pairs(word: &[String]) -> FxHashSet<(&str, &str)> {
    word.windows(2)
        .map(|pair| (pair[0].as_str(), pair[1].as_str()))
        .collect()
}

/// Split a symbol string into its initial word: one unit per character, with the
/// end-of-word marker appended to the final unit.
pub fn initial_word(token: &str) -> Vec<String> {
    let mut word: Vec<String> = token.chars().map(String::from).collect();
    if let Some(last) = word.last_mut() {
        last.push_str(END_OF_WORD);
    }
    word
}

/// Fuse every non-overlapping occurrence of `first` followed by `second`.
///
/// Scanning resumes after a fused pair, so `a a a` with rule `(a, a)` becomes `aa a`.
fn merge_pair(word: &[String], first: &str, second: &str) -> Vec<String> {
    let mut merged = Vec::with_capacity(word.len());
    let mut i = 0;

    while i < word.len() {
        let Some(offset) = word[i..].iter().position(|unit| unit.as_str() == first) else {
            merged.extend_from_slice(&word[i..]);
            break;
        };

        let j = i + offset;
        merged.extend_from_slice(&word[i..j]);

        if j + 1 < word.len() && word[j + 1].as_str() == second {
            merged.push(format!("{first}{second}"));
            i = j + 2;
        } else {
            merged.push(word[j].clone());
            i = j + 1;
        }
    }

    merged
}

/// Apply byte-pair merges to a symbol string.
///
/// `token` must already be expressed in the byte-level alphabet. Returns the final
/// units joined by single spaces; the last unit carries the end-of-word marker.
/// An empty token yields an empty string.
pub fn bpe_merge(token: &str, ranks: &MergeRanks) -> String {
    let mut word = initial_word(token);

    if word.len() <= 1 {
        return word.pop().unwrap_or_default();
    }

    loop {
        let best = get_pairs(&word)
            .into_iter()
            .filter_map(|(left, right)| ranks.rank(left, right).map(|rank| (rank, left, right)))
            .min_by_key(|&(rank, _, _)| rank);

        let Some((_, first, second)) = best else {
            break;
        };

        word = merge_pair(&word, first, second);
        if word.len() == 1 {
            break;
        }
    }

    word.join(" ")
}
