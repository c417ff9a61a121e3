//! Structural text diff.
//!
//! Texts are split into tokens (lines or words, see [`Granularity`]) and
//! compared with a longest-common-subsequence alignment after trimming the
//! common prefix and suffix. Tokens keep their separators, so concatenating
//! the tokens of a text gives the text back.

use serde::{Deserialize, Serialize};

/// Alignments larger than this many table cells fall back to a single
/// replace hunk over the differing middle.
const MAX_LCS_CELLS: usize = 4_000_000;

/// Unit of comparison for diffs and merges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One token per line, newline included.
    #[default]
    Line,
    /// Alternating runs of whitespace and non-whitespace.
    Word,
}

impl Granularity {
    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "line" => Some(Self::Line),
            "word" | "token" => Some(Self::Word),
            _ => None,
        }
    }
}

/// Splits `text` into tokens.
pub fn tokenize(text: &str, granularity: Granularity) -> Vec<&str> {
    match granularity {
        Granularity::Line => text.split_inclusive('\n').collect(),
        Granularity::Word => {
            let mut tokens = Vec::new();
            let mut start = 0;
            let mut in_space: Option<bool> = None;
            for (i, c) in text.char_indices() {
                let space = c.is_whitespace();
                if in_space.is_some_and(|prev| prev != space) {
                    tokens.push(&text[start..i]);
                    start = i;
                }
                in_space = Some(space);
            }
            if start < text.len() {
                tokens.push(&text[start..]);
            }
            tokens
        }
    }
}

/// A contiguous change: `base_len` tokens at `base_start` replaced by
/// `new_len` tokens at `new_start`.
///
/// A pure insertion has `base_len == 0`, a pure deletion `new_len == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub base_start: usize,
    pub base_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    /// Text removed from the base.
    pub removed: String,
    /// Text inserted in its place.
    pub inserted: String,
}

impl Hunk {
    /// End of the replaced base range (exclusive).
    pub fn base_end(&self) -> usize {
        self.base_start + self.base_len
    }

    /// Returns true for pure insertions.
    pub fn is_insertion(&self) -> bool {
        self.base_len == 0
    }
}

/// Changes turning one text into another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub granularity: Granularity,
    pub hunks: Vec<Hunk>,
    /// Number of inserted tokens.
    pub insertions: usize,
    /// Number of deleted tokens.
    pub deletions: usize,
}

impl Diff {
    /// Returns true if the texts are equal.
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Re-applies the hunks to `base`.
    pub fn apply(&self, base: &str) -> String {
        let tokens = tokenize(base, self.granularity);
        let mut out = String::with_capacity(base.len());
        let mut pos = 0;
        for hunk in &self.hunks {
            out.extend(tokens[pos..hunk.base_start].iter().copied());
            out.push_str(&hunk.inserted);
            pos = hunk.base_end();
        }
        out.extend(tokens[pos..].iter().copied());
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Delete,
    Insert,
}

/// Computes the diff from `base` to `new`.
pub fn diff(base: &str, new: &str, granularity: Granularity) -> Diff {
    let a = tokenize(base, granularity);
    let b = tokenize(new, granularity);
    let hunks = hunks(&a, &b);
    let insertions = hunks.iter().map(|h| h.new_len).sum();
    let deletions = hunks.iter().map(|h| h.base_len).sum();
    Diff {
        granularity,
        hunks,
        insertions,
        deletions,
    }
}

/// Hunks between two token sequences.
pub(crate) fn hunks(a: &[&str], b: &[&str]) -> Vec<Hunk> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let a_mid = &a[prefix..a.len() - suffix];
    let b_mid = &b[prefix..b.len() - suffix];

    let ops = align(a_mid, b_mid);

    let mut hunks = Vec::new();
    let (mut i, mut j) = (prefix, prefix);
    let mut current: Option<Hunk> = None;
    for op in ops {
        match op {
            Op::Equal => {
                hunks.extend(current.take());
                i += 1;
                j += 1;
            }
            Op::Delete | Op::Insert => {
                let hunk = current.get_or_insert_with(|| Hunk {
                    base_start: i,
                    base_len: 0,
                    new_start: j,
                    new_len: 0,
                    removed: String::new(),
                    inserted: String::new(),
                });
                if op == Op::Delete {
                    hunk.base_len += 1;
                    hunk.removed.push_str(a[i]);
                    i += 1;
                } else {
                    hunk.new_len += 1;
                    hunk.inserted.push_str(b[j]);
                    j += 1;
                }
            }
        }
    }
    hunks.extend(current);
    hunks
}

/// Edit script between two sequences with no common prefix or suffix.
fn align(a: &[&str], b: &[&str]) -> Vec<Op> {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 || (n + 1) * (m + 1) > MAX_LCS_CELLS {
        let mut ops = vec![Op::Delete; n];
        ops.extend(std::iter::repeat(Op::Insert).take(m));
        return ops;
    }

    // lcs[i][j] = LCS length of a[i..] and b[j..]
    let width = m + 1;
    let mut lcs = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * width + j] = if a[i] == b[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            ops.push(Op::Equal);
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
            ops.push(Op::Delete);
            i += 1;
        } else {
            ops.push(Op::Insert);
            j += 1;
        }
    }
    ops.extend(std::iter::repeat(Op::Delete).take(n - i));
    ops.extend(std::iter::repeat(Op::Insert).take(m - j));
    ops
}
