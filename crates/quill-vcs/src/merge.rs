//! Three-way text merge.
//!
//! Both sides are diffed against the common ancestor. Hunks are grouped into
//! clusters of changes that touch the same base region; a cluster containing
//! changes from only one side, or identical results from both, merges
//! cleanly. Any other cluster is a conflict.

use serde::{Deserialize, Serialize};

use crate::diff::{hunks, tokenize, Granularity, Hunk};

/// Merge policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Token granularity of the comparison.
    pub granularity: Granularity,
    /// Also treat edits that touch neighbouring base regions (without
    /// overlapping) as conflicting. Off by default.
    pub adjacent_conflicts: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            granularity: Granularity::Line,
            adjacent_conflicts: false,
        }
    }
}

/// A base region both sides changed differently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRegion {
    /// First base token of the region.
    pub base_start: usize,
    /// End of the region (exclusive), in base tokens.
    pub base_end: usize,
    /// Ancestor text of the region.
    pub base: String,
    /// Target ("ours") text of the region.
    pub ours: String,
    /// Source ("theirs") text of the region.
    pub theirs: String,
}

/// Result of a three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merged text.
    Clean(String),
    /// Regions that could not be merged.
    Conflict(Vec<ConflictRegion>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Ours,
    Theirs,
}

struct Cluster<'h> {
    start: usize,
    end: usize,
    hunks: Vec<(Side, &'h Hunk)>,
}

impl Cluster<'_> {
    fn only_insertions_at(&self, point: usize) -> bool {
        self.start == point && self.end == point
    }

    /// Text of the region with only `side`'s hunks applied.
    fn render(&self, side: Side, base: &[&str]) -> String {
        let mut out = String::new();
        let mut pos = self.start;
        for (_, hunk) in self.hunks.iter().filter(|(s, _)| *s == side) {
            out.extend(base[pos..hunk.base_start].iter().copied());
            out.push_str(&hunk.inserted);
            pos = hunk.base_end();
        }
        out.extend(base[pos..self.end].iter().copied());
        out
    }

    fn sides(&self) -> (bool, bool) {
        let ours = self.hunks.iter().any(|(s, _)| *s == Side::Ours);
        let theirs = self.hunks.iter().any(|(s, _)| *s == Side::Theirs);
        (ours, theirs)
    }
}

/// Merges `ours` and `theirs`, both derived from `base`.
pub fn merge3(base: &str, ours: &str, theirs: &str, options: &MergeOptions) -> MergeOutcome {
    let base_tokens = tokenize(base, options.granularity);
    let ours_hunks = hunks(&base_tokens, &tokenize(ours, options.granularity));
    let theirs_hunks = hunks(&base_tokens, &tokenize(theirs, options.granularity));

    let mut all: Vec<(Side, &Hunk)> = ours_hunks
        .iter()
        .map(|h| (Side::Ours, h))
        .chain(theirs_hunks.iter().map(|h| (Side::Theirs, h)))
        .collect();
    // Insertions sort before replacements starting at the same token.
    all.sort_by_key(|(side, h)| (h.base_start, h.base_end(), *side == Side::Theirs));

    let mut clusters: Vec<Cluster<'_>> = Vec::new();
    for (side, hunk) in all {
        let joins = clusters.last().is_some_and(|c| {
            hunk.base_start < c.end
                || (hunk.base_start == c.end
                    && (options.adjacent_conflicts
                        || (hunk.is_insertion() && c.only_insertions_at(hunk.base_start))))
        });
        match clusters.last_mut() {
            Some(cluster) if joins => {
                cluster.end = cluster.end.max(hunk.base_end());
                cluster.hunks.push((side, hunk));
            }
            _ => clusters.push(Cluster {
                start: hunk.base_start,
                end: hunk.base_end(),
                hunks: vec![(side, hunk)],
            }),
        }
    }

    let mut merged = String::with_capacity(base.len().max(ours.len()).max(theirs.len()));
    let mut conflicts = Vec::new();
    let mut pos = 0;
    for cluster in &clusters {
        merged.extend(base_tokens[pos..cluster.start].iter().copied());
        pos = cluster.end;

        let resolved = match cluster.sides() {
            (true, false) => cluster.render(Side::Ours, &base_tokens),
            (false, true) => cluster.render(Side::Theirs, &base_tokens),
            _ => {
                let ours_text = cluster.render(Side::Ours, &base_tokens);
                let theirs_text = cluster.render(Side::Theirs, &base_tokens);
                if ours_text != theirs_text {
                    conflicts.push(ConflictRegion {
                        base_start: cluster.start,
                        base_end: cluster.end,
                        base: base_tokens[cluster.start..cluster.end].concat(),
                        ours: ours_text,
                        theirs: theirs_text,
                    });
                    continue;
                }
                ours_text
            }
        };
        merged.push_str(&resolved);
    }
    merged.extend(base_tokens[pos..].iter().copied());

    if conflicts.is_empty() {
        MergeOutcome::Clean(merged)
    } else {
        MergeOutcome::Conflict(conflicts)
    }
}
