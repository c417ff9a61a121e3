//! Property-based tests for diff and three-way merge.

use proptest::prelude::*;
use quill_vcs::{diff, merge3, tokenize, Granularity, MergeOptions, MergeOutcome};

/// A document of short lines over a tiny alphabet, so edits collide often.
fn document_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[abc]{0,3}( [abc]{1,2})?", 0..12).prop_map(|lines| {
        lines
            .into_iter()
            .map(|line| format!("{line}\n"))
            .collect::<String>()
    })
}

fn granularity_strategy() -> impl Strategy<Value = Granularity> {
    prop_oneof![Just(Granularity::Line), Just(Granularity::Word)]
}

fn options_strategy() -> impl Strategy<Value = MergeOptions> {
    (granularity_strategy(), any::<bool>()).prop_map(|(granularity, adjacent_conflicts)| {
        MergeOptions {
            granularity,
            adjacent_conflicts,
        }
    })
}

proptest! {
    /// Property: tokens concatenate back to the original text
    #[test]
    fn prop_tokenize_is_lossless(text in document_strategy(), g in granularity_strategy()) {
        prop_assert_eq!(tokenize(&text, g).concat(), text);
    }

    /// Property: applying a diff to its base yields the new text
    #[test]
    fn prop_diff_apply_reproduces_target(
        base in document_strategy(),
        new in document_strategy(),
        g in granularity_strategy(),
    ) {
        let d = diff(&base, &new, g);
        prop_assert_eq!(d.apply(&base), new.clone());
        prop_assert_eq!(d.is_empty(), base == new);
    }

    /// Property: a change on one side only always merges to that side
    #[test]
    fn prop_one_sided_change_merges_cleanly(
        base in document_strategy(),
        edited in document_strategy(),
        options in options_strategy(),
    ) {
        prop_assert_eq!(
            merge3(&base, &edited, &base, &options),
            MergeOutcome::Clean(edited.clone())
        );
        prop_assert_eq!(
            merge3(&base, &base, &edited, &options),
            MergeOutcome::Clean(edited.clone())
        );
    }

    /// Property: identical changes on both sides are never a conflict
    #[test]
    fn prop_identical_changes_merge_cleanly(
        base in document_strategy(),
        edited in document_strategy(),
        options in options_strategy(),
    ) {
        prop_assert_eq!(
            merge3(&base, &edited, &edited, &options),
            MergeOutcome::Clean(edited.clone())
        );
    }

    /// Property: edits to lines at least two apart merge without conflict
    #[test]
    fn prop_separated_line_edits_merge(
        len in 3usize..20,
        ours_at in 0usize..20,
        gap in 2usize..20,
    ) {
        let ours_at = ours_at % len;
        let theirs_at = ours_at + gap;
        prop_assume!(theirs_at < len);

        let line = |i: usize, label: &str| format!("{label} {i}\n");
        let build = |edit: &[(usize, &str)]| -> String {
            (0..len)
                .map(|i| {
                    let label = edit.iter().find(|(at, _)| *at == i).map_or("line", |(_, l)| *l);
                    line(i, label)
                })
                .collect()
        };
        let base = build(&[]);
        let ours = build(&[(ours_at, "ours")]);
        let theirs = build(&[(theirs_at, "theirs")]);
        let expected = build(&[(ours_at, "ours"), (theirs_at, "theirs")]);

        prop_assert_eq!(
            merge3(&base, &ours, &theirs, &MergeOptions::default()),
            MergeOutcome::Clean(expected)
        );
    }
}
