//! Property tests for hunk re-anchoring against sources with unique lines.

use std::fs;

use itf::core::correct::{DiffHunk, HunkLine, correct_hunks};
use itf::core::synth::{InternalApplier, synthesize};
use proptest::prelude::*;

/// Distinct lines, some with ragged indentation
fn source_lines() -> impl Strategy<Value = Vec<String>> {
    (4usize..40).prop_flat_map(|n| {
        prop::collection::vec(0usize..4, n).prop_map(|indents| {
            indents
                .into_iter()
                .enumerate()
                .map(|(i, ind)| format!("{}line {i}", " ".repeat(ind * 2)))
                .collect()
        })
    })
}

/// Source, window start, window length, replacement line count
fn edit_case() -> impl Strategy<Value = (Vec<String>, usize, usize, usize)> {
    source_lines().prop_flat_map(|src| {
        let n = src.len();
        (Just(src), 0..n).prop_flat_map(move |(src, start)| {
            let max_len = (n - start).min(5);
            (Just(src), Just(start), 1..=max_len, 0usize..4)
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn anchored_hunk_starts_at_its_window((src, start, len, added) in edit_case()) {
        // Given: the window is pasted with its indentation stripped
        let mut raw: Vec<HunkLine> = src[start..start + len]
            .iter()
            .map(|l| HunkLine::Remove(l.trim().to_string()))
            .collect();
        raw.extend((0..added).map(|k| HunkLine::Add(format!("new {k}"))));

        // When
        let c = correct_hunks("f.txt", &src, &[DiffHunk::new(raw)]);

        // Then
        prop_assert!(c.dropped.is_empty());
        let (header, _) = &c.patch.hunks[0];
        prop_assert_eq!(header.old_start, start + 1);
        prop_assert_eq!(header.old_count, len);
        prop_assert_eq!(header.new_count, added);
        prop_assert_eq!(header.new_start, start + 1);
    }

    #[test]
    fn later_hunks_shift_by_earlier_net_change(
        src in source_lines(),
        grow in 0usize..4,
    ) {
        // Given: one hunk near the top that grows the file, one at the bottom
        let last = src.len() - 1;
        let mut h1 = vec![HunkLine::Context(src[0].clone())];
        h1.extend((0..grow).map(|k| HunkLine::Add(format!("extra {k}"))));
        let h2 = vec![
            HunkLine::Remove(src[last].clone()),
            HunkLine::Add("tail".to_string()),
        ];

        // When
        let c = correct_hunks("f.txt", &src, &[DiffHunk::new(h1), DiffHunk::new(h2)]);

        // Then: new_start = old_start + sum(new_count - old_count) of earlier hunks
        let headers: Vec<_> = c.patch.hunks.iter().map(|(h, _)| *h).collect();
        prop_assert_eq!(headers.len(), 2);
        prop_assert_eq!(headers[0].old_start, 1);
        prop_assert_eq!(headers[1].old_start, last + 1);
        prop_assert_eq!(headers[1].new_start, last + 1 + grow);
    }

    #[test]
    fn internal_engine_produces_the_edit((src, start, len, added) in edit_case()) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("f.txt");
        fs::write(&path, src.join("\n") + "\n").unwrap();

        let mut raw: Vec<HunkLine> = src[start..start + len]
            .iter()
            .map(|l| HunkLine::Remove(l.clone()))
            .collect();
        // Keep the replacement distinct from the window so the result always differs
        raw.extend((0..=added).map(|k| HunkLine::Add(format!("new {k}"))));

        let c = correct_hunks("f.txt", &src, &[DiffHunk::new(raw)]);
        let merged = synthesize(&InternalApplier, &c.patch, &path).unwrap();

        let mut expected: Vec<String> = src[..start].to_vec();
        expected.extend((0..=added).map(|k| format!("new {k}")));
        expected.extend_from_slice(&src[start + len..]);
        prop_assert_eq!(merged, expected);
    }
}

#[test]
fn unanchored_hunk_does_not_shift_later_ones() {
    let src: Vec<String> = (1..=6).map(|i| format!("l{i}")).collect();
    let ghost = DiffHunk::new(vec![
        HunkLine::Context("nowhere".into()),
        HunkLine::Add("a".into()),
        HunkLine::Add("b".into()),
    ]);
    let real = DiffHunk::new(vec![HunkLine::Remove("l5".into()), HunkLine::Add("L5".into())]);

    let c = correct_hunks("f.txt", &src, &[ghost, real]);

    assert_eq!(c.dropped.len(), 1);
    assert_eq!(c.dropped[0].index, 0);
    assert_eq!(c.patch.hunks[0].0.to_string(), "@@ -5,1 +5,1 @@");
}
