//! Hunk repair: anchor each hunk in the real source and rebuild its header.
//!
//! Headers supplied by the input are never trusted. Every hunk is located by
//! its before-text (context + removals), compared with surrounding whitespace
//! ignored, and its `@@` header is recomputed from its own line counts plus a
//! running offset of the hunks before it.

use std::fmt;

use tracing::{debug, warn};

/// One line of a hunk, tagged by its first character
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

impl HunkLine {
    /// Classify a raw diff line; untagged and blank lines are context
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim_end_matches('\r');
        if let Some(rest) = raw.strip_prefix('+') {
            HunkLine::Add(rest.to_string())
        } else if let Some(rest) = raw.strip_prefix('-') {
            HunkLine::Remove(rest.to_string())
        } else if let Some(rest) = raw.strip_prefix(' ') {
            HunkLine::Context(rest.to_string())
        } else {
            HunkLine::Context(raw.to_string())
        }
    }

    pub fn text(&self) -> &str {
        match self {
            HunkLine::Context(s) | HunkLine::Remove(s) | HunkLine::Add(s) => s,
        }
    }

    fn tag(&self) -> char {
        match self {
            HunkLine::Context(_) => ' ',
            HunkLine::Remove(_) => '-',
            HunkLine::Add(_) => '+',
        }
    }
}

impl fmt::Display for HunkLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.tag(), self.text())
    }
}

/// A header-less run of diff lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffHunk {
    pub lines: Vec<HunkLine>,
}

impl DiffHunk {
    pub fn new(lines: Vec<HunkLine>) -> Self {
        Self { lines }
    }

    pub fn from_raw<S: AsRef<str>>(raw: &[S]) -> Self {
        Self::new(raw.iter().map(|l| HunkLine::parse(l.as_ref())).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines the hunk expects to find in the source: context and removals
    pub fn target_block(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| !matches!(l, HunkLine::Add(_)))
            .map(HunkLine::text)
            .collect()
    }

    /// (old side count, new side count)
    pub fn counts(&self) -> (usize, usize) {
        self.lines.iter().fold((0, 0), |(old, new), l| match l {
            HunkLine::Context(_) => (old + 1, new + 1),
            HunkLine::Remove(_) => (old + 1, new),
            HunkLine::Add(_) => (old, new + 1),
        })
    }
}

/// `@@ -old_start,old_count +new_start,new_count @@`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
}

impl fmt::Display for HunkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        )
    }
}

/// Hunks of one file with headers recomputed against its current content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectedPatch {
    pub path: String,
    pub hunks: Vec<(HunkHeader, DiffHunk)>,
}

impl CorrectedPatch {
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Unified diff text; empty when no hunk survived
    pub fn render(&self) -> String {
        if self.hunks.is_empty() {
            return String::new();
        }
        let mut out = format!("--- a/{0}\n+++ b/{0}\n", self.path);
        for (header, hunk) in &self.hunks {
            out.push_str(&header.to_string());
            out.push('\n');
            for line in &hunk.lines {
                out.push_str(&line.to_string());
                out.push('\n');
            }
        }
        out
    }
}

/// A hunk that could not be anchored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedHunk {
    /// 0-based position in the input hunk sequence
    pub index: usize,
    /// First expected line, for diagnostics
    pub first_line: String,
}

#[derive(Debug, Clone)]
pub struct Correction {
    pub patch: CorrectedPatch,
    pub dropped: Vec<DroppedHunk>,
}

/// 0-based index of the first contiguous match of `block` in `source`,
/// comparing lines with surrounding whitespace stripped
pub fn find_block<S: AsRef<str>>(source: &[S], block: &[&str]) -> Option<usize> {
    if block.is_empty() || block.len() > source.len() {
        return None;
    }
    source.windows(block.len()).position(|window| {
        window
            .iter()
            .zip(block)
            .all(|(have, want)| have.as_ref().trim() == want.trim())
    })
}

/// Re-anchor `hunks` against `source` and rebuild their headers.
///
/// Unanchored hunks are dropped and reported; they do not shift the offset
/// of later hunks.
pub fn correct_hunks<S: AsRef<str>>(path: &str, source: &[S], hunks: &[DiffHunk]) -> Correction {
    let mut offset: isize = 0;
    let mut kept = Vec::with_capacity(hunks.len());
    let mut dropped = Vec::new();

    for (index, hunk) in hunks.iter().enumerate() {
        let target = hunk.target_block();
        let (old_count, new_count) = hunk.counts();

        let old_start = if target.is_empty() {
            if new_count == 0 {
                debug!(path, index, "empty hunk skipped");
                dropped.push(DroppedHunk { index, first_line: String::new() });
                continue;
            }
            // Pure addition: append after the last line
            source.len()
        } else {
            match find_block(source, &target) {
                Some(i) => i + 1,
                None => {
                    warn!(path, index, first = target[0], "hunk context not found in source; dropped");
                    dropped.push(DroppedHunk { index, first_line: target[0].to_string() });
                    continue;
                }
            }
        };

        let mut new_start = old_start as isize + offset;
        if old_count == 0 {
            new_start += 1;
        }

        kept.push((
            HunkHeader {
                old_start,
                old_count,
                new_start: new_start.max(0) as usize,
                new_count,
            },
            hunk.clone(),
        ));
        offset += new_count as isize - old_count as isize;
    }

    Correction {
        patch: CorrectedPatch { path: path.to_string(), hunks: kept },
        dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_hunk_header() {
        let source = src(&["a", "b", "c"]);
        let hunk = DiffHunk::from_raw(&[" a", "-b", "+B", " c"]);
        let c = correct_hunks("f.txt", &source, &[hunk]);

        assert!(c.dropped.is_empty());
        assert_eq!(c.patch.hunks[0].0.to_string(), "@@ -1,3 +1,3 @@");
        assert_eq!(
            c.patch.render(),
            "--- a/f.txt\n+++ b/f.txt\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n"
        );
    }

    #[test]
    fn test_offsets_accumulate_across_hunks() {
        let source = src(&["1", "2", "3", "4", "5", "6", "7", "8"]);
        let h1 = DiffHunk::from_raw(&[" 1", "+1a", "+1b", " 2"]);
        let h2 = DiffHunk::from_raw(&[" 6", "-7", " 8"]);
        let c = correct_hunks("n", &source, &[h1, h2]);

        let headers: Vec<_> = c.patch.hunks.iter().map(|(h, _)| h.to_string()).collect();
        assert_eq!(headers, vec!["@@ -1,2 +1,4 @@", "@@ -6,3 +8,2 @@"]);
    }

    #[test]
    fn test_unanchored_hunk_does_not_shift_offset() {
        let source = src(&["a", "b", "c", "d"]);
        let lost = DiffHunk::from_raw(&[" zzz", "+new"]);
        let h = DiffHunk::from_raw(&[" c", "-d", "+D"]);
        let c = correct_hunks("f", &source, &[lost, h]);

        assert_eq!(c.dropped.len(), 1);
        assert_eq!(c.dropped[0].index, 0);
        assert_eq!(c.dropped[0].first_line, "zzz");
        assert_eq!(c.patch.hunks[0].0.to_string(), "@@ -3,2 +3,2 @@");
    }

    #[test]
    fn test_whitespace_insensitive_anchor() {
        let source = src(&["fn a() {", "    return 1;", "}"]);
        let hunk = DiffHunk::from_raw(&[" fn a() {", "-  return 1;  ", "+    return 2;", " }"]);
        let c = correct_hunks("a.rs", &source, &[hunk]);
        assert_eq!(c.patch.hunks[0].0.old_start, 1);
    }

    #[test]
    fn test_first_match_wins() {
        let source = src(&["x", "y", "x", "y"]);
        let hunk = DiffHunk::from_raw(&[" x", "-y", "+z"]);
        let c = correct_hunks("f", &source, &[hunk]);
        assert_eq!(c.patch.hunks[0].0.old_start, 1);
    }

    #[test]
    fn test_pure_addition_to_empty_file() {
        let source: Vec<String> = Vec::new();
        let hunk = DiffHunk::from_raw(&["+one", "+two"]);
        let c = correct_hunks("new.txt", &source, &[hunk]);
        assert_eq!(c.patch.hunks[0].0.to_string(), "@@ -0,0 +1,2 @@");
    }

    #[test]
    fn test_pure_addition_appends_at_end() {
        let source = src(&["a", "b"]);
        let hunk = DiffHunk::from_raw(&["+c"]);
        let c = correct_hunks("f", &source, &[hunk]);
        assert_eq!(c.patch.hunks[0].0.to_string(), "@@ -2,0 +3,1 @@");
    }

    #[test]
    fn test_all_dropped_renders_empty() {
        let source = src(&["a"]);
        let c = correct_hunks("f", &source, &[DiffHunk::from_raw(&["-nope"])]);
        assert!(c.patch.is_empty());
        assert_eq!(c.patch.render(), "");
    }

    #[test]
    fn test_untagged_line_becomes_context() {
        assert_eq!(HunkLine::parse("bare"), HunkLine::Context("bare".into()));
        assert_eq!(HunkLine::parse(""), HunkLine::Context(String::new()));
        assert_eq!(HunkLine::Context("bare".into()).to_string(), " bare");
    }
}
