//! Block and diff extraction from pasted text.
//!
//! Three lazy views over the same fence scan: whole-file content blocks
//! (untagged or language-tagged fences), diff blocks (fences tagged `diff`,
//! `patch` or `udiff`) and file operations (`delete` and `rename` fences,
//! plus diffs whose new side is `/dev/null`).

pub mod fence;
pub mod hint;

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};

use crate::core::correct::{DiffHunk, HunkLine};

pub use fence::Fence;
pub use hint::{comment_syntax, path_from_comment, path_from_hint};

/// Fence tags routed to diff parsing
const DIFF_TAGS: [&str; 3] = ["diff", "patch", "udiff"];

/// Fence tags listing whole-file operations, one per line
const OP_TAGS: [&str; 2] = ["delete", "rename"];

/// Lines before the first hunk that carry no content
const DIFF_METADATA: [&str; 9] = [
    "index ",
    "new file mode",
    "deleted file mode",
    "old mode",
    "new mode",
    "similarity index",
    "rename from",
    "rename to",
    "Binary files",
];

#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("invalid --only glob '{glob}': {source}")]
    InvalidGlob {
        glob: String,
        #[source]
        source: globset::Error,
    },
}

/// Full replacement content for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock {
    pub path: String,
    pub lines: Vec<String>,
}

/// Raw hunks for one file, headers discarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffBlock {
    pub path: String,
    pub hunks: Vec<DiffHunk>,
}

/// Whole-file operation without new content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    Delete { path: String },
    Rename { from: String, to: String },
}

/// Extension allow-list plus optional glob filter
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    extensions: Vec<String>,
    only: Option<GlobSet>,
}

impl PathFilter {
    pub fn new(extensions: &[String], only: &[String]) -> Result<Self, ExtractError> {
        let extensions = extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        let only = if only.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for g in only {
                let glob = Glob::new(g).map_err(|source| ExtractError::InvalidGlob {
                    glob: g.clone(),
                    source,
                })?;
                builder.add(glob);
            }
            Some(builder.build().map_err(|source| ExtractError::InvalidGlob {
                glob: only.join(","),
                source,
            })?)
        };

        Ok(Self { extensions, only })
    }

    pub fn allows(&self, path: &str) -> bool {
        let path = path.strip_prefix("./").unwrap_or(path);

        if !self.extensions.is_empty() {
            let ext = Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase);
            match ext {
                Some(ext) if self.extensions.contains(&ext) => {}
                _ => return false,
            }
        }

        self.only.as_ref().is_none_or(|set| set.is_match(path))
    }
}

pub fn is_diff_tag(tag: &str) -> bool {
    DIFF_TAGS.contains(&tag)
}

fn is_op_tag(tag: &str) -> bool {
    OP_TAGS.contains(&tag)
}

/// Content blocks with a discoverable path, in document order
pub fn content_blocks<'a>(
    text: &'a str,
    filter: &'a PathFilter,
) -> impl Iterator<Item = FileBlock> + 'a {
    fence::scan(text).filter_map(move |f| {
        if is_diff_tag(&f.tag) || is_op_tag(&f.tag) {
            return None;
        }

        // Hint line first, then a same-syntax comment on the first line
        let path = f
            .hint
            .and_then(path_from_hint)
            .or_else(|| f.body.first().and_then(|l| path_from_comment(l)));
        let Some(path) = path else {
            debug!(line = f.line, "code block without a path ignored");
            return None;
        };
        if !filter.allows(&path) {
            debug!(%path, "block filtered out");
            return None;
        }

        let mut lines: Vec<String> = f.body.iter().map(|l| l.to_string()).collect();
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        Some(FileBlock { path, lines })
    })
}

/// Diff blocks with a discoverable path, in document order.
/// A fence holding several file sections yields one block per section.
pub fn diff_blocks<'a>(
    text: &'a str,
    filter: &'a PathFilter,
) -> impl Iterator<Item = DiffBlock> + 'a {
    fence::scan(text)
        .filter(|f| is_diff_tag(&f.tag))
        .flat_map(|f| parse_diff_body(&f.body, f.hint))
        .filter_map(|item| match item {
            DiffItem::Hunks(block) => Some(block),
            DiffItem::Deleted(_) => None,
        })
        .filter(move |b| {
            let ok = filter.allows(&b.path);
            if !ok {
                debug!(path = %b.path, "diff filtered out");
            }
            ok
        })
}

/// Deletions and renames in document order.
///
/// A `delete` fence lists one path per line. A `rename` fence lists
/// `old new` pairs; lines without exactly two fields are skipped. A rename
/// passes the filter when either side does.
pub fn file_ops<'a>(text: &'a str, filter: &'a PathFilter) -> impl Iterator<Item = FileOp> + 'a {
    fence::scan(text)
        .flat_map(|f| {
            let ops: Vec<FileOp> = match f.tag.as_str() {
                "delete" => f
                    .body
                    .iter()
                    .map(|l| l.trim())
                    .filter(|l| !l.is_empty())
                    .map(|l| FileOp::Delete { path: l.to_string() })
                    .collect(),
                "rename" => f
                    .body
                    .iter()
                    .filter_map(|l| {
                        let mut fields = l.split_whitespace();
                        match (fields.next(), fields.next(), fields.next()) {
                            (Some(from), Some(to), None) => {
                                Some(FileOp::Rename { from: from.to_string(), to: to.to_string() })
                            }
                            (None, ..) => None,
                            _ => {
                                warn!(line = l.trim(), "rename line needs exactly two paths; skipped");
                                None
                            }
                        }
                    })
                    .collect(),
                tag if is_diff_tag(tag) => parse_diff_body(&f.body, f.hint)
                    .into_iter()
                    .filter_map(|item| match item {
                        DiffItem::Deleted(path) => Some(FileOp::Delete { path }),
                        DiffItem::Hunks(_) => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            ops
        })
        .filter(move |op| {
            let ok = match op {
                FileOp::Delete { path } => filter.allows(path),
                FileOp::Rename { from, to } => filter.allows(from) || filter.allows(to),
            };
            if !ok {
                debug!(?op, "file operation filtered out");
            }
            ok
        })
}

/// One file section of a diff fence
enum DiffItem {
    Hunks(DiffBlock),
    /// `+++ /dev/null`: the old side is removed outright
    Deleted(String),
}

#[derive(Default)]
struct Section<'a> {
    git_path: Option<String>,
    old_path: Option<String>,
    new_path: Option<String>,
    hunks: Vec<DiffHunk>,
    current: Vec<&'a str>,
}

impl<'a> Section<'a> {
    fn has_content(&self) -> bool {
        !self.hunks.is_empty() || !self.current.is_empty()
    }

    fn is_deletion(&self) -> bool {
        self.new_path.as_deref() == Some("/dev/null")
    }

    fn flush_hunk(&mut self) {
        // Trailing blank lines are paste artifacts, not context
        while self.current.last().is_some_and(|l| l.is_empty()) {
            self.current.pop();
        }
        if !self.current.is_empty() {
            let lines = self.current.drain(..).map(HunkLine::parse).collect();
            self.hunks.push(DiffHunk::new(lines));
        }
    }

    fn finish(mut self, hint: Option<&str>, out: &mut Vec<DiffItem>) {
        self.flush_hunk();
        if self.is_deletion() {
            // Hunk bodies of a deletion are not checked against the file
            match self.old_path.filter(|p| p != "/dev/null").or(self.git_path) {
                Some(path) => out.push(DiffItem::Deleted(path)),
                None => warn!("deletion diff without a path ignored"),
            }
            return;
        }
        if self.hunks.is_empty() {
            return;
        }

        let path = self
            .new_path
            .or(self.old_path.filter(|p| p != "/dev/null"))
            .or(self.git_path)
            .or_else(|| hint.and_then(path_from_hint));

        match path {
            Some(path) => out.push(DiffItem::Hunks(DiffBlock { path, hunks: self.hunks })),
            None => debug!("diff block without a path ignored"),
        }
    }
}

/// Split a diff fence body into per-file hunk lists
fn parse_diff_body(body: &[&str], hint: Option<&str>) -> Vec<DiffItem> {
    let mut out = Vec::new();
    let mut cur = Section::default();
    let mut i = 0;

    while i < body.len() {
        let line = body[i];
        i += 1;

        if let Some(rest) = line.strip_prefix("diff --git ") {
            std::mem::take(&mut cur).finish(hint, &mut out);
            cur.git_path = rest.rfind(" b/").map(|at| rest[at + 3..].trim().to_string());
            continue;
        }

        // `--- x` only counts as a header when `+++ y` follows
        if let Some(old) = line.strip_prefix("--- ")
            && let Some(new) = body.get(i).and_then(|n| n.strip_prefix("+++ "))
        {
            if cur.has_content() || cur.is_deletion() {
                std::mem::take(&mut cur).finish(hint, &mut out);
            }
            cur.old_path = Some(header_path(old, "a/"));
            cur.new_path = Some(header_path(new, "b/"));
            i += 1;
            continue;
        }

        if let Some(new) = line.strip_prefix("+++ ")
            && !cur.has_content()
        {
            cur.new_path = Some(header_path(new, "b/"));
            continue;
        }

        if line.starts_with("@@") {
            cur.flush_hunk();
            continue;
        }

        if line.starts_with('\\') {
            // "\ No newline at end of file"
            continue;
        }

        if cur.current.is_empty() && DIFF_METADATA.iter().any(|m| line.starts_with(m)) {
            continue;
        }

        cur.current.push(line);
    }

    cur.finish(hint, &mut out);
    out
}

/// Path from a `---`/`+++` header: timestamps and the a/ b/ prefix dropped
fn header_path(raw: &str, prefix: &str) -> String {
    let p = raw.split('\t').next().unwrap_or("").trim();
    let p = match p.split_once(' ') {
        Some((head, tail)) if tail.trim_start().starts_with(|c: char| c.is_ascii_digit()) => head,
        _ => p,
    };
    let p = p.trim_matches('"');
    p.strip_prefix(prefix).unwrap_or(p).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> PathFilter {
        PathFilter::default()
    }

    #[test]
    fn test_content_blocks_with_hints() {
        let text = "\
Update `src/a.py`:

```python
x = 1
```

Some prose.

```python
# src/b.py
y = 2

```

```
no path here
```
";
        let filter = all();
        let blocks: Vec<_> = content_blocks(text, &filter).collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].path, "src/a.py");
        assert_eq!(blocks[0].lines, vec!["x = 1"]);
        assert_eq!(blocks[1].path, "src/b.py");
        // The path comment stays in the content; trailing blanks are dropped
        assert_eq!(blocks[1].lines, vec!["# src/b.py", "y = 2"]);
    }

    #[test]
    fn test_diff_fence_never_a_content_block() {
        let text = "`src/a.py`\n```diff\n-x = 1\n+x = 2\n```\n";
        let filter = all();
        assert_eq!(content_blocks(text, &filter).count(), 0);

        let diffs: Vec<_> = diff_blocks(text, &filter).collect();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "src/a.py");
        assert_eq!(diffs[0].hunks.len(), 1);
    }

    #[test]
    fn test_diff_headers_and_hunk_split() {
        let text = "\
```diff
diff --git a/src/m.rs b/src/m.rs
index 123..456 100644
--- a/src/m.rs\t2024-01-01 00:00:00
+++ b/src/m.rs\t2024-01-01 00:00:00
@@ -1,2 +1,2 @@
 fn a() {
-    1
+    2
@@ -99,1 +99,1 @@
-old
+new
\\ No newline at end of file
```
";
        let filter = all();
        let diffs: Vec<_> = diff_blocks(text, &filter).collect();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "src/m.rs");
        assert_eq!(diffs[0].hunks.len(), 2);
        assert_eq!(
            diffs[0].hunks[1].lines,
            vec![HunkLine::Remove("old".into()), HunkLine::Add("new".into())]
        );
    }

    #[test]
    fn test_multi_file_diff_fence() {
        let text = "\
```diff
--- a/one.txt
+++ b/one.txt
-a
+b
--- a/two.txt
+++ b/two.txt
-c
+d
```
";
        let filter = all();
        let paths: Vec<_> = diff_blocks(text, &filter).map(|d| d.path).collect();
        assert_eq!(paths, vec!["one.txt", "two.txt"]);
    }

    #[test]
    fn test_deletion_diff_becomes_file_op() {
        let text = "```diff\n--- a/gone.txt\n+++ /dev/null\n-bye\n```\n";
        let filter = all();
        assert_eq!(diff_blocks(text, &filter).count(), 0);
        assert_eq!(
            file_ops(text, &filter).collect::<Vec<_>>(),
            vec![FileOp::Delete { path: "gone.txt".into() }]
        );
    }

    #[test]
    fn test_delete_and_rename_fences() {
        let text = "\
```delete
old/a.py

docs/notes.md
```

```rename
src/x.py src/y.py
only-one-field.py
a.md b.md c.md
```
";
        let filter = all();
        let ops: Vec<_> = file_ops(text, &filter).collect();
        assert_eq!(
            ops,
            vec![
                FileOp::Delete { path: "old/a.py".into() },
                FileOp::Delete { path: "docs/notes.md".into() },
                FileOp::Rename { from: "src/x.py".into(), to: "src/y.py".into() },
            ]
        );
        // Operation fences never carry content
        assert_eq!(content_blocks(text, &filter).count(), 0);

        // A rename survives when either side is allowed
        let py = PathFilter::new(&["py".into()], &[]).unwrap();
        let kept: Vec<_> = file_ops("```rename\nnotes.txt main.py\n```\n", &py).collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(file_ops(text, &py).count(), 2);
    }

    #[test]
    fn test_removed_sql_comment_is_not_a_header() {
        let text = "`q.sql`\n```diff\n select 1;\n--- old comment\n+-- new comment\n```\n";
        let filter = all();
        let d: Vec<_> = diff_blocks(text, &filter).collect();
        assert_eq!(d[0].path, "q.sql");
        assert_eq!(d[0].hunks[0].lines[1], HunkLine::Remove("-- old comment".into()));
    }

    #[test]
    fn test_extension_and_glob_filter() {
        let f = PathFilter::new(&[".rs".into(), "PY".into()], &[]).unwrap();
        assert!(f.allows("src/main.rs"));
        assert!(f.allows("a/b.py"));
        assert!(!f.allows("README.md"));
        assert!(!f.allows("Makefile"));

        let g = PathFilter::new(&[], &["src/**".into()]).unwrap();
        assert!(g.allows("./src/x/y.txt"));
        assert!(!g.allows("docs/y.txt"));

        assert!(PathFilter::new(&[], &["[".into()]).is_err());
    }
}
