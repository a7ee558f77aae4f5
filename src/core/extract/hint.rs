//! Path discovery from hint lines and first-line comments.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Comment delimiters: (prefix, suffix); suffix is empty for line comments
pub type CommentSyntax = (&'static str, &'static str);

const HASH: CommentSyntax = ("#", "");
const SLASHES: CommentSyntax = ("//", "");
const DASHES: CommentSyntax = ("--", "");
const MARKUP: CommentSyntax = ("<!--", "-->");
const BLOCK: CommentSyntax = ("/*", "*/");

/// Every distinct syntax, probed in this order for embedded paths
const ALL_SYNTAXES: [CommentSyntax; 5] = [MARKUP, BLOCK, SLASHES, DASHES, HASH];

const EXTENSION_SYNTAX: &[(&str, CommentSyntax)] = &[
    ("py", HASH),
    ("rb", HASH),
    ("sh", HASH),
    ("bash", HASH),
    ("zsh", HASH),
    ("yaml", HASH),
    ("yml", HASH),
    ("toml", HASH),
    ("dockerfile", HASH),
    ("js", SLASHES),
    ("jsx", SLASHES),
    ("ts", SLASHES),
    ("tsx", SLASHES),
    ("java", SLASHES),
    ("c", SLASHES),
    ("cpp", SLASHES),
    ("h", SLASHES),
    ("hpp", SLASHES),
    ("cs", SLASHES),
    ("go", SLASHES),
    ("rs", SLASHES),
    ("dart", SLASHES),
    ("kt", SLASHES),
    ("kts", SLASHES),
    ("swift", SLASHES),
    ("scala", SLASHES),
    ("scss", SLASHES),
    ("less", SLASHES),
    ("sql", DASHES),
    ("lua", DASHES),
    ("hs", DASHES),
    ("html", MARKUP),
    ("xml", MARKUP),
    ("md", MARKUP),
    ("vue", MARKUP),
    ("css", BLOCK),
];

/// Comment syntax used by files at `path`
pub fn comment_syntax(path: &str) -> CommentSyntax {
    let name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_ascii_lowercase();

    if name.contains("makefile") || name.starts_with("dockerfile") {
        return HASH;
    }

    let ext = Path::new(&name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    EXTENSION_SYNTAX
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, s)| *s)
        .unwrap_or(SLASHES)
}

static BACKTICK_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`\n]+)`").expect("static regex"));
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#+\s*").expect("static regex"));
static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[*_]*(?:file\s*name|filename|file|path)\s*:[*_]*\s*").expect("static regex")
});
static COMMENT_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:file|path)\s*:\s*").expect("static regex"));

/// Does `s` look like a file path rather than prose?
pub fn is_path_like(s: &str) -> bool {
    !s.is_empty()
        && !s.chars().any(char::is_whitespace)
        && (s.contains('/') || s.contains('.'))
        && !s.contains("://")
        && !s.ends_with('.')
        && !s.ends_with('/')
}

fn strip_heading(s: &str) -> String {
    HEADING.replace(s, "").trim().to_string()
}

fn strip_emphasis(s: &str) -> String {
    for marker in ["**", "__", "*", "_"] {
        if s.len() > marker.len() * 2 && s.starts_with(marker) && s.ends_with(marker) {
            return s[marker.len()..s.len() - marker.len()].trim().to_string();
        }
    }
    s.to_string()
}

fn strip_label(s: &str) -> String {
    LABEL.replace(s, "").trim().to_string()
}

fn strip_trailing_colon(s: &str) -> String {
    s.strip_suffix(':').unwrap_or(s).trim().to_string()
}

type Stripper = fn(&str) -> String;

const STRIPPERS: [Stripper; 4] = [strip_heading, strip_emphasis, strip_label, strip_trailing_colon];

/// Extract a path from the line preceding a fence
pub fn path_from_hint(line: &str) -> Option<String> {
    let hint = line.trim();
    if hint.is_empty() {
        return None;
    }

    // A backtick span anywhere on the line wins
    if let Some(c) = BACKTICK_SPAN.captures(hint) {
        let candidate = c[1].trim();
        if is_path_like(candidate) {
            return Some(candidate.to_string());
        }
    }

    // Peel markdown decoration until the line stops changing
    let mut current = hint.to_string();
    loop {
        let next = STRIPPERS.iter().fold(current.clone(), |acc, strip| strip(&acc));
        if next == current {
            break;
        }
        current = next;
    }

    is_path_like(&current).then_some(current)
}

/// Extract a path written as a comment on a block's first line.
///
/// The comment must use the syntax of the file it names, so `# notes.txt`
/// inside a Rust block is not taken as a path.
pub fn path_from_comment(first_line: &str) -> Option<String> {
    let line = first_line.trim();
    for (prefix, suffix) in ALL_SYNTAXES {
        let Some(rest) = line.strip_prefix(prefix) else {
            continue;
        };
        let inner = if suffix.is_empty() {
            rest
        } else {
            match rest.strip_suffix(suffix) {
                Some(inner) => inner,
                None => continue,
            }
        };
        let candidate = COMMENT_LABEL.replace(inner.trim(), "").trim().to_string();
        if is_path_like(&candidate) && comment_syntax(&candidate) == (prefix, suffix) {
            return Some(candidate);
        }
        // A line matches at most one syntax
        return None;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_styles() {
        let cases = [
            ("`src/main.rs`", "src/main.rs"),
            ("Here is `src/lib.rs` updated:", "src/lib.rs"),
            ("### src/app.py", "src/app.py"),
            ("**src/app.py**", "src/app.py"),
            ("*src/app.py*", "src/app.py"),
            ("File: src/app.py", "src/app.py"),
            ("**File:** src/app.py", "src/app.py"),
            ("## Path: web/index.html", "web/index.html"),
            ("src/app.py:", "src/app.py"),
            ("Cargo.toml", "Cargo.toml"),
        ];
        for (line, want) in cases {
            assert_eq!(path_from_hint(line).as_deref(), Some(want), "hint {line:?}");
        }
    }

    #[test]
    fn test_prose_is_not_a_path() {
        for line in [
            "Here is the updated file:",
            "Done.",
            "https://example.com/a.rs",
            "`let x = 1;` is fine",
            "",
        ] {
            assert_eq!(path_from_hint(line), None, "hint {line:?}");
        }
    }

    #[test]
    fn test_comment_syntax_table() {
        assert_eq!(comment_syntax("a/b.py"), ("#", ""));
        assert_eq!(comment_syntax("Makefile"), ("#", ""));
        assert_eq!(comment_syntax("docker/Dockerfile"), ("#", ""));
        assert_eq!(comment_syntax("q.SQL"), ("--", ""));
        assert_eq!(comment_syntax("x.css"), ("/*", "*/"));
        assert_eq!(comment_syntax("noext"), ("//", ""));
    }

    #[test]
    fn test_embedded_comment_paths() {
        assert_eq!(path_from_comment("# src/app.py").as_deref(), Some("src/app.py"));
        assert_eq!(path_from_comment("// file: src/lib.rs").as_deref(), Some("src/lib.rs"));
        assert_eq!(
            path_from_comment("<!-- templates/base.html -->").as_deref(),
            Some("templates/base.html")
        );
        assert_eq!(path_from_comment("/* styles/site.css */").as_deref(), Some("styles/site.css"));
        assert_eq!(path_from_comment("-- db/schema.sql").as_deref(), Some("db/schema.sql"));
    }

    #[test]
    fn test_embedded_comment_syntax_must_match() {
        // Hash comment naming a Rust file
        assert_eq!(path_from_comment("# src/lib.rs"), None);
        // Ordinary code comment
        assert_eq!(path_from_comment("// compute the total"), None);
        assert_eq!(path_from_comment("fn main() {}"), None);
    }
}
