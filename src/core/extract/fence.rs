//! Markdown fence scanner.
//!
//! Yields every fenced region with its info tag and the hint line that
//! precedes it. Fences open with three or more backticks or tildes (up to
//! three spaces of indentation) and close with the same character repeated
//! at least as many times.

use tracing::warn;

/// One fenced region of the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fence<'a> {
    /// First word of the info string, lowercased ("" when untagged)
    pub tag: String,
    /// Nearest non-blank line before the opening fence
    pub hint: Option<&'a str>,
    /// Lines between the fences, without terminators
    pub body: Vec<&'a str>,
    /// 1-based line number of the opening fence
    pub line: usize,
}

/// Lazy iterator over the fences in a text
pub struct FenceScanner<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    /// First line that may serve as a hint (just past the last closing fence)
    boundary: usize,
}

pub fn scan(text: &str) -> FenceScanner<'_> {
    FenceScanner {
        lines: text.lines().map(|l| l.trim_end_matches('\r')).collect(),
        pos: 0,
        boundary: 0,
    }
}

impl<'a> FenceScanner<'a> {
    fn hint_for(&self, open: usize) -> Option<&'a str> {
        let mut j = open.checked_sub(1)?;
        // One blank line is allowed between hint and fence
        if self.lines[j].trim().is_empty() {
            j = j.checked_sub(1)?;
        }
        if j < self.boundary {
            return None;
        }
        let line = self.lines[j];
        (!line.trim().is_empty() && opening_fence(line).is_none()).then_some(line)
    }
}

impl<'a> Iterator for FenceScanner<'a> {
    type Item = Fence<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.lines.len() {
            let open = self.pos;
            self.pos += 1;

            let Some((ch, count, info)) = opening_fence(self.lines[open]) else {
                continue;
            };

            let close = (open + 1..self.lines.len())
                .find(|&i| is_closing_fence(self.lines[i], ch, count));
            let Some(close) = close else {
                // Only the opener is dropped; shorter fences after it still count
                warn!(line = open + 1, "unterminated code fence ignored");
                continue;
            };

            let fence = Fence {
                tag: info
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .to_ascii_lowercase(),
                hint: self.hint_for(open),
                body: self.lines[open + 1..close].to_vec(),
                line: open + 1,
            };
            self.pos = close + 1;
            self.boundary = close + 1;
            return Some(fence);
        }
        None
    }
}

/// Parse an opening fence: (fence char, run length, info string)
fn opening_fence(line: &str) -> Option<(char, usize, &str)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let ch = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let count = rest.chars().take_while(|c| *c == ch).count();
    if count < 3 {
        return None;
    }
    let info = rest[count..].trim();
    // Backtick fences may not carry backticks in their info string
    if ch == '`' && info.contains('`') {
        return None;
    }
    Some((ch, count, info))
}

fn is_closing_fence(line: &str, ch: char, count: usize) -> bool {
    let trimmed = line.trim();
    let run = trimmed.chars().take_while(|c| *c == ch).count();
    let indent = line.len() - line.trim_start_matches(' ').len();
    indent <= 3 && run >= count && run == trimmed.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_and_body() {
        let text = "Intro\n\n`src/a.rs`\n```rust\nfn a() {}\n```\n";
        let fences: Vec<_> = scan(text).collect();
        assert_eq!(fences.len(), 1);
        assert_eq!(fences[0].tag, "rust");
        assert_eq!(fences[0].hint, Some("`src/a.rs`"));
        assert_eq!(fences[0].body, vec!["fn a() {}"]);
        assert_eq!(fences[0].line, 4);
    }

    #[test]
    fn test_one_blank_line_between_hint_and_fence() {
        let text = "src/a.py\n\n```\nx = 1\n```\n";
        let f = scan(text).next().unwrap();
        assert_eq!(f.hint, Some("src/a.py"));

        let text = "src/a.py\n\n\n```\nx = 1\n```\n";
        assert_eq!(scan(text).next().unwrap().hint, None);
    }

    #[test]
    fn test_closing_fence_resets_hint() {
        let text = "```\none\n```\n```\ntwo\n```\n";
        let fences: Vec<_> = scan(text).collect();
        assert_eq!(fences.len(), 2);
        assert_eq!(fences[1].hint, None);
        assert_eq!(fences[1].body, vec!["two"]);
    }

    #[test]
    fn test_longer_fence_contains_shorter() {
        let text = "````md\n```\ninner\n```\n````\n";
        let f = scan(text).next().unwrap();
        assert_eq!(f.tag, "md");
        assert_eq!(f.body, vec!["```", "inner", "```"]);
    }

    #[test]
    fn test_tilde_fence_and_crlf() {
        let text = "~~~diff\r\n-a\r\n+b\r\n~~~\r\n";
        let f = scan(text).next().unwrap();
        assert_eq!(f.tag, "diff");
        assert_eq!(f.body, vec!["-a", "+b"]);
    }

    #[test]
    fn test_unterminated_fence_is_dropped() {
        let text = "`a.rs`\n```rust\nfn a() {}\n";
        assert_eq!(scan(text).count(), 0);
    }

    #[test]
    fn test_unterminated_long_fence_keeps_later_fences() {
        let text = "````\nstray opener\n\n`src/a.py`\n```python\nx = 1\n```\n";
        let fences: Vec<_> = scan(text).collect();
        assert_eq!(fences.len(), 1);
        assert_eq!(fences[0].hint, Some("`src/a.py`"));
        assert_eq!(fences[0].body, vec!["x = 1"]);
    }
}
