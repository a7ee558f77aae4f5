//! Input acquisition, line splitting and atomic writes.

use anyhow::{Context, Result};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where pasted text was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOrigin {
    Clipboard,
    Stdin,
    File(PathBuf),
}

impl std::fmt::Display for InputOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputOrigin::Clipboard => write!(f, "system clipboard"),
            InputOrigin::Stdin => write!(f, "standard input"),
            InputOrigin::File(p) => write!(f, "'{}'", p.display()),
        }
    }
}

/// How to look for input text
#[derive(Debug, Clone)]
pub enum InputRequest {
    /// Clipboard only
    Clipboard,
    /// A named file, or stdin for "-"
    File(PathBuf),
    /// Clipboard first, then the fallback file
    ClipboardThenFile(PathBuf),
}

/// Read the requested input. Returns Ok(None) when nothing usable was found.
pub fn read_input(req: &InputRequest) -> Result<Option<(String, InputOrigin)>> {
    let found = match req {
        InputRequest::Clipboard => Some((get_clipboard_content()?, InputOrigin::Clipboard)),
        InputRequest::File(path) if path.as_os_str() == "-" => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read standard input")?;
            Some((buf, InputOrigin::Stdin))
        }
        InputRequest::File(path) => {
            if !path.exists() {
                anyhow::bail!("Source file '{}' not found", path.display());
            }
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read source file: {}", path.display()))?;
            Some((text, InputOrigin::File(path.clone())))
        }
        InputRequest::ClipboardThenFile(path) => {
            // An unavailable clipboard (headless box) is the same as an empty one
            let clip = get_clipboard_content().unwrap_or_else(|e| {
                debug!("clipboard unavailable: {e:#}");
                String::new()
            });
            if !clip.trim().is_empty() {
                Some((clip, InputOrigin::Clipboard))
            } else if path.exists() {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read source file: {}", path.display()))?;
                Some((text, InputOrigin::File(path.clone())))
            } else {
                None
            }
        }
    };

    Ok(found.filter(|(text, _)| !text.trim().is_empty()))
}

/// Get content from system clipboard
fn get_clipboard_content() -> Result<String> {
    use arboard::Clipboard;
    let mut clipboard = Clipboard::new().context("Failed to access clipboard")?;
    clipboard
        .get_text()
        .context("Failed to get text from clipboard")
}

/// Newline convention of an existing file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }

    /// Detect from the first line break; LF when there is none
    pub fn detect(s: &str) -> Self {
        match s.find('\n') {
            Some(i) if i > 0 && s.as_bytes()[i - 1] == b'\r' => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }
}

/// Split text into lines without terminators, tolerating CRLF
pub fn split_lines(s: &str) -> Vec<String> {
    s.lines()
        .map(|l| l.trim_end_matches('\r').to_string())
        .collect()
}

/// Read a file as lines; Ok(None) when it does not exist
pub fn read_lines(path: &Path) -> Result<Option<Vec<String>>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(split_lines(&s))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to read {}", path.display()))),
    }
}

/// Join lines with `ending`, terminating a non-empty file with a newline
pub fn render_lines(lines: &[String], ending: LineEnding) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let nl = ending.as_str();
    let mut out = lines.join(nl);
    out.push_str(nl);
    out
}

/// Atomic write with robust temp file strategy
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    // Prefer same-dir tempfile; fall back to OS temp on EPERM/ENOENT
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    // Preserve original permissions when the file exists
    let perms = fs::metadata(path).map(|m| m.permissions()).ok();

    let tmp = match tempfile::NamedTempFile::new_in(dir) {
        Ok(t) => t,
        Err(_) => tempfile::NamedTempFile::new()?, // fallback to /tmp
    };

    // Write the content fully
    use std::io::Write;
    let mut file = tmp.as_file();
    file.set_len(0)?;
    file.write_all(data)?;
    file.sync_all()?;

    if let Some(perms) = perms {
        fs::set_permissions(tmp.path(), perms).context("set temp permissions")?;
    }

    // Atomically replace the destination
    match tmp.persist(path) {
        Ok(_) => {}
        Err(e) => {
            // Different filesystem? Try copy fallback
            fs::copy(e.file.path(), path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
    }

    // fsync parent dir to ensure durability on Unix
    let _ = sync_dir(dir);

    Ok(())
}

/// Cross-platform directory fsync helper.
#[cfg(unix)]
pub fn sync_dir(p: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let f = fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECTORY)
        .open(p)?;
    f.sync_all()
}

#[cfg(not(unix))]
pub fn sync_dir(_p: &Path) -> std::io::Result<()> {
    // No reliable directory fsync; best-effort no-op.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_split_and_render_crlf() {
        let text = "a\r\nb\r\nc\r\n";
        let ending = LineEnding::detect(text);
        assert_eq!(ending, LineEnding::CrLf);

        let lines = split_lines(text);
        assert_eq!(lines, vec!["a", "b", "c"]);
        assert_eq!(render_lines(&lines, ending), text);
    }

    #[test]
    fn test_render_empty_is_empty() {
        assert_eq!(render_lines(&[], LineEnding::Lf), "");
        assert_eq!(LineEnding::detect("no newline"), LineEnding::Lf);
    }

    #[test]
    fn test_read_lines_missing_file() {
        let dir = tempdir().unwrap();
        assert!(read_lines(&dir.path().join("nope.txt")).unwrap().is_none());
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "old\n").unwrap();

        write_atomic(&path, b"new\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn test_file_input_missing_is_error() {
        let dir = tempdir().unwrap();
        let req = InputRequest::File(dir.path().join("itf.txt"));
        assert!(read_input(&req).is_err());
    }

    #[test]
    fn test_blank_file_input_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("itf.txt");
        fs::write(&path, "  \n\n").unwrap();
        assert!(read_input(&InputRequest::File(path)).unwrap().is_none());
    }
}
