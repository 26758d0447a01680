//! File loading and prompt-bundle assembly.

use std::fs;
use std::path::Path;
use tracing::warn;

/// Inserted between the head and tail slices of truncated content.
pub const ELISION_MARKER: &str = "\n...(内容已截断)...\n";

/// Read a file as UTF-8 text.
///
/// Failures are returned as text and end up in the prompt like any other content,
/// so a single unreadable file never aborts its directory.
pub fn load_file(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            format!("Error reading file: {}", e)
        }
    }
}

/// Keep the first and last `max_length / 2` characters of `content` when it is too long.
pub fn truncate_content(content: &str, max_length: usize) -> String {
    let total_chars = content.chars().count();
    if total_chars <= max_length {
        return content.to_string();
    }

    let half = max_length / 2;
    let head_end = byte_offset(content, half);
    let tail_start = byte_offset(content, total_chars - half);

    let mut truncated =
        String::with_capacity(head_end + ELISION_MARKER.len() + content.len() - tail_start);
    truncated.push_str(&content[..head_end]);
    truncated.push_str(ELISION_MARKER);
    truncated.push_str(&content[tail_start..]);
    truncated
}

fn byte_offset(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map_or(s.len(), |(idx, _)| idx)
}

/// The files of one directory, in the order they will appear in the prompt.
#[derive(Debug, Default, Clone)]
pub struct Bundle {
    entries: Vec<(String, String)>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, relative_path: impl Into<String>, content: impl Into<String>) {
        self.entries.push((relative_path.into(), content.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(path, content)| format!("\n### File: {}\n```\n{}\n```", path, content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn short_content_is_returned_unchanged() {
        let at_limit = "x".repeat(8000);
        for text in ["", "fn main() {}", at_limit.as_str()] {
            assert_eq!(truncate_content(text, 8000), text);
        }
    }

    #[test]
    fn long_content_keeps_head_and_tail() {
        let text: String = (0..20_000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let out = truncate_content(&text, 8000);

        assert_eq!(
            out.chars().count(),
            2 * (8000 / 2) + ELISION_MARKER.chars().count()
        );
        assert!(out.starts_with(&text[..4000]));
        assert!(out.ends_with(&text[text.len() - 4000..]));
        assert!(out.contains(ELISION_MARKER));
    }

    #[test]
    fn odd_limit_drops_the_remainder() {
        let out = truncate_content("abcdefghij", 5);
        assert_eq!(out, format!("ab{}ij", ELISION_MARKER));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "分析".repeat(10);
        let out = truncate_content(&text, 6);
        assert_eq!(out, format!("分析分{}析分析", ELISION_MARKER));
    }

    #[test]
    fn unreadable_file_becomes_inline_marker() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("gone.py");
        assert!(load_file(&missing).starts_with("Error reading file:"));

        let binary = tmp.path().join("blob.json");
        fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();
        assert!(load_file(&binary).starts_with("Error reading file:"));
    }

    #[test]
    fn bundle_renders_each_file_with_a_header() {
        let mut bundle = Bundle::new();
        bundle.push("a.py", "print(1)");
        bundle.push("b.js", "x()");

        assert_eq!(
            bundle.render(),
            "\n### File: a.py\n```\nprint(1)\n```\n\n### File: b.js\n```\nx()\n```"
        );
        assert_eq!(bundle.len(), 2);
    }
}
