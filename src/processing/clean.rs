//! Text normalisation and noise cleaning for the observation column.

use regex::{Regex, RegexSet};
use std::sync::LazyLock;

/// Longest text kept in a cell before truncation.
pub const MAX_TEXT_CHARS: usize = 32_000;

/// Appended to truncated text.
pub const TRUNCATION_MARKER: &str = "...[TRUNCATED]";

/// Placeholder strings that mean "no value".
const NULL_MARKERS: [&str; 4] = ["nan", "None", "null", "NULL"];

/// Whole lines that carry no information.
static NOISE_LINES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        // Terminal session leftovers
        r"(?i)^\s*(quit|exit|end|return)\s*$",
        r"(?i)^configure terminal.*$",
        // Separators
        r"^[-=_~*+#]{10,}.*$",
        r"^[*]{5,}[^*]*[*]{5,}$",
        r"^#+\s*$",
        // Log output
        r"(?i)^\s*(DEBUG|INFO|WARNING|ERROR):.*$",
        r"^\s*\[.*?\]\s*$",
    ])
    .unwrap()
});

static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{4,}").unwrap());
static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{3,}").unwrap());

fn is_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}' | '\u{7F}'..='\u{9F}')
}

/// Result of normalising one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub truncated: bool,
}

/// Normalise a raw cell: strip control characters, trim, blank out null
/// markers and cap the length.
pub fn normalize_text(raw: &str) -> Normalized {
    let stripped: String = raw.chars().filter(|&c| !is_control(c)).collect();
    let trimmed = stripped.trim();

    if NULL_MARKERS.contains(&trimmed) {
        return Normalized {
            text: String::new(),
            truncated: false,
        };
    }

    match trimmed.char_indices().nth(MAX_TEXT_CHARS) {
        Some((cut, _)) => Normalized {
            text: format!("{}{}", &trimmed[..cut], TRUNCATION_MARKER),
            truncated: true,
        },
        None => Normalized {
            text: trimmed.to_string(),
            truncated: false,
        },
    }
}

/// Light cleanup for cells outside the text column: null markers become
/// empty and control characters are dropped.
pub fn scrub_cell(cell: &mut String) {
    if NULL_MARKERS.contains(&cell.trim()) {
        cell.clear();
    } else if cell.chars().any(is_control) {
        cell.retain(|c| !is_control(c));
    }
}

/// Remove noise lines and collapse whitespace runs.
pub fn clean_noise(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let kept: Vec<&str> = text
        .split('\n')
        .map(|line| {
            if line.trim().is_empty() || NOISE_LINES.is_match(line) {
                ""
            } else {
                line
            }
        })
        .collect();
    let joined = kept.join("\n");

    let collapsed = BLANK_RUNS.replace_all(&joined, "\n\n");
    let collapsed = SPACE_RUNS.replace_all(&collapsed, " ");
    collapsed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_markers_blank() {
        for marker in ["nan", "None", " null ", "NULL"] {
            assert_eq!(normalize_text(marker).text, "");
        }
        assert_eq!(normalize_text("nano").text, "nano");
    }

    #[test]
    fn test_control_characters_removed() {
        assert_eq!(normalize_text("a\u{0}b\u{1B}c\u{85}").text, "abc");
        // Tabs and newlines survive
        assert_eq!(normalize_text("a\tb\nc").text, "a\tb\nc");
    }

    #[test]
    fn test_scrub_cell() {
        let mut cell = "None".to_string();
        scrub_cell(&mut cell);
        assert_eq!(cell, "");

        let mut cell = " keep\u{7}me ".to_string();
        scrub_cell(&mut cell);
        assert_eq!(cell, " keepme ");
    }

    #[test]
    fn test_truncation() {
        let long = "x".repeat(MAX_TEXT_CHARS + 5);
        let n = normalize_text(&long);
        assert!(n.truncated);
        assert_eq!(n.text.len(), MAX_TEXT_CHARS + TRUNCATION_MARKER.len());
        assert!(n.text.ends_with(TRUNCATION_MARKER));

        let exact = "é".repeat(MAX_TEXT_CHARS);
        assert!(!normalize_text(&exact).truncated);
    }

    #[test]
    fn test_clean_noise_drops_prompt_and_log_lines() {
        let text = "SN: ABC123\nquit\n==========\nINFO: link up\n[router]\nVLAN 100";
        assert_eq!(clean_noise(text), "SN: ABC123\n\nVLAN 100");
    }

    #[test]
    fn test_clean_noise_collapses_spaces() {
        assert_eq!(clean_noise("a     b"), "a b");
        assert_eq!(clean_noise("exit"), "");
    }
}
