//! Minimal CSV reader (quotes + CRLF tolerant).

use std::mem::take;

/// A parsed CSV file: one header row plus data rows of the same width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table from raw rows, treating the first row as the header.
    ///
    /// Data rows are padded or cut to the header width. Returns `None` when
    /// there is no header at all.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        let headers: Vec<String> = rows
            .remove(0)
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return None;
        }

        let width = headers.len();
        for row in rows.iter_mut() {
            row.resize(width, String::new());
        }
        Some(Self { headers, rows })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Append a column, filling existing rows with `values` (or empty cells).
    pub fn push_column(&mut self, name: String, values: Vec<String>) {
        self.headers.push(name);
        let mut values = values.into_iter();
        for row in self.rows.iter_mut() {
            row.push(values.next().unwrap_or_default());
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Decode file bytes as UTF-8, falling back to Latin-1.
///
/// A leading byte-order mark is dropped. The flag reports whether the
/// fallback was used.
pub fn decode(bytes: &[u8]) -> (String, bool) {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => (s.to_string(), false),
        // Latin-1 maps every byte straight to the code point of the same value
        Err(_) => (bytes.iter().map(|&b| char::from(b)).collect(), true),
    }
}

/// Split CSV text into rows of fields.
///
/// Blank lines are skipped. Quoted fields may contain separators, newlines
/// and doubled quotes.
pub fn parse_rows(text: &str, sep: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if matches!(chars.peek(), Some('"')) {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            c if c == sep && !in_quotes => {
                row.push(take(&mut field));
            }
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    // Trailing row without newline, even if a quote was left open
    row.push(field);
    if !(row.len() == 1 && row[0].is_empty()) {
        rows.push(row);
    }

    rows
}

/// Guess the separator from the header line: `;` wins over `,` when it is
/// more frequent, which is common for spreadsheet exports.
pub fn sniff_separator(text: &str) -> char {
    let header = text.lines().next().unwrap_or("");
    let commas = header.matches(',').count();
    let semicolons = header.matches(';').count();
    if semicolons > commas {
        ';'
    } else {
        ','
    }
}
