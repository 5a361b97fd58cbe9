//! Lexical helpers shared by the object parser, the rewrite planners and the
//! region wrapper.
//!
//! AL has three constructs that can hide braces and keywords: `//` line
//! comments, `/* */` block comments and `'single quoted'` string literals.
//! [`mask_source`] blanks their contents so structural regexes and brace
//! matching only ever see code. Double-quoted identifiers are kept because
//! object and field names live in them.

/// Replace comment and string-literal contents with spaces, keeping byte
/// offsets and newlines intact.
pub fn mask_source(text: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Str,
        Ident,
    }

    let bytes = text.as_bytes();
    let mut out = bytes.to_vec();
    let mut state = State::Code;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            State::Code => match b {
                b'/' if next == Some(b'/') => {
                    state = State::LineComment;
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 1;
                }
                b'/' if next == Some(b'*') => {
                    state = State::BlockComment;
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 1;
                }
                b'\'' => state = State::Str,
                b'"' => state = State::Ident,
                _ => {}
            },
            State::LineComment => {
                if b == b'\n' {
                    state = State::Code;
                } else if b != b'\r' {
                    out[i] = b' ';
                }
            }
            State::BlockComment => {
                if b == b'*' && next == Some(b'/') {
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 1;
                    state = State::Code;
                } else if b != b'\n' && b != b'\r' {
                    out[i] = b' ';
                }
            }
            State::Str => {
                if b == b'\'' {
                    if next == Some(b'\'') {
                        // escaped quote
                        out[i] = b' ';
                        out[i + 1] = b' ';
                        i += 1;
                    } else {
                        state = State::Code;
                    }
                } else if b != b'\n' && b != b'\r' {
                    out[i] = b' ';
                }
            }
            State::Ident => {
                if b == b'"' || b == b'\n' {
                    state = State::Code;
                }
            }
        }
        i += 1;
    }

    // Only ASCII bytes were written over whole UTF-8 sequences or ASCII bytes,
    // so the result is still valid UTF-8.
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Find the delimiter closing the one at `open` in masked text, skipping
/// double-quoted identifiers.
pub fn find_matching(masked: &str, open: usize, open_ch: u8, close_ch: u8) -> Option<usize> {
    let bytes = masked.as_bytes();
    if bytes.get(open) != Some(&open_ch) {
        return None;
    }
    let mut depth = 0usize;
    let mut in_ident = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_ident {
            if b == b'"' || b == b'\n' {
                in_ident = false;
            }
            continue;
        }
        if b == b'"' {
            in_ident = true;
        } else if b == open_ch {
            depth += 1;
        } else if b == close_ch {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

pub fn find_matching_brace(masked: &str, open: usize) -> Option<usize> {
    find_matching(masked, open, b'{', b'}')
}

pub fn find_matching_paren(masked: &str, open: usize) -> Option<usize> {
    find_matching(masked, open, b'(', b')')
}

/// End of a `name(args) { ... }` declaration whose argument list closes at
/// `paren_close`: past its brace body when it has one, otherwise the end of
/// the line (before any `\r\n`).
pub fn declaration_end(masked: &str, paren_close: usize, limit: usize) -> usize {
    let after = &masked[paren_close + 1..limit];
    let trimmed = after.trim_start();
    let brace = paren_close + 1 + (after.len() - trimmed.len());
    if trimmed.starts_with('{') {
        if let Some(end) = find_matching_brace(masked, brace) {
            return end + 1;
        }
    }
    let eol = masked[paren_close..limit]
        .find('\n')
        .map(|i| paren_close + i)
        .unwrap_or(limit);
    if eol > 0 && masked.as_bytes()[eol - 1] == b'\r' {
        eol - 1
    } else {
        eol
    }
}

/// Split on `sep` outside double-quoted identifiers and nested brackets,
/// returning the byte range of every part relative to `text`.
pub fn split_top_level(text: &str, sep: u8) -> Vec<(usize, usize)> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_ident = false;
    let mut start = 0;
    for (i, &b) in text.as_bytes().iter().enumerate() {
        if in_ident {
            if b == b'"' {
                in_ident = false;
            }
            continue;
        }
        match b {
            b'"' => in_ident = true,
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth -= 1,
            _ if b == sep && depth == 0 => {
                parts.push((start, i));
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push((start, text.len()));
    parts
}

/// Trim whitespace from a sub-range, returning the narrowed range.
pub fn trim_range(text: &str, start: usize, end: usize) -> (usize, usize) {
    let slice = &text[start..end];
    let lead = slice.len() - slice.trim_start().len();
    let trail = slice.len() - slice.trim_end().len();
    (start + lead, end - trail)
}

/// Strip one pair of surrounding double quotes, returning the inner range.
pub fn unquote_range(text: &str, start: usize, end: usize) -> (usize, usize) {
    let slice = &text[start..end];
    if slice.len() >= 2 && slice.starts_with('"') && slice.ends_with('"') {
        (start + 1, end - 1)
    } else {
        (start, end)
    }
}

/// Offset of the first byte of the line containing `offset`.
pub fn line_start(text: &str, offset: usize) -> usize {
    text[..offset.min(text.len())]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// Offset just past the line containing `offset` (after its `\n`).
pub fn line_end(text: &str, offset: usize) -> usize {
    text[offset.min(text.len())..]
        .find('\n')
        .map(|i| offset + i + 1)
        .unwrap_or(text.len())
}

/// Leading whitespace of the line containing `offset`.
pub fn indentation_at(text: &str, offset: usize) -> &str {
    let start = line_start(text, offset);
    let line = &text[start..];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

/// 1-based line number of a byte offset.
pub fn line_of(text: &str, offset: usize) -> usize {
    text[..offset.min(text.len())].matches('\n').count() + 1
}

/// The line ending used by the file (`\r\n` when any line uses it).
pub fn newline_of(text: &str) -> &'static str {
    if text.contains("\r\n") { "\r\n" } else { "\n" }
}

/// Whether an identifier needs double quotes to be valid AL.
pub fn needs_quotes(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_hides_comments_and_strings() {
        let text = "a { // }\n b := '{'; /* } */ c }";
        let masked = mask_source(text);
        assert_eq!(masked.len(), text.len());
        assert_eq!(find_matching_brace(&masked, 2), Some(text.len() - 1));
        assert!(!masked.contains("//"));
        assert!(masked.contains('\n'));
    }

    #[test]
    fn test_mask_keeps_quoted_identifiers() {
        let text = "field(1; \"No. (Old)\"; Code[20]) // note";
        let masked = mask_source(text);
        assert!(masked.contains("\"No. (Old)\""));
        let open = masked.find('(').unwrap();
        assert_eq!(find_matching_paren(&masked, open), Some(text.find(") //").unwrap()));
    }

    #[test]
    fn test_mask_handles_escaped_quotes() {
        let text = "x := 'it''s {'; }";
        let masked = mask_source(text);
        assert_eq!(masked.matches('{').count(), 0);
        assert_eq!(masked.matches('}').count(), 1);
    }

    #[test]
    fn test_split_top_level() {
        let text = "10; \"A;B\"; Decimal";
        let parts: Vec<_> = split_top_level(text, b';')
            .into_iter()
            .map(|(s, e)| text[s..e].trim())
            .collect();
        assert_eq!(parts, vec!["10", "\"A;B\"", "Decimal"]);
    }

    #[test]
    fn test_needs_quotes() {
        assert!(!needs_quotes("Customer"));
        assert!(!needs_quotes("ABC_Customer"));
        assert!(needs_quotes("Sales Header"));
        assert!(needs_quotes("No."));
    }
}
