use crate::error::{CoreError, Result};
use alscope_api::models::Span;
use serde::{Deserialize, Serialize};

/// Replace `span` with `new_text`; an empty span inserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub span: Span,
    pub new_text: String,
}

impl TextEdit {
    pub fn replace(span: Span, new_text: impl Into<String>) -> Self {
        Self {
            span,
            new_text: new_text.into(),
        }
    }

    pub fn insert(at: usize, new_text: impl Into<String>) -> Self {
        Self {
            span: Span::empty(at),
            new_text: new_text.into(),
        }
    }
}

/// Apply a batch of edits to `text` in one pass.
///
/// Edits are ordered by position; insertions at the same offset keep the
/// order they were given in. Overlapping or out-of-bounds edits reject the
/// whole batch.
pub fn apply_edits(text: &str, edits: &[TextEdit]) -> Result<String> {
    let mut ordered: Vec<&TextEdit> = edits.iter().collect();
    ordered.sort_by_key(|e| (e.span.start, e.span.end));

    for edit in &ordered {
        let Span { start, end } = edit.span;
        if start > end || end > text.len() {
            return Err(CoreError::Edit(format!(
                "span {start}..{end} is outside a text of {} bytes",
                text.len()
            )));
        }
        if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
            return Err(CoreError::Edit(format!(
                "span {start}..{end} splits a character"
            )));
        }
    }
    for pair in ordered.windows(2) {
        let (a, b) = (&pair[0].span, &pair[1].span);
        if a.overlaps(b) || (!a.is_empty() && !b.is_empty() && a.end > b.start) {
            return Err(CoreError::Edit(format!(
                "edits {}..{} and {}..{} overlap",
                a.start, a.end, b.start, b.end
            )));
        }
        if !a.is_empty() && b.is_empty() && b.start < a.end {
            return Err(CoreError::Edit(format!(
                "insertion at {} falls inside {}..{}",
                b.start, a.start, a.end
            )));
        }
    }

    let extra: usize = ordered.iter().map(|e| e.new_text.len()).sum();
    let mut out = String::with_capacity(text.len() + extra);
    let mut cursor = 0;
    for edit in ordered {
        out.push_str(&text[cursor..edit.span.start]);
        out.push_str(&edit.new_text);
        cursor = edit.span.end;
    }
    out.push_str(&text[cursor..]);
    Ok(out)
}
