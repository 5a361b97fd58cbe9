//! Structural extraction from AL source files.
//!
//! This is not a full AL parser: it recognises the object header, the
//! `fields` block of tables and table extensions, the `SourceTable` of pages
//! and API entity declarations. Anything it cannot make sense of inside a
//! block is skipped so one malformed field never hides the rest of the file.

use crate::error::{CoreError, Result};
use alscope_api::models::{
    EntityDeclaration, EntityKey, FieldInfo, Location, ObjectInfo, ObjectSpans, ObjectType, Span,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

pub mod utils;

use utils::{
    declaration_end, find_matching_brace, find_matching_paren, line_end, line_of, mask_source,
    split_top_level, trim_range, unquote_range,
};

const NAME: &str = r#""[^"\r\n]*"|[A-Za-z_][A-Za-z0-9_]*"#;

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?im)^[ \t]*(?P<kw>[a-z]+)[ \t]+(?:(?P<id>\d+)[ \t]+)?(?P<name>{NAME})(?:[ \t]+extends[ \t]+(?P<ext>{NAME}))?"
    ))
    .expect("header regex")
});

static FIELDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfields\s*\{").expect("fields regex"));

static FIELD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bfield\s*\(").expect("field regex"));

static SOURCE_TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?im)^[ \t]*SourceTable[ \t]*=[ \t]*(?P<name>{NAME})[ \t]*;"))
        .expect("source table regex")
});

static API_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:PageType|QueryType)[ \t]*=[ \t]*API[ \t]*;").expect("api regex")
});

static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*(?P<prop>EntityName|EntitySetName)[ \t]*=[ \t]*'(?P<name>[^'\r\n]*)'")
        .expect("entity regex")
});

/// Parse the object declared in `text`.
pub fn parse_object(path: &Path, text: &str) -> Result<ObjectInfo> {
    let masked = mask_source(text);

    let caps = HEADER_RE
        .captures_iter(&masked)
        .find(|c| ObjectType::from_keyword(&c["kw"]).is_some())
        .ok_or_else(|| CoreError::parse(path, "no object header found"))?;

    let kw = caps.name("kw").expect("kw group is mandatory");
    let object_type = ObjectType::from_keyword(kw.as_str())
        .ok_or_else(|| CoreError::parse(path, format!("unknown object type '{}'", kw.as_str())))?;

    let name_m = caps.name("name").expect("name group is mandatory");
    let (name_start, name_end) = unquote_range(text, name_m.start(), name_m.end());
    let name = text[name_start..name_end].to_string();
    if name.trim().is_empty() {
        return Err(CoreError::parse(path, "object name is empty"));
    }

    let id_m = caps.name("id");
    let id = match id_m {
        Some(m) => Some(
            m.as_str()
                .parse::<u32>()
                .map_err(|e| CoreError::parse(path, format!("invalid object id: {e}")))?,
        ),
        None => None,
    };

    let ext_m = caps.name("ext");
    let (extended_name, extends_span) = match (object_type.is_extension(), ext_m) {
        (true, Some(m)) => {
            let (s, e) = unquote_range(text, m.start(), m.end());
            (Some(text[s..e].to_string()), Some(Span::new(s, e)))
        }
        (true, None) => {
            return Err(CoreError::parse(
                path,
                format!("{object_type} without an extends clause"),
            ));
        }
        (false, _) => (None, None),
    };

    let header_end = caps.get(0).map(|m| m.end()).unwrap_or(0);
    let body_open = masked[header_end..].find('{').map(|i| header_end + i);
    let body_close = body_open.and_then(|open| find_matching_brace(&masked, open));

    let mut spans = ObjectSpans {
        keyword: Span::new(kw.start(), kw.end()),
        id: id_m.map(|m| Span::new(m.start(), m.end())),
        name: Span::new(name_start, name_end),
        extends: extends_span,
        body_open,
        fields_close: None,
    };

    let mut fields = Vec::new();
    let mut source_table = None;

    if let (Some(open), Some(close)) = (body_open, body_close) {
        match object_type {
            ObjectType::Table | ObjectType::TableExtension => {
                if let Some((fields_open, fields_close)) = find_fields_block(&masked, open, close) {
                    spans.fields_close = Some(fields_close);
                    fields = parse_fields(text, &masked, fields_open, fields_close);
                }
            }
            ObjectType::Page => {
                source_table = SOURCE_TABLE_RE
                    .captures(&masked[open..close])
                    .and_then(|c| c.name("name"))
                    .map(|m| {
                        let (s, e) = unquote_range(text, open + m.start(), open + m.end());
                        text[s..e].to_string()
                    });
            }
            _ => {}
        }
    }

    Ok(ObjectInfo {
        object_type,
        id,
        name,
        extended_name,
        source_table,
        path: path.to_path_buf(),
        fields,
        spans,
    })
}

/// Locate the `fields { ... }` block directly inside the object body.
fn find_fields_block(masked: &str, body_open: usize, body_close: usize) -> Option<(usize, usize)> {
    let body = &masked[body_open + 1..body_close];
    let m = FIELDS_RE.find(body)?;
    let open = body_open + 1 + m.end() - 1;
    let close = find_matching_brace(masked, open)?;
    Some((open, close))
}

fn parse_fields(text: &str, masked: &str, open: usize, close: usize) -> Vec<FieldInfo> {
    let mut fields = Vec::new();
    let mut pos = open + 1;

    while pos < close {
        let Some(m) = FIELD_RE.find(&masked[pos..close]) else {
            break;
        };
        let start = pos + m.start();
        let paren = pos + m.end() - 1;

        let Some(paren_close) = find_matching_paren(masked, paren) else {
            // Unbalanced declaration: nothing after it can be trusted on this line
            pos = line_end(masked, paren);
            continue;
        };

        let block_end = declaration_end(masked, paren_close, close);
        if let Some(field) = parse_field_args(text, start, paren + 1, paren_close, block_end) {
            fields.push(field);
        } else {
            tracing::debug!(
                "Skipping malformed field declaration at line {}",
                line_of(text, start)
            );
        }
        pos = block_end.max(paren_close + 1);
    }

    fields
}

fn parse_field_args(
    text: &str,
    start: usize,
    args_start: usize,
    args_end: usize,
    block_end: usize,
) -> Option<FieldInfo> {
    let args = &text[args_start..args_end];
    let parts = split_top_level(args, b';');
    if parts.len() < 3 {
        return None;
    }

    let (id_s, id_e) = trim_range(text, args_start + parts[0].0, args_start + parts[0].1);
    let id = text[id_s..id_e].parse::<u32>().ok()?;

    let (name_s, name_e) = trim_range(text, args_start + parts[1].0, args_start + parts[1].1);
    let (name_s, name_e) = unquote_range(text, name_s, name_e);
    let name = text[name_s..name_e].to_string();
    if name.is_empty() {
        return None;
    }

    let (type_s, type_e) = trim_range(text, args_start + parts[2].0, args_start + parts[2].1);
    let data_type = text[type_s..type_e].to_string();
    if data_type.is_empty() {
        return None;
    }

    Some(FieldInfo {
        id,
        name,
        data_type,
        line: line_of(text, start),
        id_span: Span::new(id_s, id_e),
        name_span: Span::new(name_s, name_e),
        block_span: Span::new(start, block_end),
    })
}

/// Extract API entity and entity-set names declared by an API page or query.
///
/// Returns an empty list for every other file, including unparseable ones.
pub fn parse_entity_names(path: &Path, text: &str) -> Vec<EntityDeclaration> {
    let masked = mask_source(text);
    if !API_TYPE_RE.is_match(&masked) {
        return Vec::new();
    }

    ENTITY_RE
        .captures_iter(text)
        .filter(|c| {
            // Ignore declarations that sit inside comments
            let start = c.name("prop").map(|m| m.start()).unwrap_or(0);
            masked.as_bytes().get(start) == text.as_bytes().get(start)
        })
        .filter_map(|c| {
            let prop = c.name("prop")?;
            let name = c.name("name")?;
            let key = if prop.as_str().eq_ignore_ascii_case("EntitySetName") {
                EntityKey::entity_set(name.as_str())
            } else {
                EntityKey::entity(name.as_str())
            };
            Some(EntityDeclaration {
                key,
                location: Location::at_offset(path, text, name.start()),
            })
        })
        .collect()
}
