//! Copying field declarations between related table extensions.
//!
//! A field is already present on a target when the target declares a field
//! with the same id or the same name. Missing fields are copied verbatim,
//! re-indented to the target's field indentation and appended before the
//! target's `fields` block closes.

use super::{Document, ItemKind, PlannedItem, RewritePlan, TextEdit};
use crate::error::{CoreError, Result};
use crate::parser::utils::{indentation_at, line_start, newline_of};
use alscope_api::models::{FieldInfo, ItemChange, ObjectType, RewriteOperation};

const INDENT: &str = "    ";

/// A copy target as the engine found it.
#[derive(Debug)]
pub enum Target {
    Loaded(Document),
    Missing { label: String, reason: String },
}

pub(super) fn plan(source: &Document, targets: &[Target]) -> Result<RewritePlan> {
    if source.info.object_type != ObjectType::TableExtension {
        return Err(CoreError::Plan(format!(
            "{} \"{}\" is not a tableextension",
            source.info.object_type, source.info.name
        )));
    }

    let mut plan = RewritePlan::new(RewriteOperation::CopyFields);
    for target in targets {
        match target {
            Target::Missing { label, reason } => fault_all(&mut plan, source, label, reason),
            Target::Loaded(doc) if doc.info.object_type != ObjectType::TableExtension => {
                fault_all(
                    &mut plan,
                    source,
                    &doc.path.display().to_string(),
                    &format!("it declares a {}", doc.info.object_type),
                );
            }
            Target::Loaded(doc) => plan_target(&mut plan, source, doc),
        }
    }

    tracing::debug!(
        "Copy fields from \"{}\" planned {} field(s), {} fault(s)",
        source.info.name,
        plan.item_count(),
        plan.faults.len()
    );
    Ok(plan)
}

fn fault_all(plan: &mut RewritePlan, source: &Document, label: &str, reason: &str) {
    for field in &source.info.fields {
        plan.fault(
            format!(
                "Cannot add field \"{}\" to {}: {}",
                field.name, label, reason
            ),
            Some(source.location(field.name_span.start)),
        );
    }
}

fn plan_target(plan: &mut RewritePlan, source: &Document, target: &Document) {
    let missing: Vec<&FieldInfo> = source
        .info
        .fields
        .iter()
        .filter(|f| target.info.field_by_id(f.id).is_none())
        .filter(|f| target.info.field_by_name(&f.name).is_none())
        .collect();
    if missing.is_empty() {
        return;
    }

    let text = &target.text;
    let nl = newline_of(text);

    // (offset, text opening the insertion, text closing it, field indentation)
    let (at, open, close, indent) = match (target.info.spans.fields_close, target.info.spans.body_open) {
        (Some(fields_close), _) => {
            let indent = match target.info.fields.first() {
                Some(first) => indentation_at(text, first.block_span.start).to_string(),
                None => format!("{}{INDENT}", indentation_at(text, fields_close)),
            };
            let start = line_start(text, fields_close);
            if text[start..fields_close].trim().is_empty() {
                (start, String::new(), String::new(), indent)
            } else {
                // `fields { }` on one line
                let outer = indentation_at(text, fields_close).to_string();
                (fields_close, nl.to_string(), outer, indent)
            }
        }
        (None, Some(body_open)) => {
            let inner = format!("{}{INDENT}", indentation_at(text, body_open));
            (
                body_open + 1,
                format!("{nl}{inner}fields{nl}{inner}{{{nl}"),
                format!("{inner}}}"),
                format!("{inner}{INDENT}"),
            )
        }
        (None, None) => {
            fault_all(
                plan,
                source,
                &format!("tableextension \"{}\"", target.info.name),
                "it has no object body",
            );
            return;
        }
    };

    let location = target.location(at);
    let last = missing.len() - 1;
    for (i, field) in missing.into_iter().enumerate() {
        let mut insert = String::new();
        if i == 0 {
            insert.push_str(&open);
        }
        insert.push_str(&reindent(&source.text, field, &indent, nl));
        insert.push_str(nl);
        if i == last {
            insert.push_str(&close);
        }

        plan.push(
            &target.path,
            PlannedItem {
                kind: ItemKind::Field,
                description: format!(
                    "field \"{}\" in tableextension \"{}\"",
                    field.name, target.info.name
                ),
                change: Some(ItemChange {
                    object_type: ObjectType::TableExtension,
                    name: target.info.name.clone(),
                    from: String::new(),
                    to: field.name.clone(),
                }),
                location: location.clone(),
                edits: vec![TextEdit::insert(at, insert)],
            },
        );
    }
}

/// The field's declaration moved from its source indentation to `indent`.
fn reindent(source: &str, field: &FieldInfo, indent: &str, nl: &str) -> String {
    let block = &source[field.block_span.start..field.block_span.end];
    let source_indent = indentation_at(source, field.block_span.start);

    block
        .split('\n')
        .enumerate()
        .map(|(i, line)| {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if i == 0 {
                format!("{indent}{line}")
            } else if line.trim().is_empty() {
                String::new()
            } else if let Some(rest) = line.strip_prefix(source_indent) {
                format!("{indent}{rest}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(nl)
}
