//! `#region` wrapping.
//!
//! Procedures and triggers declared at object level are wrapped together
//! with the attributes and `///` doc comments above them. In reports, every
//! data item and every run of adjacent columns gets its own region. Code
//! already enclosed by a region is left alone, so wrapping is idempotent.

use super::{Document, ItemKind, PlannedItem, RewritePlan, TextEdit};
use crate::parser::utils::{
    declaration_end, find_matching_brace, find_matching_paren, indentation_at, line_start,
    mask_source, newline_of, split_top_level, trim_range, unquote_range,
};
use alscope_api::models::ObjectType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ROUTINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?im)^[ \t]*(?:(?:local|internal|protected)[ \t]+)?(?:procedure|trigger)[ \t]+(?P<name>"[^"\r\n]*"|[A-Za-z_][A-Za-z0-9_]*)[ \t]*\("#,
    )
    .expect("routine regex")
});

static BLOCK_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""[^"\r\n]*"|\b(?P<kw>(?i:begin|case|end))\b"#).expect("block token regex")
});

static DATASET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bdataset\s*\{").expect("dataset regex"));

static DATASET_ITEM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?P<kw>dataitem|column|add|addfirst|addlast|addafter|addbefore)\s*\(")
        .expect("dataset item regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapMode {
    Procedures,
    DataItems,
    /// Procedures, then data items, in one plan.
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    /// Offset where `#region` is inserted (a line start).
    pub start: usize,
    /// Offset where `#endregion` is inserted (end of the wrapped code).
    pub end: usize,
    pub open: TextEdit,
    pub close: TextEdit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrapPlan {
    pub regions: Vec<Region>,
}

impl WrapPlan {
    pub fn count(&self) -> usize {
        self.regions.len()
    }

    pub fn edits(&self) -> Vec<TextEdit> {
        self.regions
            .iter()
            .flat_map(|r| [r.open.clone(), r.close.clone()])
            .collect()
    }
}

/// Wrap every object-level procedure and trigger not already in a region.
pub fn wrap_procedures(text: &str) -> WrapPlan {
    let masked = mask_source(text);
    let existing = existing_regions(text);
    let nl = newline_of(text);
    let mut plan = WrapPlan::default();

    for caps in ROUTINE_RE.captures_iter(&masked) {
        let (Some(all), Some(name_m)) = (caps.get(0), caps.name("name")) else {
            continue;
        };
        if brace_depth(&masked, all.start()) != 1 {
            continue;
        }
        let paren = all.end() - 1;
        let Some(paren_close) = find_matching_paren(&masked, paren) else {
            continue;
        };
        let Some(end) = routine_end(&masked, paren_close) else {
            continue;
        };

        let start = leading_decorations(text, line_start(text, all.start()));
        if inside_region(&existing, start) {
            continue;
        }
        let (s, e) = unquote_range(text, name_m.start(), name_m.end());
        plan.regions.push(region(text, nl, &text[s..e], start, end, all.start()));
    }

    plan
}

/// Wrap every report data item, and every run of adjacent columns, not
/// already in a region.
pub fn wrap_data_items(text: &str) -> WrapPlan {
    let masked = mask_source(text);
    let existing = existing_regions(text);
    let nl = newline_of(text);
    let mut plan = WrapPlan::default();

    let Some(m) = DATASET_RE.find(&masked) else {
        return plan;
    };
    let open = m.end() - 1;
    let Some(close) = find_matching_brace(&masked, open) else {
        return plan;
    };
    wrap_dataset_block(text, &masked, nl, &existing, open, close, &mut plan);

    plan.regions.sort_by_key(|r| r.start);
    plan
}

struct DatasetItem {
    kind: String,
    name: String,
    decl_start: usize,
    end: usize,
    body: Option<(usize, usize)>,
}

fn wrap_dataset_block(
    text: &str,
    masked: &str,
    nl: &str,
    existing: &[(usize, usize)],
    open: usize,
    close: usize,
    plan: &mut WrapPlan,
) {
    let items = dataset_items(text, masked, open, close);

    let mut i = 0;
    while i < items.len() {
        let item = &items[i];
        if item.kind == "column" {
            // Extend the run while only whitespace separates columns
            let mut j = i;
            while j + 1 < items.len()
                && items[j + 1].kind == "column"
                && masked[items[j].end..items[j + 1].decl_start].trim().is_empty()
            {
                j += 1;
            }
            let start = line_start(text, item.decl_start);
            if !inside_region(existing, start) {
                plan.regions
                    .push(region(text, nl, "Columns", start, items[j].end, item.decl_start));
            }
            i = j + 1;
            continue;
        }

        if item.kind == "dataitem" {
            let start = line_start(text, item.decl_start);
            if !inside_region(existing, start) {
                plan.regions
                    .push(region(text, nl, &item.name, start, item.end, item.decl_start));
            }
        }
        if let Some((body_open, body_close)) = item.body {
            wrap_dataset_block(text, masked, nl, existing, body_open, body_close, plan);
        }
        i += 1;
    }
}

fn dataset_items(text: &str, masked: &str, open: usize, close: usize) -> Vec<DatasetItem> {
    let mut items = Vec::new();
    let mut pos = open + 1;

    while pos < close {
        let Some(caps) = DATASET_ITEM_RE.captures(&masked[pos..close]) else {
            break;
        };
        let (Some(all), Some(kw)) = (caps.get(0), caps.name("kw")) else {
            break;
        };
        let decl_start = pos + all.start();
        let paren = pos + all.end() - 1;
        let Some(paren_close) = find_matching_paren(masked, paren) else {
            break;
        };
        let end = declaration_end(masked, paren_close, close);

        let args = &text[paren + 1..paren_close];
        let name = split_top_level(args, b';')
            .first()
            .map(|&(s, e)| {
                let (s, e) = trim_range(text, paren + 1 + s, paren + 1 + e);
                let (s, e) = unquote_range(text, s, e);
                text[s..e].to_string()
            })
            .unwrap_or_default();

        let body = (masked.as_bytes().get(end.saturating_sub(1)) == Some(&b'}'))
            .then(|| {
                let body_close = end - 1;
                masked[paren_close..body_close]
                    .find('{')
                    .map(|i| (paren_close + i, body_close))
            })
            .flatten();

        items.push(DatasetItem {
            kind: kw.as_str().to_ascii_lowercase(),
            name,
            decl_start,
            end,
            body,
        });
        pos = end.max(paren_close + 1);
    }

    items
}

fn region(text: &str, nl: &str, name: &str, start: usize, end: usize, decl: usize) -> Region {
    let indent = indentation_at(text, decl);
    Region {
        name: name.to_string(),
        start,
        end,
        open: TextEdit::insert(start, format!("{indent}#region {name}{nl}")),
        close: TextEdit::insert(end, format!("{nl}{indent}#endregion")),
    }
}

/// Offset just past the `end;` closing the routine whose parameter list
/// closes at `paren_close`.
fn routine_end(masked: &str, paren_close: usize) -> Option<usize> {
    let mut depth = 0usize;
    for caps in BLOCK_TOKEN_RE.captures_iter(&masked[paren_close..]) {
        let Some(kw) = caps.name("kw") else {
            continue;
        };
        match kw.as_str().to_ascii_lowercase().as_str() {
            "begin" | "case" => depth += 1,
            _ => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
                if depth == 0 {
                    let after = paren_close + kw.end();
                    let rest = &masked[after..];
                    let trimmed = rest.trim_start_matches([' ', '\t']);
                    return Some(if trimmed.starts_with(';') {
                        after + (rest.len() - trimmed.len()) + 1
                    } else {
                        after
                    });
                }
            }
        }
    }
    None
}

/// Move `start` up over attribute and doc-comment lines directly above it.
fn leading_decorations(text: &str, mut start: usize) -> usize {
    while start > 0 {
        let prev = line_start(text, start - 1);
        let line = text[prev..start].trim();
        if line.starts_with('[') || line.starts_with("///") {
            start = prev;
        } else {
            break;
        }
    }
    start
}

/// Brace nesting at `pos`, skipping quoted identifiers.
fn brace_depth(masked: &str, pos: usize) -> i32 {
    let mut depth = 0;
    let mut in_ident = false;
    for &b in &masked.as_bytes()[..pos] {
        match b {
            b'"' => in_ident = !in_ident,
            b'\n' => in_ident = false,
            b'{' if !in_ident => depth += 1,
            b'}' if !in_ident => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// `(start, end)` line offsets of every `#region` ... `#endregion` pair.
fn existing_regions(text: &str) -> Vec<(usize, usize)> {
    let mut open = Vec::new();
    let mut regions = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#endregion") {
            if let Some(start) = open.pop() {
                regions.push((start, offset + line.len()));
            }
        } else if trimmed.starts_with("#region") {
            open.push(offset);
        }
        offset += line.len();
    }
    regions
}

fn inside_region(regions: &[(usize, usize)], offset: usize) -> bool {
    regions.iter().any(|&(s, e)| s < offset && offset < e)
}

/// Turn a document's regions into planned items.
pub(super) fn plan_document(plan: &mut RewritePlan, doc: &Document, mode: WrapMode) {
    let wrap = match mode {
        WrapMode::All => {
            plan_document(plan, doc, WrapMode::Procedures);
            plan_document(plan, doc, WrapMode::DataItems);
            return;
        }
        WrapMode::Procedures if doc.info.object_type == ObjectType::Interface => return,
        WrapMode::Procedures => wrap_procedures(&doc.text),
        WrapMode::DataItems
            if matches!(
                doc.info.object_type,
                ObjectType::Report | ObjectType::ReportExtension
            ) =>
        {
            wrap_data_items(&doc.text)
        }
        WrapMode::DataItems => return,
    };

    for region in wrap.regions {
        plan.push(
            &doc.path,
            PlannedItem {
                kind: ItemKind::Region,
                description: format!("region \"{}\"", region.name),
                change: None,
                location: doc.location(region.start),
                edits: vec![region.open, region.close],
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::apply_edits;

    const CODEUNIT: &str = r#"codeunit 50100 "ABC Helper"
{
    [EventSubscriber(ObjectType::Table, Database::Customer, 'OnAfterInsertEvent', '', false, false)]
    local procedure OnCustomerInsert(var Rec: Record Customer)
    begin
        if Rec."No." = '' then begin
            exit;
        end;
        case Rec.Blocked of
            Rec.Blocked::All:
                exit;
        end;
    end;

    /// Returns the answer.
    procedure "Get Answer"(): Integer
    var
        "Begin Date": Date;
    begin
        exit(42);
    end;
}
"#;

    #[test]
    fn test_wraps_procedures_with_attributes() {
        let plan = wrap_procedures(CODEUNIT);
        let names: Vec<_> = plan.regions.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["OnCustomerInsert", "Get Answer"]);

        let out = apply_edits(CODEUNIT, &plan.edits()).unwrap();
        assert!(out.contains("{\n    #region OnCustomerInsert\n    [EventSubscriber"));
        assert!(out.contains("        end;\n    end;\n    #endregion\n"));
        assert!(out.contains("    #region Get Answer\n    /// Returns the answer."));
        assert!(out.contains("exit(42);\n    end;\n    #endregion\n}"));
    }

    #[test]
    fn test_wrapping_twice_adds_nothing() {
        let once = apply_edits(CODEUNIT, &wrap_procedures(CODEUNIT).edits()).unwrap();
        assert_eq!(wrap_procedures(&once).count(), 0);
    }

    #[test]
    fn test_field_triggers_are_not_wrapped() {
        let text = "table 50100 T\n{\n    fields\n    {\n        field(1; A; Integer)\n        {\n            trigger OnValidate()\n            begin\n            end;\n        }\n    }\n\n    trigger OnInsert()\n    begin\n    end;\n}\n";
        let plan = wrap_procedures(text);
        let names: Vec<_> = plan.regions.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["OnInsert"]);
    }

    const REPORT: &str = r#"report 50100 "ABC Customer List"
{
    dataset
    {
        dataitem(Customer; Customer)
        {
            column(No; "No.") { }
            column(Name; Name) { }
            dataitem("Cust. Ledger Entry"; "Cust. Ledger Entry")
            {
                column(Amount; Amount) { }
            }
        }
    }
}
"#;

    #[test]
    fn test_wraps_data_items_and_column_runs() {
        let plan = wrap_data_items(REPORT);
        let names: Vec<_> = plan.regions.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Customer", "Columns", "Cust. Ledger Entry", "Columns"]
        );

        let out = apply_edits(REPORT, &plan.edits()).unwrap();
        assert!(out.contains(
            "            #region Columns\n            column(No; \"No.\") { }\n            column(Name; Name) { }\n            #endregion\n"
        ));
        assert_eq!(wrap_data_items(&out).count(), 0);
    }

    #[test]
    fn test_all_mode_plans_procedures_and_data_items() {
        let text = REPORT.replacen(
            "    }\n}\n",
            "    }\n\n    procedure Total(): Decimal\n    begin\n        exit(0);\n    end;\n}\n",
            1,
        );
        assert!(text.contains("procedure Total"));

        let path = std::path::Path::new("/p/list.al");
        let doc = Document {
            path: path.to_path_buf(),
            info: crate::parser::parse_object(path, &text).unwrap(),
            text,
        };
        let mut plan = RewritePlan::new(alscope_api::models::RewriteOperation::WrapRegions);
        plan_document(&mut plan, &doc, WrapMode::All);
        assert_eq!(plan.item_count(), 5);

        let mut procedures_only = RewritePlan::new(alscope_api::models::RewriteOperation::WrapRegions);
        plan_document(&mut procedures_only, &doc, WrapMode::Procedures);
        assert_eq!(procedures_only.item_count(), 1);
    }
}
