//! Project-wide object renumbering.
//!
//! Each object type owns its own id space. Within a type, numbered objects
//! are ordered by current id then path and packed onto the free ids of the
//! policy's ranges, so the result never reuses an id twice.

use super::{Document, ItemKind, PlannedItem, RewritePlan, TextEdit};
use crate::config::IdRange;
use crate::error::{CoreError, Result};
use alscope_api::models::{ItemChange, ObjectType, RewriteOperation, Span};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::parser::utils::mask_source;

static RUN_OBJECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bRunObject\s*=\s*(?P<kw>Page|Report|Codeunit|XmlPort|Query)\s+(?P<id>\d+)")
        .expect("run object regex")
});

static RUN_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?P<kw>Page|Report|Codeunit|XmlPort|Query)\s*\.\s*(?:RunModal|Run)\s*\(\s*(?P<id>\d+)\b",
    )
    .expect("run call regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenumberPolicy {
    pub ranges: Vec<IdRange>,
}

impl RenumberPolicy {
    pub fn new(ranges: Vec<IdRange>) -> Self {
        Self { ranges }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ranges.is_empty() {
            return Err(CoreError::Plan("no id ranges to renumber into".into()));
        }
        if let Some(bad) = self.ranges.iter().find(|r| r.is_empty()) {
            return Err(CoreError::Plan(format!(
                "id range {}..{} is empty",
                bad.from, bad.to
            )));
        }
        Ok(())
    }

    /// Available ids in ascending order, overlapping ranges counted once.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        let mut ranges = self.ranges.clone();
        ranges.sort_by_key(|r| r.from);
        let mut last: Option<u32> = None;
        ranges
            .into_iter()
            .flat_map(|r| r.from..=r.to)
            .filter(move |id| {
                let fresh = last.is_none_or(|l| *id > l);
                if fresh {
                    last = Some(*id);
                }
                fresh
            })
    }
}

struct Numbered<'a> {
    doc: &'a Document,
    id: u32,
    id_span: Span,
}

/// Plan the renumbering of `docs`. `reserved` holds ids that stay taken
/// because their objects are in the project but not in `docs`; they are
/// never handed out.
pub(super) fn plan(
    docs: &[Document],
    policy: &RenumberPolicy,
    reserved: &HashSet<(ObjectType, u32)>,
) -> Result<RewritePlan> {
    policy.validate()?;
    let mut plan = RewritePlan::new(RewriteOperation::Renumber);

    let mut by_type: IndexMap<ObjectType, Vec<Numbered>> = IndexMap::new();
    for doc in docs {
        if let (Some(id), Some(id_span)) = (doc.info.id, doc.info.spans.id) {
            by_type
                .entry(doc.info.object_type)
                .or_default()
                .push(Numbered { doc, id, id_span });
        }
    }

    // (type, old id) -> new id, only for ids that identify one object
    let mut mapping: HashMap<(ObjectType, u32), u32> = HashMap::new();
    let mut ambiguous: HashSet<(ObjectType, u32)> = HashSet::new();

    for (object_type, mut objects) in by_type {
        objects.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.doc.path.cmp(&b.doc.path)));

        let mut seen: HashMap<u32, usize> = HashMap::new();
        for o in &objects {
            *seen.entry(o.id).or_default() += 1;
        }
        for &(_, id) in reserved.iter().filter(|(t, _)| *t == object_type) {
            *seen.entry(id).or_default() += 1;
        }

        let free: Vec<u32> = policy
            .ids()
            .filter(|id| !reserved.contains(&(object_type, *id)))
            .collect();
        let capacity = free.len();

        if objects.len() > capacity {
            let first = &objects[capacity];
            plan.fault(
                format!(
                    "{} {} objects do not fit into {} available id(s); none were renumbered",
                    objects.len(),
                    object_type,
                    capacity
                ),
                Some(first.doc.location(first.id_span.start)),
            );
            continue;
        }

        for (o, &new_id) in objects.iter().zip(&free) {
            if seen.get(&o.id).copied().unwrap_or(0) > 1 {
                ambiguous.insert((object_type, o.id));
            } else if o.id != new_id {
                mapping.insert((object_type, o.id), new_id);
            }
            if o.id == new_id {
                continue;
            }
            let info = &o.doc.info;
            plan.push(
                &o.doc.path,
                PlannedItem {
                    kind: ItemKind::Object,
                    description: format!("{} \"{}\"", info.object_type, info.name),
                    change: Some(ItemChange {
                        object_type,
                        name: info.name.clone(),
                        from: o.id.to_string(),
                        to: new_id.to_string(),
                    }),
                    location: o.doc.location(o.id_span.start),
                    edits: vec![TextEdit::replace(o.id_span, new_id.to_string())],
                },
            );
        }
    }

    if !mapping.is_empty() || !ambiguous.is_empty() {
        for doc in docs {
            plan_references(&mut plan, doc, &mapping, &ambiguous);
        }
    }

    tracing::debug!(
        "Renumber planned {} item(s), {} fault(s)",
        plan.item_count(),
        plan.faults.len()
    );
    Ok(plan)
}

/// Rewrite numeric `RunObject` properties and `<Type>.Run(<id>)` calls.
fn plan_references(
    plan: &mut RewritePlan,
    doc: &Document,
    mapping: &HashMap<(ObjectType, u32), u32>,
    ambiguous: &HashSet<(ObjectType, u32)>,
) {
    let masked = mask_source(&doc.text);
    let matches = RUN_OBJECT_RE
        .captures_iter(&masked)
        .chain(RUN_CALL_RE.captures_iter(&masked));

    for caps in matches {
        let (Some(kw), Some(id_m)) = (caps.name("kw"), caps.name("id")) else {
            continue;
        };
        let Some(object_type) = ObjectType::from_keyword(kw.as_str()) else {
            continue;
        };
        let Ok(old_id) = id_m.as_str().parse::<u32>() else {
            continue;
        };
        let location = doc.location(id_m.start());

        if ambiguous.contains(&(object_type, old_id)) {
            plan.fault(
                format!("Reference to {object_type} {old_id} is ambiguous and was left unchanged"),
                Some(location),
            );
            continue;
        }
        let Some(new_id) = mapping.get(&(object_type, old_id)) else {
            continue;
        };
        plan.push(
            &doc.path,
            PlannedItem {
                kind: ItemKind::Reference,
                description: format!("reference to {object_type} {old_id}"),
                change: None,
                location,
                edits: vec![TextEdit::replace(
                    Span::new(id_m.start(), id_m.end()),
                    new_id.to_string(),
                )],
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_object;
    use std::path::Path;

    fn doc(path: &str, text: &str) -> Document {
        Document {
            path: Path::new(path).to_path_buf(),
            text: text.to_string(),
            info: parse_object(Path::new(path), text).unwrap(),
        }
    }

    fn new_ids(plan: &RewritePlan) -> Vec<(String, String)> {
        plan.files
            .values()
            .flat_map(|f| f.items.iter())
            .filter_map(|i| i.change.as_ref())
            .map(|c| (c.name.clone(), c.to.clone()))
            .collect()
    }

    #[test]
    fn test_policy_ids_skip_overlap() {
        let policy = RenumberPolicy::new(vec![IdRange::new(10, 12), IdRange::new(11, 13)]);
        assert_eq!(policy.ids().collect::<Vec<_>>(), vec![10, 11, 12, 13]);
    }

    #[test]
    fn test_empty_ranges_is_plan_error() {
        let err = plan(&[], &RenumberPolicy::new(vec![]), &HashSet::new()).unwrap_err();
        assert!(matches!(err, CoreError::Plan(_)));
    }

    #[test]
    fn test_compacts_each_type_separately() {
        let docs = vec![
            doc("/p/b.al", "table 70010 B\n{\n}\n"),
            doc("/p/a.al", "table 70005 A\n{\n}\n"),
            doc("/p/c.al", "page 70005 C\n{\n}\n"),
            doc("/p/d.al", "tableextension 70001 D extends Customer\n{\n}\n"),
        ];
        let policy = RenumberPolicy::new(vec![IdRange::new(50100, 50149)]);
        let plan = plan(&docs, &policy, &HashSet::new()).unwrap();

        let ids = new_ids(&plan);
        assert!(ids.contains(&("A".into(), "50100".into())));
        assert!(ids.contains(&("B".into(), "50101".into())));
        assert!(ids.contains(&("C".into(), "50100".into())));
        assert!(ids.contains(&("D".into(), "50100".into())));
        assert!(plan.faults.is_empty());
    }

    #[test]
    fn test_objects_already_in_place_are_untouched() {
        let docs = vec![doc("/p/a.al", "codeunit 50100 A\n{\n}\n")];
        let policy = RenumberPolicy::new(vec![IdRange::new(50100, 50149)]);
        let plan = plan(&docs, &policy, &HashSet::new()).unwrap();
        assert_eq!(plan.item_count(), 0);
    }

    #[test]
    fn test_overflowing_type_is_faulted_whole() {
        let docs = vec![
            doc("/p/a.al", "table 1 A\n{\n}\n"),
            doc("/p/b.al", "table 2 B\n{\n}\n"),
            doc("/p/c.al", "page 3 C\n{\n}\n"),
        ];
        let policy = RenumberPolicy::new(vec![IdRange::new(50100, 50100)]);
        let plan = plan(&docs, &policy, &HashSet::new()).unwrap();

        assert_eq!(plan.faults.len(), 1);
        assert!(plan.faults[0].message.contains("table"));
        assert_eq!(new_ids(&plan), vec![("C".to_string(), "50100".to_string())]);
    }

    #[test]
    fn test_references_follow_renumbered_objects() {
        let docs = vec![
            doc("/p/card.al", "page 70000 \"ABC Card\"\n{\n}\n"),
            doc(
                "/p/list.al",
                "page 70001 \"ABC List\"\n{\n    actions\n    {\n        action(Open)\n        {\n            RunObject = Page 70000;\n        }\n    }\n    trigger OnOpenPage()\n    begin\n        Page.RunModal(70000);\n        // Page.Run(70000);\n    end;\n}\n",
            ),
        ];
        let policy = RenumberPolicy::new(vec![IdRange::new(50100, 50149)]);
        let plan = plan(&docs, &policy, &HashSet::new()).unwrap();

        let list = &plan.files[Path::new("/p/list.al")];
        let refs: Vec<_> = list
            .items
            .iter()
            .filter(|i| i.kind == ItemKind::Reference)
            .collect();
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|r| r.edits[0].new_text == "50100"));
    }

    #[test]
    fn test_reserved_ids_are_never_handed_out() {
        let docs = vec![
            doc("/p/b.al", "table 50101 B\n{\n}\n"),
            doc("/p/c.al", "table 50107 C\n{\n}\n"),
            doc("/p/p.al", "page 50105 P\n{\n}\n"),
        ];
        let reserved = HashSet::from([(ObjectType::Table, 50100)]);
        let policy = RenumberPolicy::new(vec![IdRange::new(50100, 50149)]);
        let plan = plan(&docs, &policy, &reserved).unwrap();

        let ids = new_ids(&plan);
        assert!(ids.contains(&("C".into(), "50102".into())));
        assert!(ids.contains(&("P".into(), "50100".into())));
        assert!(!ids.iter().any(|(name, to)| name != "P" && to == "50100"));
        assert!(plan.faults.is_empty());
    }

    #[test]
    fn test_reserved_ids_count_against_capacity() {
        let docs = vec![doc("/p/b.al", "table 7 B\n{\n}\n")];
        let reserved = HashSet::from([(ObjectType::Table, 50100)]);
        let policy = RenumberPolicy::new(vec![IdRange::new(50100, 50100)]);
        let plan = plan(&docs, &policy, &reserved).unwrap();

        assert_eq!(plan.faults.len(), 1);
        assert_eq!(plan.item_count(), 0);
    }
}
