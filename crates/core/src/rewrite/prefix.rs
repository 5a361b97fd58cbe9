//! Object and field prefix changes.
//!
//! A name carries the prefix when it starts with `from` followed by one of
//! the separator characters, or when `from` itself already ends with one.
//! `ABC_Customer` carries `ABC`; `ABCD_Customer` does not.
//!
//! Object names and field names are renamed separately. A reference is
//! matched to a role by its context (member access, type keyword, object
//! property) and rewritten only when that role's name was renamed. Names
//! whose rename would collide are left alone everywhere.

use super::{Document, ItemKind, PlannedItem, RewritePlan, TextEdit};
use crate::config::DEFAULT_SEPARATORS;
use crate::error::{CoreError, Result};
use crate::parser::utils::{line_start, mask_source, needs_quotes};
use alscope_api::models::{ItemChange, ObjectType, RewriteOperation, Span};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

static IDENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?P<quoted>[^"\r\n]*)"|(?P<bare>\b[A-Za-z_][A-Za-z0-9_]*\b)"#)
        .expect("identifier regex")
});

static OBJECT_CONTEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:\b(?:record|page|report|codeunit|query|xmlport|enum|interface|testpage|extends|implements)|::|\b(?:sourcetable|tablerelation|lookuppageid|drilldownpageid|cardpageid|runobject)\s*=(?:\s*(?:page|report|codeunit|query|xmlport))?)\s*$",
    )
    .expect("object context regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixChange {
    pub from: String,
    pub to: String,
    pub rename_fields: bool,
    pub separators: Vec<char>,
    /// Store `to` as the project's prefix once the rename ran.
    pub update_settings: bool,
}

impl PrefixChange {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            rename_fields: true,
            separators: DEFAULT_SEPARATORS.to_vec(),
            update_settings: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.from.trim().is_empty() || self.to.trim().is_empty() {
            return Err(CoreError::Plan("prefix must not be empty".into()));
        }
        if self.from == self.to {
            return Err(CoreError::Plan(format!(
                "old and new prefix are both '{}'",
                self.from
            )));
        }
        Ok(())
    }

    /// The renamed form of `name`, if it carries the old prefix.
    pub fn rename(&self, name: &str) -> Option<String> {
        let rest = name.strip_prefix(self.from.as_str())?;
        let from_ends_with_separator = self
            .from
            .chars()
            .last()
            .is_some_and(|c| self.separators.contains(&c));
        let rest_starts_with_separator = rest
            .chars()
            .next()
            .is_some_and(|c| self.separators.contains(&c));
        if from_ends_with_separator || rest_starts_with_separator {
            Some(format!("{}{}", self.to, rest))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Role {
    Object,
    Field,
}

struct Candidate {
    doc: usize,
    role: Role,
    old: String,
    new: String,
}

impl Candidate {
    fn describe(&self, docs: &[Document]) -> String {
        let info = &docs[self.doc].info;
        match self.role {
            Role::Object => info.object_type.to_string(),
            Role::Field => format!("field of {} \"{}\"", info.object_type, info.name),
        }
    }
}

/// Names held back from renaming, per role. Each blocked name points at the
/// candidate whose rename collided first; `direct` holds every candidate
/// that collided on its own.
#[derive(Default)]
struct Collisions<'a> {
    blocked: HashMap<(Role, &'a str), usize>,
    direct: HashSet<usize>,
}

impl Collisions<'_> {
    fn is_blocked(&self, c: &Candidate) -> bool {
        self.blocked.contains_key(&(c.role, c.old.as_str()))
    }
}

/// Renames split by role, so a field that shares its name with a renamed
/// object follows its own decision.
struct Renames<'a> {
    objects: HashMap<&'a str, &'a str>,
    fields: HashMap<&'a str, &'a str>,
}

impl<'a> Renames<'a> {
    fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.fields.is_empty()
    }

    fn get(&self, role: Option<Role>, name: &str) -> Option<&'a str> {
        match role {
            Some(Role::Object) => self.objects.get(name).copied(),
            Some(Role::Field) => self.fields.get(name).copied(),
            None => self
                .objects
                .get(name)
                .or_else(|| self.fields.get(name))
                .copied(),
        }
    }
}

pub(super) fn plan(docs: &[Document], change: &PrefixChange) -> Result<RewritePlan> {
    change.validate()?;
    let mut plan = RewritePlan::new(RewriteOperation::ChangePrefix);

    let mut candidates = Vec::new();
    for (i, doc) in docs.iter().enumerate() {
        if let Some(new) = change.rename(&doc.info.name) {
            candidates.push(Candidate {
                doc: i,
                role: Role::Object,
                old: doc.info.name.clone(),
                new,
            });
        }
        if change.rename_fields && declares_fields(doc) {
            for field in &doc.info.fields {
                if let Some(new) = change.rename(&field.name) {
                    candidates.push(Candidate {
                        doc: i,
                        role: Role::Field,
                        old: field.name.clone(),
                        new,
                    });
                }
            }
        }
    }

    let collisions = find_collisions(docs, &candidates);
    for (i, c) in candidates.iter().enumerate() {
        let Some(&cause) = collisions.blocked.get(&(c.role, c.old.as_str())) else {
            continue;
        };
        let doc = &docs[c.doc];
        let offset = match c.role {
            Role::Object => doc.info.spans.name.start,
            Role::Field => doc
                .info
                .field_by_name(&c.old)
                .map(|f| f.name_span.start)
                .unwrap_or(0),
        };
        let reason = if collisions.direct.contains(&i) {
            "the new name is already taken".to_string()
        } else {
            let blocker = &candidates[cause];
            format!(
                "it shares a name with blocked {} \"{}\"",
                blocker.describe(docs),
                blocker.old
            )
        };
        plan.fault(
            format!(
                "Cannot rename {} \"{}\" to \"{}\": {reason}",
                c.describe(docs),
                c.old,
                c.new
            ),
            Some(doc.location(offset)),
        );
    }

    let mut renames = Renames {
        objects: HashMap::new(),
        fields: HashMap::new(),
    };
    for c in candidates.iter().filter(|c| !collisions.is_blocked(c)) {
        let map = match c.role {
            Role::Object => &mut renames.objects,
            Role::Field => &mut renames.fields,
        };
        map.insert(c.old.as_str(), c.new.as_str());
    }

    if !renames.is_empty() {
        for doc in docs {
            plan_document(&mut plan, doc, &renames);
        }
    }

    tracing::debug!(
        "Prefix change '{}' -> '{}' planned {} item(s), {} fault(s)",
        change.from,
        change.to,
        plan.item_count(),
        plan.faults.len()
    );
    Ok(plan)
}

fn declares_fields(doc: &Document) -> bool {
    matches!(
        doc.info.object_type,
        ObjectType::Table | ObjectType::TableExtension
    )
}

/// Candidates whose rename would make two objects of one type, or two
/// fields of one object, share a name. References are matched by text, so
/// blocking one candidate holds back every candidate of the same role and
/// old name. Blocking can expose new collisions with names that now stay
/// put, so this runs to a fixed point.
fn find_collisions<'a>(docs: &[Document], candidates: &'a [Candidate]) -> Collisions<'a> {
    let mut collisions = Collisions::default();

    loop {
        let mut object_names: HashMap<(ObjectType, &str), usize> = HashMap::new();
        for (i, doc) in docs.iter().enumerate() {
            let name = final_name(candidates, &collisions, &doc.info.name, Role::Object, i)
                .unwrap_or(doc.info.name.as_str());
            *object_names.entry((doc.info.object_type, name)).or_default() += 1;
        }

        let mut newly_blocked = Vec::new();
        for (i, c) in candidates.iter().enumerate() {
            if collisions.is_blocked(c) {
                continue;
            }
            let doc = &docs[c.doc];
            let taken = match c.role {
                Role::Object => {
                    object_names
                        .get(&(doc.info.object_type, c.new.as_str()))
                        .copied()
                        .unwrap_or(0)
                        > 1
                }
                Role::Field => {
                    doc.info
                        .fields
                        .iter()
                        .filter(|f| {
                            final_name(candidates, &collisions, &f.name, Role::Field, c.doc)
                                .unwrap_or(f.name.as_str())
                                == c.new
                        })
                        .count()
                        > 1
                }
            };
            if taken {
                newly_blocked.push(i);
            }
        }

        if newly_blocked.is_empty() {
            return collisions;
        }
        for i in newly_blocked {
            let c = &candidates[i];
            collisions.direct.insert(i);
            collisions.blocked.entry((c.role, c.old.as_str())).or_insert(i);
        }
    }
}

fn final_name<'a>(
    candidates: &'a [Candidate],
    collisions: &Collisions<'_>,
    old: &str,
    role: Role,
    doc: usize,
) -> Option<&'a str> {
    candidates
        .iter()
        .find(|c| c.doc == doc && c.role == role && c.old == old)
        .filter(|c| !collisions.is_blocked(c))
        .map(|c| c.new.as_str())
}

/// What a name outside any declaration refers to, when its context says.
/// Member access (`Rec."Name"`) is a field; a type keyword, `::` or an
/// object-valued property is an object. Inside a table, a bare name that
/// matches one of its own fields is that field.
fn reference_role(masked: &str, token_start: usize, own_field: bool) -> Option<Role> {
    let before = masked[..token_start].trim_end();
    if before.ends_with('.') && !before.ends_with("..") {
        return Some(Role::Field);
    }
    let line = &masked[line_start(masked, token_start)..token_start];
    if OBJECT_CONTEXT_RE.is_match(line) {
        return Some(Role::Object);
    }
    own_field.then_some(Role::Field)
}

fn plan_document(plan: &mut RewritePlan, doc: &Document, renames: &Renames<'_>) {
    let masked = mask_source(&doc.text);
    let info = &doc.info;
    let has_fields = declares_fields(doc);

    for caps in IDENT_RE.captures_iter(&masked) {
        let Some(all) = caps.get(0) else {
            continue;
        };
        let (m, quoted) = match (caps.name("quoted"), caps.name("bare")) {
            (Some(m), _) => (m, true),
            (None, Some(m)) => (m, false),
            _ => continue,
        };
        let old = m.as_str();
        let span = Span::new(m.start(), m.end());
        let is_header = span == info.spans.name;
        let is_field_decl = info.fields.iter().any(|f| f.name_span == span);

        let new = if is_header {
            renames.get(Some(Role::Object), old)
        } else if is_field_decl {
            renames.get(Some(Role::Field), old)
        } else {
            let own_field = has_fields && info.field_by_name(old).is_some();
            renames.get(reference_role(&masked, all.start(), own_field), old)
        };
        let Some(new) = new else {
            continue;
        };

        let new_text = if !quoted && needs_quotes(new) {
            format!("\"{new}\"")
        } else {
            new.to_string()
        };
        let location = doc.location(span.start);
        let edits = vec![TextEdit::replace(span, new_text)];

        let item = if is_header {
            PlannedItem {
                kind: ItemKind::Object,
                description: format!("{} \"{}\"", info.object_type, old),
                change: Some(ItemChange {
                    object_type: info.object_type,
                    name: old.to_string(),
                    from: old.to_string(),
                    to: new.to_string(),
                }),
                location,
                edits,
            }
        } else if is_field_decl {
            PlannedItem {
                kind: ItemKind::Field,
                description: format!("field \"{}\" of {} \"{}\"", old, info.object_type, info.name),
                change: Some(ItemChange {
                    object_type: info.object_type,
                    name: info.name.clone(),
                    from: old.to_string(),
                    to: new.to_string(),
                }),
                location,
                edits,
            }
        } else {
            PlannedItem {
                kind: ItemKind::Reference,
                description: format!("reference to \"{old}\""),
                change: None,
                location,
                edits,
            }
        };
        plan.push(&doc.path, item);
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

    fn kinds(plan: &RewritePlan, path: &str) -> Vec<(ItemKind, String)> {
        plan.files[Path::new(path)]
            .items
            .iter()
            .map(|i| (i.kind, i.edits[0].new_text.clone()))
            .collect()
    }

    #[test]
    fn test_rename_requires_separator() {
        let change = PrefixChange::new("ABC", "XYZ");
        assert_eq!(change.rename("ABC_Customer").as_deref(), Some("XYZ_Customer"));
        assert_eq!(change.rename("ABC Customer").as_deref(), Some("XYZ Customer"));
        assert_eq!(change.rename("ABCD_Customer"), None);
        assert_eq!(change.rename("ABC"), None);
        assert_eq!(change.rename("Customer"), None);
    }

    #[test]
    fn test_rename_with_separator_in_prefix() {
        let change = PrefixChange::new("ABC_", "XYZ_");
        assert_eq!(change.rename("ABC_Customer").as_deref(), Some("XYZ_Customer"));
        assert_eq!(change.rename("ABCCustomer"), None);
    }

    #[test]
    fn test_validate_rejects_empty_and_equal() {
        assert!(PrefixChange::new("", "XYZ").validate().is_err());
        assert!(PrefixChange::new("ABC", "ABC").validate().is_err());
        assert!(PrefixChange::new("ABC", "XYZ").validate().is_ok());
    }

    #[test]
    fn test_plan_renames_headers_fields_and_references() {
        let docs = vec![
            doc(
                "/p/car.al",
                "table 50100 ABC_Car\n{\n    fields\n    {\n        field(1; \"ABC Color\"; Text[30]) { }\n        field(2; Size; Integer) { }\n    }\n}\n",
            ),
            doc(
                "/p/card.al",
                "page 50100 \"ABC Car Card\"\n{\n    SourceTable = ABC_Car;\n    layout\n    {\n        area(Content)\n        {\n            field(Color; Rec.\"ABC Color\") { }\n        }\n    }\n}\n",
            ),
        ];
        let plan = plan(&docs, &PrefixChange::new("ABC", "XYZ")).unwrap();
        assert!(plan.faults.is_empty());

        assert_eq!(
            kinds(&plan, "/p/car.al"),
            vec![
                (ItemKind::Object, "XYZ_Car".to_string()),
                (ItemKind::Field, "XYZ Color".to_string()),
            ]
        );
        assert_eq!(
            kinds(&plan, "/p/card.al"),
            vec![
                (ItemKind::Object, "XYZ Car Card".to_string()),
                (ItemKind::Reference, "XYZ_Car".to_string()),
                (ItemKind::Reference, "XYZ Color".to_string()),
            ]
        );
    }

    #[test]
    fn test_bare_name_gains_quotes_when_needed() {
        let docs = vec![doc("/p/a.al", "codeunit 50100 ABC_Helper\n{\n}\n")];
        let plan = plan(&docs, &PrefixChange::new("ABC", "My Co")).unwrap();
        assert_eq!(
            kinds(&plan, "/p/a.al"),
            vec![(ItemKind::Object, "\"My Co_Helper\"".to_string())]
        );
    }

    #[test]
    fn test_collision_is_faulted_and_skipped() {
        let docs = vec![
            doc("/p/a.al", "table 50100 ABC_Car\n{\n}\n"),
            doc("/p/b.al", "table 50101 XYZ_Car\n{\n}\n"),
            doc("/p/c.al", "table 50102 ABC_Bike\n{\n}\n"),
        ];
        let plan = plan(&docs, &PrefixChange::new("ABC", "XYZ")).unwrap();

        assert_eq!(plan.faults.len(), 1);
        assert!(plan.faults[0].message.contains("ABC_Car"));
        assert!(!plan.files.contains_key(Path::new("/p/a.al")));
        assert_eq!(
            kinds(&plan, "/p/c.al"),
            vec![(ItemKind::Object, "XYZ_Bike".to_string())]
        );
    }

    #[test]
    fn test_fields_stay_when_disabled() {
        let docs = vec![doc(
            "/p/car.al",
            "table 50100 ABC_Car\n{\n    fields\n    {\n        field(1; \"ABC Color\"; Text[30]) { }\n    }\n}\n",
        )];
        let mut change = PrefixChange::new("ABC", "XYZ");
        change.rename_fields = false;
        let plan = plan(&docs, &change).unwrap();
        assert_eq!(
            kinds(&plan, "/p/car.al"),
            vec![(ItemKind::Object, "XYZ_Car".to_string())]
        );
    }

    const ORDER: &str = "table 50101 \"ABC Order\"\n{\n    fields\n    {\n        field(1; \"ABC Customer\"; Code[20])\n        {\n            TableRelation = \"ABC Customer\";\n        }\n    }\n\n    procedure Clear()\n    begin\n        \"ABC Customer\" := '';\n    end;\n}\n";

    const ORDER_CARD: &str = "page 50101 \"ABC Order Card\"\n{\n    SourceTable = \"ABC Order\";\n    layout\n    {\n        area(Content)\n        {\n            field(Customer; Rec.\"ABC Customer\") { }\n        }\n    }\n}\n";

    fn order_docs() -> Vec<Document> {
        vec![
            doc("/p/customer.al", "table 50100 \"ABC Customer\"\n{\n}\n"),
            doc("/p/order.al", ORDER),
            doc("/p/card.al", ORDER_CARD),
        ]
    }

    #[test]
    fn test_field_named_like_object_stays_when_disabled() {
        let mut change = PrefixChange::new("ABC", "XYZ");
        change.rename_fields = false;
        let plan = plan(&order_docs(), &change).unwrap();

        assert!(plan.faults.is_empty());
        assert_eq!(
            kinds(&plan, "/p/order.al"),
            vec![
                (ItemKind::Object, "XYZ Order".to_string()),
                (ItemKind::Reference, "XYZ Customer".to_string()),
            ]
        );
        assert_eq!(
            kinds(&plan, "/p/card.al"),
            vec![
                (ItemKind::Object, "XYZ Order Card".to_string()),
                (ItemKind::Reference, "XYZ Order".to_string()),
            ]
        );
    }

    #[test]
    fn test_field_named_like_object_follows_field_rename() {
        let plan = plan(&order_docs(), &PrefixChange::new("ABC", "XYZ")).unwrap();
        let order: Vec<ItemKind> = kinds(&plan, "/p/order.al").into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            order,
            vec![
                ItemKind::Object,
                ItemKind::Field,
                ItemKind::Reference,
                ItemKind::Reference,
            ]
        );
        assert_eq!(kinds(&plan, "/p/card.al").len(), 3);
    }

    #[test]
    fn test_blocked_object_name_holds_back_only_objects() {
        let docs = vec![
            doc("/p/a.al", "table 50100 ABC_Car\n{\n}\n"),
            doc("/p/b.al", "table 50101 XYZ_Car\n{\n}\n"),
            doc(
                "/p/c.al",
                "page 50100 ABC_Car\n{\n    SourceTable = ABC_Car;\n}\n",
            ),
            doc(
                "/p/d.al",
                "table 50102 ABC_Bike\n{\n    fields\n    {\n        field(1; ABC_Car; Code[20])\n        {\n            TableRelation = ABC_Car;\n        }\n    }\n}\n",
            ),
        ];
        let plan = plan(&docs, &PrefixChange::new("ABC", "XYZ")).unwrap();

        let messages: Vec<&str> = plan.faults.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(messages.len(), 2, "{messages:?}");
        assert!(messages[0].starts_with("Cannot rename table \"ABC_Car\""));
        assert!(messages[0].ends_with("the new name is already taken"));
        assert!(messages[1].starts_with("Cannot rename page \"ABC_Car\""));
        assert!(messages[1].ends_with("it shares a name with blocked table \"ABC_Car\""));

        assert!(!plan.files.contains_key(Path::new("/p/c.al")));
        assert_eq!(
            kinds(&plan, "/p/d.al"),
            vec![
                (ItemKind::Object, "XYZ_Bike".to_string()),
                (ItemKind::Field, "XYZ_Car".to_string()),
            ]
        );
    }
}
