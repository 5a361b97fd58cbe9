//! New extension objects for related tables and pages.
//!
//! Starting from an extension, every related base table or page that the
//! project does not extend yet gets a fresh `tableextension` or
//! `pageextension`, named after the project prefix and placed next to the
//! starting object.

use crate::config::IdRange;
use crate::error::{CoreError, Result};
use crate::index::ProjectIndex;
use crate::parser::utils::needs_quotes;
use crate::resolver::{RelatedObjectResolver, RelationCatalog};
use alscope_api::models::{Fault, ObjectInfo, ObjectType};
use std::collections::HashSet;
use std::path::PathBuf;

/// Object names are limited to 30 characters.
pub const MAX_NAME_LEN: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingConvention {
    /// `CustomerExt.TableExt.al`
    #[default]
    New,
    /// `TabExt50100.CustomerExt.al`
    Old,
}

impl NamingConvention {
    pub fn from_settings(use_old_file_naming: bool) -> Self {
        if use_old_file_naming {
            NamingConvention::Old
        } else {
            NamingConvention::New
        }
    }

    pub fn file_name(&self, object_type: ObjectType, id: Option<u32>, name: &str) -> String {
        let name: String = name.chars().filter(|c| c.is_alphanumeric()).collect();
        match self {
            NamingConvention::New => format!("{name}.{}.al", long_type_name(object_type)),
            NamingConvention::Old => match id {
                Some(id) => format!("{}{id}.{name}.al", short_type_name(object_type)),
                None => format!("{}.{name}.al", short_type_name(object_type)),
            },
        }
    }
}

fn long_type_name(object_type: ObjectType) -> &'static str {
    match object_type {
        ObjectType::Table => "Table",
        ObjectType::TableExtension => "TableExt",
        ObjectType::Page => "Page",
        ObjectType::PageExtension => "PageExt",
        ObjectType::Report => "Report",
        ObjectType::ReportExtension => "ReportExt",
        ObjectType::Codeunit => "Codeunit",
        ObjectType::Query => "Query",
        ObjectType::XmlPort => "XmlPort",
        ObjectType::Enum => "Enum",
        ObjectType::EnumExtension => "EnumExt",
        ObjectType::PermissionSet => "PermissionSet",
        ObjectType::PermissionSetExtension => "PermissionSetExt",
        ObjectType::Interface => "Interface",
        ObjectType::Profile => "Profile",
        ObjectType::ControlAddIn => "ControlAddIn",
        ObjectType::Entitlement => "Entitlement",
    }
}

fn short_type_name(object_type: ObjectType) -> &'static str {
    match object_type {
        ObjectType::Table => "Tab",
        ObjectType::TableExtension => "TabExt",
        ObjectType::Page => "Pag",
        ObjectType::PageExtension => "PagExt",
        ObjectType::Report => "Rep",
        ObjectType::ReportExtension => "RepExt",
        ObjectType::Codeunit => "Cod",
        ObjectType::Query => "Que",
        ObjectType::XmlPort => "Xml",
        ObjectType::Enum => "Enu",
        ObjectType::EnumExtension => "EnuExt",
        ObjectType::PermissionSet => "Per",
        ObjectType::PermissionSetExtension => "PerExt",
        ObjectType::Interface => "Int",
        ObjectType::Profile => "Pro",
        ObjectType::ControlAddIn => "Cad",
        ObjectType::Entitlement => "Ent",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewObject {
    pub path: PathBuf,
    pub object_type: ObjectType,
    pub id: u32,
    pub name: String,
    pub base: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScaffoldPlan {
    pub objects: Vec<NewObject>,
    pub faults: Vec<Fault>,
}

pub struct ScaffoldRequest<'a> {
    pub prefix: &'a str,
    pub naming: NamingConvention,
    pub ranges: &'a [IdRange],
    /// Base kinds to create extensions for; empty means tables and pages.
    pub kinds: &'a [ObjectType],
}

/// Plan extensions for every related table/page of `start` that the project
/// does not extend yet.
pub fn scaffold_related_extensions(
    index: &ProjectIndex,
    catalog: &RelationCatalog,
    start: &ObjectInfo,
    request: &ScaffoldRequest<'_>,
) -> Result<ScaffoldPlan> {
    let prefix = request.prefix.trim();
    if prefix.is_empty() {
        return Err(CoreError::Plan("an object prefix is required".into()));
    }
    let base = start.extended_name.as_deref().ok_or_else(|| {
        CoreError::Plan(format!(
            "{} \"{}\" does not extend another object",
            start.object_type, start.name
        ))
    })?;
    let kinds: &[ObjectType] = if request.kinds.is_empty() {
        &[ObjectType::Table, ObjectType::Page]
    } else {
        request.kinds
    };

    let related = RelatedObjectResolver::new(index, catalog).resolve(base, start.object_type, kinds)?;
    let folder = start
        .path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_default();

    let mut plan = ScaffoldPlan::default();
    let mut taken: HashSet<(ObjectType, u32)> = index
        .objects()
        .filter_map(|o| o.id.map(|id| (o.object_type, id)))
        .collect();
    let mut names: HashSet<(ObjectType, String)> = HashSet::new();

    for rel in related.into_iter().filter(|r| !r.in_project) {
        let Some(ext_type) = rel.object_type.extension_type() else {
            continue;
        };
        let already_extended = index
            .find_extensions_of(&rel.name)
            .iter()
            .any(|e| e.object_type == ext_type);
        if already_extended {
            continue;
        }

        let name = extension_name(prefix, &rel.name);
        if index.has_object(ext_type, &name) || !names.insert((ext_type, name.clone())) {
            plan.faults.push(Fault::new(
                format!("{ext_type} \"{name}\" already exists; \"{}\" was skipped", rel.name),
                None,
            ));
            continue;
        }

        let Some(id) = next_free_id(request.ranges, ext_type, &taken) else {
            plan.faults.push(Fault::new(
                format!("No free {ext_type} id left for \"{}\"", rel.name),
                None,
            ));
            continue;
        };
        taken.insert((ext_type, id));

        let file_name = request.naming.file_name(ext_type, Some(id), &name);
        plan.objects.push(NewObject {
            path: folder.join(file_name),
            object_type: ext_type,
            id,
            text: extension_source(ext_type, id, &name, &rel.name),
            name,
            base: rel.name,
        });
    }

    tracing::debug!(
        "Planned {} new extension(s) for relatives of \"{}\"",
        plan.objects.len(),
        base
    );
    Ok(plan)
}

/// `<prefix> <base>`, cut to the object name limit.
pub fn extension_name(prefix: &str, base: &str) -> String {
    let full = format!("{prefix} {base}");
    full.chars()
        .take(MAX_NAME_LEN)
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn next_free_id(
    ranges: &[IdRange],
    object_type: ObjectType,
    taken: &HashSet<(ObjectType, u32)>,
) -> Option<u32> {
    let mut ranges = ranges.to_vec();
    ranges.sort_by_key(|r| r.from);
    ranges
        .iter()
        .flat_map(|r| r.from..=r.to)
        .find(|id| !taken.contains(&(object_type, *id)))
}

fn quoted(name: &str) -> String {
    if needs_quotes(name) {
        format!("\"{name}\"")
    } else {
        name.to_string()
    }
}

fn extension_source(object_type: ObjectType, id: u32, name: &str, base: &str) -> String {
    let section = match object_type {
        ObjectType::TableExtension => "fields",
        ObjectType::PageExtension => "layout",
        ObjectType::ReportExtension => "dataset",
        _ => "",
    };
    let mut text = format!(
        "{} {} {} extends {}\n{{\n",
        object_type.keyword(),
        id,
        quoted(name),
        quoted(base)
    );
    if !section.is_empty() {
        text.push_str(&format!("    {section}\n    {{\n    }}\n"));
    }
    text.push_str("}\n");
    text
}
