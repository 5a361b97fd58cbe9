use alscope_api::models::{EntityConflict, ObjectInfo, RelatedObject, RewriteResult};
use std::path::Path;
use tabled::{Table, Tabled, settings::Style};

#[derive(Tabled)]
struct ObjectRow {
    #[tabled(rename = "Type")]
    object_type: String,
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Extends")]
    extends: String,
    #[tabled(rename = "Fields")]
    fields: usize,
    #[tabled(rename = "File")]
    file: String,
}

#[derive(Tabled)]
struct RelatedRow {
    #[tabled(rename = "Type")]
    object_type: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "In project")]
    in_project: &'static str,
}

#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Type")]
    object_type: String,
    #[tabled(rename = "Object")]
    name: String,
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "To")]
    to: String,
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

pub fn objects<'a>(objects: impl IntoIterator<Item = &'a ObjectInfo>, root: &Path) -> String {
    let rows: Vec<ObjectRow> = objects
        .into_iter()
        .map(|o| ObjectRow {
            object_type: o.object_type.to_string(),
            id: o.id.map(|id| id.to_string()).unwrap_or_default(),
            name: o.name.clone(),
            extends: o.extended_name.clone().unwrap_or_default(),
            fields: o.fields.len(),
            file: relative(&o.path, root),
        })
        .collect();
    Table::new(rows).with(Style::psql()).to_string()
}

pub fn related(related: &[RelatedObject]) -> String {
    let rows: Vec<RelatedRow> = related
        .iter()
        .map(|r| RelatedRow {
            object_type: r.object_type.to_string(),
            name: r.name.clone(),
            in_project: if r.in_project { "yes" } else { "no" },
        })
        .collect();
    Table::new(rows).with(Style::psql()).to_string()
}

/// Summary line, changed items and `path:line:column` locators for faults.
pub fn result(result: &RewriteResult) -> String {
    let mut out = String::new();
    let rows: Vec<ChangeRow> = result
        .changes
        .values()
        .flatten()
        .map(|c| ChangeRow {
            object_type: c.object_type.to_string(),
            name: c.name.clone(),
            from: c.from.clone(),
            to: c.to.clone(),
        })
        .collect();
    if !rows.is_empty() {
        out.push_str(&Table::new(rows).with(Style::psql()).to_string());
        out.push('\n');
    }
    for fault in &result.faults {
        match &fault.location {
            Some(loc) => out.push_str(&format!("{loc}: {}\n", fault.message)),
            None => out.push_str(&format!("{}\n", fault.message)),
        }
    }
    out.push_str(&result.summary());
    out
}

pub fn conflicts(conflicts: &[EntityConflict]) -> String {
    if conflicts.is_empty() {
        return "No duplicate API entity names.".to_string();
    }
    let mut out = String::new();
    for conflict in conflicts {
        out.push_str(&format!(
            "Duplicate {} declared {} times:\n",
            conflict.key,
            conflict.declarations.len()
        ));
        for loc in &conflict.declarations {
            out.push_str(&format!("  {loc}\n"));
        }
    }
    out.truncate(out.trim_end().len());
    out
}
