use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::location::Location;
use super::object::ObjectType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteOperation {
    Renumber,
    ChangePrefix,
    CopyFields,
    WrapRegions,
    CreateRelated,
}

impl fmt::Display for RewriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RewriteOperation::Renumber => "renumber",
            RewriteOperation::ChangePrefix => "change-prefix",
            RewriteOperation::CopyFields => "copy-fields",
            RewriteOperation::WrapRegions => "wrap-regions",
            RewriteOperation::CreateRelated => "create-related",
        };
        f.write_str(s)
    }
}

/// A single item that failed during a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub message: String,
    /// Where the user should go to fix it.
    pub location: Option<Location>,
}

impl Fault {
    pub fn new(message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{} ({})", self.message, loc),
            None => f.write_str(&self.message),
        }
    }
}

/// Before/after of one changed object or field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChange {
    pub object_type: ObjectType,
    pub name: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteResult {
    pub operation: RewriteOperation,
    pub items_changed: usize,
    pub files_changed: usize,
    pub objects_changed: usize,
    pub fields_changed: usize,
    /// Files the operation wrote, in the order they were written.
    pub changed_files: Vec<PathBuf>,
    /// Changes grouped by object type, in the order they were planned.
    pub changes: IndexMap<ObjectType, Vec<ItemChange>>,
    pub faults: Vec<Fault>,
}

impl RewriteResult {
    pub fn new(operation: RewriteOperation) -> Self {
        Self {
            operation,
            items_changed: 0,
            files_changed: 0,
            objects_changed: 0,
            fields_changed: 0,
            changed_files: Vec::new(),
            changes: IndexMap::new(),
            faults: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    /// One-line human summary, e.g. `Added 2 fields over 2 files`.
    pub fn summary(&self) -> String {
        match self.operation {
            RewriteOperation::Renumber => format!(
                "{} object{} renumbered.",
                self.objects_changed,
                plural(self.objects_changed)
            ),
            RewriteOperation::ChangePrefix => format!(
                "{} field{} and {} object{} changed.",
                self.fields_changed,
                plural(self.fields_changed),
                self.objects_changed,
                plural(self.objects_changed)
            ),
            RewriteOperation::CopyFields => {
                let mut s = format!(
                    "Added {} field{}",
                    self.fields_changed,
                    plural(self.fields_changed)
                );
                if self.files_changed != 1 {
                    s.push_str(&format!(" over {} files", self.files_changed));
                }
                s
            }
            RewriteOperation::WrapRegions => {
                format!("{} region(s) created.", self.items_changed)
            }
            RewriteOperation::CreateRelated => format!(
                "{} extension{} created.",
                self.objects_changed,
                plural(self.objects_changed)
            ),
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}
