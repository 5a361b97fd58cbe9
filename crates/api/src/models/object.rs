use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::location::Span;

/// AL object kinds recognised in an object header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Table,
    TableExtension,
    Page,
    PageExtension,
    Report,
    ReportExtension,
    Codeunit,
    Query,
    XmlPort,
    Enum,
    EnumExtension,
    PermissionSet,
    PermissionSetExtension,
    Interface,
    Profile,
    ControlAddIn,
    Entitlement,
}

impl ObjectType {
    pub const ALL: [ObjectType; 17] = [
        ObjectType::Table,
        ObjectType::TableExtension,
        ObjectType::Page,
        ObjectType::PageExtension,
        ObjectType::Report,
        ObjectType::ReportExtension,
        ObjectType::Codeunit,
        ObjectType::Query,
        ObjectType::XmlPort,
        ObjectType::Enum,
        ObjectType::EnumExtension,
        ObjectType::PermissionSet,
        ObjectType::PermissionSetExtension,
        ObjectType::Interface,
        ObjectType::Profile,
        ObjectType::ControlAddIn,
        ObjectType::Entitlement,
    ];

    /// Map a header keyword (case-insensitive) to an object type.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let lower = keyword.to_ascii_lowercase();
        Self::ALL.into_iter().find(|t| t.keyword() == lower)
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            ObjectType::Table => "table",
            ObjectType::TableExtension => "tableextension",
            ObjectType::Page => "page",
            ObjectType::PageExtension => "pageextension",
            ObjectType::Report => "report",
            ObjectType::ReportExtension => "reportextension",
            ObjectType::Codeunit => "codeunit",
            ObjectType::Query => "query",
            ObjectType::XmlPort => "xmlport",
            ObjectType::Enum => "enum",
            ObjectType::EnumExtension => "enumextension",
            ObjectType::PermissionSet => "permissionset",
            ObjectType::PermissionSetExtension => "permissionsetextension",
            ObjectType::Interface => "interface",
            ObjectType::Profile => "profile",
            ObjectType::ControlAddIn => "controladdin",
            ObjectType::Entitlement => "entitlement",
        }
    }

    pub fn is_extension(&self) -> bool {
        self.base_type().is_some()
    }

    /// The kind an extension object extends.
    pub fn base_type(&self) -> Option<ObjectType> {
        match self {
            ObjectType::TableExtension => Some(ObjectType::Table),
            ObjectType::PageExtension => Some(ObjectType::Page),
            ObjectType::ReportExtension => Some(ObjectType::Report),
            ObjectType::EnumExtension => Some(ObjectType::Enum),
            ObjectType::PermissionSetExtension => Some(ObjectType::PermissionSet),
            _ => None,
        }
    }

    /// The extension kind for a base kind, if the platform allows extending it.
    pub fn extension_type(&self) -> Option<ObjectType> {
        Self::ALL
            .into_iter()
            .find(|t| t.base_type() == Some(*self))
    }

    /// Whether objects of this kind carry a numeric id in their header.
    pub fn has_id(&self) -> bool {
        !matches!(
            self,
            ObjectType::Interface
                | ObjectType::Profile
                | ObjectType::ControlAddIn
                | ObjectType::Entitlement
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Byte spans inside the source text that the rewrite engine edits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSpans {
    pub keyword: Span,
    pub id: Option<Span>,
    /// Name without surrounding quotes.
    pub name: Span,
    pub extends: Option<Span>,
    /// Offset of the `{` opening the object body.
    pub body_open: Option<usize>,
    /// Offset of the `}` closing the `fields` block.
    pub fields_close: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub id: u32,
    pub name: String,
    pub data_type: String,
    /// 1-based line of the `field(` declaration.
    pub line: usize,
    pub id_span: Span,
    pub name_span: Span,
    /// From `field(` to the end of its body (or declaration line).
    pub block_span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub object_type: ObjectType,
    pub id: Option<u32>,
    pub name: String,
    /// Base object name for extension kinds.
    pub extended_name: Option<String>,
    /// `SourceTable` of a page.
    pub source_table: Option<String>,
    pub path: PathBuf,
    pub fields: Vec<FieldInfo>,
    pub spans: ObjectSpans,
}

impl ObjectInfo {
    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            object_type: self.object_type,
            name: self.name.clone(),
        }
    }

    pub fn field_by_id(&self, id: u32) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Identity of an object inside one project: kind plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub object_type: ObjectType,
    pub name: String,
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\"", self.object_type, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_round_trip_is_case_insensitive() {
        assert_eq!(
            ObjectType::from_keyword("TableExtension"),
            Some(ObjectType::TableExtension)
        );
        assert_eq!(ObjectType::from_keyword("PAGE"), Some(ObjectType::Page));
        assert_eq!(ObjectType::from_keyword("procedure"), None);
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(ObjectType::PageExtension.base_type(), Some(ObjectType::Page));
        assert_eq!(
            ObjectType::Table.extension_type(),
            Some(ObjectType::TableExtension)
        );
        assert!(!ObjectType::Codeunit.is_extension());
        assert_eq!(ObjectType::Codeunit.extension_type(), None);
    }
}
