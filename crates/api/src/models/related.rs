use serde::{Deserialize, Serialize};

use super::object::ObjectType;

/// One entry of a related-object query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelatedObject {
    pub name: String,
    pub object_type: ObjectType,
    /// Whether the object is declared in the project (as opposed to the platform catalog).
    pub in_project: bool,
}

impl RelatedObject {
    pub fn new(name: impl Into<String>, object_type: ObjectType, in_project: bool) -> Self {
        Self {
            name: name.into(),
            object_type,
            in_project,
        }
    }
}
