use serde::{Deserialize, Serialize};
use std::fmt;

use super::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Entity,
    EntitySet,
}

/// An API entity or entity-set name; must be unique project-wide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub name: String,
}

impl EntityKey {
    pub fn entity(name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Entity,
            name: name.into(),
        }
    }

    pub fn entity_set(name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::EntitySet,
            name: name.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntityKind::Entity => write!(f, "EntityName '{}'", self.name),
            EntityKind::EntitySet => write!(f, "EntitySetName '{}'", self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDeclaration {
    pub key: EntityKey,
    pub location: Location,
}

/// Keys whose conflict status flipped after an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictChange {
    /// Newly conflicting.
    pub added: Vec<EntityKey>,
    /// No longer conflicting.
    pub removed: Vec<EntityKey>,
}

impl ConflictChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn merge(&mut self, other: ConflictChange) {
        for key in other.added {
            if let Some(pos) = self.removed.iter().position(|k| k == &key) {
                self.removed.remove(pos);
            } else if !self.added.contains(&key) {
                self.added.push(key);
            }
        }
        for key in other.removed {
            if let Some(pos) = self.added.iter().position(|k| k == &key) {
                self.added.remove(pos);
            } else if !self.removed.contains(&key) {
                self.removed.push(key);
            }
        }
    }
}

/// A key declared by more than one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConflict {
    pub key: EntityKey,
    pub declarations: Vec<Location>,
}
