//! Duplicate API entity names.
//!
//! API pages and queries publish an `EntityName` and an `EntitySetName`;
//! each must be unique across the project. The analyzer keeps a registry of
//! which files declare which names and, on every change, reports the keys
//! whose conflict status flipped.

use crate::error::Result;
use crate::parser::parse_entity_names;
use crate::scanner::Scanner;
use alscope_api::models::{ConflictChange, EntityConflict, EntityDeclaration, EntityKey};
use indexmap::{IndexMap, IndexSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct EntityAnalyzer {
    enabled: bool,
    roots: Vec<PathBuf>,
    by_key: IndexMap<EntityKey, IndexSet<PathBuf>>,
    by_file: IndexMap<PathBuf, Vec<EntityDeclaration>>,
}

impl EntityAnalyzer {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Forget everything and rescan `roots`. Returns every conflicting key
    /// as newly added.
    pub fn init(&mut self, roots: &[PathBuf]) -> Result<ConflictChange> {
        self.teardown();
        if !self.enabled {
            return Ok(ConflictChange::default());
        }
        self.roots = roots.to_vec();

        let mut change = ConflictChange::default();
        for root in roots {
            for path in Scanner::collect_paths(root) {
                match std::fs::read_to_string(&path) {
                    Ok(text) => change.merge(self.on_file_changed(&path, Some(&text))),
                    Err(e) => tracing::warn!("Cannot read {}: {}", path.display(), e),
                }
            }
        }

        tracing::info!(
            "Entity analyzer tracks {} file(s), {} conflict(s)",
            self.by_file.len(),
            change.added.len()
        );
        Ok(change)
    }

    /// Re-register `path` from its new text; `None` means the file is gone.
    pub fn on_file_changed(&mut self, path: &Path, text: Option<&str>) -> ConflictChange {
        if !self.enabled {
            return ConflictChange::default();
        }

        let declarations = text
            .map(|t| parse_entity_names(path, t))
            .unwrap_or_default();

        let mut touched: IndexSet<EntityKey> = IndexSet::new();
        if let Some(old) = self.by_file.get(path) {
            touched.extend(old.iter().map(|d| d.key.clone()));
        }
        touched.extend(declarations.iter().map(|d| d.key.clone()));
        if touched.is_empty() {
            return ConflictChange::default();
        }

        let before: Vec<bool> = touched.iter().map(|k| self.is_conflicting(k)).collect();

        self.detach(path);
        if !declarations.is_empty() {
            for decl in &declarations {
                self.by_key
                    .entry(decl.key.clone())
                    .or_default()
                    .insert(path.to_path_buf());
            }
            self.by_file.insert(path.to_path_buf(), declarations);
        }

        let mut change = ConflictChange::default();
        for (key, was) in touched.into_iter().zip(before) {
            match (was, self.is_conflicting(&key)) {
                (false, true) => change.added.push(key),
                (true, false) => change.removed.push(key),
                _ => {}
            }
        }
        if !change.is_empty() {
            tracing::debug!(
                "{}: {} new conflict(s), {} resolved",
                path.display(),
                change.added.len(),
                change.removed.len()
            );
        }
        change
    }

    /// Drop every file under `folder`, e.g. when a workspace folder closes.
    pub fn remove_files_in_folder(&mut self, folder: &Path) -> ConflictChange {
        let paths: Vec<PathBuf> = self
            .by_file
            .keys()
            .filter(|p| p.starts_with(folder))
            .cloned()
            .collect();

        let mut change = ConflictChange::default();
        for path in paths {
            change.merge(self.on_file_changed(&path, None));
        }
        self.roots.retain(|r| !r.starts_with(folder));
        change
    }

    pub fn teardown(&mut self) {
        self.roots.clear();
        self.by_key.clear();
        self.by_file.clear();
    }

    pub fn is_conflicting(&self, key: &EntityKey) -> bool {
        self.by_key.get(key).is_some_and(|paths| paths.len() > 1)
    }

    /// Every conflicting key with all of its declarations.
    pub fn conflicts(&self) -> Vec<EntityConflict> {
        self.by_key
            .iter()
            .filter(|(_, paths)| paths.len() > 1)
            .map(|(key, paths)| EntityConflict {
                key: key.clone(),
                declarations: paths
                    .iter()
                    .filter_map(|p| self.by_file.get(p))
                    .flat_map(|decls| decls.iter().filter(|d| &d.key == key))
                    .map(|d| d.location.clone())
                    .collect(),
            })
            .collect()
    }

    pub fn declarations(&self, path: &Path) -> &[EntityDeclaration] {
        self.by_file.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    fn detach(&mut self, path: &Path) {
        let Some(old) = self.by_file.shift_remove(path) else {
            return;
        };
        for decl in old {
            if let Some(paths) = self.by_key.get_mut(&decl.key) {
                paths.shift_remove(path);
                if paths.is_empty() {
                    self.by_key.shift_remove(&decl.key);
                }
            }
        }
    }
}
