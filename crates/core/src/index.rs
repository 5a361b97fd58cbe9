//! Project-wide object index.
//!
//! The primary map is keyed by file path; every secondary map only stores
//! paths, so replacing or removing a file touches exactly the keys that file
//! contributed and nothing else.

use crate::error::{CoreError, Result};
use alscope_api::models::{ObjectInfo, ObjectType};
use indexmap::{IndexMap, IndexSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone)]
pub struct ProjectIndex {
    objects: IndexMap<PathBuf, ObjectInfo>,
    by_type: IndexMap<ObjectType, IndexSet<PathBuf>>,
    by_name: IndexMap<(ObjectType, String), IndexSet<PathBuf>>,
    extensions_by_base: IndexMap<String, IndexSet<PathBuf>>,
    pages_by_source_table: IndexMap<String, IndexSet<PathBuf>>,
}

impl ProjectIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or atomically replace the object declared by `path`.
    pub fn upsert(&mut self, path: &Path, info: ObjectInfo) -> Result<()> {
        if info.name.trim().is_empty() {
            return Err(CoreError::InvalidObject(format!(
                "{} object in {} has no name",
                info.object_type,
                path.display()
            )));
        }
        if info.object_type.is_extension() && info.extended_name.is_none() {
            return Err(CoreError::InvalidObject(format!(
                "{} \"{}\" has no base object",
                info.object_type, info.name
            )));
        }

        self.remove(path);

        let path = path.to_path_buf();
        self.by_type
            .entry(info.object_type)
            .or_default()
            .insert(path.clone());
        self.by_name
            .entry((info.object_type, info.name.clone()))
            .or_default()
            .insert(path.clone());
        if let Some(base) = &info.extended_name {
            self.extensions_by_base
                .entry(base.clone())
                .or_default()
                .insert(path.clone());
        }
        if let Some(table) = &info.source_table {
            self.pages_by_source_table
                .entry(table.clone())
                .or_default()
                .insert(path.clone());
        }
        self.objects.insert(path, info);
        Ok(())
    }

    /// Drop every trace of `path`, returning the object it declared.
    pub fn remove(&mut self, path: &Path) -> Option<ObjectInfo> {
        let info = self.objects.shift_remove(path)?;

        detach(&mut self.by_type, &info.object_type, path);
        detach(
            &mut self.by_name,
            &(info.object_type, info.name.clone()),
            path,
        );
        if let Some(base) = &info.extended_name {
            detach(&mut self.extensions_by_base, base, path);
        }
        if let Some(table) = &info.source_table {
            detach(&mut self.pages_by_source_table, table, path);
        }
        Some(info)
    }

    pub fn get(&self, path: &Path) -> Option<&ObjectInfo> {
        self.objects.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.objects.contains_key(path)
    }

    pub fn find_by_type(&self, object_type: ObjectType) -> Vec<&ObjectInfo> {
        self.resolve_paths(self.by_type.get(&object_type))
    }

    /// Extensions registered against `base_name` (exact, case-sensitive).
    pub fn find_extensions_of(&self, base_name: &str) -> Vec<&ObjectInfo> {
        self.resolve_paths(self.extensions_by_base.get(base_name))
    }

    pub fn find_by_name(&self, object_type: ObjectType, name: &str) -> Vec<&ObjectInfo> {
        self.resolve_paths(self.by_name.get(&(object_type, name.to_string())))
    }

    pub fn has_object(&self, object_type: ObjectType, name: &str) -> bool {
        self.by_name
            .get(&(object_type, name.to_string()))
            .is_some_and(|paths| !paths.is_empty())
    }

    /// Pages whose `SourceTable` is `table_name`.
    pub fn pages_for_table(&self, table_name: &str) -> Vec<&ObjectInfo> {
        self.resolve_paths(self.pages_by_source_table.get(table_name))
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectInfo> {
        self.objects.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.objects.keys()
    }

    /// Paths under `folder`.
    pub fn paths_in_folder(&self, folder: &Path) -> Vec<PathBuf> {
        self.objects
            .keys()
            .filter(|p| p.starts_with(folder))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn resolve_paths(&self, paths: Option<&IndexSet<PathBuf>>) -> Vec<&ObjectInfo> {
        paths
            .map(|paths| paths.iter().filter_map(|p| self.objects.get(p)).collect())
            .unwrap_or_default()
    }
}

fn detach<K>(map: &mut IndexMap<K, IndexSet<PathBuf>>, key: &K, path: &Path)
where
    K: std::hash::Hash + Eq,
{
    if let Some(paths) = map.get_mut(key) {
        paths.shift_remove(path);
        if paths.is_empty() {
            map.shift_remove(key);
        }
    }
}
