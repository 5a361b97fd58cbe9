//! Workspace runtime.
//!
//! Owns the project index, the entity registry and the per-file scan state
//! for one project root, and routes every bulk rewrite through the same
//! place so the index is refreshed from whatever the rewrite wrote.
//!
//! The index is kept MVCC style: readers take a cheap `Arc` snapshot, writers
//! update under the write lock and never block a reader holding an older
//! snapshot.

use crate::analysis::EntityAnalyzer;
use crate::config::Settings;
use crate::error::{CoreError, Result};
use crate::index::ProjectIndex;
use crate::parser::parse_object;
use crate::resolver::{RelatedObjectResolver, RelationCatalog};
use crate::rewrite::{
    DocumentStore, FsDocumentStore, PrefixChange, RenumberPolicy, RewriteEngine, WrapMode,
};
use crate::scaffold::{NamingConvention, ScaffoldRequest, scaffold_related_extensions};
use crate::scanner::{ScanOutcome, ScannedFile, Scanner, SourceFile};
use alscope_api::models::{
    ConflictChange, EntityConflict, Fault, ItemChange, Location, ObjectInfo, ObjectType,
    RelatedObject, RewriteOperation, RewriteResult,
};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

mod watch;

pub struct Workspace {
    root: PathBuf,
    settings: RwLock<Settings>,

    /// Current index version (double Arc for MVCC)
    current: RwLock<Arc<ProjectIndex>>,
    analyzer: RwLock<EntityAnalyzer>,
    sources: RwLock<HashMap<PathBuf, SourceFile>>,

    store: Arc<dyn DocumentStore>,
    catalog: Arc<RelationCatalog>,

    /// Set while a bulk rewrite is running
    busy: AtomicBool,
    cancel_token: CancellationToken,
}

/// Clears the in-flight flag when the rewrite finishes, however it finishes.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, settings: Settings) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        let analyzer = EntityAnalyzer::new(!settings.disable_api_entity_warnings);
        Self {
            root,
            settings: RwLock::new(settings),
            current: RwLock::new(Arc::new(ProjectIndex::new())),
            analyzer: RwLock::new(analyzer),
            sources: RwLock::new(HashMap::new()),
            store: Arc::new(FsDocumentStore::new()),
            catalog: Arc::new(RelationCatalog::builtin().clone()),
            busy: AtomicBool::new(false),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Load settings from `root` and build a workspace over it.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let settings = Settings::load(&root)?;
        Ok(Self::new(root, settings))
    }

    /// Replace the standard relation catalog.
    pub fn with_catalog(mut self, catalog: RelationCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Snapshot of the current index (cheap operation)
    pub async fn snapshot(&self) -> Arc<ProjectIndex> {
        self.current.read().await.clone()
    }

    /// Rescan the whole root and replace the index and entity registry.
    pub async fn rebuild(&self) -> Result<()> {
        let root = self.root.clone();
        let parsed = tokio::task::spawn_blocking(move || {
            let paths = Scanner::collect_paths(&root);
            let files = Scanner::scan(paths, &HashMap::new())
                .into_iter()
                .filter_map(|(_, outcome)| match outcome {
                    ScanOutcome::Changed(file) => Some(file),
                    _ => None,
                })
                .collect();
            parse_all(files)
        })
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;

        let enabled = !self.settings.read().await.disable_api_entity_warnings;
        let mut index = ProjectIndex::new();
        let mut sources = HashMap::new();
        let mut analyzer = EntityAnalyzer::new(enabled);

        for (file, info) in parsed {
            index_file(&mut index, &file.path, info);
            analyzer.on_file_changed(&file.path, Some(&file.text));
            sources.insert(file.path, file.source);
        }

        tracing::info!(
            "Indexed {} object(s) under {}",
            index.len(),
            self.root.display()
        );
        for conflict in analyzer.conflicts() {
            tracing::warn!(
                "Duplicate {} in {} files",
                conflict.key,
                conflict.declarations.len()
            );
        }

        *self.current.write().await = Arc::new(index);
        *self.sources.write().await = sources;
        *self.analyzer.write().await = analyzer;
        Ok(())
    }

    /// Re-read `paths`, reparsing the ones whose content changed and dropping
    /// the ones that are gone. A gone directory drops everything under it.
    pub async fn update_files(&self, paths: Vec<PathBuf>) -> Result<ConflictChange> {
        self.refresh(paths, false).await
    }

    async fn refresh(&self, paths: Vec<PathBuf>, force: bool) -> Result<ConflictChange> {
        let existing = if force {
            HashMap::new()
        } else {
            self.sources.read().await.clone()
        };

        let (to_scan, gone): (Vec<PathBuf>, Vec<PathBuf>) =
            paths.into_iter().partition(|p| p.exists());

        let (parsed, unchanged_or_gone) = tokio::task::spawn_blocking(move || {
            let mut changed = Vec::new();
            let mut vanished = Vec::new();
            for (path, outcome) in Scanner::scan(to_scan, &existing) {
                match outcome {
                    ScanOutcome::Changed(file) => changed.push(file),
                    ScanOutcome::Gone => vanished.push(path),
                    ScanOutcome::Unchanged => {}
                }
            }
            (parse_all(changed), vanished)
        })
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;

        let mut current = self.current.write().await;
        let mut sources = self.sources.write().await;
        let mut analyzer = self.analyzer.write().await;
        let index = Arc::make_mut(&mut *current);
        let mut change = ConflictChange::default();

        for path in gone.into_iter().chain(unchanged_or_gone) {
            for removed in index.paths_in_folder(&path) {
                index.remove(&removed);
                tracing::debug!("Removed {}", removed.display());
            }
            sources.retain(|p, _| !p.starts_with(&path));
            change.merge(analyzer.remove_files_in_folder(&path));
        }

        let updated = parsed.len();
        for (file, info) in parsed {
            index_file(index, &file.path, info);
            change.merge(analyzer.on_file_changed(&file.path, Some(&file.text)));
            sources.insert(file.path, file.source);
        }

        if updated > 0 {
            tracing::debug!("Reindexed {} file(s)", updated);
        }
        for key in &change.added {
            tracing::warn!("Duplicate {}", key);
        }
        Ok(change)
    }

    /// Objects related to the one declared in `path`.
    pub async fn related(&self, path: &Path, scope: &[ObjectType]) -> Result<Vec<RelatedObject>> {
        let index = self.snapshot().await;
        let info = object_at(&index, path)?;
        let base = info.extended_name.as_deref().unwrap_or(&info.name);
        RelatedObjectResolver::new(&index, &self.catalog).resolve(base, info.object_type, scope)
    }

    pub async fn conflicts(&self) -> Vec<EntityConflict> {
        self.analyzer.read().await.conflicts()
    }

    pub async fn renumber(&self, policy: &RenumberPolicy) -> Result<RewriteResult> {
        let _guard = self.begin()?;
        let index = self.snapshot().await;
        let result = self.engine().renumber(&index, policy).await?;
        self.after_rewrite(&result).await?;
        Ok(result)
    }

    pub async fn change_prefix(&self, change: &PrefixChange) -> Result<RewriteResult> {
        let _guard = self.begin()?;
        let index = self.snapshot().await;
        let mut result = self.engine().change_prefix(&index, change).await?;
        self.after_rewrite(&result).await?;

        if change.update_settings {
            match Settings::write_prefix(&self.root, &change.to) {
                Ok(()) => self.settings.write().await.object_prefix = Some(change.to.clone()),
                Err(e) => {
                    tracing::warn!("Prefix not stored in settings: {}", e);
                    result
                        .faults
                        .push(Fault::new(format!("Prefix not stored in settings: {e}"), None));
                }
            }
        }
        Ok(result)
    }

    /// Copy the fields of the table extension in `source` to the project's
    /// extensions of every related table.
    pub async fn copy_fields(&self, source: &Path) -> Result<RewriteResult> {
        let _guard = self.begin()?;
        let index = self.snapshot().await;
        let info = object_at(&index, source)?;
        let base = match (info.object_type, &info.extended_name) {
            (ObjectType::TableExtension, Some(base)) => base.clone(),
            _ => {
                return Err(CoreError::Plan(format!(
                    "{} \"{}\" is not a tableextension",
                    info.object_type, info.name
                )));
            }
        };

        let related = RelatedObjectResolver::new(&index, &self.catalog).resolve(
            &base,
            ObjectType::TableExtension,
            &[ObjectType::TableExtension],
        )?;

        // Related tables without a project extension have nowhere to copy to
        let targets: Vec<(String, Option<PathBuf>)> = related
            .iter()
            .flat_map(|r| index.find_by_name(r.object_type, &r.name))
            .filter(|ext| ext.path != source)
            .map(|ext| (ext.name.clone(), Some(ext.path.clone())))
            .collect();

        let result = self.engine().copy_fields(source, &targets).await?;
        self.after_rewrite(&result).await?;
        Ok(result)
    }

    /// Wrap regions in `paths`, or in every indexed file when `paths` is empty.
    pub async fn wrap_regions(&self, paths: &[PathBuf], mode: WrapMode) -> Result<RewriteResult> {
        let _guard = self.begin()?;
        let paths = if paths.is_empty() {
            self.snapshot().await.paths().cloned().collect()
        } else {
            paths.to_vec()
        };
        let result = self.engine().wrap_regions(&paths, mode).await?;
        self.after_rewrite(&result).await?;
        Ok(result)
    }

    /// Create the missing table/page extensions for objects related to the
    /// extension in `path`.
    pub async fn create_related(&self, path: &Path, kinds: &[ObjectType]) -> Result<RewriteResult> {
        let _guard = self.begin()?;
        let settings = self.settings().await;
        let prefix = settings
            .object_prefix
            .clone()
            .ok_or_else(|| CoreError::Plan("no object prefix is configured".into()))?;
        if settings.id_ranges.is_empty() {
            return Err(CoreError::Plan("no id ranges are configured".into()));
        }

        let index = self.snapshot().await;
        let start = object_at(&index, path)?;
        let request = ScaffoldRequest {
            prefix: &prefix,
            naming: NamingConvention::from_settings(settings.use_old_file_naming),
            ranges: &settings.id_ranges,
            kinds,
        };
        let plan = scaffold_related_extensions(&index, &self.catalog, start, &request)?;

        let mut result = RewriteResult::new(RewriteOperation::CreateRelated);
        result.faults = plan.faults;
        for object in plan.objects {
            match self.store.create(&object.path, &object.text).await {
                Ok(()) => {
                    tracing::debug!("Created {}", object.path.display());
                    result.objects_changed += 1;
                    result.items_changed += 1;
                    result.files_changed += 1;
                    let file_name = object
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    result.changed_files.push(object.path);
                    result
                        .changes
                        .entry(object.object_type)
                        .or_default()
                        .push(ItemChange {
                            object_type: object.object_type,
                            name: object.name,
                            from: object.base,
                            to: file_name,
                        });
                }
                Err(e) => result.faults.push(Fault::new(
                    format!("Cannot create {}: {e}", object.path.display()),
                    Some(Location::new(start.path.as_path(), 1, 1)),
                )),
            }
        }
        tracing::info!("{} ({} fault(s))", result.summary(), result.faults.len());

        self.after_rewrite(&result).await?;
        Ok(result)
    }

    fn engine(&self) -> RewriteEngine<'_> {
        RewriteEngine::new(self.store.as_ref())
    }

    fn begin(&self) -> Result<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CoreError::Busy)?;
        Ok(BusyGuard(&self.busy))
    }

    async fn after_rewrite(&self, result: &RewriteResult) -> Result<()> {
        for fault in &result.faults {
            tracing::warn!("{}", fault);
        }
        if result.changed_files.is_empty() {
            return Ok(());
        }
        self.refresh(result.changed_files.clone(), true).await?;
        Ok(())
    }
}

fn object_at<'a>(index: &'a ProjectIndex, path: &Path) -> Result<&'a ObjectInfo> {
    index
        .get(path)
        .ok_or_else(|| CoreError::NotFound(format!("no indexed object in {}", path.display())))
}

fn parse_all(files: Vec<ScannedFile>) -> Vec<(ScannedFile, Result<ObjectInfo>)> {
    files
        .into_par_iter()
        .map(|file| {
            let info = parse_object(&file.path, &file.text);
            (file, info)
        })
        .collect()
}

/// Insert a parsed object, or drop the file's old entry when it no longer
/// declares a usable object.
fn index_file(index: &mut ProjectIndex, path: &Path, info: Result<ObjectInfo>) {
    let outcome = info.and_then(|info| index.upsert(path, info));
    if let Err(e) = outcome {
        tracing::warn!("{}", e);
        index.remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_second_rewrite_is_rejected_while_busy() {
        let dir = tempdir().unwrap();
        let workspace = Workspace::new(dir.path(), Settings::default());

        let guard = workspace.begin().unwrap();
        let err = workspace
            .wrap_regions(&[], WrapMode::Procedures)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Busy));

        drop(guard);
        assert!(workspace.wrap_regions(&[], WrapMode::Procedures).await.is_ok());
    }

    #[tokio::test]
    async fn test_unparsable_file_is_dropped_from_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Car.Table.al");
        std::fs::write(&path, "table 50100 Car\n{\n}\n").unwrap();

        let workspace = Workspace::new(dir.path(), Settings::default());
        workspace.rebuild().await.unwrap();
        let path = workspace.root().join("Car.Table.al");
        assert!(workspace.snapshot().await.contains(&path));

        std::fs::write(&path, "// nothing here\n").unwrap();
        workspace.refresh(vec![path.clone()], true).await.unwrap();
        assert!(!workspace.snapshot().await.contains(&path));
    }
}
