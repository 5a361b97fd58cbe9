//! Bulk rewrite engine.
//!
//! Every operation runs in the same phases:
//!
//! 1. **Planning** reads and re-parses the affected documents and turns the
//!    request into per-file edit batches. Nothing is written.
//! 2. **Validating** drops any planned item whose edits collide with an
//!    earlier item in the same file and reports it as a fault.
//! 3. **Applying** hands each file's surviving edits to the
//!    [`DocumentStore`] as one batch. A failed batch faults every item it
//!    carried; other files are unaffected.
//!
//! Callers re-scan the changed files afterwards so the index follows.

pub mod copy_fields;
pub mod edit;
pub mod prefix;
pub mod renumber;
pub mod store;
pub mod wrap;

use crate::error::Result;
use crate::index::ProjectIndex;
use crate::parser::parse_object;
use alscope_api::models::{
    Fault, ItemChange, Location, ObjectInfo, ObjectType, RewriteOperation, RewriteResult,
};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::Instrument;

pub use copy_fields::Target;
pub use edit::{TextEdit, apply_edits};
pub use prefix::PrefixChange;
pub use renumber::RenumberPolicy;
pub use store::{DocumentStore, FsDocumentStore, MemoryDocumentStore};
pub use wrap::WrapMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewritePhase {
    Planning,
    Validating,
    Applying,
    Completed,
}

impl fmt::Display for RewritePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RewritePhase::Planning => "planning",
            RewritePhase::Validating => "validating",
            RewritePhase::Applying => "applying",
            RewritePhase::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// A document read from the store and parsed against its current text.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub text: String,
    pub info: ObjectInfo,
}

impl Document {
    pub fn location(&self, offset: usize) -> Location {
        Location::at_offset(&self.path, &self.text, offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Object,
    Field,
    Reference,
    Region,
}

/// One unit of change: its edits land together or not at all.
#[derive(Debug, Clone)]
pub struct PlannedItem {
    pub kind: ItemKind,
    pub description: String,
    pub change: Option<ItemChange>,
    pub location: Location,
    pub edits: Vec<TextEdit>,
}

#[derive(Debug, Clone, Default)]
pub struct FilePlan {
    pub items: Vec<PlannedItem>,
}

#[derive(Debug, Clone)]
pub struct RewritePlan {
    pub operation: RewriteOperation,
    pub files: IndexMap<PathBuf, FilePlan>,
    pub faults: Vec<Fault>,
}

impl RewritePlan {
    pub fn new(operation: RewriteOperation) -> Self {
        Self {
            operation,
            files: IndexMap::new(),
            faults: Vec::new(),
        }
    }

    pub fn push(&mut self, path: &Path, item: PlannedItem) {
        self.files
            .entry(path.to_path_buf())
            .or_default()
            .items
            .push(item);
    }

    pub fn fault(&mut self, message: impl Into<String>, location: Option<Location>) {
        self.faults.push(Fault::new(message, location));
    }

    pub fn item_count(&self) -> usize {
        self.files.values().map(|f| f.items.len()).sum()
    }
}

pub struct RewriteEngine<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> RewriteEngine<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store
    }

    /// Assign new ids inside `policy`'s ranges to every numbered object.
    pub async fn renumber(
        &self,
        index: &ProjectIndex,
        policy: &RenumberPolicy,
    ) -> Result<RewriteResult> {
        policy.validate()?;
        let (docs, faults) = self.load_index(index).await;
        // Objects that failed to load keep their ids on disk.
        let loaded: HashSet<&Path> = docs.iter().map(|d| d.path.as_path()).collect();
        let reserved: HashSet<(ObjectType, u32)> = index
            .objects()
            .filter(|o| !loaded.contains(o.path.as_path()))
            .filter_map(|o| o.id.map(|id| (o.object_type, id)))
            .collect();
        let mut plan = renumber::plan(&docs, policy, &reserved)?;
        plan.faults.splice(0..0, faults);
        Ok(self.execute(plan).await)
    }

    /// Replace a leading name prefix on objects (and optionally fields),
    /// following references across the project.
    pub async fn change_prefix(
        &self,
        index: &ProjectIndex,
        change: &PrefixChange,
    ) -> Result<RewriteResult> {
        change.validate()?;
        let (docs, faults) = self.load_index(index).await;
        let mut plan = prefix::plan(&docs, change)?;
        plan.faults.splice(0..0, faults);
        Ok(self.execute(plan).await)
    }

    /// Copy the fields of the table extension at `source` into every target
    /// table extension that lacks them. Targets are labelled with the table
    /// they extend; a `None` path is a related table with no extension in the
    /// project.
    pub async fn copy_fields(
        &self,
        source: &Path,
        targets: &[(String, Option<PathBuf>)],
    ) -> Result<RewriteResult> {
        let source = self.load(source).await?;
        let mut seen: IndexSet<&Path> = IndexSet::new();
        let mut loaded = Vec::new();
        for (label, target) in targets {
            let Some(path) = target else {
                loaded.push(Target::Missing {
                    label: format!("\"{label}\""),
                    reason: "it has no tableextension in the project".into(),
                });
                continue;
            };
            if path.as_path() == source.path || !seen.insert(path.as_path()) {
                continue;
            }
            loaded.push(match self.load(path).await {
                Ok(doc) => Target::Loaded(doc),
                Err(e) => Target::Missing {
                    label: path.display().to_string(),
                    reason: e.to_string(),
                },
            });
        }
        let plan = copy_fields::plan(&source, &loaded)?;
        Ok(self.execute(plan).await)
    }

    /// Wrap procedures and triggers, report data items, or both in
    /// `#region` blocks.
    pub async fn wrap_regions(&self, paths: &[PathBuf], mode: WrapMode) -> Result<RewriteResult> {
        let mut plan = RewritePlan::new(RewriteOperation::WrapRegions);
        for path in paths.iter().collect::<IndexSet<_>>() {
            match self.load(path).await {
                Ok(doc) => wrap::plan_document(&mut plan, &doc, mode),
                Err(e) => plan.fault(
                    format!("Cannot read {}: {e}", path.display()),
                    Some(Location::new(path.as_path(), 1, 1)),
                ),
            }
        }
        Ok(self.execute(plan).await)
    }

    async fn load(&self, path: &Path) -> Result<Document> {
        let text = self.store.read(path).await?;
        let info = parse_object(path, &text)?;
        Ok(Document {
            path: path.to_path_buf(),
            text,
            info,
        })
    }

    /// Load every indexed document, turning unreadable ones into faults.
    async fn load_index(&self, index: &ProjectIndex) -> (Vec<Document>, Vec<Fault>) {
        let paths: Vec<PathBuf> = index.paths().cloned().collect();
        let mut docs = Vec::with_capacity(paths.len());
        let mut faults = Vec::new();
        for path in paths {
            match self.load(&path).await {
                Ok(doc) => docs.push(doc),
                Err(e) => faults.push(Fault::new(
                    format!("Skipped {}: {e}", path.display()),
                    Some(Location::new(path.as_path(), 1, 1)),
                )),
            }
        }
        (docs, faults)
    }

    /// Validate and apply a plan, producing the operation's result.
    pub async fn execute(&self, plan: RewritePlan) -> RewriteResult {
        let span = tracing::info_span!("rewrite", op = %plan.operation);
        self.run(plan).instrument(span).await
    }

    async fn run(&self, plan: RewritePlan) -> RewriteResult {
        tracing::debug!(
            "{}: {} item(s) over {} file(s)",
            RewritePhase::Planning,
            plan.item_count(),
            plan.files.len()
        );
        let mut result = RewriteResult::new(plan.operation);
        result.faults = plan.faults;

        tracing::debug!("{}", RewritePhase::Validating);
        let mut batches = Vec::with_capacity(plan.files.len());
        for (path, file) in plan.files {
            let (accepted, rejected) = validate(file.items);
            for item in rejected {
                result.faults.push(Fault::new(
                    format!("Conflicting edit for {}", item.description),
                    Some(item.location),
                ));
            }
            if !accepted.is_empty() {
                batches.push((path, accepted));
            }
        }

        tracing::debug!("{}: {} file(s)", RewritePhase::Applying, batches.len());
        let mut objects: IndexSet<(PathBuf, String)> = IndexSet::new();
        for (path, items) in batches {
            let mut edits: Vec<TextEdit> = Vec::new();
            for edit in items.iter().flat_map(|i| i.edits.iter()) {
                if !edits.contains(edit) {
                    edits.push(edit.clone());
                }
            }
            if edits.is_empty() {
                continue;
            }

            match self.store.apply(&path, &edits).await {
                Ok(_) => {
                    result.files_changed += 1;
                    result.changed_files.push(path.clone());
                    for item in items {
                        match item.kind {
                            ItemKind::Object => {
                                if objects.insert((path.clone(), item.description.clone())) {
                                    result.objects_changed += 1;
                                }
                                result.items_changed += 1;
                            }
                            ItemKind::Field => {
                                result.fields_changed += 1;
                                result.items_changed += 1;
                            }
                            ItemKind::Region => result.items_changed += 1,
                            ItemKind::Reference => {}
                        }
                        if let Some(change) = item.change {
                            result
                                .changes
                                .entry(change.object_type)
                                .or_default()
                                .push(change);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to update {}: {}", path.display(), e);
                    for item in items {
                        result.faults.push(Fault::new(
                            format!("Failed to update {}: {e}", item.description),
                            Some(item.location),
                        ));
                    }
                }
            }
        }

        tracing::info!(
            "{}: {} ({} fault(s))",
            RewritePhase::Completed,
            result.summary(),
            result.faults.len()
        );
        result
    }
}

/// Accept items in order, rejecting any whose edits collide with an item
/// already accepted. Identical edits from different items are merged.
fn validate(items: Vec<PlannedItem>) -> (Vec<PlannedItem>, Vec<PlannedItem>) {
    let mut accepted: Vec<PlannedItem> = Vec::new();
    let mut rejected = Vec::new();
    for item in items {
        let clash = item.edits.iter().any(|edit| {
            accepted
                .iter()
                .flat_map(|a| a.edits.iter())
                .any(|taken| taken != edit && taken.span.overlaps(&edit.span))
        });
        if clash {
            rejected.push(item);
        } else {
            accepted.push(item);
        }
    }
    (accepted, rejected)
}
