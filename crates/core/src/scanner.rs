use ignore::WalkBuilder;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use xxhash_rust::xxh3::Xxh3;

const SKIPPED_DIRS: &[&str] = &[
    ".alpackages",
    ".snapshots",
    ".git",
    ".vscode",
    "target",
    "node_modules",
];

/// Whether `path` is an AL source file outside package and tool folders.
pub fn is_relevant_path(path: &Path) -> bool {
    let is_al = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("al"));
    if !is_al {
        return false;
    }
    !path
        .components()
        .any(|c| SKIPPED_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()))
}

/// What the workspace remembers about a scanned file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFile {
    pub content_hash: u64,
    pub last_modified: u64,
    pub len: u64,
}

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub source: SourceFile,
    pub text: String,
}

pub enum ScanOutcome {
    /// New or changed content.
    Changed(ScannedFile),
    /// Same content as last time.
    Unchanged,
    /// The file no longer exists or cannot be read.
    Gone,
}

pub struct Scanner;

impl Scanner {
    pub fn collect_paths(root: &Path) -> Vec<PathBuf> {
        WalkBuilder::new(root)
            .build()
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let path = entry.path();
                if path.is_file() && is_relevant_path(path) {
                    return Some(path.to_path_buf());
                }
                None
            })
            .collect()
    }

    /// Read `paths` in parallel, skipping files whose content did not change.
    pub fn scan(
        paths: Vec<PathBuf>,
        existing: &HashMap<PathBuf, SourceFile>,
    ) -> Vec<(PathBuf, ScanOutcome)> {
        paths
            .into_par_iter()
            .map(|path| {
                let outcome = Self::scan_path(&path, existing.get(&path));
                (path, outcome)
            })
            .collect()
    }

    fn scan_path(path: &Path, previous: Option<&SourceFile>) -> ScanOutcome {
        let Ok(metadata) = fs::metadata(path) else {
            return ScanOutcome::Gone;
        };
        let modified = metadata
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH)
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(std::time::Duration::ZERO)
            .as_millis() as u64;

        let len = metadata.len();
        if previous.is_some_and(|p| p.last_modified == modified && p.len == len) {
            return ScanOutcome::Unchanged;
        }

        let Ok(bytes) = fs::read(path) else {
            return ScanOutcome::Gone;
        };
        let content_hash = hash(&bytes);
        // mtime moved but the content is the same
        if previous.is_some_and(|p| p.content_hash == content_hash) {
            return ScanOutcome::Unchanged;
        }

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        ScanOutcome::Changed(ScannedFile {
            path: path.to_path_buf(),
            source: SourceFile {
                content_hash,
                last_modified: modified,
                len,
            },
            text,
        })
    }
}

pub fn hash(bytes: &[u8]) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.write(bytes);
    hasher.finish()
}
