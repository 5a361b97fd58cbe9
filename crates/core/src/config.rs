//! Project settings.
//!
//! Read from the editor settings file (`.vscode/settings.json`) and the app
//! manifest (`app.json`) under the project root. Both are optional; a file
//! that cannot be parsed is logged and ignored.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const PREFIX_KEY: &str = "CRS.ObjectNamePrefix";
pub const PREFIX_FALLBACK_KEY: &str = "alVarHelper.ignoreALPrefix";
pub const OLD_NAMING_KEY: &str = "ALTB.UseOldFileNamingConventions";
pub const DISABLE_ENTITY_WARNINGS_KEY: &str = "ALTB.DisableAPIEntityWarnings";

pub const DEFAULT_SEPARATORS: [char; 4] = [' ', '_', '-', '.'];

/// Inclusive object id range from `app.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    pub from: u32,
    pub to: u32,
}

impl IdRange {
    pub fn new(from: u32, to: u32) -> Self {
        Self { from, to }
    }

    pub fn len(&self) -> usize {
        if self.to < self.from {
            0
        } else {
            (self.to - self.from) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: u32) -> bool {
        (self.from..=self.to).contains(&id)
    }
}

impl std::str::FromStr for IdRange {
    type Err = CoreError;

    /// `50100..50149` or `50100-50149`.
    fn from_str(s: &str) -> Result<Self> {
        let (from, to) = s
            .split_once("..")
            .or_else(|| s.split_once('-'))
            .ok_or_else(|| CoreError::Plan(format!("invalid id range '{s}'")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| CoreError::Plan(format!("invalid id range '{s}': {e}")))
        };
        let range = IdRange::new(parse(from)?, parse(to)?);
        if range.is_empty() {
            return Err(CoreError::Plan(format!("id range '{s}' is empty")));
        }
        Ok(range)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub object_prefix: Option<String>,
    pub use_old_file_naming: bool,
    pub disable_api_entity_warnings: bool,
    pub prefix_separators: Vec<char>,
    pub rename_fields: bool,
    pub id_ranges: Vec<IdRange>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            object_prefix: None,
            use_old_file_naming: false,
            disable_api_entity_warnings: false,
            prefix_separators: DEFAULT_SEPARATORS.to_vec(),
            rename_fields: true,
            id_ranges: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AppManifest {
    #[serde(default, rename = "idRanges")]
    id_ranges: Vec<IdRange>,
    #[serde(default, rename = "idRange")]
    id_range: Option<IdRange>,
}

impl Settings {
    pub fn settings_path(root: &Path) -> PathBuf {
        root.join(".vscode").join("settings.json")
    }

    pub fn manifest_path(root: &Path) -> PathBuf {
        root.join("app.json")
    }

    pub fn load(root: &Path) -> Result<Self> {
        let mut settings = Settings::default();

        if let Some(editor) = read_json_object(&Self::settings_path(root))? {
            settings.object_prefix = string_setting(&editor, PREFIX_KEY)
                .or_else(|| string_setting(&editor, PREFIX_FALLBACK_KEY));
            settings.use_old_file_naming = bool_setting(&editor, OLD_NAMING_KEY);
            settings.disable_api_entity_warnings =
                bool_setting(&editor, DISABLE_ENTITY_WARNINGS_KEY);
        }

        let manifest_path = Self::manifest_path(root);
        if let Some(manifest) = read_json_object(&manifest_path)? {
            match serde_json::from_value::<AppManifest>(Value::Object(manifest)) {
                Ok(app) => {
                    settings.id_ranges = app.id_ranges;
                    if settings.id_ranges.is_empty() {
                        settings.id_ranges.extend(app.id_range);
                    }
                }
                Err(e) => tracing::warn!(
                    "Ignoring id ranges in {}: {}",
                    manifest_path.display(),
                    e
                ),
            }
        }

        if let Ok(prefix) = std::env::var("ALSCOPE_OBJECT_PREFIX") {
            if !prefix.trim().is_empty() {
                settings.object_prefix = Some(prefix);
            }
        }

        Ok(settings)
    }

    /// Store `prefix` in the editor settings file. The file is edited in
    /// place, so other keys, comments and formatting survive.
    pub fn write_prefix(root: &Path, prefix: &str) -> Result<()> {
        let path = Self::settings_path(root);
        let value = Value::String(prefix.to_string()).to_string();

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, format!("{{\n    \"{PREFIX_KEY}\": {value}\n}}\n"))?;
                tracing::info!("Created {} with {}", path.display(), PREFIX_KEY);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let not_an_object =
            || CoreError::Plan(format!("{} is not a JSON object", path.display()));
        let existing = read_json_object(&path)?.ok_or_else(not_an_object)?;
        let layout = locate_member(&text, PREFIX_KEY);
        let root_open = layout.root_open.ok_or_else(not_an_object)?;

        let updated = match layout.value {
            Some((start, end)) if end > start => {
                format!("{}{value}{}", &text[..start], &text[end..])
            }
            Some(_) => {
                return Err(CoreError::Plan(format!(
                    "{PREFIX_KEY} in {} does not hold a plain value",
                    path.display()
                )));
            }
            None if existing.is_empty() => format!(
                "{}\n    \"{PREFIX_KEY}\": {value}\n{}",
                &text[..root_open],
                text[root_open..].trim_start()
            ),
            None => {
                let bytes = text.as_bytes();
                let first = skip_trivia(bytes, root_open);
                let line = line_indent(&text, first);
                format!(
                    "{}\n{line}\"{PREFIX_KEY}\": {value},{}",
                    &text[..root_open],
                    &text[root_open..]
                )
            }
        };

        std::fs::write(&path, updated)?;
        tracing::info!("Updated {} in {}", PREFIX_KEY, path.display());
        Ok(())
    }
}

/// Where a top-level member sits in a JSONC document: the offset just past
/// the root object's `{`, and the byte range of the member's value.
#[derive(Debug, Default, PartialEq, Eq)]
struct MemberLayout {
    root_open: Option<usize>,
    value: Option<(usize, usize)>,
}

fn locate_member(text: &str, key: &str) -> MemberLayout {
    let b = text.as_bytes();
    let mut layout = MemberLayout::default();
    let mut depth = 0usize;
    let mut expect_key = false;
    let mut matched = false;
    let mut i = 0;

    while i < b.len() {
        i = skip_trivia(b, i);
        let Some(&c) = b.get(i) else {
            break;
        };
        match c {
            b'"' => {
                let end = string_end(b, i);
                if depth == 1 && expect_key {
                    matched = text.get(i + 1..end - 1) == Some(key);
                    expect_key = false;
                }
                i = end;
                continue;
            }
            b'{' | b'[' => {
                depth += 1;
                if depth == 1 && c == b'{' && layout.root_open.is_none() {
                    layout.root_open = Some(i + 1);
                    expect_key = true;
                }
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            b',' if depth == 1 => expect_key = true,
            b':' if depth == 1 && matched => {
                let start = skip_trivia(b, i + 1);
                let end = match b.get(start) {
                    Some(b'"') => string_end(b, start),
                    Some(_) => b[start..]
                        .iter()
                        .position(|c| {
                            !(c.is_ascii_alphanumeric() || matches!(c, b'.' | b'+' | b'-'))
                        })
                        .map_or(b.len(), |n| start + n),
                    None => start,
                };
                layout.value = Some((start, end));
                return layout;
            }
            _ => {}
        }
        i += 1;
    }
    layout
}

/// Skip whitespace and comments starting at `i`.
fn skip_trivia(b: &[u8], mut i: usize) -> usize {
    loop {
        while i < b.len() && b[i].is_ascii_whitespace() {
            i += 1;
        }
        if b[i..].starts_with(b"//") {
            while i < b.len() && b[i] != b'\n' {
                i += 1;
            }
        } else if b[i..].starts_with(b"/*") {
            i = b[i + 2..]
                .windows(2)
                .position(|w| w == b"*/")
                .map_or(b.len(), |p| i + 2 + p + 2);
        } else {
            return i;
        }
    }
}

/// Offset just past the string literal opening at `i`.
fn string_end(b: &[u8], mut i: usize) -> usize {
    i += 1;
    while i < b.len() {
        match b[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    b.len()
}

/// Leading whitespace of the line holding `offset`.
fn line_indent(text: &str, offset: usize) -> &str {
    let start = text[..offset].rfind('\n').map_or(0, |n| n + 1);
    let line = &text[start..];
    &line[..line.len() - line.trim_start_matches([' ', '\t']).len()]
}

fn read_json_object(path: &Path) -> Result<Option<Map<String, Value>>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_str::<Value>(&strip_jsonc(&text)) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(_) => {
            tracing::warn!("{} is not a JSON object, ignoring it", path.display());
            Ok(None)
        }
        Err(e) => {
            tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
            Ok(None)
        }
    }
}

fn string_setting(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn bool_setting(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Editor settings files allow comments and trailing commas.
fn strip_jsonc(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let mut in_str = false;

    while i < bytes.len() {
        let b = bytes[i];
        if in_str {
            out.push(b);
            if b == b'\\' && i + 1 < bytes.len() {
                out.push(bytes[i + 1]);
                i += 1;
            } else if b == b'"' {
                in_str = false;
            }
            i += 1;
            continue;
        }
        match (b, bytes.get(i + 1)) {
            (b'"', _) => {
                in_str = true;
                out.push(b);
            }
            (b'/', Some(b'/')) => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            (b'/', Some(b'*')) => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 2;
                continue;
            }
            (b',', _) => {
                let rest = &bytes[i + 1..];
                let next = rest.iter().position(|c| !c.is_ascii_whitespace());
                if !matches!(next.map(|n| rest[n]), Some(b'}') | Some(b']')) {
                    out.push(b);
                }
            }
            _ => out.push(b),
        }
        i += 1;
    }

    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert_eq!(settings.prefix_separators, DEFAULT_SEPARATORS.to_vec());
        assert!(settings.id_ranges.is_empty());
        assert!(!settings.use_old_file_naming);
    }

    #[test]
    fn test_load_reads_editor_settings_and_manifest() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".vscode")).unwrap();
        std::fs::write(
            dir.path().join(".vscode/settings.json"),
            r#"{
    // team prefix
    "alVarHelper.ignoreALPrefix": "ABC",
    "ALTB.UseOldFileNamingConventions": true,
    "ALTB.DisableAPIEntityWarnings": true,
}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("app.json"),
            r#"{ "name": "x", "idRanges": [ { "from": 50100, "to": 50149 } ] }"#,
        )
        .unwrap();

        let settings = Settings::load(dir.path()).unwrap();
        assert_eq!(settings.object_prefix.as_deref(), Some("ABC"));
        assert!(settings.use_old_file_naming);
        assert!(settings.disable_api_entity_warnings);
        assert_eq!(settings.id_ranges, vec![IdRange::new(50100, 50149)]);
    }

    #[test]
    fn test_write_prefix_keeps_other_keys() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".vscode")).unwrap();
        let path = dir.path().join(".vscode/settings.json");
        std::fs::write(&path, r#"{ "editor.tabSize": 4, "CRS.ObjectNamePrefix": "ABC" }"#).unwrap();

        Settings::write_prefix(dir.path(), "XYZ").unwrap();

        let value: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["CRS.ObjectNamePrefix"], "XYZ");
        assert_eq!(value["editor.tabSize"], 4);
    }

    #[test]
    fn test_write_prefix_keeps_comments_and_layout() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".vscode")).unwrap();
        let path = dir.path().join(".vscode/settings.json");
        let original = "{\n    // object naming\n    \"CRS.ObjectNamePrefix\": \"ABC\",\n    /* editor */\n    \"editor.tabSize\": 4,\n}\n";
        std::fs::write(&path, original).unwrap();

        Settings::write_prefix(dir.path(), "XYZ").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            original.replace("\"ABC\"", "\"XYZ\"")
        );
        assert_eq!(
            Settings::load(dir.path()).unwrap().object_prefix.as_deref(),
            Some("XYZ")
        );
    }

    #[test]
    fn test_write_prefix_adds_missing_key() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".vscode")).unwrap();
        let path = dir.path().join(".vscode/settings.json");
        std::fs::write(&path, "{\n  // keep\n  \"editor.tabSize\": 2\n}\n").unwrap();

        Settings::write_prefix(dir.path(), "XYZ").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n  \"CRS.ObjectNamePrefix\": \"XYZ\",\n"));
        assert!(text.contains("// keep"));
        let value: Value = serde_json::from_str(&strip_jsonc(&text)).unwrap();
        assert_eq!(value["editor.tabSize"], 2);

        let fresh = tempdir().unwrap();
        Settings::write_prefix(fresh.path(), "QQ").unwrap();
        assert_eq!(
            Settings::load(fresh.path()).unwrap().object_prefix.as_deref(),
            Some("QQ")
        );
    }

    #[test]
    fn test_write_prefix_refuses_unparsable_file() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".vscode")).unwrap();
        let path = dir.path().join(".vscode/settings.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            Settings::write_prefix(dir.path(), "XYZ"),
            Err(CoreError::Plan(_))
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");
    }

    #[test]
    fn test_id_range_from_str() {
        assert_eq!("50100..50149".parse::<IdRange>().unwrap(), IdRange::new(50100, 50149));
        assert_eq!("50100-50101".parse::<IdRange>().unwrap().len(), 2);
        assert!("50149..50100".parse::<IdRange>().is_err());
        assert!("abc".parse::<IdRange>().is_err());
    }

    #[test]
    fn test_strip_jsonc_keeps_strings() {
        let text = r#"{ "a": "http://x", /* c */ "b": [1, 2,], }"#;
        let value: Value = serde_json::from_str(&strip_jsonc(text)).unwrap();
        assert_eq!(value["a"], "http://x");
        assert_eq!(value["b"][1], 2);
    }
}
