//! Finds the data file holding a character's telemetry.
//!
//! Each candidate root is searched in order, and within a root:
//!
//! 1. **Exact file**: `<character>_data.json`
//! 2. **Case-insensitive file**: same name, any casing
//! 3. **Shared file**: any `*.json` whose first 1 KB mentions the name
//!    (case-insensitive), confirmed by parsing and finding the character key
//!
//! If nothing matches, the default "not yet created" path under the first
//! root is returned so the reader can keep retrying.

use std::io::Read;
use std::path::{Path, PathBuf};

use serde_json::Value;
use walkdir::WalkDir;

use crate::repair::lenient_parse;

const PEEK_BYTES: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKind {
    ExactFile,
    CaseInsensitiveFile,
    SharedFile,
    /// Nothing found; the path is where the addon is expected to create the file.
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: PathBuf,
    pub kind: LocationKind,
    /// On-disk casing of the character key, when a shared file confirmed it.
    pub character_key: Option<String>,
}

impl Location {
    pub fn is_found(&self) -> bool {
        self.kind != LocationKind::Default
    }
}

pub fn data_file_name(character: &str) -> String {
    format!("{}_data.json", character)
}

/// Searches `roots` in order. Never fails; see the module docs for the fallback.
pub fn locate_data_file(character: &str, roots: &[PathBuf]) -> Location {
    for root in roots.iter().filter(|root| root.is_dir()) {
        if let Some(location) = locate_in_root(character, root) {
            tracing::info!(
                character = %character,
                path = %location.path.display(),
                kind = ?location.kind,
                "Located health data file"
            );
            return location;
        }
    }

    let path = roots
        .first()
        .map(|root| root.join(data_file_name(character)))
        .unwrap_or_else(|| PathBuf::from(data_file_name(character)));
    tracing::warn!(
        character = %character,
        path = %path.display(),
        "No data file found; using default path"
    );
    Location {
        path,
        kind: LocationKind::Default,
        character_key: None,
    }
}

fn locate_in_root(character: &str, root: &Path) -> Option<Location> {
    let file_name = data_file_name(character);

    let exact = root.join(&file_name);
    if exact.is_file() {
        return Some(Location {
            path: exact,
            kind: LocationKind::ExactFile,
            character_key: None,
        });
    }

    let json_files = list_json_files(root);

    let wanted = file_name.to_lowercase();
    if let Some(path) = json_files.iter().find(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy().to_lowercase() == wanted)
            .unwrap_or(false)
    }) {
        return Some(Location {
            path: path.clone(),
            kind: LocationKind::CaseInsensitiveFile,
            character_key: None,
        });
    }

    let needle = character.to_lowercase();
    json_files
        .into_iter()
        .filter(|path| peek_mentions(path, &needle))
        .find_map(|path| {
            let key = confirm_character_key(&path, character)?;
            Some(Location {
                path,
                kind: LocationKind::SharedFile,
                character_key: Some(key),
            })
        })
}

/// `*.json` files directly inside `root`, sorted by name.
pub fn list_json_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false)
        })
        .collect()
}

fn peek_mentions(path: &Path, needle_lower: &str) -> bool {
    let mut buf = Vec::new();
    let peeked = fs_err::File::open(path)
        .and_then(|file| file.take(PEEK_BYTES).read_to_end(&mut buf));
    match peeked {
        Ok(_) => String::from_utf8_lossy(&buf)
            .to_lowercase()
            .contains(needle_lower),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Error examining data file");
            false
        }
    }
}

fn confirm_character_key(path: &Path, character: &str) -> Option<String> {
    let bytes = match fs_err::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Error checking shared file");
            return None;
        }
    };
    let text = String::from_utf8_lossy(&bytes);
    match lenient_parse(&text) {
        Ok(parsed) => resolve_character_key(&parsed.value, character),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Error checking shared file");
            None
        }
    }
}

/// Finds the character's key in a parsed document: exact, else case-insensitive.
pub fn resolve_character_key(document: &Value, character: &str) -> Option<String> {
    let object = document.as_object()?;
    if object.contains_key(character) {
        return Some(character.to_string());
    }
    let wanted = character.to_lowercase();
    object
        .keys()
        .find(|key| key.to_lowercase() == wanted)
        .cloned()
}
