//! `watch`: log one line per real change to a `*.json` file in the data roots.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, SystemTime};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use vitals_core::reader::{list_json_files, resolve_character_key};
use vitals_core::{lenient_i64, lenient_parse};

/// One line summarizing a changed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileReport {
    /// Tracked characters found, with a vitals line for each.
    Tracked {
        file: String,
        vitals: Vec<String>,
        characters: Vec<String>,
    },
    /// No tracked character present; lists every key instead.
    Untracked { file: String, keys: Vec<String> },
    Invalid { file: String, error: String },
}

/// Remembers the last mtime and content per file so repeated events are dropped.
#[derive(Debug, Default)]
pub struct FileTracker {
    characters: Vec<String>,
    last_modified: HashMap<PathBuf, SystemTime>,
    last_content: HashMap<PathBuf, String>,
}

impl FileTracker {
    pub fn new(characters: Vec<String>) -> Self {
        Self {
            characters,
            ..Self::default()
        }
    }

    /// Returns a report when the file changed since the last observation.
    pub fn observe(&mut self, path: &Path) -> Option<FileReport> {
        if !is_json(path) {
            return None;
        }
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let modified = fs_err::metadata(path).and_then(|meta| meta.modified()).ok()?;
        if self.last_modified.get(path) == Some(&modified) {
            return None;
        }
        self.last_modified.insert(path.to_path_buf(), modified);

        let bytes = match fs_err::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                return Some(FileReport::Invalid {
                    file,
                    error: err.to_string(),
                })
            }
        };
        let content = String::from_utf8_lossy(&bytes).into_owned();

        let document = match lenient_parse(&content) {
            Ok(parsed) => parsed.value,
            Err(err) => {
                return Some(FileReport::Invalid {
                    file,
                    error: err.to_string(),
                })
            }
        };

        if self.last_content.get(path) == Some(&content) {
            tracing::info!(file = %file, "File was modified but content didn't change");
            return None;
        }
        self.last_content.insert(path.to_path_buf(), content);

        Some(self.summarize(file, &document))
    }

    fn summarize(&self, file: String, document: &Value) -> FileReport {
        let mut characters = Vec::new();
        let mut vitals = Vec::new();
        for name in &self.characters {
            let Some(key) = resolve_character_key(document, name) else {
                continue;
            };
            if let Some(line) = document[&key].get("vitals").map(|v| vitals_line(&key, v)) {
                vitals.push(line);
            }
            characters.push(key);
        }

        if characters.is_empty() {
            let keys = document
                .as_object()
                .map(|object| object.keys().cloned().collect())
                .unwrap_or_default();
            FileReport::Untracked { file, keys }
        } else {
            FileReport::Tracked {
                file,
                vitals,
                characters,
            }
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// `Name: HP=850/1000, MP=120/300, TP=1500`, with `??` for missing parts.
pub fn vitals_line(name: &str, vitals: &Value) -> String {
    let field = |key: &str| {
        vitals
            .get(key)
            .and_then(lenient_i64)
            .map_or_else(|| "??".to_string(), |v| v.to_string())
    };
    let tp = vitals.get("tp").and_then(lenient_i64).unwrap_or(0);
    format!(
        "{}: HP={}/{}, MP={}/{}, TP={}",
        name,
        field("hp"),
        field("hp_max"),
        field("mp"),
        field("mp_max"),
        tp
    )
}

fn log_report(report: &FileReport) {
    match report {
        FileReport::Tracked {
            file,
            vitals,
            characters,
        } => {
            for line in vitals {
                tracing::info!("{}", line);
            }
            tracing::info!(
                file = %file,
                characters = %characters.join(", "),
                "File updated with tracked characters"
            );
        }
        FileReport::Untracked { file, keys } => {
            tracing::info!(file = %file, characters = ?keys, "File updated");
        }
        FileReport::Invalid { file, error } => {
            tracing::error!(file = %file, error = %error, "Error parsing JSON");
        }
    }
}

/// Watches `dirs` (non-recursive) until the watcher channel closes.
pub fn run(dirs: &[PathBuf], characters: Vec<String>) -> Result<(), String> {
    if dirs.is_empty() {
        return Err("No valid paths to monitor found".to_string());
    }

    let (tx, rx) = mpsc::channel();
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })
        .map_err(|e| format!("Failed to create watcher: {}", e))?;

    for dir in dirs {
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| format!("Failed to watch {}: {}", dir.display(), e))?;
        let json_files: Vec<String> = list_json_files(dir)
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().to_string())
            .collect();
        tracing::info!(
            dir = %dir.display(),
            count = json_files.len(),
            files = %json_files.join(", "),
            "Watching directory"
        );
    }

    let mut tracker = FileTracker::new(characters);
    loop {
        match rx.recv_timeout(Duration::from_secs(60)) {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    continue;
                }
                for path in &event.paths {
                    if let Some(report) = tracker.observe(path) {
                        log_report(&report);
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}
