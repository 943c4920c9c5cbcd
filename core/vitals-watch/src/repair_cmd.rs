//! `repair`: fix malformed data files in place, keeping a `.backup` of the original.

use std::path::{Path, PathBuf};

use vitals_core::reader::list_json_files;
use vitals_core::{repair_with_steps, RepairStep};

const BACKUP_SUFFIX: &str = "backup";

#[derive(Debug)]
pub enum RepairReport {
    AlreadyValid,
    Repaired {
        backup: PathBuf,
        steps: Vec<RepairStep>,
    },
    /// Repair made no difference.
    Unchanged { error: String },
    /// Repair changed the text but it still does not parse.
    Failed { error: String },
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Checks one file; if it only parses after repair, backs it up and rewrites it.
pub fn repair_file(path: &Path) -> Result<RepairReport, String> {
    let bytes = fs_err::read(path).map_err(|e| e.to_string())?;
    let content = String::from_utf8_lossy(&bytes);

    let original_err = match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(_) => return Ok(RepairReport::AlreadyValid),
        Err(err) => err,
    };
    tracing::warn!(
        path = %path.display(),
        error = %original_err,
        "JSON is invalid; attempting repair"
    );

    let outcome = repair_with_steps(&content);
    if !outcome.changed() {
        return Ok(RepairReport::Unchanged {
            error: original_err.to_string(),
        });
    }
    if let Err(err) = serde_json::from_str::<serde_json::Value>(&outcome.text) {
        return Ok(RepairReport::Failed {
            error: err.to_string(),
        });
    }

    let backup = backup_path(path);
    fs_err::write(&backup, content.as_bytes()).map_err(|e| e.to_string())?;
    fs_err::write(path, outcome.text.as_bytes()).map_err(|e| e.to_string())?;
    tracing::info!(
        path = %path.display(),
        backup = %backup.display(),
        steps = ?outcome.steps,
        "Wrote repaired JSON"
    );

    Ok(RepairReport::Repaired {
        backup,
        steps: outcome.steps,
    })
}

/// `*.json` files directly inside each root, sorted per root.
pub fn discover_files(roots: &[PathBuf]) -> Vec<PathBuf> {
    roots
        .iter()
        .filter(|root| root.is_dir())
        .flat_map(|root| list_json_files(root))
        .collect()
}

/// Returns the number of files that are still invalid.
pub fn run(files: &[PathBuf]) -> usize {
    if files.is_empty() {
        println!("No JSON files found");
        return 0;
    }

    let mut failures = 0;
    for path in files {
        println!("Testing JSON file: {}", path.display());
        match repair_file(path) {
            Ok(RepairReport::AlreadyValid) => println!("  ✓ JSON is valid"),
            Ok(RepairReport::Repaired { backup, steps }) => {
                println!("  ✓ Repaired ({:?})", steps);
                println!("    original backed up to {}", backup.display());
            }
            Ok(RepairReport::Unchanged { error }) => {
                failures += 1;
                println!("  ✗ {} (repair made no changes)", error);
            }
            Ok(RepairReport::Failed { error }) => {
                failures += 1;
                println!("  ✗ Repair failed: {}", error);
            }
            Err(error) => {
                failures += 1;
                println!("  ✗ Error reading file: {}", error);
            }
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn valid_file_is_left_alone() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("ok.json");
        fs_err::write(&path, r#"{"a": 1}"#).unwrap();

        assert!(matches!(repair_file(&path), Ok(RepairReport::AlreadyValid)));
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn repairable_file_is_rewritten_with_backup() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("Wondolio_data.json");
        let broken = "{Wondolio: {vitals: {hp: 10,},},}";
        fs_err::write(&path, broken).unwrap();

        let report = repair_file(&path).unwrap();
        let RepairReport::Repaired { backup, steps } = report else {
            panic!("expected repair");
        };
        assert_eq!(backup, temp.path().join("Wondolio_data.json.backup"));
        assert!(steps.contains(&RepairStep::QuotedKeys));
        assert_eq!(fs_err::read_to_string(&backup).unwrap(), broken);

        let repaired: serde_json::Value =
            serde_json::from_str(&fs_err::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(repaired["Wondolio"]["vitals"]["hp"], 10);
    }

    #[test]
    fn unrepairable_file_is_untouched() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("broken.json");
        fs_err::write(&path, "{\"a\": [").unwrap();

        assert!(matches!(
            repair_file(&path),
            Ok(RepairReport::Unchanged { .. })
        ));
        assert_eq!(fs_err::read_to_string(&path).unwrap(), "{\"a\": [");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn discovers_json_files_per_root() {
        let temp = tempdir().unwrap();
        fs_err::write(temp.path().join("b.json"), "{}").unwrap();
        fs_err::write(temp.path().join("a.json"), "{}").unwrap();
        fs_err::write(temp.path().join("c.txt"), "{}").unwrap();

        let files = discover_files(&[temp.path().to_path_buf(), temp.path().join("missing")]);
        assert_eq!(
            files,
            vec![temp.path().join("a.json"), temp.path().join("b.json")]
        );
    }
}
