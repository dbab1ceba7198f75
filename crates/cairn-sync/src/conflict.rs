use cairn_core::{CairnError, CairnResult};
use cairn_fs::{WorkspacePaths, relative_note_path};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const CONFLICT_MARKER: &str = ".conflict-";
const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const STAMP_LEN: usize = 15;
const MAX_SUFFIX: u32 = 1000;

/// A conflict copy found in the workspace, with the note it shadows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictArtifact {
    pub artifact: String,
    pub original: String,
    pub created_at: Option<String>,
}

/// `notes/a.md` + `20261019-120000` -> `notes/a.conflict-20261019-120000.md`
pub fn conflict_artifact_path(original: &Path, stamp: &str) -> PathBuf {
    let stem = original
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match original.extension() {
        Some(ext) => format!("{stem}{CONFLICT_MARKER}{stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}{CONFLICT_MARKER}{stamp}"),
    };
    original.with_file_name(name)
}

/// Copies the local file next to itself under a timestamped name. Never overwrites an
/// existing file; a second conflict within the same second gets a `-2`, `-3`, ... suffix.
pub fn write_conflict_artifact(original: &Path) -> CairnResult<PathBuf> {
    let bytes = fs::read(original).map_err(|err| {
        CairnError::io(format!(
            "failed to read '{}' for conflict copy: {}",
            original.display(),
            err
        ))
    })?;

    let stamp = Local::now().format(STAMP_FORMAT).to_string();
    for attempt in 1..=MAX_SUFFIX {
        let stamp = if attempt == 1 {
            stamp.clone()
        } else {
            format!("{stamp}-{attempt}")
        };
        let candidate = conflict_artifact_path(original, &stamp);

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => file,
            Err(err) if err.kind() == IoErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(CairnError::io(format!(
                    "failed to create conflict copy '{}': {}",
                    candidate.display(),
                    err
                )));
            }
        };

        file.write_all(&bytes)
            .and_then(|_| file.sync_all())
            .map_err(|err| {
                CairnError::io(format!(
                    "failed to write conflict copy '{}': {}",
                    candidate.display(),
                    err
                ))
            })?;

        return Ok(candidate);
    }

    Err(CairnError::io(format!(
        "too many conflict copies of '{}' within one second",
        original.display()
    )))
}

pub fn is_conflict_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(parse_artifact_name)
        .is_some()
}

/// Every conflict copy under the workspace root, sorted by path.
pub fn list_conflict_artifacts(paths: &WorkspacePaths) -> CairnResult<Vec<ConflictArtifact>> {
    let mut artifacts = Vec::new();

    let walker = WalkDir::new(&paths.root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    for entry in walker {
        let entry = entry.map_err(|err| {
            CairnError::io(format!(
                "failed to scan workspace '{}': {}",
                paths.root.display(),
                err
            ))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let Some((original_name, stamp)) = parse_artifact_name(name) else {
            continue;
        };

        let artifact = relative_note_path(paths, entry.path())?;
        let original = relative_note_path(paths, &entry.path().with_file_name(original_name))?;
        let created_at = NaiveDateTime::parse_from_str(&stamp, STAMP_FORMAT)
            .ok()
            .map(|stamp| stamp.format("%Y-%m-%d %H:%M:%S").to_string());

        artifacts.push(ConflictArtifact {
            artifact,
            original,
            created_at,
        });
    }

    Ok(artifacts)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|name| name.starts_with('.'))
}

// Returns the shadowed file name and the raw stamp.
fn parse_artifact_name(name: &str) -> Option<(String, String)> {
    let idx = name.rfind(CONFLICT_MARKER)?;
    let prefix = &name[..idx];
    let rest = &name[idx + CONFLICT_MARKER.len()..];

    let stamp = rest.get(..STAMP_LEN)?;
    if !is_stamp(stamp) {
        return None;
    }

    let mut tail = &rest[STAMP_LEN..];
    if let Some(suffixed) = tail.strip_prefix('-') {
        let digits = suffixed.chars().take_while(char::is_ascii_digit).count();
        if digits == 0 {
            return None;
        }
        tail = &suffixed[digits..];
    }

    if !(tail.is_empty() || tail.starts_with('.')) || prefix.is_empty() {
        return None;
    }

    Some((format!("{prefix}{tail}"), stamp.to_string()))
}

fn is_stamp(value: &str) -> bool {
    value.char_indices().all(|(idx, ch)| {
        if idx == 8 {
            ch == '-'
        } else {
            ch.is_ascii_digit()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_keeps_directory_and_extension() {
        let path = conflict_artifact_path(
            Path::new("/w/50-events/50.01-local-events.md"),
            "20261019-120000",
        );
        assert_eq!(
            path,
            PathBuf::from("/w/50-events/50.01-local-events.conflict-20261019-120000.md")
        );
    }

    #[test]
    fn artifact_names_are_recognised_with_and_without_suffix() {
        assert_eq!(
            parse_artifact_name("a.conflict-20261019-120000.md"),
            Some(("a.md".to_string(), "20261019-120000".to_string()))
        );
        assert_eq!(
            parse_artifact_name("50.01-x.conflict-20261019-120000-3.md"),
            Some(("50.01-x.md".to_string(), "20261019-120000".to_string()))
        );
        assert_eq!(parse_artifact_name("a.md"), None);
        assert_eq!(parse_artifact_name("a.conflict-notastamp.md"), None);
        assert_eq!(parse_artifact_name("a.conflict-20261019-120000x.md"), None);
    }

    #[test]
    fn repeated_conflicts_never_overwrite_earlier_copies() {
        let temp = tempfile::tempdir().expect("tempdir");
        let original = temp.path().join("note.md");
        fs::write(&original, "first").expect("write original");

        let first = write_conflict_artifact(&original).expect("first copy");
        fs::write(&original, "second").expect("rewrite original");
        let second = write_conflict_artifact(&original).expect("second copy");

        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(&first).expect("read first"), "first");
        assert_eq!(fs::read_to_string(&second).expect("read second"), "second");
        assert!(is_conflict_artifact(&first));
        assert!(is_conflict_artifact(&second));
    }
}
