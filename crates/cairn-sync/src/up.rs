use crate::conflict::{is_conflict_artifact, write_conflict_artifact};
use crate::note::LocalNote;
use crate::{ItemError, SyncEngine};
use cairn_api::{NoteWrite, RemoteStore, UpsertOutcome};
use cairn_core::{CairnError, CairnResult};
use cairn_fs::{INBOX_DIR_NAME, WorkspaceConfig, relative_note_path};
use cairn_store::SyncState;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTargets {
    /// Every markdown file under the managed folders.
    All,
    /// Absolute paths picked by the caller.
    Files(Vec<PathBuf>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRecord {
    pub path: String,
    pub expected_version: i64,
    pub current_version: i64,
    pub artifact: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpReport {
    pub scanned: usize,
    pub created: usize,
    pub updated: usize,
    pub conflicts: usize,
    pub errors: usize,
    pub conflict_details: Vec<ConflictRecord>,
    pub failures: Vec<ItemError>,
    pub ignored: Vec<String>,
}

struct Candidate {
    absolute: PathBuf,
    relative: String,
}

impl<R: RemoteStore + ?Sized> SyncEngine<'_, R> {
    /// Pushes local notes with an optimistic version guard taken from the sync ledger.
    ///
    /// A rejected guard leaves the remote, the local file and the ledger untouched and
    /// writes a conflict copy beside the file.
    pub fn sync_up(
        &self,
        config: &WorkspaceConfig,
        state: &mut SyncState,
        targets: &SyncTargets,
        force: bool,
    ) -> CairnResult<UpReport> {
        let mut report = UpReport::default();
        let candidates = match targets {
            SyncTargets::All => self.scan_managed_folders(config)?,
            SyncTargets::Files(files) => self.filter_explicit(files, &mut report.ignored),
        };
        report.scanned = candidates.len();

        if candidates.is_empty() {
            info!("no markdown files to push");
            return Ok(report);
        }

        for candidate in &candidates {
            let expected_version = if force {
                None
            } else {
                state.version_of(&candidate.relative)
            };

            let outcome = LocalNote::read(&candidate.absolute, &candidate.relative).and_then(|note| {
                self.remote.upsert_note(&NoteWrite {
                    jd_id: note.jd_id(),
                    path: candidate.relative.clone(),
                    title: note.title(),
                    content: note.body,
                    expected_version,
                })
            });

            match outcome {
                Ok(UpsertOutcome::Created { version }) => {
                    info!(path = %candidate.relative, version, "created remote note");
                    report.created += 1;
                    state.record(candidate.relative.clone(), version);
                }
                Ok(UpsertOutcome::Updated { version }) => {
                    info!(path = %candidate.relative, version, "updated remote note");
                    report.updated += 1;
                    state.record(candidate.relative.clone(), version);
                }
                Ok(UpsertOutcome::Conflict {
                    current_version,
                    expected_version,
                }) => {
                    report.conflicts += 1;
                    let artifact = match write_conflict_artifact(&candidate.absolute) {
                        Ok(path) => Some(sibling_relative(&candidate.relative, &path)),
                        Err(err) => {
                            report.errors += 1;
                            report
                                .failures
                                .push(ItemError::new(candidate.relative.clone(), err.message));
                            None
                        }
                    };
                    warn!(
                        path = %candidate.relative,
                        expected_version,
                        current_version,
                        artifact = artifact.as_deref().unwrap_or("-"),
                        "remote changed since last sync"
                    );
                    report.conflict_details.push(ConflictRecord {
                        path: candidate.relative.clone(),
                        expected_version,
                        current_version,
                        artifact,
                    });
                }
                Err(err) => {
                    warn!(path = %candidate.relative, error = %err, "failed to push note");
                    report.errors += 1;
                    report
                        .failures
                        .push(ItemError::new(candidate.relative.clone(), err.message));
                }
            }
        }

        state.persist()?;
        Ok(report)
    }

    fn scan_managed_folders(&self, config: &WorkspaceConfig) -> CairnResult<Vec<Candidate>> {
        let mut files = Vec::new();

        for folder in &config.managed_folders {
            let dir = self.paths.root.join(folder);
            if !dir.is_dir() {
                debug!(folder = %folder, "managed folder missing; skipping");
                continue;
            }

            for entry in WalkDir::new(&dir) {
                let entry = entry.map_err(|err| {
                    CairnError::io(format!(
                        "failed to scan folder '{}': {}",
                        dir.display(),
                        err
                    ))
                })?;
                let path = entry.path();
                if entry.file_type().is_file() && is_markdown(path) && !is_conflict_artifact(path) {
                    files.push(path.to_path_buf());
                }
            }
        }

        files.sort();
        files.dedup();

        files
            .into_iter()
            .map(|absolute| {
                let relative = relative_note_path(self.paths, &absolute)?;
                Ok(Candidate { absolute, relative })
            })
            .collect()
    }

    fn filter_explicit(&self, files: &[PathBuf], ignored: &mut Vec<String>) -> Vec<Candidate> {
        let root = fs::canonicalize(&self.paths.root).unwrap_or_else(|_| self.paths.root.clone());
        let inbox = root.join(INBOX_DIR_NAME);

        let mut accepted = Vec::new();
        for file in files {
            match explicit_candidate(&root, &inbox, file) {
                Ok(candidate) => accepted.push(candidate),
                Err(reason) => {
                    debug!(path = %file.display(), reason, "ignoring target");
                    ignored.push(file.display().to_string());
                }
            }
        }

        accepted
    }
}

fn explicit_candidate(root: &Path, inbox: &Path, file: &Path) -> Result<Candidate, &'static str> {
    if !is_markdown(file) {
        return Err("not a markdown file");
    }
    if is_conflict_artifact(file) {
        return Err("conflict copy");
    }

    let absolute = fs::canonicalize(file).map_err(|_| "file does not exist")?;
    if !absolute.is_file() {
        return Err("not a file");
    }

    let Ok(relative) = absolute.strip_prefix(root) else {
        return Err("outside the workspace");
    };
    if absolute.starts_with(inbox) {
        return Err("inbox files are not synced");
    }

    let relative = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/");

    Ok(Candidate { absolute, relative })
}

// Relative path of a file written next to the note at `relative`.
fn sibling_relative(relative: &str, sibling: &Path) -> String {
    let name = sibling
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    match relative.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/{name}"),
        None => name,
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "md")
}
