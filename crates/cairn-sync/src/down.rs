use crate::note::render_synced_note;
use crate::{ItemError, SyncEngine};
use cairn_api::{RemoteNote, RemoteStore};
use cairn_core::{CairnError, CairnResult};
use cairn_fs::resolve_note_path;
use cairn_store::{SyncEntry, SyncState};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DownReport {
    pub remote_notes: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub removed: usize,
    pub errors: usize,
    pub failures: Vec<ItemError>,
}

impl<R: RemoteStore + ?Sized> SyncEngine<'_, R> {
    /// Mirrors every remote note into the workspace and removes files whose notes are gone.
    ///
    /// An empty remote listing is treated as "nothing to do" rather than "delete everything".
    pub fn sync_down(&self, state: &mut SyncState, force: bool) -> CairnResult<DownReport> {
        let notes = self.remote.fetch_notes()?;
        let mut report = DownReport {
            remote_notes: notes.len(),
            ..DownReport::default()
        };

        if notes.is_empty() {
            info!("remote returned no notes; leaving workspace and sync state untouched");
            return Ok(report);
        }

        let mut next: BTreeMap<String, SyncEntry> = BTreeMap::new();
        let mut listed: BTreeSet<&str> = BTreeSet::new();

        for note in &notes {
            listed.insert(note.path.as_str());
            let stored = state.entry(&note.path).cloned();

            if !force
                && let Some(entry) = stored.as_ref()
                && entry.version >= note.version
            {
                debug!(path = %note.path, version = note.version, "up to date");
                report.skipped += 1;
                next.insert(note.path.clone(), entry.clone());
                continue;
            }

            let synced_at = Utc::now().to_rfc3339();
            match self.write_remote_note(note, &synced_at) {
                Ok(action) => {
                    match action {
                        NoteAction::Created => report.created += 1,
                        NoteAction::Updated => report.updated += 1,
                    }
                    info!(path = %note.path, version = note.version, ?action, "pulled note");
                    next.insert(
                        note.path.clone(),
                        SyncEntry {
                            version: note.version,
                            synced_at: Some(synced_at),
                        },
                    );
                }
                Err(err) => {
                    warn!(path = %note.path, error = %err, "failed to write note");
                    report.errors += 1;
                    report
                        .failures
                        .push(ItemError::new(note.path.clone(), err.message));
                    if let Some(entry) = stored {
                        next.insert(note.path.clone(), entry);
                    }
                }
            }
        }

        for (path, entry) in &state.notes {
            if listed.contains(path.as_str()) {
                continue;
            }

            match self.remove_orphan(path) {
                Ok(true) => {
                    info!(path = %path, "removed note deleted on remote");
                    report.removed += 1;
                }
                Ok(false) => debug!(path = %path, "orphaned entry had no local file"),
                Err(err) => {
                    warn!(path = %path, error = %err, "failed to remove orphaned note");
                    report.errors += 1;
                    report.failures.push(ItemError::new(path.clone(), err.message));
                    next.insert(path.clone(), entry.clone());
                }
            }
        }

        state.replace_notes(next);
        state.persist()?;

        Ok(report)
    }

    fn write_remote_note(&self, note: &RemoteNote, synced_at: &str) -> CairnResult<NoteAction> {
        let target = resolve_note_path(self.paths, &note.path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                CairnError::io(format!(
                    "failed to create directory '{}': {}",
                    parent.display(),
                    err
                ))
            })?;
        }

        let action = if target.exists() {
            NoteAction::Updated
        } else {
            NoteAction::Created
        };

        fs::write(&target, render_synced_note(note, synced_at)).map_err(|err| {
            CairnError::io(format!(
                "failed to write note '{}': {}",
                target.display(),
                err
            ))
        })?;

        Ok(action)
    }

    // Ok(false) when there was nothing on disk to delete.
    fn remove_orphan(&self, relative: &str) -> CairnResult<bool> {
        let target = resolve_note_path(self.paths, relative)?;
        match fs::remove_file(&target) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(false),
            Err(err) => Err(CairnError::io(format!(
                "failed to remove '{}': {}",
                target.display(),
                err
            ))),
        }
    }
}
