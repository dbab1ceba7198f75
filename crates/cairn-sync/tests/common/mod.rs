#![allow(dead_code)]

use cairn_api::{CaptureRecord, NoteWrite, RemoteNote, RemoteStore, UpsertOutcome};
use cairn_core::{CairnError, CairnResult};
use cairn_fs::{WorkspaceInitResult, init_workspace};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// In-process remote with the same version rules as the hosted store: creates start at 1,
/// every accepted write bumps by one, a stale `expected_version` is rejected unchanged.
#[derive(Default)]
pub struct MemoryRemote {
    pub notes: RefCell<BTreeMap<String, RemoteNote>>,
    pub captures: RefCell<Vec<CaptureRecord>>,
    pub assets: RefCell<HashMap<String, Vec<u8>>>,
    pub synced: RefCell<HashSet<String>>,
    pub upserts: RefCell<Vec<NoteWrite>>,
    pub failing_paths: RefCell<HashSet<String>>,
    pub fail_ack: Cell<bool>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_note(&self, path: &str, jd_id: &str, title: &str, content: &str, version: i64) {
        self.notes.borrow_mut().insert(
            path.to_string(),
            RemoteNote {
                path: path.to_string(),
                jd_id: jd_id.to_string(),
                title: title.to_string(),
                content: content.to_string(),
                version,
            },
        );
    }

    pub fn remove_note(&self, path: &str) {
        self.notes.borrow_mut().remove(path);
    }

    pub fn note(&self, path: &str) -> Option<RemoteNote> {
        self.notes.borrow().get(path).cloned()
    }

    pub fn seed_capture(&self, id: &str, created_at: f64, text: Option<&str>, file_url: Option<&str>) {
        self.captures.borrow_mut().push(CaptureRecord {
            id: id.to_string(),
            created_at,
            source: Some("telegram".to_string()),
            content_type: Some(if file_url.is_some() { "image" } else { "text" }.to_string()),
            text: text.map(ToString::to_string),
            file_url: file_url.map(ToString::to_string),
        });
    }

    pub fn seed_asset(&self, url: &str, bytes: &[u8]) {
        self.assets.borrow_mut().insert(url.to_string(), bytes.to_vec());
    }

    pub fn fail_upserts_for(&self, path: &str) {
        self.failing_paths.borrow_mut().insert(path.to_string());
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.borrow().len()
    }
}

impl RemoteStore for MemoryRemote {
    fn fetch_notes(&self) -> CairnResult<Vec<RemoteNote>> {
        Ok(self.notes.borrow().values().cloned().collect())
    }

    fn upsert_note(&self, write: &NoteWrite) -> CairnResult<UpsertOutcome> {
        self.upserts.borrow_mut().push(write.clone());
        if self.failing_paths.borrow().contains(&write.path) {
            return Err(CairnError::remote("connection reset [http_status=502]"));
        }

        let mut notes = self.notes.borrow_mut();
        match notes.get_mut(&write.path) {
            Some(existing) => {
                if let Some(expected) = write.expected_version
                    && expected != existing.version
                {
                    return Ok(UpsertOutcome::Conflict {
                        current_version: existing.version,
                        expected_version: expected,
                    });
                }

                existing.version += 1;
                existing.jd_id = write.jd_id.clone();
                existing.title = write.title.clone();
                existing.content = write.content.clone();
                Ok(UpsertOutcome::Updated {
                    version: existing.version,
                })
            }
            None => {
                notes.insert(
                    write.path.clone(),
                    RemoteNote {
                        path: write.path.clone(),
                        jd_id: write.jd_id.clone(),
                        title: write.title.clone(),
                        content: write.content.clone(),
                        version: 1,
                    },
                );
                Ok(UpsertOutcome::Created { version: 1 })
            }
        }
    }

    fn fetch_unsynced_captures(&self) -> CairnResult<Vec<CaptureRecord>> {
        let synced = self.synced.borrow();
        Ok(self
            .captures
            .borrow()
            .iter()
            .filter(|capture| !synced.contains(&capture.id))
            .cloned()
            .collect())
    }

    fn mark_captures_synced(&self, ids: &[String]) -> CairnResult<()> {
        if self.fail_ack.get() {
            return Err(CairnError::remote("mutation timed out"));
        }
        self.synced.borrow_mut().extend(ids.iter().cloned());
        Ok(())
    }

    fn download_asset(&self, url: &str) -> CairnResult<Vec<u8>> {
        self.assets
            .borrow()
            .get(url)
            .cloned()
            .ok_or_else(|| CairnError::remote(format!("asset not found: {url} [http_status=404]")))
    }
}

pub fn workspace() -> (TempDir, WorkspaceInitResult) {
    let temp = tempfile::tempdir().expect("tempdir");
    let init = init_workspace(Some(&temp.path().join("second-brain")), None).expect("init workspace");
    (temp, init)
}

pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
}

pub fn read_file(path: &Path) -> String {
    fs::read_to_string(path).expect("read file")
}
