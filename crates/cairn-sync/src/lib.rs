//! Reconciles the workspace with the remote note store and drains the capture queue.

mod capture;
mod conflict;
mod down;
mod note;
mod up;

pub use capture::{DEFAULT_ASSET_EXTENSION, IngestReport, IngestedCapture, infer_extension};
pub use conflict::{
    CONFLICT_MARKER, ConflictArtifact, conflict_artifact_path, is_conflict_artifact,
    list_conflict_artifacts, write_conflict_artifact,
};
pub use down::{DownReport, NoteAction};
pub use note::{
    DEFAULT_JD_ID, LocalNote, NoteHeader, render_synced_note, split_header, strip_header,
    title_case,
};
pub use up::{ConflictRecord, SyncTargets, UpReport};

use cairn_api::RemoteStore;
use cairn_fs::WorkspacePaths;
use serde::Serialize;

/// A per-item failure that did not abort the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub path: String,
    pub message: String,
}

impl ItemError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub struct SyncEngine<'a, R: RemoteStore + ?Sized> {
    remote: &'a R,
    paths: &'a WorkspacePaths,
}

impl<'a, R: RemoteStore + ?Sized> SyncEngine<'a, R> {
    pub fn new(remote: &'a R, paths: &'a WorkspacePaths) -> Self {
        Self { remote, paths }
    }

    pub fn paths(&self) -> &WorkspacePaths {
        self.paths
    }
}
