//! Durable local state: the per-path sync ledger and the capture counter.
//!
//! Both files are small JSON documents rewritten in full on every change through
//! [`write_atomic`], so a reader never sees a half-written file.

use cairn_core::version::deserialize_version;
use cairn_core::{CairnError, CairnResult};
use cairn_fs::WorkspacePaths;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEntry {
    #[serde(deserialize_with = "deserialize_version")]
    pub version: i64,
    #[serde(default)]
    pub synced_at: Option<String>,
}

/// What the engines last reconciled, keyed by workspace-relative path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(skip)]
    path: PathBuf,
    #[serde(default)]
    pub notes: BTreeMap<String, SyncEntry>,
    #[serde(default)]
    pub last_sync: Option<String>,
}

impl SyncState {
    pub fn load(path: impl Into<PathBuf>) -> CairnResult<Self> {
        let path = path.into();
        let mut state: SyncState = read_json_or_default(&path, "sync state")?;
        state.path = path;
        Ok(state)
    }

    pub fn from_workspace(paths: &WorkspacePaths) -> CairnResult<Self> {
        Self::load(paths.sync_state_path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry(&self, path: &str) -> Option<&SyncEntry> {
        self.notes.get(path)
    }

    pub fn version_of(&self, path: &str) -> Option<i64> {
        self.notes.get(path).map(|entry| entry.version)
    }

    pub fn record(&mut self, path: impl Into<String>, version: i64) {
        self.notes.insert(
            path.into(),
            SyncEntry {
                version,
                synced_at: Some(Utc::now().to_rfc3339()),
            },
        );
    }

    /// Swaps in a freshly built ledger, keeping this state's file location.
    pub fn replace_notes(&mut self, notes: BTreeMap<String, SyncEntry>) {
        self.notes = notes;
    }

    pub fn persist(&mut self) -> CairnResult<()> {
        self.last_sync = Some(Utc::now().to_rfc3339());
        write_json_atomic(&self.path, self, "sync state")
    }
}

/// Locally assigned capture identifier, rendered as `cap_0001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaptureId(pub u32);

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cap_{:04}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureCounter {
    #[serde(skip)]
    path: PathBuf,
    #[serde(default = "first_capture_num")]
    pub next_capture_num: u32,
}

fn first_capture_num() -> u32 {
    1
}

impl CaptureCounter {
    pub fn load(path: impl Into<PathBuf>) -> CairnResult<Self> {
        let path = path.into();
        let raw = read_trimmed(&path, "capture counter")?;
        let mut counter = match raw {
            Some(raw) => serde_json::from_str::<CaptureCounter>(&raw).map_err(|err| {
                CairnError::io(format!(
                    "failed to parse capture counter '{}': {}",
                    path.display(),
                    err
                ))
            })?,
            None => CaptureCounter {
                path: PathBuf::new(),
                next_capture_num: first_capture_num(),
            },
        };
        counter.next_capture_num = counter.next_capture_num.max(1);
        counter.path = path;
        Ok(counter)
    }

    pub fn from_workspace(paths: &WorkspacePaths) -> CairnResult<Self> {
        Self::load(paths.counter_path.clone())
    }

    pub fn peek(&self) -> CaptureId {
        CaptureId(self.next_capture_num)
    }

    /// Issues the next identifier and retires it on disk before returning it.
    pub fn reserve(&mut self) -> CairnResult<CaptureId> {
        let issued = CaptureId(self.next_capture_num);
        let next = self.next_capture_num.checked_add(1).ok_or_else(|| {
            CairnError::io("capture counter exhausted the 32-bit identifier space")
        })?;

        self.next_capture_num = next;
        if let Err(err) = write_json_atomic(&self.path, self, "capture counter") {
            self.next_capture_num = issued.0;
            return Err(err);
        }

        Ok(issued)
    }
}

/// Replaces `path` with `bytes` via a synced temp file in the same directory. The file and
/// its directory entry are both on disk when this returns `Ok`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> CairnResult<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).map_err(|err| {
        CairnError::io(format!(
            "failed to create directory '{}': {}",
            parent.display(),
            err
        ))
    })?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    let tmp = parent.join(format!(".{file_name}.tmp-{}", std::process::id()));

    let write_tmp = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()
    };

    if let Err(err) = write_tmp() {
        let _ = fs::remove_file(&tmp);
        return Err(CairnError::io(format!(
            "failed to write temporary file for '{}': {}",
            path.display(),
            err
        )));
    }

    fs::rename(&tmp, path).map_err(|err| {
        let _ = fs::remove_file(&tmp);
        CairnError::io(format!(
            "failed to replace '{}': {}",
            path.display(),
            err
        ))
    })?;

    sync_parent_dir(parent).map_err(|err| {
        CairnError::io(format!(
            "failed to sync directory '{}': {}",
            parent.display(),
            err
        ))
    })
}

fn sync_parent_dir(parent: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        fs::File::open(parent)?.sync_all()?;
    }
    Ok(())
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T, label: &str) -> CairnResult<()> {
    let encoded = serde_json::to_string_pretty(value)
        .map_err(|err| CairnError::io(format!("failed to encode {label}: {err}")))?;
    write_atomic(path, encoded.as_bytes())
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path, label: &str) -> CairnResult<T> {
    let Some(raw) = read_trimmed(path, label)? else {
        return Ok(T::default());
    };

    serde_json::from_str(&raw).map_err(|err| {
        CairnError::io(format!(
            "failed to parse {label} '{}': {}",
            path.display(),
            err
        ))
    })
}

fn read_trimmed(path: &Path, label: &str) -> CairnResult<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path).map_err(|err| {
        CairnError::io(format!(
            "failed to read {label} '{}': {}",
            path.display(),
            err
        ))
    })?;

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    Ok(Some(trimmed.to_string()))
}
