use crate::config::{WorkspaceConfig, load_config, save_config};
use cairn_core::{CairnError, CairnResult};
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const META_DIR_NAME: &str = ".cairn";
pub const SYNC_STATE_FILE: &str = "_sync_state.json";
pub const COUNTER_STATE_FILE: &str = "_state.json";
pub const INBOX_DIR_NAME: &str = "inbox";

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub meta_dir: PathBuf,
    pub config_path: PathBuf,
    pub sync_state_path: PathBuf,
    pub counter_path: PathBuf,
    pub inbox_dir: PathBuf,
    pub inbox_new_dir: PathBuf,
    pub inbox_assets_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct WorkspaceInitResult {
    pub paths: WorkspacePaths,
    pub created: Vec<PathBuf>,
}

impl WorkspacePaths {
    pub fn from_root(root: PathBuf) -> Self {
        let meta_dir = root.join(META_DIR_NAME);
        let inbox_dir = root.join(INBOX_DIR_NAME);

        Self {
            config_path: meta_dir.join("config.toml"),
            sync_state_path: root.join(SYNC_STATE_FILE),
            counter_path: root.join(COUNTER_STATE_FILE),
            inbox_new_dir: inbox_dir.join("new"),
            inbox_assets_dir: inbox_dir.join("assets"),
            inbox_dir,
            meta_dir,
            root,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.meta_dir.is_dir()
    }
}

pub fn init_workspace(
    target: Option<&Path>,
    remote: Option<&str>,
) -> CairnResult<WorkspaceInitResult> {
    let root = match target {
        Some(path) => absolutize(path)?,
        None => std::env::current_dir().map_err(|err| {
            CairnError::io(format!(
                "failed to resolve current directory for init: {err}"
            ))
        })?,
    };

    let paths = WorkspacePaths::from_root(root);
    let mut created = Vec::new();

    ensure_dir(&paths.root, &mut created)?;
    ensure_dir(&paths.meta_dir, &mut created)?;
    ensure_dir(&paths.inbox_new_dir, &mut created)?;
    ensure_dir(&paths.inbox_assets_dir, &mut created)?;

    let config = if paths.config_path.exists() {
        load_config(&paths)?
    } else {
        let config = WorkspaceConfig::with_remote(remote.map(str::to_string));
        save_config(&paths, &config)?;
        created.push(paths.config_path.clone());
        config
    };

    for folder in &config.managed_folders {
        ensure_dir(&paths.root.join(folder), &mut created)?;
    }

    Ok(WorkspaceInitResult { paths, created })
}

pub fn resolve_workspace(explicit: Option<&Path>) -> CairnResult<WorkspacePaths> {
    let root = match explicit {
        Some(path) => absolutize(path)?,
        None => std::env::current_dir().map_err(|err| {
            CairnError::io(format!(
                "failed to resolve current directory for workspace lookup: {err}"
            ))
        })?,
    };

    let paths = WorkspacePaths::from_root(root);
    if !paths.is_initialized() {
        let root_display = paths.root.display();
        return Err(CairnError::usage(format!(
            "workspace is not initialized at '{root_display}'; run `cairn init --workspace {root_display}` first"
        )));
    }

    Ok(paths)
}

/// Path of `absolute` relative to the workspace root, always `/`-separated.
pub fn relative_note_path(paths: &WorkspacePaths, absolute: &Path) -> CairnResult<String> {
    let relative = absolute.strip_prefix(&paths.root).map_err(|err| {
        CairnError::io(format!(
            "failed to create relative path from '{}' to '{}': {}",
            paths.root.display(),
            absolute.display(),
            err
        ))
    })?;

    let parts: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect();
    Ok(parts.join("/"))
}

/// Maps a stored or remote relative path onto the workspace, refusing anything that could
/// land outside the root.
pub fn resolve_note_path(paths: &WorkspacePaths, relative: &str) -> CairnResult<PathBuf> {
    let candidate = Path::new(relative);
    if relative.trim().is_empty() {
        return Err(CairnError::usage("note path cannot be empty"));
    }

    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(CairnError::usage(format!(
                    "note path '{relative}' escapes the workspace"
                )));
            }
        }
    }

    Ok(paths.root.join(candidate))
}

pub(crate) fn absolutize(path: &Path) -> CairnResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    let cwd = std::env::current_dir().map_err(|err| {
        CairnError::io(format!(
            "failed to resolve current directory for path: {err}"
        ))
    })?;

    Ok(cwd.join(path))
}

fn ensure_dir(path: &Path, created: &mut Vec<PathBuf>) -> CairnResult<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(CairnError::io(format!(
                "expected '{}' to be a directory",
                path.display()
            )));
        }
        return Ok(());
    }

    fs::create_dir_all(path).map_err(|err| {
        CairnError::io(format!(
            "failed to create directory '{}': {}",
            path.display(),
            err
        ))
    })?;
    created.push(path.to_path_buf());
    Ok(())
}
