use crate::workspace::WorkspacePaths;
use cairn_core::{CairnError, CairnResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MANAGED_FOLDERS: [&str; 10] = [
    "00-index",
    "10-reference",
    "20-projects",
    "30-people",
    "40-media",
    "50-events",
    "60-ideas",
    "70-home",
    "80-personal",
    "90-archive",
];

/// Environment keys consulted for the remote endpoint, in priority order.
pub const REMOTE_ENV_KEYS: [&str; 3] = ["CAIRN_REMOTE_URL", "CONVEX_URL", "NEXT_PUBLIC_CONVEX_URL"];
pub const ENV_FILE_OVERRIDE: &str = "CAIRN_ENV_FILE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub managed_folders: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteSource {
    Flag,
    Environment,
    EnvFile,
    Config,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedRemote {
    pub url: String,
    pub source: RemoteSource,
    #[serde(skip)]
    pub timeout: Duration,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self::with_remote(None)
    }
}

impl WorkspaceConfig {
    pub fn with_remote(remote_url: Option<String>) -> Self {
        Self {
            version: CONFIG_VERSION,
            remote_url: remote_url.filter(|url| !url.trim().is_empty()),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            managed_folders: DEFAULT_MANAGED_FOLDERS
                .iter()
                .map(|folder| folder.to_string())
                .collect(),
        }
    }

    pub fn ensure_defaults(&mut self) {
        if self.version == 0 {
            self.version = CONFIG_VERSION;
        }

        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
        }

        if self.managed_folders.is_empty() {
            self.managed_folders = DEFAULT_MANAGED_FOLDERS
                .iter()
                .map(|folder| folder.to_string())
                .collect();
        }

        if self
            .remote_url
            .as_deref()
            .is_some_and(|url| url.trim().is_empty())
        {
            self.remote_url = None;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

pub fn load_config(paths: &WorkspacePaths) -> CairnResult<WorkspaceConfig> {
    let contents = fs::read_to_string(&paths.config_path).map_err(|err| {
        CairnError::config(format!(
            "failed to read workspace config '{}': {}",
            paths.config_path.display(),
            err
        ))
    })?;

    let mut config: WorkspaceConfig = toml::from_str(&contents).map_err(|err| {
        CairnError::config(format!(
            "failed to parse workspace config '{}': {}",
            paths.config_path.display(),
            err
        ))
    })?;
    config.ensure_defaults();
    Ok(config)
}

pub fn save_config(paths: &WorkspacePaths, config: &WorkspaceConfig) -> CairnResult<()> {
    let serialized = toml::to_string_pretty(config)
        .map_err(|err| CairnError::config(format!("failed to encode config.toml: {err}")))?;

    fs::write(&paths.config_path, serialized).map_err(|err| {
        CairnError::io(format!(
            "failed to write workspace config '{}': {}",
            paths.config_path.display(),
            err
        ))
    })
}

/// Picks the remote endpoint: flag, process environment, `.env` file, then config.
pub fn resolve_remote(
    config: &WorkspaceConfig,
    remote_override: Option<&str>,
    workspace_root: &Path,
) -> CairnResult<ResolvedRemote> {
    let timeout = config.request_timeout();
    let resolved = |url: &str, source| ResolvedRemote {
        url: url.trim().trim_end_matches('/').to_string(),
        source,
        timeout,
    };

    if let Some(url) = remote_override.filter(|url| !url.trim().is_empty()) {
        return Ok(resolved(url, RemoteSource::Flag));
    }

    if let Some(url) = remote_from_env() {
        return Ok(resolved(&url, RemoteSource::Environment));
    }

    if let Some(path) = resolve_env_file(workspace_root) {
        let values = load_env_file(&path)?;
        if let Some(url) = REMOTE_ENV_KEYS
            .iter()
            .filter_map(|key| values.get(*key))
            .find(|value| !value.trim().is_empty())
        {
            return Ok(resolved(url, RemoteSource::EnvFile));
        }
    }

    if let Some(url) = config.remote_url.as_deref() {
        return Ok(resolved(url, RemoteSource::Config));
    }

    Err(CairnError::config(format!(
        "no remote endpoint configured; pass --remote, set {} or add remote_url to config.toml",
        REMOTE_ENV_KEYS.join("/")
    )))
}

fn remote_from_env() -> Option<String> {
    REMOTE_ENV_KEYS
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

fn resolve_env_file(workspace_root: &Path) -> Option<PathBuf> {
    if let Ok(path) = std::env::var(ENV_FILE_OVERRIDE) {
        let candidate = PathBuf::from(path);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    if let Ok(cwd) = std::env::current_dir()
        && let Some(found) = search_upwards_for(&cwd, Path::new(".env"))
    {
        return Some(found);
    }

    search_upwards_for(workspace_root, Path::new(".env"))
}

fn search_upwards_for(start: &Path, relative_path: &Path) -> Option<PathBuf> {
    let mut cursor = Some(start);

    while let Some(path) = cursor {
        let candidate = path.join(relative_path);
        if candidate.is_file() {
            return Some(candidate);
        }
        cursor = path.parent();
    }

    None
}

fn load_env_file(path: &Path) -> CairnResult<BTreeMap<String, String>> {
    let raw = fs::read_to_string(path).map_err(|err| {
        CairnError::config(format!(
            "failed to read env file '{}': {}",
            path.display(),
            err
        ))
    })?;

    Ok(parse_env_lines(&raw))
}

fn parse_env_lines(raw: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let mut value = value.trim().to_string();
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = value[1..value.len() - 1].to_string();
        }

        vars.insert(key.to_string(), value);
    }

    vars
}
