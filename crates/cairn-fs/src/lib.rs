mod config;
mod doctor;
mod workspace;

pub use config::{
    CONFIG_VERSION, DEFAULT_MANAGED_FOLDERS, DEFAULT_REQUEST_TIMEOUT_SECS, ENV_FILE_OVERRIDE,
    REMOTE_ENV_KEYS, RemoteSource, ResolvedRemote, WorkspaceConfig, load_config, resolve_remote,
    save_config,
};
pub use doctor::{DoctorCheck, DoctorReport, run_doctor};
pub use workspace::{
    COUNTER_STATE_FILE, INBOX_DIR_NAME, META_DIR_NAME, SYNC_STATE_FILE, WorkspaceInitResult,
    WorkspacePaths, init_workspace, relative_note_path, resolve_note_path, resolve_workspace,
};
