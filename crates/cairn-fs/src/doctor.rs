use crate::config::{load_config, resolve_remote};
use crate::workspace::WorkspacePaths;
use cairn_core::CairnResult;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub ok: bool,
    pub details: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub workspace: String,
    pub healthy: bool,
    pub checks: Vec<DoctorCheck>,
    pub remote: Option<String>,
}

pub fn run_doctor(
    paths: &WorkspacePaths,
    remote_override: Option<&str>,
) -> CairnResult<DoctorReport> {
    let mut checks = vec![
        dir_check("workspace_root", &paths.root),
        dir_check("meta_directory", &paths.meta_dir),
        dir_check("inbox_new_directory", &paths.inbox_new_dir),
        dir_check("inbox_assets_directory", &paths.inbox_assets_dir),
        DoctorCheck {
            name: "config_file".to_string(),
            ok: paths.config_path.is_file(),
            details: paths.config_path.display().to_string(),
        },
        optional_file_check("sync_state_file", &paths.sync_state_path),
        optional_file_check("capture_counter_file", &paths.counter_path),
    ];

    let mut remote = None;

    if paths.config_path.is_file() {
        match load_config(paths) {
            Ok(config) => {
                let missing: Vec<&str> = config
                    .managed_folders
                    .iter()
                    .map(String::as_str)
                    .filter(|folder| !paths.root.join(folder).is_dir())
                    .collect();
                checks.push(DoctorCheck {
                    name: "managed_folders".to_string(),
                    ok: missing.is_empty(),
                    details: if missing.is_empty() {
                        format!("{} folders present", config.managed_folders.len())
                    } else {
                        format!("missing: {}", missing.join(", "))
                    },
                });

                match resolve_remote(&config, remote_override, &paths.root) {
                    Ok(resolved) => {
                        remote = Some(resolved.url.clone());
                        checks.push(DoctorCheck {
                            name: "remote_endpoint".to_string(),
                            ok: true,
                            details: format!("{} ({:?})", resolved.url, resolved.source),
                        });
                    }
                    Err(err) => checks.push(DoctorCheck {
                        name: "remote_endpoint".to_string(),
                        ok: false,
                        details: err.message,
                    }),
                }
            }
            Err(err) => checks.push(DoctorCheck {
                name: "config_parse".to_string(),
                ok: false,
                details: err.message,
            }),
        }
    }

    let healthy = checks.iter().all(|check| check.ok);

    Ok(DoctorReport {
        workspace: paths.root.display().to_string(),
        healthy,
        checks,
        remote,
    })
}

fn dir_check(name: &str, path: &Path) -> DoctorCheck {
    DoctorCheck {
        name: name.to_string(),
        ok: path.is_dir(),
        details: path.display().to_string(),
    }
}

// State files only appear after the first sync or ingest run.
fn optional_file_check(name: &str, path: &Path) -> DoctorCheck {
    let exists = path.exists();
    DoctorCheck {
        name: name.to_string(),
        ok: !exists || path.is_file(),
        details: if exists {
            path.display().to_string()
        } else {
            format!("{} (not created yet)", path.display())
        },
    }
}
