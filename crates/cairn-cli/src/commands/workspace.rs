use cairn_core::{CairnResult, ExitCode};
use cairn_fs::{DoctorCheck, init_workspace, resolve_workspace, run_doctor};
use cairn_store::{CaptureCounter, SyncState};
use serde_json::json;

use crate::{GlobalOptions, InitOutput, print_json, workspace_target};

pub(crate) fn cmd_init(globals: &GlobalOptions) -> CairnResult<ExitCode> {
    let target = workspace_target(globals)?;
    let result = init_workspace(Some(&target), globals.remote.as_deref())?;

    let output = InitOutput {
        workspace: result.paths.root.display().to_string(),
        created: result
            .created
            .iter()
            .map(|path| path.display().to_string())
            .collect(),
    };

    if globals.json {
        print_json(&json!({"ok": true, "result": output}))?;
    } else {
        println!("Workspace initialized: {}", output.workspace);
        println!("Created:");
        if output.created.is_empty() {
            println!("  - none");
        } else {
            for path in &output.created {
                println!("  - {path}");
            }
        }
    }

    Ok(ExitCode::Success)
}

pub(crate) fn cmd_doctor(globals: &GlobalOptions) -> CairnResult<ExitCode> {
    let target = workspace_target(globals)?;
    let paths = resolve_workspace(Some(&target))?;

    let mut report = run_doctor(&paths, globals.remote.as_deref())?;

    let sync_state = match SyncState::from_workspace(&paths) {
        Ok(state) => DoctorCheck {
            name: "sync_state_parse".to_string(),
            ok: true,
            details: format!("{} tracked notes", state.notes.len()),
        },
        Err(err) => DoctorCheck {
            name: "sync_state_parse".to_string(),
            ok: false,
            details: err.message,
        },
    };
    let counter = match CaptureCounter::from_workspace(&paths) {
        Ok(counter) => DoctorCheck {
            name: "capture_counter_parse".to_string(),
            ok: true,
            details: format!("next capture {}", counter.peek()),
        },
        Err(err) => DoctorCheck {
            name: "capture_counter_parse".to_string(),
            ok: false,
            details: err.message,
        },
    };
    report.healthy = report.healthy && sync_state.ok && counter.ok;
    report.checks.push(sync_state);
    report.checks.push(counter);

    if globals.json {
        print_json(&json!({"ok": report.healthy, "result": report}))?;
    } else {
        println!("Workspace: {}", report.workspace);
        println!(
            "Health: {}",
            if report.healthy {
                "healthy"
            } else {
                "degraded"
            }
        );

        for check in &report.checks {
            let prefix = if check.ok { "OK" } else { "FAIL" };
            println!("[{}] {} -> {}", prefix, check.name, check.details);
        }
    }

    Ok(if report.healthy {
        ExitCode::Success
    } else {
        ExitCode::Io
    })
}
