use cairn_core::{CairnResult, ExitCode};
use cairn_fs::resolve_workspace;
use cairn_store::{CaptureCounter, SyncState};
use cairn_sync::{DownReport, ItemError, SyncEngine, SyncTargets, UpReport, list_conflict_artifacts};
use serde_json::json;

use crate::{
    GlobalOptions, SyncCommand, print_json, resolve_user_path, with_remote_context,
    workspace_target,
};

pub(crate) fn cmd_sync(command: SyncCommand, globals: &GlobalOptions) -> CairnResult<ExitCode> {
    match command {
        SyncCommand::Down { force } => with_remote_context(globals, |ctx| {
            let mut state = SyncState::from_workspace(&ctx.paths)?;
            let report = SyncEngine::new(&ctx.remote, &ctx.paths).sync_down(&mut state, force)?;

            if globals.json {
                print_json(&json!({"ok": true, "result": report}))?;
            } else {
                print_down_summary(&report, &ctx.endpoint.url);
            }

            Ok(ExitCode::Success)
        }),
        SyncCommand::Up { force, files } => with_remote_context(globals, |ctx| {
            let targets = if files.is_empty() {
                SyncTargets::All
            } else {
                SyncTargets::Files(
                    files
                        .into_iter()
                        .map(|file| resolve_user_path(file, &ctx.paths.root))
                        .collect::<CairnResult<Vec<_>>>()?,
                )
            };

            let mut state = SyncState::from_workspace(&ctx.paths)?;
            let report = SyncEngine::new(&ctx.remote, &ctx.paths).sync_up(
                &ctx.config,
                &mut state,
                &targets,
                force,
            )?;

            if globals.json {
                print_json(&json!({"ok": true, "result": report}))?;
            } else {
                print_up_summary(&report, &ctx.endpoint.url);
            }

            Ok(ExitCode::Success)
        }),
        SyncCommand::Status => {
            let paths = resolve_workspace(Some(&workspace_target(globals)?))?;
            let state = SyncState::from_workspace(&paths)?;
            let counter = CaptureCounter::from_workspace(&paths)?;
            let conflicts = list_conflict_artifacts(&paths)?;

            if globals.json {
                print_json(&json!({
                    "ok": true,
                    "result": {
                        "workspace": paths.root.display().to_string(),
                        "last_sync": state.last_sync,
                        "tracked_notes": state.notes.len(),
                        "next_capture_id": counter.peek().to_string(),
                        "conflict_artifacts": conflicts.len(),
                    }
                }))?;
            } else {
                println!("Workspace: {}", paths.root.display());
                println!(
                    "Last sync: {}",
                    state.last_sync.as_deref().unwrap_or("never")
                );
                println!("Tracked notes: {}", state.notes.len());
                println!("Next capture: {}", counter.peek());
                println!("Conflict copies: {}", conflicts.len());
            }

            Ok(ExitCode::Success)
        }
        SyncCommand::Conflicts => {
            let paths = resolve_workspace(Some(&workspace_target(globals)?))?;
            let conflicts = list_conflict_artifacts(&paths)?;

            if globals.json {
                print_json(&json!({"ok": true, "result": conflicts}))?;
            } else if conflicts.is_empty() {
                println!("No conflicts.");
            } else {
                for conflict in conflicts {
                    println!(
                        "{} | {} | {}",
                        conflict.artifact,
                        conflict.original,
                        conflict.created_at.as_deref().unwrap_or("-")
                    );
                }
            }

            Ok(ExitCode::Success)
        }
    }
}

fn print_down_summary(report: &DownReport, remote: &str) {
    println!("Fetched {} notes from {}.", report.remote_notes, remote);
    println!(
        "Pull completed: {} created, {} updated, {} unchanged, {} removed, {} errors.",
        report.created, report.updated, report.skipped, report.removed, report.errors
    );
    print_failures(&report.failures);
}

fn print_up_summary(report: &UpReport, remote: &str) {
    println!("Scanned {} notes for {}.", report.scanned, remote);
    println!(
        "Push completed: {} created, {} updated, {} conflicts, {} errors.",
        report.created, report.updated, report.conflicts, report.errors
    );

    for conflict in &report.conflict_details {
        println!(
            "  conflict {}: expected v{}, remote is v{} -> {}",
            conflict.path,
            conflict.expected_version,
            conflict.current_version,
            conflict.artifact.as_deref().unwrap_or("no copy written")
        );
    }

    for ignored in &report.ignored {
        println!("  ignored {ignored}");
    }

    print_failures(&report.failures);
}

fn print_failures(failures: &[ItemError]) {
    for failure in failures {
        println!("  error {}: {}", failure.path, failure.message);
    }
}
