use cairn_core::{CairnResult, ExitCode};
use cairn_store::CaptureCounter;
use cairn_sync::SyncEngine;
use serde_json::json;

use crate::{GlobalOptions, print_json, with_remote_context};

pub(crate) fn cmd_ingest(globals: &GlobalOptions) -> CairnResult<ExitCode> {
    with_remote_context(globals, |ctx| {
        let mut counter = CaptureCounter::from_workspace(&ctx.paths)?;
        let report = SyncEngine::new(&ctx.remote, &ctx.paths).ingest_captures(&mut counter)?;

        if globals.json {
            print_json(&json!({"ok": true, "result": report}))?;
        } else if report.fetched == 0 {
            println!("No new captures.");
        } else {
            println!(
                "Ingested {} of {} captures into {} ({} assets, {} errors).",
                report.stubs_written,
                report.fetched,
                ctx.paths.inbox_new_dir.display(),
                report.assets_downloaded,
                report.errors
            );
            for capture in &report.captures {
                match capture.asset.as_deref() {
                    Some(asset) => println!("  {} -> {} [{}]", capture.capture_id, capture.stub, asset),
                    None => println!("  {} -> {}", capture.capture_id, capture.stub),
                }
            }
            for failure in &report.failures {
                println!("  error {}: {}", failure.path, failure.message);
            }
        }

        Ok(ExitCode::Success)
    })
}
