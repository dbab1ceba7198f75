use crate::note::header_value;
use crate::{ItemError, SyncEngine};
use cairn_api::{CaptureRecord, RemoteStore};
use cairn_core::{CairnError, CairnResult};
use cairn_store::{CaptureCounter, CaptureId, write_atomic};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const DEFAULT_ASSET_EXTENSION: &str = ".jpg";
const DEFAULT_SOURCE: &str = "unknown";
const DEFAULT_CONTENT_TYPE: &str = "text";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestedCapture {
    pub capture_id: String,
    pub remote_id: String,
    pub stub: String,
    pub asset: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub fetched: usize,
    pub stubs_written: usize,
    pub assets_downloaded: usize,
    pub asset_failures: usize,
    pub acknowledged: usize,
    pub errors: usize,
    pub captures: Vec<IngestedCapture>,
    pub failures: Vec<ItemError>,
}

impl<R: RemoteStore + ?Sized> SyncEngine<'_, R> {
    /// Turns every unsynced remote capture into an inbox stub, then acknowledges the batch.
    ///
    /// Only captures whose stub (and asset, when downloaded) was synced to disk are
    /// acknowledged. A crash between the writes and the acknowledgement leaves them
    /// unsynced, so the next run stubs them again under fresh identifiers.
    pub fn ingest_captures(&self, counter: &mut CaptureCounter) -> CairnResult<IngestReport> {
        let captures = self.remote.fetch_unsynced_captures()?;
        let mut report = IngestReport {
            fetched: captures.len(),
            ..IngestReport::default()
        };

        if captures.is_empty() {
            info!("no unsynced captures");
            return Ok(report);
        }

        for dir in [&self.paths.inbox_new_dir, &self.paths.inbox_assets_dir] {
            fs::create_dir_all(dir).map_err(|err| {
                CairnError::io(format!(
                    "failed to create inbox directory '{}': {}",
                    dir.display(),
                    err
                ))
            })?;
        }

        let mut acknowledged = Vec::new();
        for record in &captures {
            let capture_id = counter.reserve()?;

            let asset = match record.file_url.as_deref().filter(|url| !url.trim().is_empty()) {
                Some(url) => match self.download_capture_asset(capture_id, url) {
                    Ok(name) => {
                        report.assets_downloaded += 1;
                        Some(name)
                    }
                    Err(err) => {
                        warn!(%capture_id, url, error = %err, "asset download failed; stub will have no attachment");
                        report.asset_failures += 1;
                        None
                    }
                },
                None => None,
            };

            match self.write_stub(record, capture_id, asset.as_deref()) {
                Ok(stub) => {
                    info!(%capture_id, remote_id = %record.id, stub = %stub, "wrote capture stub");
                    report.stubs_written += 1;
                    acknowledged.push(record.id.clone());
                    report.captures.push(IngestedCapture {
                        capture_id: capture_id.to_string(),
                        remote_id: record.id.clone(),
                        stub,
                        asset: asset.map(|name| format!("inbox/assets/{name}")),
                    });
                }
                Err(err) => {
                    warn!(%capture_id, remote_id = %record.id, error = %err, "failed to write capture stub");
                    report.errors += 1;
                    report
                        .failures
                        .push(ItemError::new(record.id.clone(), err.message));
                }
            }
        }

        if !acknowledged.is_empty() {
            self.remote
                .mark_captures_synced(&acknowledged)
                .map_err(|err| {
                    CairnError::remote(format!(
                        "wrote {} capture stubs but failed to mark them synced: {}",
                        acknowledged.len(),
                        err.message
                    ))
                })?;
            report.acknowledged = acknowledged.len();
        }

        Ok(report)
    }

    fn download_capture_asset(&self, capture_id: CaptureId, url: &str) -> CairnResult<String> {
        let bytes = self.remote.download_asset(url)?;
        let name = format!("{capture_id}{}", infer_extension(url));
        let target = self.paths.inbox_assets_dir.join(&name);
        write_atomic(&target, &bytes).map_err(|err| {
            CairnError::io(format!("failed to write asset: {}", err.message))
        })?;
        Ok(name)
    }

    // Returns the stub path relative to the workspace root.
    fn write_stub(
        &self,
        record: &CaptureRecord,
        capture_id: CaptureId,
        asset: Option<&str>,
    ) -> CairnResult<String> {
        let captured_at = capture_time(record.created_at);
        let file_name = format!(
            "{}-{capture_id}.md",
            captured_at.format("%Y-%m-%dT%H-%M-%SZ")
        );
        let target = self.paths.inbox_new_dir.join(&file_name);

        let stub = render_stub(record, capture_id, captured_at, asset);
        write_atomic(&target, stub.as_bytes()).map_err(|err| {
            CairnError::io(format!("failed to write capture stub: {}", err.message))
        })?;

        Ok(format!("inbox/new/{file_name}"))
    }
}

fn capture_time(created_at_ms: f64) -> DateTime<Utc> {
    if created_at_ms.is_finite() && created_at_ms > 0.0 {
        DateTime::from_timestamp_millis(created_at_ms as i64).unwrap_or_else(Utc::now)
    } else {
        Utc::now()
    }
}

fn render_stub(
    record: &CaptureRecord,
    capture_id: CaptureId,
    captured_at: DateTime<Utc>,
    asset: Option<&str>,
) -> String {
    let source = non_empty(record.source.as_deref()).unwrap_or(DEFAULT_SOURCE);
    let content_type = non_empty(record.content_type.as_deref()).unwrap_or(DEFAULT_CONTENT_TYPE);

    let mut out = String::from("---\n");
    out.push_str(&format!("id: {capture_id}\n"));
    out.push_str(&format!("captured_at: {}\n", captured_at.to_rfc3339()));
    out.push_str(&format!("source: {}\n", header_value(source)));
    out.push_str(&format!("content_type: {}\n", header_value(content_type)));
    if let Some(name) = asset {
        out.push_str(&format!("assets: [\"../assets/{name}\"]\n"));
    }
    out.push_str("---\n\n");

    match non_empty(record.text.as_deref()) {
        Some(text) => out.push_str(text),
        None => out.push_str(&format!("[Capture from {source}]")),
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }

    out
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

/// Extension of the last path segment of `url`, `.jpg` when there is none.
pub fn infer_extension(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let without_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let path = without_scheme
        .split_once('/')
        .map(|(_, path)| path)
        .unwrap_or("");
    let segment = Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("");

    match segment.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 8
                && ext.chars().all(|ch| ch.is_ascii_alphanumeric()) =>
        {
            format!(".{ext}")
        }
        _ => DEFAULT_ASSET_EXTENSION.to_string(),
    }
}
