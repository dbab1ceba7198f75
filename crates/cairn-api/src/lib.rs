//! Client side of the remote note store.
//!
//! The engines only see [`RemoteStore`]; [`ConvexRemote`] implements it over the Convex HTTP
//! function API (`/api/query`, `/api/mutation`).

use cairn_core::version::{deserialize_optional_version, deserialize_version};
use cairn_core::{CairnError, CairnResult, ErrorKind};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::thread;
use std::time::Duration;

pub const NOTES_FOR_SYNC: &str = "notes:getForSync";
pub const NOTES_UPSERT: &str = "notes:upsert";
pub const CAPTURES_UNSYNCED: &str = "captures:getUnsynced";
pub const CAPTURES_MARK_SYNCED: &str = "captures:markSynced";

const DEFAULT_MAX_RETRIES: u32 = 3;
const USER_AGENT: &str = concat!("cairn/", env!("CARGO_PKG_VERSION"));

/// The operations the sync engines need from the authoritative store.
pub trait RemoteStore {
    fn fetch_notes(&self) -> CairnResult<Vec<RemoteNote>>;

    /// Guarded write: when `expected_version` is set and differs from the stored version,
    /// the store must reject the write and leave the note untouched.
    fn upsert_note(&self, write: &NoteWrite) -> CairnResult<UpsertOutcome>;

    fn fetch_unsynced_captures(&self) -> CairnResult<Vec<CaptureRecord>>;

    fn mark_captures_synced(&self, ids: &[String]) -> CairnResult<()>;

    fn download_asset(&self, url: &str) -> CairnResult<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNote {
    pub path: String,
    #[serde(rename = "jdId")]
    pub jd_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "first_version", deserialize_with = "deserialize_version")]
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteWrite {
    #[serde(rename = "jdId")]
    pub jd_id: String,
    pub path: String,
    pub title: String,
    pub content: String,
    #[serde(
        rename = "expectedVersion",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_version"
    )]
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created {
        #[serde(deserialize_with = "deserialize_version")]
        version: i64,
    },
    Updated {
        #[serde(deserialize_with = "deserialize_version")]
        version: i64,
    },
    Conflict {
        #[serde(rename = "currentVersion", deserialize_with = "deserialize_version")]
        current_version: i64,
        #[serde(rename = "expectedVersion", deserialize_with = "deserialize_version")]
        expected_version: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    #[serde(rename = "_id")]
    pub id: String,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "createdAt")]
    pub created_at: f64,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(rename = "fileUrl", default)]
    pub file_url: Option<String>,
}

fn first_version() -> i64 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Query,
    Mutation,
}

impl FunctionKind {
    fn endpoint(self) -> &'static str {
        match self {
            FunctionKind::Query => "/api/query",
            FunctionKind::Mutation => "/api/mutation",
        }
    }
}

#[derive(Debug, Deserialize)]
struct FunctionEnvelope {
    status: Option<String>,
    #[serde(default)]
    value: Value,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
    message: Option<String>,
    code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConvexRemote {
    base_url: String,
    client: Client,
    max_retries: u32,
}

impl ConvexRemote {
    pub fn new(base_url: &str, timeout: Duration) -> CairnResult<Self> {
        let trimmed = base_url.trim().trim_end_matches('/').to_string();
        if trimmed.is_empty() {
            return Err(CairnError::config("remote URL cannot be empty"));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| CairnError::io(format!("failed to construct remote client: {err}")))?;

        Ok(Self {
            base_url: trimmed,
            client,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn query<T: DeserializeOwned>(&self, path: &str, args: Value) -> CairnResult<T> {
        let mut attempt = 0u32;
        loop {
            match self.call(FunctionKind::Query, path, &args) {
                Ok(value) => return decode_value(path, value),
                Err(error) if attempt < self.max_retries && is_retryable_remote_error(&error) => {
                    tracing::debug!(function = path, attempt, error = %error.message, "retrying query");
                    thread::sleep(backoff_duration(attempt));
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    // Sent exactly once, never retried.
    fn mutation<T: DeserializeOwned>(&self, path: &str, args: Value) -> CairnResult<T> {
        let value = self.call(FunctionKind::Mutation, path, &args)?;
        decode_value(path, value)
    }

    fn call(&self, kind: FunctionKind, path: &str, args: &Value) -> CairnResult<Value> {
        let body = json!({
            "path": path,
            "args": args,
            "format": "json",
        });

        let response = self
            .client
            .post(self.url(kind.endpoint()))
            .json(&body)
            .send()
            .map_err(network_error)?;

        let envelope: FunctionEnvelope = parse_json_response(response)?;
        match envelope.status.as_deref() {
            Some("error") => Err(CairnError::remote(format!(
                "remote function '{path}' failed: {}",
                envelope
                    .error_message
                    .unwrap_or_else(|| "unknown error".to_string())
            ))),
            _ => Ok(envelope.value),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl RemoteStore for ConvexRemote {
    fn fetch_notes(&self) -> CairnResult<Vec<RemoteNote>> {
        let notes: Option<Vec<RemoteNote>> = self.query(NOTES_FOR_SYNC, json!({}))?;
        Ok(notes.unwrap_or_default())
    }

    fn upsert_note(&self, write: &NoteWrite) -> CairnResult<UpsertOutcome> {
        let args = serde_json::to_value(write)
            .map_err(|err| CairnError::io(format!("failed to encode note write: {err}")))?;
        self.mutation(NOTES_UPSERT, args)
    }

    fn fetch_unsynced_captures(&self) -> CairnResult<Vec<CaptureRecord>> {
        let captures: Option<Vec<CaptureRecord>> = self.query(CAPTURES_UNSYNCED, json!({}))?;
        Ok(captures.unwrap_or_default())
    }

    fn mark_captures_synced(&self, ids: &[String]) -> CairnResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let _: Value = self.mutation(CAPTURES_MARK_SYNCED, json!({ "ids": ids }))?;
        Ok(())
    }

    fn download_asset(&self, url: &str) -> CairnResult<Vec<u8>> {
        let response = self.client.get(url).send().map_err(network_error)?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().unwrap_or_default();
            return Err(parse_error_response(status, &body_text));
        }

        let bytes = response
            .bytes()
            .map_err(|err| CairnError::remote(format!("failed to read asset body: {err}")))?;
        Ok(bytes.to_vec())
    }
}

fn decode_value<T: DeserializeOwned>(path: &str, value: Value) -> CairnResult<T> {
    serde_json::from_value::<T>(value).map_err(|err| {
        CairnError::remote(format!(
            "failed to map '{path}' response to expected shape: {err}"
        ))
    })
}

fn parse_json_response<T: DeserializeOwned>(response: Response) -> CairnResult<T> {
    let status = response.status();
    let body_text = response.text().unwrap_or_default();

    if !status.is_success() {
        return Err(parse_error_response(status, &body_text));
    }

    serde_json::from_str::<T>(&body_text)
        .map_err(|err| CairnError::remote(format!("failed to decode remote response JSON: {err}")))
}

fn parse_error_response(status: StatusCode, body_text: &str) -> CairnError {
    let body_trimmed = body_text.trim();
    let fallback = if body_trimmed.is_empty() {
        format!("request failed with status {}", status.as_u16())
    } else {
        format!(
            "request failed with status {}: {}",
            status.as_u16(),
            truncate_for_error(body_trimmed, 240)
        )
    };

    let parsed = serde_json::from_str::<ErrorEnvelope>(body_text).ok();
    let message = parsed
        .as_ref()
        .and_then(|payload| payload.error_message.clone())
        .or_else(|| parsed.as_ref().and_then(|payload| payload.message.clone()))
        .unwrap_or(fallback);
    let tagged_message = parsed
        .as_ref()
        .and_then(|payload| payload.code.as_ref())
        .map(|code| format!("{message} ({code})"))
        .unwrap_or(message);

    CairnError::remote(format!(
        "{} [http_status={}]",
        tagged_message,
        status.as_u16()
    ))
}

fn truncate_for_error(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }

    let truncated: String = input.chars().take(max_chars).collect();
    format!("{truncated}...")
}

fn network_error(err: reqwest::Error) -> CairnError {
    CairnError::remote(format!("network request failed: {err}"))
}

fn is_retryable_remote_error(error: &CairnError) -> bool {
    if error.kind != ErrorKind::Remote {
        return false;
    }

    if error.message.contains("network request failed") {
        return true;
    }

    let Some(status) = extract_http_status(&error.message) else {
        return false;
    };

    status >= 500 || status == 429
}

fn extract_http_status(message: &str) -> Option<u16> {
    let marker = "[http_status=";
    let start = message.find(marker)?;
    let rest = &message[start + marker.len()..];
    let end = rest.find(']')?;
    rest[..end].parse::<u16>().ok()
}

fn backoff_duration(attempt: u32) -> Duration {
    let base_ms = 250u64;
    let multiplier = 1u64 << attempt.min(6);
    Duration::from_millis(base_ms * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_outcome_is_a_closed_tagged_result() {
        let created: UpsertOutcome =
            serde_json::from_value(json!({"action": "created", "id": "abc", "version": 1}))
                .expect("created");
        assert_eq!(created, UpsertOutcome::Created { version: 1 });

        let conflict: UpsertOutcome = serde_json::from_value(json!({
            "action": "conflict",
            "id": "abc",
            "currentVersion": 4,
            "expectedVersion": 3
        }))
        .expect("conflict");
        assert_eq!(
            conflict,
            UpsertOutcome::Conflict {
                current_version: 4,
                expected_version: 3
            }
        );

        let unknown = serde_json::from_value::<UpsertOutcome>(json!({"action": "merged"}));
        assert!(unknown.is_err());
    }

    #[test]
    fn note_write_omits_guard_when_absent() {
        let write = NoteWrite {
            jd_id: "50.01".to_string(),
            path: "50-events/a.md".to_string(),
            title: "A".to_string(),
            content: "body".to_string(),
            expected_version: None,
        };
        let encoded = serde_json::to_value(&write).expect("encode");
        assert_eq!(encoded["jdId"], "50.01");
        assert!(encoded.get("expectedVersion").is_none());
    }

    #[test]
    fn remote_note_version_defaults_to_one() {
        let note: RemoteNote = serde_json::from_value(json!({
            "_id": "x",
            "path": "20-projects/a.md",
            "jdId": "20.01",
            "title": "A",
            "content": "body",
            "updatedAt": 1.0
        }))
        .expect("note");
        assert_eq!(note.version, 1);
    }

    #[test]
    fn float_versions_from_the_store_decode_as_integers() {
        let note: RemoteNote = serde_json::from_str(
            r#"{"path": "20-projects/a.md", "jdId": "20.01", "title": "A", "content": "", "version": 3.0}"#,
        )
        .expect("note");
        assert_eq!(note.version, 3);

        let updated: UpsertOutcome =
            serde_json::from_str(r#"{"action": "updated", "id": "n1", "version": 4.0}"#)
                .expect("updated");
        assert_eq!(updated, UpsertOutcome::Updated { version: 4 });

        let conflict: UpsertOutcome = serde_json::from_str(
            r#"{"action": "conflict", "id": "n1", "currentVersion": 5.0, "expectedVersion": 3}"#,
        )
        .expect("conflict");
        assert_eq!(
            conflict,
            UpsertOutcome::Conflict {
                current_version: 5,
                expected_version: 3
            }
        );

        let write: NoteWrite = serde_json::from_str(
            r#"{"jdId": "20.01", "path": "a.md", "title": "A", "content": "", "expectedVersion": 2.0}"#,
        )
        .expect("write");
        assert_eq!(write.expected_version, Some(2));
    }

    #[test]
    fn fractional_or_negative_versions_are_rejected() {
        let fractional = serde_json::from_str::<RemoteNote>(
            r#"{"path": "a.md", "jdId": "00.00", "version": 2.5}"#,
        );
        assert!(fractional.is_err());

        let negative = serde_json::from_str::<UpsertOutcome>(
            r#"{"action": "created", "id": "n1", "version": -1}"#,
        );
        assert!(negative.is_err());
    }

    #[test]
    fn retryable_error_classification_matches_network_and_http_status() {
        assert!(is_retryable_remote_error(&CairnError::remote(
            "network request failed: connection reset"
        )));
        assert!(is_retryable_remote_error(&CairnError::remote(
            "request failed [http_status=429]"
        )));
        assert!(is_retryable_remote_error(&CairnError::remote(
            "request failed [http_status=503]"
        )));
        assert!(!is_retryable_remote_error(&CairnError::remote(
            "request failed [http_status=400]"
        )));
        assert!(!is_retryable_remote_error(&CairnError::io(
            "request failed [http_status=500]"
        )));
    }

    #[test]
    fn backoff_duration_uses_exponential_steps_with_cap() {
        assert_eq!(backoff_duration(0), Duration::from_millis(250));
        assert_eq!(backoff_duration(1), Duration::from_millis(500));
        assert_eq!(backoff_duration(6), Duration::from_millis(16000));
        assert_eq!(backoff_duration(10), Duration::from_millis(16000));
    }

    #[test]
    fn error_response_prefers_remote_error_message() {
        let error = parse_error_response(
            StatusCode::BAD_REQUEST,
            r#"{"code":"BadJsonBody","message":"bad args"}"#,
        );
        assert_eq!(error.kind, ErrorKind::Remote);
        assert_eq!(error.message, "bad args (BadJsonBody) [http_status=400]");
    }
}
