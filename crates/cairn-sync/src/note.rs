//! Local note files: the `---` metadata header, identity and title derivation.

use cairn_api::RemoteNote;
use cairn_core::version::integral_version;
use cairn_core::{CairnError, CairnResult};
use std::fs;
use std::path::Path;

pub const DEFAULT_JD_ID: &str = "00.00";
pub const HEADER_DELIMITER: &str = "---";

/// Flat `key: value` view of a note header. Nested YAML (lists, maps) is ignored; the
/// engines only read scalar fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteHeader {
    fields: Vec<(String, String)>,
}

impl NoteHeader {
    pub fn parse(block: &str) -> Self {
        let mut fields = Vec::new();

        for line in block.lines() {
            if line.trim().is_empty()
                || line.starts_with(char::is_whitespace)
                || line.starts_with('#')
                || line.starts_with('-')
            {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };

            let key = key.trim();
            if key.is_empty() {
                continue;
            }

            fields.push((key.to_string(), unquote(value)));
        }

        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }

    pub fn jd_id(&self) -> Option<&str> {
        self.get("jdId")
    }

    pub fn title(&self) -> Option<&str> {
        self.get("title")
    }

    /// Version recorded by the last downstream sync. Advisory only.
    pub fn version(&self) -> Option<i64> {
        let value = self.get("version")?;
        value
            .parse::<i64>()
            .ok()
            .or_else(|| value.parse::<f64>().ok().and_then(integral_version))
    }
}

/// A note file as read from disk, addressed by its workspace-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalNote {
    pub relative_path: String,
    pub header: NoteHeader,
    pub body: String,
}

impl LocalNote {
    pub fn read(absolute: &Path, relative_path: &str) -> CairnResult<Self> {
        let raw = fs::read_to_string(absolute).map_err(|err| {
            CairnError::io(format!(
                "failed to read note '{}': {}",
                absolute.display(),
                err
            ))
        })?;

        Ok(Self::parse(relative_path, &raw))
    }

    pub fn parse(relative_path: &str, raw: &str) -> Self {
        let (header, body) = split_header(raw);
        Self {
            relative_path: relative_path.to_string(),
            header: header.map(NoteHeader::parse).unwrap_or_default(),
            body: trim_leading_blank_lines(body).to_string(),
        }
    }

    pub fn jd_id(&self) -> String {
        IDENTITY_CHAIN
            .iter()
            .find_map(|extract| extract(self))
            .unwrap_or_else(|| DEFAULT_JD_ID.to_string())
    }

    pub fn title(&self) -> String {
        TITLE_CHAIN
            .iter()
            .find_map(|extract| extract(self))
            .unwrap_or_else(|| "Untitled".to_string())
    }

    fn file_stem(&self) -> Option<&str> {
        Path::new(&self.relative_path)
            .file_stem()
            .and_then(|stem| stem.to_str())
    }

    fn folder_name(&self) -> Option<&str> {
        Path::new(&self.relative_path)
            .parent()
            .and_then(|parent| parent.file_name())
            .and_then(|name| name.to_str())
    }
}

type Extractor = fn(&LocalNote) -> Option<String>;

/// Tried in order; the first hit wins.
const IDENTITY_CHAIN: [Extractor; 3] = [
    identity_from_header,
    identity_from_file_name,
    identity_from_folder,
];

const TITLE_CHAIN: [Extractor; 3] = [title_from_header, title_from_heading, title_from_file_name];

fn identity_from_header(note: &LocalNote) -> Option<String> {
    note.header.jd_id().map(|value| value.trim().to_string())
}

// `50.01-local-events.md` -> `50.01`
fn identity_from_file_name(note: &LocalNote) -> Option<String> {
    note.file_stem()
        .and_then(leading_decimal)
        .map(ToString::to_string)
}

// `50-events/local-events.md` -> `50.00`
fn identity_from_folder(note: &LocalNote) -> Option<String> {
    note.folder_name()
        .and_then(leading_digits)
        .map(|digits| format!("{digits}.00"))
}

fn title_from_header(note: &LocalNote) -> Option<String> {
    note.header.title().map(|value| value.trim().to_string())
}

fn title_from_heading(note: &LocalNote) -> Option<String> {
    note.body
        .lines()
        .filter_map(|line| line.strip_prefix("# "))
        .map(str::trim)
        .find(|heading| !heading.is_empty())
        .map(ToString::to_string)
}

fn title_from_file_name(note: &LocalNote) -> Option<String> {
    let stem = note.file_stem()?;
    let spaced = stem.replace(['-', '_'], " ");
    let titled = title_case(spaced.trim());
    (!titled.is_empty()).then_some(titled)
}

fn leading_digits(input: &str) -> Option<&str> {
    let end = input
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map(|(idx, _)| idx)
        .unwrap_or(input.len());
    (end > 0).then(|| &input[..end])
}

fn leading_decimal(input: &str) -> Option<&str> {
    let whole = leading_digits(input)?;
    let rest = input[whole.len()..].strip_prefix('.')?;
    let fraction = leading_digits(rest)?;
    Some(&input[..whole.len() + 1 + fraction.len()])
}

/// Upper-cases the first letter of every alphabetic run and lower-cases the rest.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut previous_alpha = false;

    for ch in input.chars() {
        if ch.is_alphabetic() {
            if previous_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            previous_alpha = true;
        } else {
            out.push(ch);
            previous_alpha = false;
        }
    }

    out
}

/// Splits a leading `---` block off `raw`. Without a closing delimiter the whole text is body.
pub fn split_header(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))
    else {
        return (None, raw);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == HEADER_DELIMITER {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }

    (None, raw)
}

/// Body of `content` with any header block removed.
pub fn strip_header(content: &str) -> &str {
    let (_, body) = split_header(content);
    trim_leading_blank_lines(body)
}

fn trim_leading_blank_lines(body: &str) -> &str {
    body.trim_start_matches(['\n', '\r'])
}

/// Full file contents for a note pulled from the remote.
pub fn render_synced_note(note: &RemoteNote, synced_at: &str) -> String {
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("jdId: {}\n", quote(&note.jd_id)));
    out.push_str(&format!("title: {}\n", quote(&note.title)));
    out.push_str(&format!("version: {}\n", note.version));
    out.push_str(&format!("synced_at: {}\n", quote(synced_at)));
    out.push_str("---\n\n");
    out.push_str(strip_header(&note.content));
    out
}

/// Double-quoted scalar; JSON string escapes are valid YAML escapes.
pub fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value.replace('"', "\\\"")))
}

/// Plain scalar when it is unambiguous, quoted otherwise.
pub fn header_value(value: &str) -> String {
    let plain = !value.is_empty()
        && value.trim() == value
        && value
            .chars()
            .all(|ch| ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ' ' | '+'));

    if plain {
        value.to_string()
    } else {
        quote(value)
    }
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        if let Ok(decoded) = serde_json::from_str::<String>(value) {
            return decoded;
        }
        return value[1..value.len() - 1].to_string();
    }

    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].replace("''", "'");
    }

    value.to_string()
}
