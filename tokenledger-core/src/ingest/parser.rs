//! Transcript JSONL parser
//!
//! Turns one transcript file into an ordered list of [`Event`]s.
//!
//! # Error Handling
//!
//! - **Malformed JSON lines**: recorded as [`IngestWarning::MalformedLine`],
//!   line skipped, parsing continues. The live agent appends to these files,
//!   so a truncated trailing line is expected and lands here.
//! - **Invalid UTF-8**: bytes are replaced with U+FFFD and the line is
//!   parsed as usual.
//! - **Missing file**: an empty transcript with [`IngestWarning::NotFound`].
//! - **Missing fields**: `#[serde(default)]` everywhere; absent usage carries
//!   the previous cumulative value forward.
//!
//! The file is streamed once; its length is never assumed stable.

use super::summary::{summarize_tool_result, summarize_tool_use};
use crate::diagnostics::IngestWarning;
use crate::error::{Error, Result};
use crate::format::{single_line, take_chars};
use crate::types::{Event, EventKind, TodoSnapshotEntry, TokenUsage, ToolUse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

/// Represents a single transcript line.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    uuid: Option<String>,
    parent_uuid: Option<String>,
    #[serde(alias = "session_id")]
    session_id: Option<String>,
    #[serde(rename = "type")]
    record_type: Option<String>,
    timestamp: Option<String>,
    is_sidechain: Option<bool>,
    message: Option<RawMessage>,
    todos: Option<Vec<RawTodo>>,
    tool_use_result: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    content: Option<RawContent>,
    usage: Option<RawUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    // Anything else is ignored rather than failing the whole line
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        content: serde_json::Value,
    },
    // Catch-all for thinking, image, ...
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawUsage {
    input_tokens: Option<u64>,
    cache_creation_input_tokens: Option<u64>,
    cache_read_input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawTodo {
    id: Option<serde_json::Value>,
    content: String,
    status: String,
    priority: Option<String>,
}

impl RawUsage {
    /// Overlay the counters present in this record onto the running totals.
    fn apply(&self, previous: TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens.unwrap_or(previous.input_tokens),
            cache_creation_input_tokens: self
                .cache_creation_input_tokens
                .unwrap_or(previous.cache_creation_input_tokens),
            cache_read_input_tokens: self
                .cache_read_input_tokens
                .unwrap_or(previous.cache_read_input_tokens),
            output_tokens: self.output_tokens.unwrap_or(previous.output_tokens),
        }
    }
}

impl From<&RawTodo> for TodoSnapshotEntry {
    fn from(raw: &RawTodo) -> Self {
        let item_id = match &raw.id {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        TodoSnapshotEntry {
            item_id,
            content: raw.content.clone(),
            status: raw.status.clone(),
            priority: raw.priority.clone().unwrap_or_default(),
        }
    }
}

/// Events and warnings read from one transcript file.
#[derive(Debug, Clone)]
pub struct SessionTranscript {
    pub session_id: String,
    pub path: PathBuf,
    /// False when the file did not exist
    pub found: bool,
    pub events: Vec<Event>,
    pub warnings: Vec<IngestWarning>,
}

/// Session id implied by a transcript path (`{session-id}.jsonl`).
pub fn session_id_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Parse a transcript file into events.
///
/// Only I/O failures other than "not found" are returned as errors.
pub fn parse_transcript(path: &Path) -> Result<SessionTranscript> {
    let fallback_id = session_id_from_path(path);

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Transcript not found");
            return Ok(SessionTranscript {
                session_id: fallback_id,
                path: path.to_path_buf(),
                found: false,
                events: Vec::new(),
                warnings: vec![IngestWarning::NotFound {
                    path: path.to_path_buf(),
                }],
            });
        }
        Err(e) => {
            return Err(Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open {}: {}", path.display(), e),
            )))
        }
    };

    let mut transcript = parse_lines(BufReader::new(file), &fallback_id);
    transcript.path = path.to_path_buf();

    tracing::debug!(
        path = %path.display(),
        session_id = %transcript.session_id,
        events = transcript.events.len(),
        warnings = transcript.warnings.len(),
        "Parsed transcript"
    );

    Ok(transcript)
}

/// Parse transcript lines from any reader.
///
/// Invalid UTF-8 is replaced rather than dropping the line. A read error
/// ends the stream with a warning.
pub fn parse_lines<R: BufRead>(mut reader: R, fallback_session_id: &str) -> SessionTranscript {
    let mut events = Vec::new();
    let mut warnings = Vec::new();
    let mut session_id: Option<String> = None;
    let mut cumulative = TokenUsage::default();
    let mut buf = Vec::new();
    let mut line_number = 0;

    loop {
        buf.clear();
        line_number += 1;
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(line = line_number, error = %e, "Transcript read failed");
                warnings.push(IngestWarning::MalformedLine {
                    line: line_number,
                    message: format!("read error: {}", e),
                });
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);

        if line.trim().is_empty() {
            continue;
        }

        let record: RawRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(line = line_number, error = %e, "Skipping malformed transcript line");
                warnings.push(IngestWarning::MalformedLine {
                    line: line_number,
                    message: e.to_string(),
                });
                continue;
            }
        };

        if session_id.is_none() {
            session_id = record.session_id.clone();
        }

        if let Some(usage) = record.message.as_ref().and_then(|m| m.usage.as_ref()) {
            cumulative = usage.apply(cumulative);
        }

        events.push(record_to_event(
            record,
            line_number,
            session_id.as_deref().unwrap_or(fallback_session_id),
            cumulative,
        ));
    }

    SessionTranscript {
        session_id: session_id.unwrap_or_else(|| fallback_session_id.to_string()),
        path: PathBuf::new(),
        found: true,
        events,
        warnings,
    }
}

fn record_to_event(
    record: RawRecord,
    line: usize,
    transcript_session: &str,
    cumulative_usage: TokenUsage,
) -> Event {
    let kind = EventKind::from_record_type(record.record_type.as_deref());
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_uses = Vec::new();
    let mut tool_todos: Option<Vec<TodoSnapshotEntry>> = None;
    let mut action: Option<String> = None;
    let describes_calls = matches!(kind, EventKind::Assistant | EventKind::Result);

    if let Some(content) = record.message.and_then(|m| m.content) {
        match content {
            RawContent::Text(text) => text_parts.push(text),
            RawContent::Blocks(blocks) => {
                for block in blocks {
                    match block {
                        ContentBlock::Text { text } => {
                            if describes_calls && action.is_none() {
                                action = Some(format!(
                                    "Response: {}...",
                                    single_line(take_chars(&text, 100))
                                ));
                            }
                            if !text.is_empty() {
                                text_parts.push(text);
                            }
                        }
                        ContentBlock::ToolUse { name, input } => {
                            if name == "TodoWrite" {
                                tool_todos = todos_from_tool_input(&input);
                            }
                            if describes_calls && action.is_none() {
                                action = Some(summarize_tool_use(&name, &input));
                            }
                            let text_field = |key: &str| {
                                input.get(key).and_then(|v| v.as_str()).map(str::to_string)
                            };
                            tool_uses.push(ToolUse {
                                description: text_field("description"),
                                prompt: text_field("prompt"),
                                name,
                            });
                        }
                        ContentBlock::ToolResult { content } => {
                            if kind == EventKind::User && action.is_none() {
                                let result = record.tool_use_result.as_ref().unwrap_or(&content);
                                action = Some(format!("Result: {}", summarize_tool_result(result)));
                            }
                        }
                        ContentBlock::Unknown => {}
                    }
                }
            }
            RawContent::Other(_) => {}
        }
    }

    let todo_snapshot = record
        .todos
        .as_ref()
        .map(|todos| todos.iter().map(TodoSnapshotEntry::from).collect())
        .or(tool_todos);

    Event {
        line,
        kind,
        session_id: record
            .session_id
            .unwrap_or_else(|| transcript_session.to_string()),
        uuid: record.uuid,
        parent_uuid: record.parent_uuid,
        is_side_chain: record.is_sidechain.unwrap_or(false),
        cumulative_usage,
        todo_snapshot,
        content: text_parts.join("\n"),
        tool_uses,
        action,
        timestamp: record
            .timestamp
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Extract a snapshot from `TodoWrite` tool input (`{"todos": [...]}`).
fn todos_from_tool_input(input: &serde_json::Value) -> Option<Vec<TodoSnapshotEntry>> {
    let todos: Vec<RawTodo> = serde_json::from_value(input.get("todos")?.clone()).ok()?;
    Some(todos.iter().map(TodoSnapshotEntry::from).collect())
}
