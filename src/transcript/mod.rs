use crate::metadata::ActionSummaryMeta;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::io::BufRead;

// ===================================================================
// Roles
// ===================================================================

/// Author of a conversation message. Anything other than `user` or
/// `assistant` (system notices, summaries) is `Other` and never survives
/// cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    #[serde(other)]
    Other,
}

// ===================================================================
// Top-level transcript entry, one per JSONL line
// ===================================================================

/// A single line in a Claude Code `.jsonl` transcript file.
///
/// Only the message payload matters to the bundler; bookkeeping fields
/// (uuids, timestamps, cwd, ...) are ignored. Lines without a `message`
/// (progress, file-history snapshots, queue operations) still parse so
/// the trimmer sees the full sequence.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptEntry {
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

/// `message.content` can be a plain string (user text) or an array of
/// content blocks (assistant responses, tool results).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    /// Anything else (null, objects) is carried through verbatim.
    Other(Value),
}

impl TranscriptEntry {
    /// Content blocks of an assistant message; empty for everything else.
    pub fn assistant_blocks(&self) -> &[ContentBlock] {
        match &self.message {
            Some(Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(blocks),
            }) => blocks,
            _ => &[],
        }
    }

    /// Assistant `tool_use` blocks in message order.
    pub fn tool_uses(&self) -> impl Iterator<Item = &ToolUseBlock> {
        self.assistant_blocks().iter().filter_map(|b| match b {
            ContentBlock::ToolUse(tu) => Some(tu),
            _ => None,
        })
    }
}

// ===================================================================
// Content blocks inside message.content[]
// ===================================================================

/// A decoded content block.
///
/// Blocks whose `type` is unrecognised, or whose fields don't match the
/// expected shape, are kept as `Unknown` with their raw JSON so they
/// serialize back exactly as they were read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text(TextBlock),
    #[serde(rename = "tool_use")]
    ToolUse(ToolUseBlock),
    #[serde(rename = "tool_result")]
    ToolResult(ToolResultBlock),
    #[serde(untagged)]
    Unknown(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    #[serde(default)]
    pub content: Value,
    /// Summarization statistics. Internal only, stripped before persistence.
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ActionSummaryMeta>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentBlock {
    /// Decode a raw JSON block, falling back to `Unknown` on any mismatch.
    pub fn from_value(raw: Value) -> Self {
        let decoded = match raw.get("type").and_then(Value::as_str) {
            Some("text") => decode_fields(&raw).map(ContentBlock::Text),
            Some("tool_use") => decode_fields(&raw).map(ContentBlock::ToolUse),
            Some("tool_result") => decode_fields(&raw).map(ContentBlock::ToolResult),
            _ => None,
        };
        decoded.unwrap_or(ContentBlock::Unknown(raw))
    }
}

/// Deserialize a block body with its `type` tag removed, so the flattened
/// `extra` map never holds a second copy of the tag.
fn decode_fields<T: DeserializeOwned>(raw: &Value) -> Option<T> {
    let mut fields = raw.as_object()?.clone();
    fields.remove("type");
    serde_json::from_value(Value::Object(fields)).ok()
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(ContentBlock::from_value)
    }
}

// ===================================================================
// Transcript: parsed JSONL in file order
// ===================================================================

/// A parsed Claude Code JSONL transcript.
///
/// Parsing is per-line skip-and-continue: a malformed line is reported
/// and dropped, the rest of the file still loads.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

/// A line that failed to parse (1-based line number and error).
pub type LineError = (usize, String);

impl Transcript {
    /// Parse a JSONL transcript from a reader one line at a time, so the
    /// raw file never has to sit in memory next to the parsed entries.
    ///
    /// Lines are split on raw bytes: a line that is not valid UTF-8 is a
    /// malformed line like any other. Only a failing read is an error.
    pub fn from_reader<R: BufRead>(reader: R) -> std::io::Result<(Self, Vec<LineError>)> {
        let mut entries = Vec::new();
        let mut errors = Vec::new();
        for (i, line) in reader.split(b'\n').enumerate() {
            let line = line?;
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<TranscriptEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => errors.push((i + 1, format!("{e}"))),
            }
        }
        Ok((Self { entries }, errors))
    }

    pub fn into_entries(self) -> Vec<TranscriptEntry> {
        self.entries
    }
}
