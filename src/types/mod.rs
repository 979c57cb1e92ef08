use serde::{Deserialize, Serialize};

// ===================================================================
// Hook Input Types (received via stdin, snake_case JSON)
// ===================================================================

/// Fields shared by all hook event inputs.
#[derive(Debug, Clone, Deserialize)]
pub struct CommonInput {
    pub session_id: String,
    pub transcript_path: String,
    pub cwd: String,
}

#[derive(Debug, Deserialize)]
pub struct PreToolUseInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: serde_json::Value,
}

/// Top-level hook input, deserialized from stdin JSON.
///
/// Tagged by the `hook_event_name` field. Only `PreToolUse` drives the
/// bundler; every other event deserializes to `Other` and is ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "hook_event_name")]
pub enum HookInput {
    PreToolUse(PreToolUseInput),
    #[serde(other)]
    Other,
}

// ===================================================================
// Tool-Specific Input Types
// ===================================================================
//
// Only the fields the action summaries need are required. Anything else a
// tool sends is ignored.

#[derive(Debug, Clone, Deserialize)]
pub struct BashToolInput {
    pub command: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilePathToolInput {
    pub file_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobToolInput {
    pub pattern: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrepToolInput {
    pub pattern: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebFetchToolInput {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchToolInput {
    pub query: String,
}

/// Input of the delegating `Task` tool. Every field is optional because the
/// coordinator reads `subagent_type` from partially-populated payloads too.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskToolInput {
    #[serde(default)]
    pub subagent_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

// ===================================================================
// Hook Output Types (written to stdout as JSON, camelCase)
// ===================================================================

/// Top-level hook output written to stdout on exit code 0.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    /// Message shown to the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
}

#[cfg(test)]
mod tests;
