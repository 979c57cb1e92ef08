use crate::transcript::TranscriptEntry;
use serde_json::Value;
use std::collections::HashMap;

/// The originating call of a tool result.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUseRecord {
    pub name: String,
    pub input: Value,
}

/// `tool_use` id → call, built in one forward pass before any result is
/// summarized (a result may reference a call from an earlier entry).
#[derive(Debug, Default)]
pub struct ToolUseIndex {
    by_id: HashMap<String, ToolUseRecord>,
}

impl ToolUseIndex {
    /// Index every assistant `tool_use` block with a non-empty id.
    /// A repeated id overwrites the earlier record.
    pub fn build(entries: &[TranscriptEntry]) -> Self {
        let mut by_id = HashMap::new();
        for tu in entries.iter().flat_map(|e| e.tool_uses()) {
            if tu.id.is_empty() {
                continue;
            }
            by_id.insert(
                tu.id.clone(),
                ToolUseRecord {
                    name: tu.name.clone(),
                    input: tu.input.clone(),
                },
            );
        }
        Self { by_id }
    }

    pub fn get(&self, tool_use_id: &str) -> Option<&ToolUseRecord> {
        self.by_id.get(tool_use_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }
}
