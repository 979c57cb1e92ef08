use crate::transcript::TranscriptEntry;

/// Tools whose first use marks the start of implementation work.
pub const DEFAULT_IMPLEMENTATION_TOOLS: &[&str] = &["Edit", "MultiEdit", "Write"];

/// Does this entry contain an assistant `tool_use` of one of `tools`?
fn starts_implementation<S: AsRef<str>>(entry: &TranscriptEntry, tools: &[S]) -> bool {
    entry
        .tool_uses()
        .any(|tu| tools.iter().any(|t| t.as_ref() == tu.name))
}

/// Index of the first entry that starts implementation work.
pub fn implementation_start<S: AsRef<str>>(
    entries: &[TranscriptEntry],
    tools: &[S],
) -> Option<usize> {
    entries.iter().position(|e| starts_implementation(e, tools))
}

/// Drop everything before the first implementation tool call.
///
/// The returned suffix includes the triggering entry. When no entry
/// qualifies the whole transcript is discarded.
pub fn trim_prework<S: AsRef<str>>(
    mut entries: Vec<TranscriptEntry>,
    tools: &[S],
) -> Vec<TranscriptEntry> {
    match implementation_start(&entries, tools) {
        Some(start) => entries.split_off(start),
        None => Vec::new(),
    }
}
