use crate::metadata::{ActionSummaryMeta, EntryMeta};
use crate::tokens::CountTokens;
use crate::tool_index::{ToolUseIndex, ToolUseRecord};
use crate::transcript::{ContentBlock, MessageContent, Role, TranscriptEntry};
use crate::types::{
    BashToolInput, FilePathToolInput, GlobToolInput, GrepToolInput, TaskToolInput,
    WebFetchToolInput, WebSearchToolInput,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Summary used when a result can't be traced back to its call.
pub const UNKNOWN_ACTION: &str = "Unknown action";

/// Keys scanned, in order, to describe a tool that has no dedicated
/// formatter.
const FALLBACK_KEYS: &[&str] = &[
    "file_path",
    "path",
    "command",
    "pattern",
    "query",
    "url",
    "description",
];

/// Values longer than this many characters are cut for display.
const DISPLAY_LIMIT: usize = 100;
/// Characters kept when a value is cut; an ellipsis fills the rest.
const DISPLAY_KEEP: usize = 97;

/// Default ceiling for the head/tail truncation strategy.
pub const DEFAULT_TRUNCATE_MAX_TOKENS: usize = 1500;

// ===================================================================
// Cleaned entries
// ===================================================================

/// A user or assistant message after summarization. `meta` is internal
/// and stripped before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedEntry {
    pub role: Role,
    pub content: MessageContent,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<EntryMeta>,
}

/// What to do with a string tool result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStrategy {
    /// Replace it with a one-line action summary.
    #[default]
    Summarize,
    /// Keep a head and tail slice when it is over the token ceiling.
    Truncate,
}

// ===================================================================
// Summary registry
// ===================================================================

/// Builds a one-line summary from a tool's input. Returning `None` (input
/// doesn't have the expected shape) falls through to the generic summary.
pub type SummaryFn = Box<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Tool name → summary formatter.
///
/// `SummaryRegistry::default()` knows the built-in Claude Code tools;
/// `register` adds or replaces a formatter.
pub struct SummaryRegistry {
    formatters: HashMap<String, SummaryFn>,
}

impl SummaryRegistry {
    /// A registry with no formatters: every tool gets the generic summary.
    pub fn empty() -> Self {
        Self {
            formatters: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, tool_name: &str, formatter: F) -> &mut Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        self.formatters.insert(tool_name.to_string(), Box::new(formatter));
        self
    }

    /// One-line description of the call that produced a result.
    pub fn summarize(&self, record: Option<&ToolUseRecord>) -> String {
        let Some(record) = record else {
            return UNKNOWN_ACTION.to_string();
        };
        self.formatters
            .get(&record.name)
            .and_then(|format| format(&record.input))
            .unwrap_or_else(|| generic_summary(&record.name, &record.input))
    }
}

impl Default for SummaryRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register("Read", |i| file_action("Read", i))
            .register("Write", |i| file_action("Write", i))
            .register("Edit", |i| file_action("Edit", i))
            .register("MultiEdit", |i| file_action("MultiEdit", i))
            .register("Bash", |i| {
                decode::<BashToolInput>(i).map(|b| format!("Bash: {}", b.command))
            })
            .register("Glob", |i| {
                decode::<GlobToolInput>(i).map(|g| format!("Glob: {}", g.pattern))
            })
            .register("Grep", |i| {
                decode::<GrepToolInput>(i).map(|g| match g.path {
                    Some(path) => format!("Grep: {} in {path}", g.pattern),
                    None => format!("Grep: {}", g.pattern),
                })
            })
            .register("TodoWrite", |_| Some("TodoWrite: Updated task list".to_string()))
            .register("WebFetch", |i| {
                decode::<WebFetchToolInput>(i).map(|w| format!("WebFetch: {}", w.url))
            })
            .register("WebSearch", |i| {
                decode::<WebSearchToolInput>(i).map(|w| format!("WebSearch: {}", w.query))
            })
            .register("Task", |i| {
                let task = decode::<TaskToolInput>(i)?;
                Some(format!(
                    "Task: {} - {}",
                    task.subagent_type?,
                    task.description?
                ))
            });
        registry
    }
}

fn decode<T: DeserializeOwned>(input: &Value) -> Option<T> {
    T::deserialize(input).ok()
}

fn file_action(label: &str, input: &Value) -> Option<String> {
    decode::<FilePathToolInput>(input).map(|f| format!("{label}: {}", f.file_path))
}

/// `"{tool}: {value}"` from the first populated fallback key, or
/// `"{tool}: executed"`.
fn generic_summary(tool_name: &str, input: &Value) -> String {
    let value = FALLBACK_KEYS
        .iter()
        .filter_map(|key| input.get(*key))
        .find(|v| !v.is_null());
    match value {
        Some(Value::String(s)) => format!("{tool_name}: {}", truncate_display(s)),
        Some(other) => format!("{tool_name}: {}", truncate_display(&other.to_string())),
        None => format!("{tool_name}: executed"),
    }
}

/// Cut to 97 characters plus `...` when longer than 100 characters.
fn truncate_display(s: &str) -> String {
    if s.chars().count() <= DISPLAY_LIMIT {
        return s.to_string();
    }
    let end = s
        .char_indices()
        .nth(DISPLAY_KEEP)
        .map_or(s.len(), |(i, _)| i);
    format!("{}...", &s[..end])
}

// ===================================================================
// Head/tail truncation
// ===================================================================

/// Keep the start and end of `text` so the result fits roughly within
/// `max_tokens`. The character budget comes from the text's own
/// chars-per-token ratio. `None` if the text is already within budget.
pub fn truncate_head_tail<C: CountTokens + ?Sized>(
    text: &str,
    max_tokens: usize,
    counter: &C,
) -> Option<String> {
    let tokens = counter.count(text);
    if tokens <= max_tokens {
        return None;
    }
    let chars = text.chars().count();
    let keep = chars * max_tokens / tokens;
    let head_chars = keep / 2;
    let tail_chars = keep - head_chars;

    let byte_at = |n: usize| text.char_indices().nth(n).map_or(text.len(), |(i, _)| i);
    let head = &text[..byte_at(head_chars)];
    let tail = &text[byte_at(chars - tail_chars)..];
    let dropped = tokens.saturating_sub(counter.count(head) + counter.count(tail));
    Some(format!(
        "{head}\n\n[... {dropped} tokens truncated ...]\n\n{tail}"
    ))
}

// ===================================================================
// Summarizer
// ===================================================================

/// Turns trimmed transcript entries into cleaned entries: flattens simple
/// user prompts and shrinks string tool results.
pub struct Summarizer<'a, C: CountTokens + ?Sized> {
    index: &'a ToolUseIndex,
    registry: &'a SummaryRegistry,
    counter: &'a C,
    strategy: ResultStrategy,
    truncate_max_tokens: usize,
}

impl<'a, C: CountTokens + ?Sized> Summarizer<'a, C> {
    pub fn new(index: &'a ToolUseIndex, registry: &'a SummaryRegistry, counter: &'a C) -> Self {
        Self {
            index,
            registry,
            counter,
            strategy: ResultStrategy::Summarize,
            truncate_max_tokens: DEFAULT_TRUNCATE_MAX_TOKENS,
        }
    }

    pub fn with_strategy(mut self, strategy: ResultStrategy, truncate_max_tokens: usize) -> Self {
        self.strategy = strategy;
        self.truncate_max_tokens = truncate_max_tokens;
        self
    }

    /// Clean every entry, dropping those that aren't user or assistant
    /// messages. Order is preserved.
    pub fn clean_all(&self, entries: Vec<TranscriptEntry>) -> Vec<CleanedEntry> {
        entries
            .into_iter()
            .filter_map(|e| self.clean_entry(e))
            .collect()
    }

    pub fn clean_entry(&self, entry: TranscriptEntry) -> Option<CleanedEntry> {
        let message = entry.message?;
        if !matches!(message.role, Role::User | Role::Assistant) {
            return None;
        }

        let mut content = message.content;
        let mut stats = EntryMeta::default();
        if let MessageContent::Blocks(blocks) = &mut content {
            for block in blocks.iter_mut() {
                self.shrink_block(block, &mut stats);
            }
        }
        if message.role == Role::User {
            content = flatten_single_text(content);
        }

        Some(CleanedEntry {
            role: message.role,
            content,
            meta: stats.was_summarized.then_some(stats),
        })
    }

    /// Replace a string tool result in place. Any other block, or a
    /// replacement that would not be smaller, is left untouched.
    fn shrink_block(&self, block: &mut ContentBlock, stats: &mut EntryMeta) {
        let ContentBlock::ToolResult(result) = block else {
            return;
        };
        let Value::String(original) = &result.content else {
            return;
        };

        let record = self.index.get(&result.tool_use_id);
        let replacement = match self.strategy {
            ResultStrategy::Summarize => self.registry.summarize(record),
            ResultStrategy::Truncate => {
                match truncate_head_tail(original, self.truncate_max_tokens, self.counter) {
                    Some(t) => t,
                    None => return,
                }
            }
        };

        let original_tokens = self.counter.count(original);
        let summary_tokens = self.counter.count(&replacement);
        if summary_tokens > original_tokens {
            return;
        }

        stats.was_summarized = true;
        stats.summarized_results += 1;
        stats.original_tokens += original_tokens;
        stats.summary_tokens += summary_tokens;
        result.meta = Some(ActionSummaryMeta::new(
            &result.tool_use_id,
            record.is_some(),
            original_tokens,
            summary_tokens,
        ));
        result.content = Value::String(replacement);
    }
}

/// A user message made of exactly one text block becomes a bare string.
fn flatten_single_text(content: MessageContent) -> MessageContent {
    match content {
        MessageContent::Blocks(blocks) => match <[ContentBlock; 1]>::try_from(blocks) {
            Ok([ContentBlock::Text(text)]) => MessageContent::Text(text.text),
            Ok([other]) => MessageContent::Blocks(vec![other]),
            Err(blocks) => MessageContent::Blocks(blocks),
        },
        other => other,
    }
}

/// Sum of the per-entry statistics.
pub fn summary_totals(entries: &[CleanedEntry]) -> EntryMeta {
    entries
        .iter()
        .filter_map(|e| e.meta.as_ref())
        .fold(EntryMeta::default(), |mut acc, m| {
            acc.was_summarized |= m.was_summarized;
            acc.summarized_results += m.summarized_results;
            acc.original_tokens += m.original_tokens;
            acc.summary_tokens += m.summary_tokens;
            acc
        })
}
