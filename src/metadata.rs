use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics attached to a tool-result block that was replaced by an
/// action summary (or truncated). Carried under the `_meta` key while the
/// pipeline runs and stripped before anything is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSummaryMeta {
    pub original_tokens: usize,
    pub summary_tokens: usize,
    pub reduction_percent: f64,
    pub tool_use_id: String,
    /// Whether the result could be correlated back to its `tool_use` call.
    pub tool_matched: bool,
}

impl ActionSummaryMeta {
    pub fn new(
        tool_use_id: &str,
        tool_matched: bool,
        original_tokens: usize,
        summary_tokens: usize,
    ) -> Self {
        Self {
            original_tokens,
            summary_tokens,
            reduction_percent: reduction_percent(original_tokens, summary_tokens),
            tool_use_id: tool_use_id.to_string(),
            tool_matched,
        }
    }
}

/// `(original - summary) / original * 100`, rounded to one decimal.
/// Zero when there was nothing to reduce.
pub fn reduction_percent(original_tokens: usize, summary_tokens: usize) -> f64 {
    if original_tokens == 0 {
        return 0.0;
    }
    let saved = original_tokens.saturating_sub(summary_tokens) as f64;
    (saved / original_tokens as f64 * 1000.0).round() / 10.0
}

/// Per-entry aggregate of the block-level statistics, kept under `_meta`
/// on a cleaned entry for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub was_summarized: bool,
    pub summarized_results: usize,
    pub original_tokens: usize,
    pub summary_tokens: usize,
}

/// The coordination flag at `<state-root>/in_subagent_context.flag`.
///
/// On disk it is two lines: the agent identifier and an RFC 3339 UTC
/// timestamp. Presence alone is the signal; the content is advisory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecursionFlag {
    pub agent: String,
    pub set_at: Option<DateTime<Utc>>,
}

impl RecursionFlag {
    pub fn new(agent: &str, set_at: DateTime<Utc>) -> Self {
        Self {
            agent: agent.to_string(),
            set_at: Some(set_at),
        }
    }

    pub fn render(&self) -> String {
        let stamp = self.set_at.map(|t| t.to_rfc3339()).unwrap_or_default();
        format!("{}\n{}\n", self.agent, stamp)
    }

    /// Lenient parse: a flag written by another tool may carry only an
    /// agent name, or nothing at all.
    pub fn parse(contents: &str) -> Self {
        let mut lines = contents.lines();
        let agent = lines.next().unwrap_or_default().trim().to_string();
        let set_at = lines
            .next()
            .and_then(|l| DateTime::parse_from_rfc3339(l.trim()).ok())
            .map(|t| t.with_timezone(&Utc));
        Self { agent, set_at }
    }
}

/// Compare-and-set lock record guarding one agent's output directory.
/// Stored as `<agent-dir>/.bundle.lock`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub owner: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
