use crate::metadata::{LockRecord, RecursionFlag};
use crate::preferences::Preferences;
use crate::transcript::TranscriptEntry;
use crate::types::TaskToolInput;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const FLAG_FILE: &str = "in_subagent_context.flag";
pub const LOCK_FILE: &str = ".bundle.lock";

// ===================================================================
// Outcomes
// ===================================================================

/// Why a run did nothing. Skips are expected outcomes, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The triggering tool is not a delegation tool.
    NotTriggerTool,
    /// The coordination flag is set: we are already inside a subagent.
    RecursionGuard,
    /// Another run holds the lock on this agent's directory.
    BundleInProgress,
}

// ===================================================================
// Pure decisions
// ===================================================================

/// Should a `PreToolUse` for `tool_name` build a bundle at all?
///
/// A non-trigger tool is reported as such whatever the flag says.
pub fn gate(
    tool_name: &str,
    prefs: &Preferences,
    flag: Option<&RecursionFlag>,
) -> Option<SkipReason> {
    if !prefs.is_trigger_tool(tool_name) {
        return Some(SkipReason::NotTriggerTool);
    }
    if flag.is_some() {
        return Some(SkipReason::RecursionGuard);
    }
    None
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn subagent_type(input: &serde_json::Value) -> Option<String> {
    let task = TaskToolInput::deserialize(input).ok()?;
    non_empty(task.subagent_type.as_deref()).map(String::from)
}

/// Pick the subagent identifier for this run.
///
/// Order: `subagent_type` on the triggering payload, then the last
/// trigger-tool call in the final transcript entry, then the configured
/// default agent.
pub fn resolve_agent(
    tool_input: &serde_json::Value,
    last_entry: Option<&TranscriptEntry>,
    prefs: &Preferences,
) -> String {
    if let Some(agent) = subagent_type(tool_input) {
        return agent;
    }
    last_entry
        .into_iter()
        .flat_map(|e| e.tool_uses())
        .filter(|tu| prefs.is_trigger_tool(&tu.name))
        .filter_map(|tu| subagent_type(&tu.input))
        .last()
        .unwrap_or_else(|| prefs.default_agent.clone())
}

/// Filesystem-safe directory name for an agent identifier.
///
/// Drops any `namespace:` prefix (up to the first colon), maps characters
/// outside `[A-Za-z0-9._-]` to `-`, and falls back to `default` when
/// nothing usable is left.
pub fn normalize_agent_dir(agent: &str, default: &str) -> String {
    let base = match agent.split_once(':') {
        Some((_, rest)) => rest,
        None => agent,
    };
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        if agent == default {
            return "general-purpose".into();
        }
        return normalize_agent_dir(default, "general-purpose");
    }
    cleaned
}

// ===================================================================
// Recursion flag
// ===================================================================

pub fn flag_path(state_root: &Path) -> PathBuf {
    state_root.join(FLAG_FILE)
}

/// Read the flag, returning `None` if it is not set.
///
/// Presence is what counts: a flag that exists but can't be read is
/// still reported, with no agent.
pub fn read_flag(state_root: &Path) -> Option<RecursionFlag> {
    let path = flag_path(state_root);
    match fs::read_to_string(&path) {
        Ok(contents) => Some(RecursionFlag::parse(&contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::debug!("reading {}: {e}", path.display());
            Some(RecursionFlag::default())
        }
    }
}

/// Set the flag for `agent`. Clearing it is the job of whoever handles
/// the end of the delegated call.
pub fn mark_active(state_root: &Path, agent: &str) -> Result<RecursionFlag> {
    let flag = RecursionFlag::new(agent, Utc::now());
    let path = flag_path(state_root);
    fs::write(&path, flag.render()).with_context(|| format!("writing {}", path.display()))?;
    Ok(flag)
}

// ===================================================================
// Directory lock
// ===================================================================

/// Exclusive claim on one agent directory, released on drop.
#[derive(Debug)]
pub struct BundleLock {
    path: PathBuf,
    record: LockRecord,
}

impl BundleLock {
    /// Try to take the lock in `dir`.
    ///
    /// Returns `Ok(None)` when another owner holds an unexpired lock. An
    /// expired or unreadable record is reclaimed and the claim retried once.
    pub fn acquire(dir: &Path, owner: &str, ttl: Duration) -> Result<Option<Self>> {
        Self::acquire_at(dir, owner, ttl, Utc::now())
    }

    fn acquire_at(
        dir: &Path,
        owner: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>> {
        let path = dir.join(LOCK_FILE);
        let record = LockRecord {
            owner: owner.to_string(),
            pid: std::process::id(),
            acquired_at: now,
            expires_at: now + ttl,
        };
        let json = serde_json::to_string_pretty(&record).context("serializing lock record")?;

        for attempt in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(json.as_bytes())
                        .with_context(|| format!("writing {}", path.display()))?;
                    return Ok(Some(Self { path, record }));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if attempt > 0 || !Self::is_stale(&path, now) {
                        return Ok(None);
                    }
                    if !Self::reclaim(&path, now)? {
                        return Ok(None);
                    }
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("creating {}", path.display()));
                }
            }
        }
        Ok(None)
    }

    /// Move a stale lock out of the way.
    ///
    /// The file is first renamed to a name only this run uses, so two runs
    /// racing on the same stale record can't both remove it. If what was
    /// moved turns out to be a live lock taken in the meantime, it is
    /// linked back into place and `false` is returned.
    fn reclaim(path: &Path, now: DateTime<Utc>) -> Result<bool> {
        let tombstone = path.with_file_name(format!(
            "{LOCK_FILE}.{}.{}",
            std::process::id(),
            now.timestamp_nanos_opt().unwrap_or_default()
        ));
        match fs::rename(path, &tombstone) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e).with_context(|| format!("moving {}", path.display())),
        }

        let stale = Self::is_stale(&tombstone, now);
        if stale {
            tracing::debug!("reclaimed stale lock {}", path.display());
        } else {
            match fs::hard_link(&tombstone, path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(_) => {
                    return fs::rename(&tombstone, path)
                        .with_context(|| format!("restoring {}", path.display()))
                        .map(|()| false);
                }
            }
        }
        if let Err(e) = fs::remove_file(&tombstone) {
            tracing::debug!("removing {}: {e}", tombstone.display());
        }
        Ok(stale)
    }

    fn read_record(path: &Path) -> Option<LockRecord> {
        let contents = fs::read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    fn is_stale(path: &Path, now: DateTime<Utc>) -> bool {
        Self::read_record(path).is_none_or(|existing| existing.is_expired(now))
    }
}

impl Drop for BundleLock {
    /// Remove the lock file, unless it no longer holds this run's record
    /// (it expired and another run reclaimed it).
    fn drop(&mut self) {
        if Self::read_record(&self.path).as_ref() != Some(&self.record) {
            tracing::debug!("{} is no longer ours, leaving it", self.path.display());
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("releasing {}: {e}", self.path.display());
            }
        }
    }
}
