use crate::chunk::chunk_entries;
use crate::coordinator::{self, BundleLock, SkipReason};
use crate::error::BundleError;
use crate::persist;
use crate::preferences::Preferences;
use crate::prework::trim_prework;
use crate::service_context;
use crate::summarize::{SummaryRegistry, Summarizer, summary_totals};
use crate::tokens::TokenCounter;
use crate::tool_index::ToolUseIndex;
use crate::transcript::Transcript;
use crate::types::{HookOutput, PreToolUseInput};
use anyhow::{Context, Result};
use chrono::Duration;
use minijinja::{Environment, context};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".brainworm";
const STATE_DIR: &str = "state";

/// Upper bound on `lock_ttl_secs`, keeps the expiry timestamp in range.
const MAX_LOCK_TTL_SECS: u64 = 86_400;

fn hint(message: String) -> Option<HookOutput> {
    Some(HookOutput {
        system_message: Some(message),
    })
}

/// Read a JSONL transcript, skipping (and logging) malformed lines.
///
/// A missing file is an error: there is nothing to bundle, and the caller
/// must not go on to clear the previous bundle.
pub fn read_transcript(path: &Path) -> Result<Transcript> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(BundleError::TranscriptMissing {
                path: path.to_path_buf(),
            }
            .into());
        }
        Err(source) => {
            return Err(BundleError::TranscriptRead {
                path: path.to_path_buf(),
                source,
            }
            .into());
        }
    };
    let (transcript, errors) =
        Transcript::from_reader(BufReader::new(file)).map_err(|source| {
            BundleError::TranscriptRead {
                path: path.to_path_buf(),
                source,
            }
        })?;
    for (line, err) in &errors {
        tracing::warn!("skipping transcript line {line}: {err}");
    }
    Ok(transcript)
}

// ===================================================================
// Request / outcome
// ===================================================================

/// One delegation to bundle context for.
pub struct BundleRequest<'a> {
    pub tool_name: &'a str,
    pub tool_input: &'a serde_json::Value,
    pub transcript_path: &'a Path,
    /// Recorded in the directory lock.
    pub owner: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleReport {
    pub agent: String,
    pub directory: PathBuf,
    pub files: Vec<String>,
    pub entries_read: usize,
    pub entries_kept: usize,
    pub stale_files_removed: usize,
    pub summarized_results: usize,
    pub original_tokens: usize,
    pub summary_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BundleOutcome {
    Skipped { reason: SkipReason },
    Written(BundleReport),
}

// ===================================================================
// Session
// ===================================================================

pub struct Session {
    repo: Option<git2::Repository>,
    root: PathBuf,
    cwd: PathBuf,
    config_dir: PathBuf,
    state_root: PathBuf,
    pub prefs: Preferences,
}

impl Session {
    /// Locate the project from `cwd` and load preferences.
    ///
    /// The project root is the git working directory containing `cwd`, or
    /// `cwd` itself outside a repository. Nothing is created here.
    pub fn open(cwd: &Path) -> Result<Self> {
        let repo = match git2::Repository::discover(cwd) {
            Ok(repo) => Some(repo),
            Err(err) => {
                tracing::debug!("no git repository at {}: {err}", cwd.display());
                None
            }
        };
        let root = repo
            .as_ref()
            .and_then(|r| r.workdir())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());
        let config_dir = root.join(CONFIG_DIR);
        let state_root = config_dir.join(STATE_DIR);
        let prefs = Preferences::load(&config_dir)?;
        Ok(Self {
            repo,
            root,
            cwd: cwd.to_path_buf(),
            config_dir,
            state_root,
            prefs,
        })
    }

    fn lock_ttl(&self) -> Duration {
        Duration::seconds(self.prefs.lock_ttl_secs.min(MAX_LOCK_TTL_SECS) as i64)
    }

    /// Run the coordinator and, unless it skips, the whole pipeline.
    ///
    /// Skips happen before any write. Once the directory lock is held the
    /// stale batches are cleared only after the new chunks are built.
    pub fn bundle(&self, request: &BundleRequest<'_>) -> Result<BundleOutcome> {
        let flag = coordinator::read_flag(&self.state_root);
        if let Some(reason) = coordinator::gate(request.tool_name, &self.prefs, flag.as_ref()) {
            tracing::debug!(
                ?reason,
                tool = request.tool_name,
                active_agent = flag.as_ref().map(|f| f.agent.as_str()),
                "skipping bundle"
            );
            return Ok(BundleOutcome::Skipped { reason });
        }

        let entries = read_transcript(request.transcript_path)?.into_entries();
        let entries_read = entries.len();
        let agent = coordinator::resolve_agent(request.tool_input, entries.last(), &self.prefs);
        let dir = self
            .state_root
            .join(coordinator::normalize_agent_dir(&agent, &self.prefs.default_agent));

        persist::ensure_dir(&dir)?;
        let Some(_lock) = BundleLock::acquire(&dir, request.owner, self.lock_ttl())? else {
            tracing::debug!("{} is locked by another run", dir.display());
            return Ok(BundleOutcome::Skipped {
                reason: SkipReason::BundleInProgress,
            });
        };

        let counter = TokenCounter::new(self.prefs.tokenizer);
        let trimmed = trim_prework(entries, &self.prefs.implementation_tools);
        let entries_kept = trimmed.len();
        let index = ToolUseIndex::build(&trimmed);
        let registry = SummaryRegistry::default();
        let cleaned = Summarizer::new(&index, &registry, &counter)
            .with_strategy(self.prefs.result_strategy, self.prefs.truncate_max_tokens)
            .clean_all(trimmed);
        let totals = summary_totals(&cleaned);
        let chunks = chunk_entries(cleaned, self.prefs.max_tokens, &counter)
            .context("measuring transcript entries")?;
        tracing::debug!(
            entries_read,
            entries_kept,
            tool_uses = index.len(),
            summarized = totals.summarized_results,
            original_tokens = totals.original_tokens,
            summary_tokens = totals.summary_tokens,
            chunks = chunks.len(),
            exact_tokenizer = counter.is_exact(),
            "transcript processed"
        );

        let stale_files_removed = persist::clear_batches(&dir)?;
        let files = persist::write_chunks(&dir, &chunks)?;
        let context = service_context::detect(&self.root, &self.cwd, self.repo.as_ref());
        persist::write_service_context(&dir, &context)?;
        coordinator::mark_active(&self.state_root, &agent)?;

        tracing::info!(
            agent = agent.as_str(),
            dir = %dir.display(),
            files = files.len(),
            "bundle written"
        );
        Ok(BundleOutcome::Written(BundleReport {
            agent,
            directory: dir,
            files,
            entries_read,
            entries_kept,
            stale_files_removed,
            summarized_results: totals.summarized_results,
            original_tokens: totals.original_tokens,
            summary_tokens: totals.summary_tokens,
        }))
    }

    /// Render the notice template for a written bundle.
    fn render_notice(&self, template: &str, report: &BundleReport) -> Result<String> {
        let env = Environment::new();
        let tmpl = env
            .template_from_str(template)
            .context("parsing notice template")?;
        tmpl.render(context! {
            agent => report.agent,
            directory => report.directory.display().to_string(),
            chunks => report.files.len(),
            files => report.files,
            entries => report.entries_kept,
            summarized => report.summarized_results,
            original_tokens => report.original_tokens,
            summary_tokens => report.summary_tokens,
        })
        .context("rendering notice template")
    }

    // ---------------------------------------------------------------
    // Hook handlers
    // ---------------------------------------------------------------

    pub fn handle_pre_tool_use(&self, input: &PreToolUseInput) -> Result<Option<HookOutput>> {
        let request = BundleRequest {
            tool_name: &input.tool_name,
            tool_input: &input.tool_input,
            transcript_path: Path::new(&input.common.transcript_path),
            owner: &input.common.session_id,
        };
        let report = match self.bundle(&request)? {
            BundleOutcome::Skipped { .. } => return Ok(None),
            BundleOutcome::Written(report) => report,
        };
        if !self.prefs.notice {
            return Ok(None);
        }
        let template = self.prefs.load_notice_template(&self.config_dir)?;
        Ok(hint(self.render_notice(&template, &report)?))
    }
}
