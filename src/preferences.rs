use crate::chunk::DEFAULT_MAX_TOKENS;
use crate::prework::DEFAULT_IMPLEMENTATION_TOOLS;
use crate::summarize::{DEFAULT_TRUNCATE_MAX_TOKENS, ResultStrategy};
use crate::tokens::TokenizerMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

const FILENAME: &str = "bundler.toml";

const DEFAULT_TRIGGER_TOOLS: &[&str] = &["Task"];

/// Template for the one-line notice shown after a bundle is written:
/// either an inline Jinja2 string or a path to a template file (relative
/// to `.brainworm/`).
///
/// In TOML this looks like one of:
///
/// ```toml
/// [notice_template]
/// inline = "[brainworm] {{ chunks }} file(s) for {{ agent }}"
///
/// # or
///
/// [notice_template]
/// file = "notice.tmpl"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeTemplate {
    Inline(String),
    File(String),
}

impl Default for NoticeTemplate {
    fn default() -> Self {
        NoticeTemplate::Inline(
            "[brainworm] prepared {{ chunks }} context file(s) for {{ agent }}".into(),
        )
    }
}

/// User-facing preferences stored in `.brainworm/bundler.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    /// Token ceiling per batch file.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// `"exact"` (cl100k byte-pair encoding) or `"approximate"` (words × 1.3).
    #[serde(default)]
    pub tokenizer: TokenizerMode,

    /// `"summarize"` replaces tool results with one-line summaries,
    /// `"truncate"` keeps a head and tail of oversized results.
    #[serde(default)]
    pub result_strategy: ResultStrategy,

    /// Token ceiling for the `"truncate"` strategy.
    #[serde(default = "default_truncate_max_tokens")]
    pub truncate_max_tokens: usize,

    /// Tool names whose `PreToolUse` event builds a bundle.
    #[serde(default = "default_trigger_tools")]
    pub trigger_tools: Vec<String>,

    /// Tool names that mark the start of implementation work.
    #[serde(default = "default_implementation_tools")]
    pub implementation_tools: Vec<String>,

    /// Agent used when neither the payload nor the transcript names one.
    #[serde(default = "default_agent")]
    pub default_agent: String,

    /// How long a bundle lock is honoured before it is treated as stale.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Show a notice after a bundle is written.
    #[serde(default = "default_notice")]
    pub notice: bool,

    #[serde(default)]
    pub notice_template: NoticeTemplate,
}

fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}

fn default_truncate_max_tokens() -> usize {
    DEFAULT_TRUNCATE_MAX_TOKENS
}

fn default_trigger_tools() -> Vec<String> {
    DEFAULT_TRIGGER_TOOLS.iter().map(|s| s.to_string()).collect()
}

fn default_implementation_tools() -> Vec<String> {
    DEFAULT_IMPLEMENTATION_TOOLS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_agent() -> String {
    "general-purpose".into()
}

fn default_lock_ttl_secs() -> u64 {
    120
}

fn default_notice() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            tokenizer: TokenizerMode::default(),
            result_strategy: ResultStrategy::default(),
            truncate_max_tokens: default_truncate_max_tokens(),
            trigger_tools: default_trigger_tools(),
            implementation_tools: default_implementation_tools(),
            default_agent: default_agent(),
            lock_ttl_secs: default_lock_ttl_secs(),
            notice: default_notice(),
            notice_template: NoticeTemplate::default(),
        }
    }
}

impl Preferences {
    /// Load preferences from `<dir>/bundler.toml`.
    ///
    /// A missing file yields defaults and nothing is written, so loading
    /// never touches the filesystem. Missing keys in an existing file are
    /// filled in with defaults via serde.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(FILENAME);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let prefs: Preferences = toml::from_str(&contents)
                    .with_context(|| format!("parsing {}", path.display()))?;
                Ok(prefs)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Preferences::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn is_trigger_tool(&self, tool_name: &str) -> bool {
        self.trigger_tools.iter().any(|t| t == tool_name)
    }

    /// Resolve the notice template to a string.
    pub fn load_notice_template(&self, dir: &Path) -> Result<String> {
        match &self.notice_template {
            NoticeTemplate::Inline(s) => Ok(s.clone()),
            NoticeTemplate::File(filename) => {
                let path = dir.join(filename);
                fs::read_to_string(&path)
                    .with_context(|| format!("reading template {}", path.display()))
            }
        }
    }
}
