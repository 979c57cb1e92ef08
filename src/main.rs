mod chunk;
mod coordinator;
mod error;
mod metadata;
mod persist;
mod preferences;
mod prework;
mod service_context;
mod session;
mod summarize;
mod tokens;
mod tool_index;
mod transcript;
mod types;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use session::{BundleOutcome, BundleRequest, Session};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use tokens::TokenizerMode;
use tracing_subscriber::EnvFilter;
use types::{HookInput, HookOutput};

/// Bundle a Claude Code transcript into token-bounded context files for a
/// delegated subagent.
///
/// Without a subcommand, reads one hook payload from stdin.
#[derive(Parser, Debug)]
#[command(name = "brainworm-context", version, about, long_about = None)]
struct Cli {
    /// Write diagnostics to stderr
    #[arg(long, global = true, env = "BRAINWORM_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bundle a transcript directly and print the outcome as JSON
    Bundle(BundleArgs),
}

#[derive(Args, Debug)]
struct BundleArgs {
    /// Transcript file (JSONL)
    #[arg(long)]
    transcript: PathBuf,

    /// Directory to resolve the project from (defaults to the current one)
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Subagent identifier, as the Task tool's `subagent_type`
    #[arg(long)]
    agent: Option<String>,

    /// Token ceiling per batch file (overrides bundler.toml)
    #[arg(long)]
    max_tokens: Option<usize>,

    /// Use the word-count estimate instead of the BPE tokenizer
    #[arg(long)]
    approximate: bool,
}

fn init_tracing(debug: bool) {
    let default = if debug {
        format!("{}=debug", env!("CARGO_CRATE_NAME"))
    } else {
        "off".to_string()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("reading stdin")?;
    Ok(buffer)
}

fn run_hook() -> Result<Option<HookOutput>> {
    let input = read_stdin()?;
    let hook_input: HookInput = serde_json::from_str(&input).context("parsing hook input")?;
    match &hook_input {
        HookInput::PreToolUse(e) => {
            Session::open(Path::new(&e.common.cwd)).and_then(|s| s.handle_pre_tool_use(e))
        }
        HookInput::Other => Ok(None),
    }
}

fn run_bundle(args: BundleArgs) -> Result<BundleOutcome> {
    let cwd = match args.cwd {
        Some(cwd) => cwd,
        None => std::env::current_dir().context("reading current directory")?,
    };
    let mut session = Session::open(&cwd)?;
    if let Some(max_tokens) = args.max_tokens {
        session.prefs.max_tokens = max_tokens;
    }
    if args.approximate {
        session.prefs.tokenizer = TokenizerMode::Approximate;
    }

    let tool_name = session
        .prefs
        .trigger_tools
        .first()
        .cloned()
        .unwrap_or_else(|| "Task".to_string());
    let tool_input = match &args.agent {
        Some(agent) => serde_json::json!({ "subagent_type": agent }),
        None => serde_json::json!({}),
    };
    session.bundle(&BundleRequest {
        tool_name: &tool_name,
        tool_input: &tool_input,
        transcript_path: &args.transcript,
        owner: "cli",
    })
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        // Hook mode never fails the tool call it was triggered by.
        None => match run_hook() {
            Ok(Some(output)) => match serde_json::to_string(&output) {
                Ok(json) => println!("{json}"),
                Err(err) => tracing::warn!("serializing hook output: {err}"),
            },
            Ok(None) => {}
            Err(err) => tracing::warn!("{err:#}"),
        },
        Some(Command::Bundle(args)) => {
            let result = run_bundle(args).and_then(|outcome| {
                serde_json::to_string_pretty(&outcome).context("serializing outcome")
            });
            match result {
                Ok(json) => println!("{json}"),
                Err(err) => {
                    eprintln!("brainworm-context: {err:#}");
                    process::exit(1);
                }
            }
        }
    }
}
