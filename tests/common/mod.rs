#![allow(dead_code)]

use serde_json::{Value, json};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Spawn the binary with `args`, feed `stdin` and collect (code, stdout, stderr).
pub fn run_with_args(args: &[&str], stdin: &str) -> (i32, String, String) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_brainworm-context"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("BRAINWORM_DEBUG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn binary");

    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();

    let output = child.wait_with_output().unwrap();
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

/// Hook mode: payload on stdin, no arguments.
pub fn run_cli(stdin_json: &str) -> (i32, String, String) {
    run_with_args(&[], stdin_json)
}

/// Create a temp dir containing a git repo with an initial commit and return it.
/// The `TempDir` must be kept alive for the duration of the test.
pub fn temp_git_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let repo = git2::Repository::init(dir.path()).unwrap();

    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test").unwrap();
    config.set_str("user.email", "test@test.com").unwrap();

    let sig = repo.signature().unwrap();
    let tree_oid = repo.index().unwrap().write_tree().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
        .unwrap();

    dir
}

pub fn common(cwd: &str, transcript_path: &str) -> String {
    format!(
        r#"
    "session_id": "test-session",
    "transcript_path": "{transcript_path}",
    "cwd": "{cwd}",
    "permission_mode": "default"
"#
    )
}

/// A `PreToolUse` payload for `tool_name` with `tool_input`.
pub fn pre_tool_use(cwd: &Path, transcript: &Path, tool_name: &str, tool_input: Value) -> String {
    json!({
        "session_id": "test-session",
        "transcript_path": transcript,
        "cwd": cwd,
        "permission_mode": "default",
        "hook_event_name": "PreToolUse",
        "tool_name": tool_name,
        "tool_input": tool_input,
        "tool_use_id": "toolu_task"
    })
    .to_string()
}

pub fn task_input(subagent_type: &str) -> Value {
    json!({
        "subagent_type": subagent_type,
        "description": "Gather context",
        "prompt": "Look around"
    })
}

// ===================================================================
// Transcript builders
// ===================================================================

pub fn user_text(text: &str) -> Value {
    json!({
        "type": "user",
        "uuid": format!("u-{}", text.len()),
        "sessionId": "s",
        "timestamp": "2025-01-01T00:00:00Z",
        "message": { "role": "user", "content": text }
    })
}

pub fn assistant_text(text: &str) -> Value {
    json!({
        "type": "assistant",
        "sessionId": "s",
        "message": { "role": "assistant", "content": [{ "type": "text", "text": text }] }
    })
}

pub fn assistant_tool_use(id: &str, name: &str, input: Value) -> Value {
    json!({
        "type": "assistant",
        "sessionId": "s",
        "message": {
            "role": "assistant",
            "content": [{ "type": "tool_use", "id": id, "name": name, "input": input }]
        }
    })
}

pub fn tool_result(id: &str, content: &str) -> Value {
    json!({
        "type": "user",
        "sessionId": "s",
        "message": {
            "role": "user",
            "content": [{ "type": "tool_result", "tool_use_id": id, "content": content }]
        }
    })
}

/// Write `entries` as a JSONL transcript under `dir` and return its path.
pub fn write_transcript(dir: &Path, entries: &[Value]) -> PathBuf {
    let path = dir.join("transcript.jsonl");
    let mut contents = String::new();
    for entry in entries {
        contents.push_str(&entry.to_string());
        contents.push('\n');
    }
    fs::write(&path, contents).unwrap();
    path
}

/// A short session: some exploration, then an edit with its result.
pub fn edit_session() -> Vec<Value> {
    vec![
        user_text("please fix the bug"),
        assistant_text("thinking about it"),
        assistant_tool_use("toolu_read", "Read", json!({ "file_path": "/src/lib.rs" })),
        tool_result("toolu_read", &"fn main() {}\n".repeat(200)),
        assistant_tool_use(
            "toolu_edit",
            "Edit",
            json!({ "file_path": "/src/lib.rs", "old_string": "a", "new_string": "b" }),
        ),
        tool_result("toolu_edit", "The file /src/lib.rs has been updated successfully."),
        assistant_tool_use("toolu_bash", "Bash", json!({ "command": "cargo test" })),
        tool_result("toolu_bash", &"test result: ok. 12 passed\n".repeat(50)),
        assistant_text("done, delegating review"),
    ]
}

// ===================================================================
// State directory helpers
// ===================================================================

pub fn state_root(project: &Path) -> PathBuf {
    project.join(".brainworm").join("state")
}

pub fn flag_path(project: &Path) -> PathBuf {
    state_root(project).join("in_subagent_context.flag")
}

/// Batch file names in `dir`, sorted.
pub fn batch_files(dir: &Path) -> Vec<String> {
    let Ok(listing) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = listing
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("current_transcript_") && n.ends_with(".json"))
        .collect();
    names.sort();
    names
}

/// Concatenate every batch in `dir`, in file order.
pub fn read_batches(dir: &Path) -> Vec<Value> {
    batch_files(dir)
        .iter()
        .flat_map(|name| {
            let text = fs::read_to_string(dir.join(name)).unwrap();
            let batch: Vec<Value> = serde_json::from_str(&text).unwrap();
            batch
        })
        .collect()
}

/// Every file under `root`, as (relative path, contents).
pub fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(listing) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in listing {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_path_buf();
                files.push((rel, fs::read(&path).unwrap()));
            }
        }
    }
    files.sort();
    files
}
