use super::*;
use serde_json::json;

// Helper to build the common fields every hook input needs.
fn common_fields() -> serde_json::Value {
    json!({
        "session_id": "sess-1",
        "transcript_path": "/tmp/transcript.jsonl",
        "cwd": "/home/user/project",
        "permission_mode": "default"
    })
}

fn merge(base: serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
    let mut map = base.as_object().unwrap().clone();
    map.extend(extra.as_object().unwrap().clone());
    serde_json::Value::Object(map)
}

// =================================================================
// PreToolUse input deserialization
// =================================================================

#[test]
fn deserialize_pre_tool_use_task() {
    let input = merge(
        common_fields(),
        json!({
            "hook_event_name": "PreToolUse",
            "tool_name": "Task",
            "tool_input": {
                "subagent_type": "brainworm:context-gathering",
                "description": "Gather context",
                "prompt": "Look at the auth module"
            },
            "tool_use_id": "toolu_abc"
        }),
    );

    let hook: HookInput = serde_json::from_value(input).unwrap();
    match &hook {
        HookInput::PreToolUse(e) => {
            assert_eq!(e.common.session_id, "sess-1");
            assert_eq!(e.common.transcript_path, "/tmp/transcript.jsonl");
            assert_eq!(e.common.cwd, "/home/user/project");
            assert_eq!(e.tool_name, "Task");

            let ti: TaskToolInput = serde_json::from_value(e.tool_input.clone()).unwrap();
            assert_eq!(ti.subagent_type.as_deref(), Some("brainworm:context-gathering"));
            assert_eq!(ti.description.as_deref(), Some("Gather context"));
        }
        other => panic!("Expected PreToolUse, got {:?}", other),
    }
}

#[test]
fn unknown_input_fields_are_ignored() {
    let input = merge(
        common_fields(),
        json!({
            "hook_event_name": "PreToolUse",
            "tool_name": "Bash",
            "tool_input": { "command": "ls", "description": "list", "timeout": 5 },
            "permission_mode": "bypassPermissions",
            "tool_use_id": "toolu_x"
        }),
    );
    let hook: HookInput = serde_json::from_value(input).unwrap();
    match hook {
        HookInput::PreToolUse(e) => {
            let bash: BashToolInput = serde_json::from_value(e.tool_input).unwrap();
            assert_eq!(bash.command, "ls");
        }
        other => panic!("Expected PreToolUse, got {:?}", other),
    }
}

#[test]
fn pre_tool_use_without_tool_input_defaults_to_null() {
    let input = merge(
        common_fields(),
        json!({ "hook_event_name": "PreToolUse", "tool_name": "Task" }),
    );
    let hook: HookInput = serde_json::from_value(input).unwrap();
    match hook {
        HookInput::PreToolUse(e) => assert!(e.tool_input.is_null()),
        other => panic!("Expected PreToolUse, got {:?}", other),
    }
}

// =================================================================
// Events the bundler does not handle
// =================================================================

#[test]
fn other_events_deserialize_to_other() {
    for event in ["PostToolUse", "Stop", "SessionStart", "SomethingNew"] {
        let input = merge(common_fields(), json!({ "hook_event_name": event }));
        let hook: HookInput = serde_json::from_value(input).unwrap();
        assert!(matches!(hook, HookInput::Other), "{event} should map to Other");
    }
}

#[test]
fn missing_event_name_is_rejected() {
    let result: Result<HookInput, _> = serde_json::from_value(common_fields());
    assert!(result.is_err());
}

// =================================================================
// Tool input decoding
// =================================================================

#[test]
fn grep_input_path_is_optional() {
    let grep: GrepToolInput = serde_json::from_value(json!({ "pattern": "fn main" })).unwrap();
    assert_eq!(grep.pattern, "fn main");
    assert!(grep.path.is_none());

    let grep: GrepToolInput =
        serde_json::from_value(json!({ "pattern": "TODO", "path": "src", "glob": "*.rs" }))
            .unwrap();
    assert_eq!(grep.path.as_deref(), Some("src"));
}

#[test]
fn file_path_input_ignores_extra_fields() {
    let edit: FilePathToolInput = serde_json::from_value(json!({
        "file_path": "/a/b.rs",
        "old_string": "x",
        "new_string": "y"
    }))
    .unwrap();
    assert_eq!(edit.file_path, "/a/b.rs");
}

#[test]
fn task_input_tolerates_missing_fields() {
    let task: TaskToolInput = serde_json::from_value(json!({})).unwrap();
    assert!(task.subagent_type.is_none());
    assert!(task.description.is_none());
}

// =================================================================
// Output serialization
// =================================================================

#[test]
fn hook_output_is_camel_case() {
    let out = HookOutput {
        system_message: Some("[brainworm] ok".into()),
    };
    let v = serde_json::to_value(&out).unwrap();
    assert_eq!(v, json!({ "systemMessage": "[brainworm] ok" }));
}
