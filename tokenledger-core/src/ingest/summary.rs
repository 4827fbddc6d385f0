//! One-line action summaries for tool calls and tool results
//!
//! Each summary is rendered on a single line in the full tasks view, so
//! every value taken from tool input passes through [`single_line`].

use crate::format::{ellipsize, single_line, take_chars};
use serde_json::Value;

/// String field of a tool input, collapsed onto one line.
fn field(input: &Value, key: &str) -> String {
    single_line(input.get(key).and_then(Value::as_str).unwrap_or_default())
}

fn suffix(prefix: &str, value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!("{prefix}{value}")
    }
}

/// Summarize a `tool_use` block, e.g. `$ cargo test # run tests`.
pub(crate) fn summarize_tool_use(name: &str, input: &Value) -> String {
    let summary = match name {
        "Bash" => {
            let command = ellipsize(&field(input, "command"), 110);
            format!("$ {command}{}", suffix(" # ", &field(input, "description")))
        }
        "Read" => {
            let path = field(input, "file_path");
            let limit = input.get("limit").and_then(Value::as_u64).filter(|n| *n > 0);
            match input.get("offset").and_then(Value::as_u64).filter(|n| *n > 0) {
                Some(offset) => format!(
                    "Read: {path} (lines {offset}-{})",
                    offset.saturating_add(limit.unwrap_or(2000))
                ),
                None => match limit {
                    Some(limit) => format!("Read: {path} (first {limit} lines)"),
                    None => format!("Read: {path}"),
                },
            }
        }
        "Write" => {
            let content = input.get("content").and_then(Value::as_str).unwrap_or_default();
            let lines = if content.is_empty() {
                0
            } else {
                content.matches('\n').count() + 1
            };
            format!(
                "Write: {} ({lines} lines, {} chars)",
                field(input, "file_path"),
                content.chars().count()
            )
        }
        "Edit" => {
            let all = input
                .get("replace_all")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            format!(
                "Edit: {} - '{}...' → '{}...'{}",
                field(input, "file_path"),
                take_chars(&field(input, "old_string"), 30),
                take_chars(&field(input, "new_string"), 30),
                if all { " (all)" } else { "" }
            )
        }
        "MultiEdit" => format!(
            "MultiEdit: {} ({} edits)",
            field(input, "file_path"),
            input.get("edits").and_then(Value::as_array).map_or(0, Vec::len)
        ),
        "Glob" => format!(
            "Glob: {}{}",
            field(input, "pattern"),
            suffix(" in ", &field(input, "path"))
        ),
        "Grep" => format!(
            "Grep: /{}/{}",
            take_chars(&field(input, "pattern"), 50),
            suffix(" in ", &field(input, "include"))
        ),
        "LS" => format!("List: {}", field(input, "path")),
        "TodoWrite" => match input.get("todos").and_then(Value::as_array) {
            Some(todos) if !todos.is_empty() => format!("Update todos ({} items)", todos.len()),
            _ => "Clear todos".to_string(),
        },
        "TodoRead" => "Read todos".to_string(),
        "WebSearch" => format!("Search web: {}", take_chars(&field(input, "query"), 50)),
        "WebFetch" => format!("Fetch: {}", field(input, "url")),
        "Task" => format!(
            "Task: {} - {}...",
            field(input, "description"),
            take_chars(&field(input, "prompt"), 50)
        ),
        _ => format!("{name}: {}...", take_chars(&input.to_string(), 80)),
    };
    single_line(&summary)
}

/// Summarize a tool result (`toolUseResult`, or the block content).
pub(crate) fn summarize_tool_result(result: &Value) -> String {
    single_line(&result_text(result))
}

fn result_text(result: &Value) -> String {
    if let Some(map) = result.as_object() {
        if map.contains_key("stdout") {
            let stderr = map.get("stderr").and_then(Value::as_str).unwrap_or_default().trim();
            let stdout = map.get("stdout").and_then(Value::as_str).unwrap_or_default().trim();
            if !stderr.is_empty() {
                return format!("Error: {}...", take_chars(stderr, 80));
            }
            if !stdout.is_empty() {
                return ellipsize(&single_line(stdout), 230);
            }
        } else if let Some(files) = map.get("filenames") {
            let files: Vec<&str> = files
                .as_array()
                .map(|f| f.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let count = map
                .get("numFiles")
                .and_then(Value::as_u64)
                .unwrap_or(files.len() as u64);
            return match count {
                0 => "No matches found".to_string(),
                1..=3 => format!("Found: {}", files.join(", ")),
                _ => format!(
                    "Found {count} files: {}, ...",
                    files.iter().take(3).copied().collect::<Vec<_>>().join(", ")
                ),
            };
        } else if let Some(content) = map.get("content") {
            return content_text(content);
        }
    }

    match result {
        Value::String(text) => ellipsize(text, 100),
        Value::Null => String::new(),
        other => ellipsize(&other.to_string(), 100),
    }
}

fn content_text(content: &Value) -> String {
    if let Some(blocks) = content.as_array() {
        let first_text = blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .find_map(|b| b.get("text").and_then(Value::as_str));
        if let Some(text) = first_text {
            let head = take_chars(text, 100);
            return if head.len() < text.len() {
                format!("{head}...")
            } else {
                head.to_string()
            };
        }
    }
    let raw = match content {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    format!("{}...", take_chars(&raw, 100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bash_summary() {
        let input = json!({"command": "cargo test\n  --all", "description": "Run tests"});
        assert_eq!(
            summarize_tool_use("Bash", &input),
            "$ cargo test --all # Run tests"
        );

        let long = json!({"command": "x".repeat(150)});
        let summary = summarize_tool_use("Bash", &long);
        assert_eq!(summary.chars().count(), 2 + 110);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_file_tool_summaries() {
        assert_eq!(
            summarize_tool_use("Read", &json!({"file_path": "/a.rs", "offset": 10, "limit": 5})),
            "Read: /a.rs (lines 10-15)"
        );
        assert_eq!(
            summarize_tool_use("Read", &json!({"file_path": "/a.rs", "limit": 40})),
            "Read: /a.rs (first 40 lines)"
        );
        assert_eq!(
            summarize_tool_use("Write", &json!({"file_path": "/b.rs", "content": "a\nb"})),
            "Write: /b.rs (2 lines, 3 chars)"
        );
        assert_eq!(
            summarize_tool_use(
                "Edit",
                &json!({"file_path": "/c.rs", "old_string": "foo()", "new_string": "bar()", "replace_all": true})
            ),
            "Edit: /c.rs - 'foo()...' → 'bar()...' (all)"
        );
        assert_eq!(
            summarize_tool_use("Grep", &json!({"pattern": "unwrap\\(", "include": "*.rs"})),
            "Grep: /unwrap\\(/ in *.rs"
        );
    }

    #[test]
    fn test_other_tool_summaries() {
        assert_eq!(summarize_tool_use("TodoWrite", &json!({"todos": []})), "Clear todos");
        assert_eq!(
            summarize_tool_use("TodoWrite", &json!({"todos": [{}, {}]})),
            "Update todos (2 items)"
        );
        assert_eq!(
            summarize_tool_use("Task", &json!({"description": "Audit", "prompt": "Look\nclosely"})),
            "Task: Audit - Look closely..."
        );
        assert_eq!(
            summarize_tool_use("Custom", &json!({"k": 1})),
            "Custom: {\"k\":1}..."
        );
    }

    #[test]
    fn test_result_summaries() {
        assert_eq!(
            summarize_tool_result(&json!({"stdout": "ok\n\nall good", "stderr": ""})),
            "ok all good"
        );
        assert_eq!(
            summarize_tool_result(&json!({"stdout": "", "stderr": "boom\nfailed"})),
            "Error: boom failed..."
        );
        assert_eq!(
            summarize_tool_result(&json!({"filenames": [], "numFiles": 0})),
            "No matches found"
        );
        assert_eq!(
            summarize_tool_result(&json!({"filenames": ["a", "b"]})),
            "Found: a, b"
        );
        assert_eq!(
            summarize_tool_result(&json!({"filenames": ["a", "b", "c", "d"]})),
            "Found 4 files: a, b, c, ..."
        );
        assert_eq!(
            summarize_tool_result(&json!({"content": [{"type": "text", "text": "Done"}]})),
            "Done"
        );
        assert_eq!(summarize_tool_result(&json!("line one\nline two")), "line one line two");
    }
}
