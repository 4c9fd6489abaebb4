/*!
 * Common test utilities for the archivist test suite
 */

use anyhow::Result;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Routes library logs to the test harness output, once per binary
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Ordinary message entry as it appears in an export
pub fn ordinary_message(id: i64, from: &str, text: &str, reply_to: Option<i64>) -> Value {
    let mut message = json!({
        "id": id,
        "type": "message",
        "date": format!("2023-07-01T10:{:02}:00", id % 60),
        "date_unixtime": (1_688_205_600 + id * 60).to_string(),
        "from": from,
        "from_id": format!("user{}", from.len()),
        "text": text,
    });
    if let Some(parent) = reply_to {
        message["reply_to_message_id"] = json!(parent);
    }
    message
}

/// Service message entry as it appears in an export
pub fn service_message(id: i64, action: &str, actor: &str) -> Value {
    json!({
        "id": id,
        "type": "service",
        "date": format!("2023-07-01T10:{:02}:00", id % 60),
        "date_unixtime": (1_688_205_600 + id * 60).to_string(),
        "actor": actor,
        "actor_id": "user0",
        "action": action,
    })
}

/// Writes a chat export with the given message entries
pub fn write_export(dir: &Path, filename: &str, messages: Vec<Value>) -> Result<PathBuf> {
    let export = json!({
        "name": "Weekend plans",
        "type": "private_group",
        "id": 4242,
        "messages": messages,
    });
    create_test_file(dir, filename, &serde_json::to_string_pretty(&export)?)
}

/// Writes an export of plain messages with the given ids
pub fn write_export_with_ids(dir: &Path, filename: &str, ids: &[i64]) -> Result<PathBuf> {
    let messages = ids
        .iter()
        .map(|&id| ordinary_message(id, if id % 2 == 0 { "Bob" } else { "Alice" }, &format!("message {}", id), None))
        .collect();
    write_export(dir, filename, messages)
}

/// A small conversation with a reply chain and a service message
pub fn write_sample_export(dir: &Path, filename: &str) -> Result<PathBuf> {
    write_export(
        dir,
        filename,
        vec![
            service_message(1, "create_group", "Alice"),
            ordinary_message(2, "Alice", "Anyone up for hiking on Saturday?", None),
            ordinary_message(3, "Bob", "Count me in", Some(2)),
            ordinary_message(4, "Carol", "Which trail?", Some(3)),
            ordinary_message(5, "Alice", "The ridge loop, 9am at the parking lot", Some(4)),
            ordinary_message(6, "Bob", "I'll bring snacks", None),
            ordinary_message(7, "Carol", "See you there", Some(5)),
        ],
    )
}
