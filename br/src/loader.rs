//! Batch loading and resume computation
//!
//! The input batch is a JSON array of `{id, payload}` records, or a plain
//! text file with one payload per line (ids auto-generated). Resume is a
//! pure set difference against the keys already persisted in the result
//! store; it never mutates the store.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::{BatchEntry, Task};
use crate::error::RunError;

/// Loose record shape so missing fields produce a batch-level error
/// instead of a serde message about one line
#[derive(Debug, Deserialize)]
struct RawEntry {
    id: Option<String>,
    payload: Option<String>,
}

/// Load a batch file, picking the format by extension (`.json` vs text)
pub async fn load_batch(path: impl AsRef<Path>) -> Result<Vec<BatchEntry>, RunError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RunError::MalformedInput(format!("cannot read {}: {}", path.display(), e)))?;

    let batch = if path.extension().map(|e| e == "json").unwrap_or(false) {
        parse_json_batch(&content)?
    } else {
        parse_text_batch(&content)
    };

    info!(count = batch.len(), path = %path.display(), "Batch loaded");
    Ok(batch)
}

/// Parse the JSON array format, rejecting missing or duplicate ids
pub fn parse_json_batch(content: &str) -> Result<Vec<BatchEntry>, RunError> {
    let raw: Vec<RawEntry> =
        serde_json::from_str(content).map_err(|e| RunError::MalformedInput(format!("invalid JSON batch: {}", e)))?;

    let mut seen = HashSet::with_capacity(raw.len());
    let mut batch = Vec::with_capacity(raw.len());

    for (i, entry) in raw.into_iter().enumerate() {
        let id = match entry.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => {
                return Err(RunError::MalformedInput(format!("record {} has no id", i)));
            }
        };
        let payload = entry
            .payload
            .ok_or_else(|| RunError::MalformedInput(format!("record {} ({}) has no payload", i, id)))?;

        if !seen.insert(id.clone()) {
            // Duplicates are rejected at load, never merged
            return Err(RunError::MalformedInput(format!("duplicate id: {}", id)));
        }
        batch.push(BatchEntry { id, payload });
    }

    Ok(batch)
}

/// Parse the one-payload-per-line text format with generated ids
pub fn parse_text_batch(content: &str) -> Vec<BatchEntry> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| BatchEntry {
            id: format!("prompt-{:03}", i + 1),
            payload: line.to_string(),
        })
        .collect()
}

/// Compute the resumed work set: `batch - keys already in the store`
///
/// Batch order is preserved for the surviving tasks.
pub fn resume(batch: Vec<BatchEntry>, done: &HashSet<String>, max_retries: u32) -> Vec<Task> {
    let total = batch.len();
    let pending: Vec<Task> = batch
        .into_iter()
        .filter(|entry| !done.contains(&entry.id))
        .map(|entry| Task::new(entry, max_retries))
        .collect();

    debug!(
        total,
        already_done = total - pending.len(),
        pending = pending.len(),
        "Resume set computed"
    );
    pending
}
