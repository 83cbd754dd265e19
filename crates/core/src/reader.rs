// crates/core/src/reader.rs
//! Session reader: one JSONL file in, an ordered message list plus
//! one-pass aggregates out.
//!
//! Session files are written append-only by a live process, so the final
//! line may be a partial write. The reader parses every complete line,
//! attempts the unterminated tail (it is often a whole record that simply
//! lacks its newline yet), and silently drops it when it isn't valid JSON.

use crate::classifier::Classifier;
use crate::error::ParseError;
use crate::types::{truncate_chars, ParsedMessage, TokenUsage};
use memchr::memrchr;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use ts_rs::TS;

/// Preview length for the session-list first-message text.
const PREVIEW_CHARS: usize = 100;

/// Session-level rollups computed in the same pass as classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct SessionAggregates {
    pub message_count: usize,
    /// Lines that failed classification and were skipped.
    pub skipped_lines: usize,
    /// First real user input, truncated for list previews.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_user_text: Option<String>,
    pub usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_timestamp_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp_ms: Option<i64>,
}

/// A fully classified session file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct SessionLog {
    pub messages: Vec<ParsedMessage>,
    pub aggregates: SessionAggregates,
}

impl SessionLog {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        match (
            self.aggregates.first_timestamp_ms,
            self.aggregates.last_timestamp_ms,
        ) {
            (Some(first), Some(last)) if last >= first => Some((last - first) as u64),
            _ => None,
        }
    }
}

/// Classify the full content of a session file. Pure; used directly by
/// tests and by recursion over in-memory sub-agent transcripts.
pub fn parse_lines(content: &str) -> SessionLog {
    let classifier = Classifier::new();
    let mut messages: Vec<ParsedMessage> = Vec::new();
    let mut skipped_lines: usize = 0;

    // Split complete lines from the unterminated tail (if any).
    let (complete, tail) = match memrchr(b'\n', content.as_bytes()) {
        Some(pos) => (&content[..pos], &content[pos + 1..]),
        None => ("", content),
    };

    for (line_number, line) in complete.split('\n').enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match classifier.classify_line(line) {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => {}
            Err(e) => {
                debug!("Skipping unclassifiable line {}: {}", line_number + 1, e);
                skipped_lines += 1;
            }
        }
    }

    // The tail is a concurrent writer's partial line: parse it when it
    // happens to be complete JSON, drop it silently otherwise.
    let tail = tail.trim();
    if !tail.is_empty() {
        match classifier.classify_line(tail) {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => {}
            Err(_) => {
                debug!("Dropping unterminated partial tail line");
            }
        }
    }

    let aggregates = compute_aggregates(&messages, skipped_lines);
    SessionLog {
        messages,
        aggregates,
    }
}

/// Read and classify a session file.
///
/// # Errors
/// - [`ParseError::NotFound`] / [`ParseError::PermissionDenied`] when the
///   file is unavailable; callers usually map these to "no session"
///   rather than a failure state ([`ParseError::is_unavailable`]).
/// - [`ParseError::Io`] for other I/O failures.
///
/// A file with zero parseable lines yields an empty log, not an error.
pub async fn read_session(path: &Path) -> Result<SessionLog, ParseError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ParseError::io(path, e))?;
    let content = String::from_utf8_lossy(&bytes);
    Ok(parse_lines(&content))
}

fn compute_aggregates(messages: &[ParsedMessage], skipped_lines: usize) -> SessionAggregates {
    let mut usage = TokenUsage::default();
    let mut first_user_text: Option<String> = None;
    let mut first_timestamp_ms: Option<i64> = None;
    let mut last_timestamp_ms: Option<i64> = None;

    for message in messages {
        if let Some(u) = &message.usage {
            usage.add(u);
        }
        if first_user_text.is_none() && message.starts_chunk() && !message.content.is_empty() {
            first_user_text = Some(truncate_chars(&message.content, PREVIEW_CHARS));
        }
        if let Some(ts) = message.timestamp_ms {
            first_timestamp_ms = Some(first_timestamp_ms.map_or(ts, |f: i64| f.min(ts)));
            last_timestamp_ms = Some(last_timestamp_ms.map_or(ts, |l: i64| l.max(ts)));
        }
    }

    SessionAggregates {
        message_count: messages.len(),
        skipped_lines,
        first_user_text,
        usage,
        first_timestamp_ms,
        last_timestamp_ms,
    }
}
