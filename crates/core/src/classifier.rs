// crates/core/src/classifier.rs
//! Record classifier: one raw JSONL line in, one [`ParsedMessage`] out.
//!
//! The on-disk format has no schema version and overloads its `type` tags
//! (a `type: "user"` record can be a real prompt, a tool result, or an
//! interruption). All discrimination rules live here, evaluated in order,
//! first match wins; downstream stages match on [`MessageKind`] and never
//! re-derive classification from raw fields.

use crate::commands::CommandTags;
use crate::error::ClassifyError;
use crate::types::*;
use tracing::debug;

/// Conventional prefix on the text block of a user interruption record.
const INTERRUPT_PREFIX: &str = "[Request interrupted";

/// Stateless apart from compiled command-tag patterns. Build once per
/// session read, reuse per line.
pub struct Classifier {
    tags: CommandTags,
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            tags: CommandTags::new(),
        }
    }

    /// Classify one raw line.
    ///
    /// `Ok(None)` means the line is a valid record of a type this layer
    /// does not model (forward compatibility: unknown types are skipped,
    /// never fatal). `Err` means the line is not valid JSON or has no
    /// usable `type` tag; callers skip and count it.
    pub fn classify_line(&self, line: &str) -> Result<Option<ParsedMessage>, ClassifyError> {
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| ClassifyError::MalformedJson {
                message: e.to_string(),
            })?;
        self.classify_value(&value)
    }

    /// Classify an already-decoded record. Pure; no I/O.
    pub fn classify_value(
        &self,
        value: &serde_json::Value,
    ) -> Result<Option<ParsedMessage>, ClassifyError> {
        let entry_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(ClassifyError::MissingType)?;

        let message = match entry_type {
            "user" => self.classify_user(value),
            "assistant" => self.classify_assistant(value),
            "system" => Some(classify_system(value)),
            "summary" => Some(classify_summary(value)),
            "file-history-snapshot" => Some(classify_snapshot(value)),
            other => {
                debug!("Ignoring unknown entry type '{}'", other);
                None
            }
        };

        Ok(message.map(|m| attach_common_fields(m, value)))
    }

    /// The three-way `type: "user"` split (the central parsing challenge):
    ///
    /// 1. not meta + string content ⇒ real user input
    /// 2. meta, or array content with tool_result blocks ⇒ tool result
    /// 3. array content without tool_result blocks ⇒ interruption
    fn classify_user(&self, value: &serde_json::Value) -> Option<ParsedMessage> {
        let is_meta = value.get("isMeta").and_then(|v| v.as_bool()) == Some(true);
        // Content usually lives under the nested `message` object, but
        // older records carry it at the top level.
        let content = value
            .get("message")
            .and_then(|m| m.get("content"))
            .or_else(|| value.get("content"));

        match content {
            Some(serde_json::Value::String(s)) if !is_meta => {
                if s.trim_start().starts_with(INTERRUPT_PREFIX) {
                    return Some(ParsedMessage::new(MessageKind::Interruption, s.clone()));
                }

                let cleaned = self.tags.clean(s).replace("\\\n", "\n");
                let mut message = ParsedMessage::user_input(cleaned);
                message.is_command_echo = self.tags.is_noise(s);
                message.command = self.tags.parse_command(s);
                Some(message)
            }
            Some(serde_json::Value::Array(arr)) => {
                let blocks: Vec<ContentBlock> = arr
                    .iter()
                    .filter_map(|b| serde_json::from_value(b.clone()).ok())
                    .collect();
                let has_tool_result = blocks
                    .iter()
                    .any(|b| matches!(b, ContentBlock::ToolResult { .. }));

                if has_tool_result || is_meta {
                    Some(build_tool_result_message(value, blocks))
                } else {
                    // Array content with no tool_result: the user cut the
                    // assistant off mid-response.
                    let text = join_text_blocks(&blocks);
                    let mut message = ParsedMessage::new(MessageKind::Interruption, text);
                    message.blocks = blocks;
                    Some(message)
                }
            }
            Some(serde_json::Value::String(s)) => {
                // Meta with string content: injected context, not a prompt.
                let mut message = ParsedMessage::new(MessageKind::ToolResult, s.clone());
                message.is_command_echo = self.tags.is_noise(s);
                Some(message)
            }
            _ => None,
        }
    }

    fn classify_assistant(&self, value: &serde_json::Value) -> Option<ParsedMessage> {
        let msg_value = value.get("message").unwrap_or(value);
        let raw: RawMessage = serde_json::from_value(msg_value.clone()).ok()?;

        let (blocks, text) = match raw.content {
            RawContent::Text(text) => (Vec::new(), text),
            RawContent::Blocks(blocks) => {
                let text = join_text_blocks(&blocks);
                (blocks, text)
            }
        };

        let tool_calls: Vec<ToolCall> = blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect();

        let mut message = ParsedMessage::assistant(text);
        message.blocks = blocks;
        message.tool_calls = tool_calls;
        message.usage = raw.usage.map(TokenUsage::from).filter(|u| !u.is_empty());
        Some(message)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Attach fields every record type shares.
fn attach_common_fields(
    mut message: ParsedMessage,
    value: &serde_json::Value,
) -> ParsedMessage {
    if let Some(ts) = value.get("timestamp").and_then(|v| v.as_str()) {
        message = message.with_timestamp(ts);
    }
    if let Some(uuid) = value.get("uuid").and_then(|v| v.as_str()) {
        message = message.with_uuid(uuid);
    }
    if let Some(parent) = value.get("parentUuid").and_then(|v| v.as_str()) {
        message = message.with_parent_uuid(parent);
    }
    message.is_meta = value.get("isMeta").and_then(|v| v.as_bool()).unwrap_or(false);
    message.is_sidechain = value
        .get("isSidechain")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    message.agent_id = value
        .get("agentId")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from);
    message.source_tool_use_id = value
        .get("sourceToolUseID")
        .and_then(|v| v.as_str())
        .map(String::from);
    message
}

/// Build a tool-result message from its extracted blocks, lifting the
/// top-level `toolUseResult` enrichment onto the first payload.
fn build_tool_result_message(
    value: &serde_json::Value,
    blocks: Vec<ContentBlock>,
) -> ParsedMessage {
    let mut payloads: Vec<ToolResultPayload> = blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Some(ToolResultPayload {
                tool_use_id: tool_use_id.clone(),
                content: flatten_result_content(content.as_ref()),
                is_error: *is_error,
                enrichment: None,
            }),
            _ => None,
        })
        .collect();

    if let Some(enrichment) = extract_enrichment(value.get("toolUseResult")) {
        if let Some(first) = payloads.first_mut() {
            first.enrichment = Some(enrichment);
        }
    }

    let preview = payloads
        .iter()
        .map(|p| {
            let truncated = truncate_chars(&p.content, 200);
            if truncated.is_empty() {
                format!("[Tool result for {}]", p.tool_use_id)
            } else {
                format!("[Tool result for {}]: {}", p.tool_use_id, truncated)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut message = ParsedMessage::new(MessageKind::ToolResult, preview);
    message.blocks = blocks;
    message.tool_results = payloads;
    message
}

/// Flatten a tool_result `content` value (string, or array of text
/// blocks) into readable text.
fn flatten_result_content(content: Option<&serde_json::Value>) -> String {
    match content {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(arr)) => arr
            .iter()
            .filter_map(|item| {
                if item.get("type").and_then(|t| t.as_str()) == Some("text") {
                    item.get("text").and_then(|t| t.as_str())
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Lift Task-completion fields from a `toolUseResult` object. Returns
/// `None` when the value carries nothing this layer models (plain string
/// results, arbitrary tool output objects).
fn extract_enrichment(value: Option<&serde_json::Value>) -> Option<TaskEnrichment> {
    let obj = value?.as_object()?;

    let agent_id = obj.get("agentId").and_then(|v| v.as_str()).map(String::from);
    let status = obj.get("status").and_then(|v| v.as_str()).map(String::from);
    let total_duration_ms = obj.get("totalDurationMs").and_then(|v| v.as_u64());
    let total_tool_use_count = obj
        .get("totalToolUseCount")
        .and_then(|v| v.as_u64())
        .map(|v| v as u32);
    let usage = obj
        .get("usage")
        .and_then(|u| serde_json::from_value::<RawUsage>(u.clone()).ok())
        .map(TokenUsage::from)
        .unwrap_or_default();

    if agent_id.is_none()
        && status.is_none()
        && total_duration_ms.is_none()
        && total_tool_use_count.is_none()
        && usage.is_empty()
    {
        return None;
    }

    Some(TaskEnrichment {
        agent_id,
        status,
        total_duration_ms,
        total_tool_use_count,
        usage,
    })
}

fn join_text_blocks(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn classify_system(value: &serde_json::Value) -> ParsedMessage {
    let subtype = value
        .get("subtype")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let duration_ms = value.get("durationMs").and_then(|v| v.as_u64());

    let content = if let Some(ms) = duration_ms {
        format!("{}: {}ms", subtype, ms)
    } else {
        subtype.to_string()
    };

    let mut meta = serde_json::Map::new();
    meta.insert(
        "subtype".to_string(),
        serde_json::Value::String(subtype.to_string()),
    );
    if let Some(ms) = duration_ms {
        meta.insert("durationMs".to_string(), serde_json::json!(ms));
    }
    if let Some(err) = value.get("error") {
        meta.insert("error".to_string(), err.clone());
    }

    ParsedMessage::new(MessageKind::System, content)
        .with_metadata(serde_json::Value::Object(meta))
}

fn classify_summary(value: &serde_json::Value) -> ParsedMessage {
    let summary = value
        .get("summary")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    let mut meta = serde_json::Map::new();
    meta.insert(
        "summary".to_string(),
        serde_json::Value::String(summary.to_string()),
    );
    if let Some(leaf) = value.get("leafUuid").and_then(|v| v.as_str()) {
        meta.insert(
            "leafUuid".to_string(),
            serde_json::Value::String(leaf.to_string()),
        );
    }

    ParsedMessage::new(MessageKind::Summary, summary.to_string())
        .with_metadata(serde_json::Value::Object(meta))
}

fn classify_snapshot(value: &serde_json::Value) -> ParsedMessage {
    let is_update = value
        .get("isSnapshotUpdate")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let content = if is_update {
        "file-history-snapshot (update)".to_string()
    } else {
        "file-history-snapshot".to_string()
    };

    let mut meta = serde_json::Map::new();
    if let Some(snapshot) = value.get("snapshot") {
        meta.insert("snapshot".to_string(), snapshot.clone());
    }
    meta.insert("isSnapshotUpdate".to_string(), serde_json::json!(is_update));

    ParsedMessage::new(MessageKind::Snapshot, content)
        .with_metadata(serde_json::Value::Object(meta))
}
