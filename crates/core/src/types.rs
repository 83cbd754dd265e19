// crates/core/src/types.rs
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Token usage attached to assistant messages (and Task completions).
///
/// All counts default to zero; the on-disk `usage` object omits fields
/// freely, so absence and zero are treated the same.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_read_tokens)
            .saturating_add(self.cache_creation_tokens)
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Tokens this usage contributes to the context-growth running sum:
    /// input + output + both cache buckets.
    pub fn context_weight(&self) -> u64 {
        self.total()
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(other.cache_creation_tokens);
    }
}

/// Resolved classification of a raw record.
///
/// The on-disk format overloads `type: "user"` for three distinct meanings
/// (real input, tool result, interruption); this enum is the single place
/// where that ambiguity is resolved. Every consumer matches on it rather
/// than re-checking ad-hoc booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A real user prompt (string content, not meta). Starts a chunk
    /// unless it is a local-command echo.
    UserInput,
    /// A `type: "user"` record carrying tool_result blocks back to the
    /// assistant. Response flow; never starts a chunk.
    ToolResult,
    /// A `type: "user"` record with array content and no tool_result
    /// blocks: the user interrupted the assistant mid-response.
    Interruption,
    /// An assistant response (text / thinking / tool_use blocks).
    Assistant,
    /// Non-conversational marker (turn durations, hook output). Retained
    /// for bookkeeping, excluded from conversation content.
    System,
    /// A `type: "summary"` passthrough record.
    Summary,
    /// A `type: "file-history-snapshot"` passthrough record.
    Snapshot,
}

impl MessageKind {
    /// True for records that belong to the assistant's response flow
    /// rather than opening a new conversational turn.
    pub fn is_response_flow(&self) -> bool {
        matches!(
            self,
            Self::ToolResult | Self::Interruption | Self::Assistant | Self::System
        )
    }

    /// True for metadata records that are not part of the conversational
    /// stream at all.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Summary | Self::Snapshot)
    }
}

/// One typed content block from a message's content array.
///
/// Extraction from the raw array is lossless: blocks are kept in array
/// order and unknown block types are preserved as `Other` so downstream
/// stages can count them even if they can't interpret them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: Option<serde_json::Value>,
        #[serde(default)]
        is_error: bool,
    },
    Image,
    #[serde(other)]
    Other,
}

/// A tool invocation extracted from an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// The `tool_use` block id: the join key to the matching tool_result.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

impl ToolCall {
    /// Task calls spawn sub-agent executions logged in their own files.
    pub fn is_task(&self) -> bool {
        self.name == "Task"
    }

    /// Human-readable description from the Task call's input parameters.
    pub fn description(&self) -> Option<&str> {
        self.input.get("description").and_then(|v| v.as_str())
    }

    /// Sub-agent type label from the Task call's input parameters.
    pub fn subagent_type(&self) -> Option<&str> {
        self.input.get("subagent_type").and_then(|v| v.as_str())
    }
}

/// Enrichment lifted from the top-level `toolUseResult` object on Task
/// completion records. The sub-agent file itself never carries these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct TaskEnrichment {
    /// Short-hash agent identifier, matching the `agent-{id}.jsonl`
    /// filename in the subagents directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tool_use_count: Option<u32>,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// A tool result extracted from a response-flow user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPayload {
    /// Matches the id of the `tool_use` block it answers.
    pub tool_use_id: String,
    /// Flattened readable content (string content or joined text blocks).
    pub content: String,
    pub is_error: bool,
    /// Present on Task completions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<TaskEnrichment>,
}

/// The normalized form of one raw JSONL record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct ParsedMessage {
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Threading link. Not reliable for ordering; file position and
    /// timestamps are authoritative there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uuid: Option<String>,
    /// ISO-8601 timestamp as written on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// The same timestamp parsed to epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
    /// Flattened readable text content.
    pub content: String,
    /// Ordered content blocks when the raw content was an array.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub is_meta: bool,
    #[serde(default)]
    pub is_sidechain: bool,
    /// Present when this record was logged inside a sub-agent execution.
    /// Informational at this layer; sub-agent files are discovered by
    /// naming convention, not by this flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Local slash-command echo or other injected marker. Superficially a
    /// user input, but must never start a chunk.
    #[serde(default)]
    pub is_command_echo: bool,
    /// The slash command parsed out of a tag-wrapped user message. The
    /// tags themselves are stripped from `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<crate::commands::ParsedCommand>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResultPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tool_use_id: Option<String>,
    /// Extra fields from system / summary / snapshot records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ParsedMessage {
    pub fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            uuid: None,
            parent_uuid: None,
            timestamp: None,
            timestamp_ms: None,
            content: content.into(),
            blocks: Vec::new(),
            usage: None,
            is_meta: false,
            is_sidechain: false,
            agent_id: None,
            is_command_echo: false,
            command: None,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            source_tool_use_id: None,
            metadata: None,
        }
    }

    pub fn user_input(content: impl Into<String>) -> Self {
        Self::new(MessageKind::UserInput, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Assistant, content)
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        let ts = timestamp.into();
        self.timestamp_ms = parse_timestamp_ms(&ts);
        self.timestamp = Some(ts);
        self
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_parent_uuid(mut self, parent_uuid: impl Into<String>) -> Self {
        self.parent_uuid = Some(parent_uuid.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether this message opens a new conversational chunk: a real user
    /// input that is not a command echo.
    pub fn starts_chunk(&self) -> bool {
        self.kind == MessageKind::UserInput && !self.is_command_echo
    }

    /// Noise records never start a chunk and never form one by themselves:
    /// command echoes, meta system markers, and passthrough metadata.
    pub fn is_noise(&self) -> bool {
        self.is_command_echo || self.kind.is_passthrough() || self.kind == MessageKind::System
    }

    /// Thinking block texts, in array order.
    pub fn thinking_blocks(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|b| match b {
            ContentBlock::Thinking { thinking } => Some(thinking.as_str()),
            _ => None,
        })
    }
}

/// Parse an ISO-8601 / RFC 3339 timestamp into epoch milliseconds.
pub fn parse_timestamp_ms(ts: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Truncate to at most `max` characters without splitting a char.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{truncated}...")
    }
}

// ============================================================================
// Raw JSONL deserialization types (on-disk format)
// ============================================================================

/// The nested `message` object of a raw record.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    pub role: Option<String>,
    pub content: RawContent,
    #[serde(default)]
    pub usage: Option<RawUsage>,
}

/// Content is either a plain string (real user prompts) or an ordered
/// array of typed blocks (everything else).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Token counts as spelled in the on-disk `usage` object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
}

impl From<RawUsage> for TokenUsage {
    fn from(raw: RawUsage) -> Self {
        TokenUsage {
            input_tokens: raw.input_tokens.unwrap_or(0),
            output_tokens: raw.output_tokens.unwrap_or(0),
            cache_read_tokens: raw.cache_read_input_tokens.unwrap_or(0),
            cache_creation_tokens: raw.cache_creation_input_tokens.unwrap_or(0),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
