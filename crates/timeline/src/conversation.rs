// crates/timeline/src/conversation.rs
//! Conversation transformer: map enhanced chunks 1:1 onto a flat,
//! chronologically ordered list of display items with rollup summaries
//! for collapsed-view rendering. Derived data only; recomputed on every
//! parse, never persisted.

use crate::chunks::UserChunk;
use crate::steps::{EnhancedAiChunk, EnhancedChunk, SemanticStep, StepKind};
use serde::{Deserialize, Serialize};
use session_lens_core::{truncate_chars, CommandTags, ParsedCommand, TokenUsage};
use ts_rs::TS;

/// Preview length for thinking text in collapsed AI groups.
const THINKING_PREVIEW_CHARS: usize = 120;

/// Derived status of one AI response group. First matching rule wins:
/// interrupted ≻ error ≻ in-progress ≻ complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "snake_case")]
pub enum AiGroupStatus {
    Complete,
    Interrupted,
    Error,
    InProgress,
}

/// Rollup summary for a collapsed AI group, computed once per transform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct AiGroupSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_preview: Option<String>,
    pub tool_call_count: usize,
    pub output_count: usize,
    pub subagent_count: usize,
    pub error_count: usize,
    pub duration_ms: u64,
    pub usage: TokenUsage,
}

/// One user turn: the prompt plus parsed command / file references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct UserGroup {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<ParsedCommand>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
}

/// One AI response: its steps plus summary and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct AiGroup {
    pub steps: Vec<SemanticStep>,
    pub summary: AiGroupSummary,
    pub status: AiGroupStatus,
}

/// A marker item for chunks that hold nothing but system bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct SystemGroup {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConversationItem {
    User(UserGroup),
    System(SystemGroup),
    Ai(AiGroup),
}

/// Flat chat-item list for one loaded session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct SessionConversation {
    pub items: Vec<ConversationItem>,
}

/// Map each chunk to exactly one item, preserving order; no merging or
/// splitting at this stage.
pub fn transform_chunks(chunks: &[EnhancedChunk]) -> SessionConversation {
    let tags = CommandTags::new();
    let items = chunks
        .iter()
        .map(|chunk| match chunk {
            EnhancedChunk::User(user) => ConversationItem::User(user_group(user, &tags)),
            EnhancedChunk::Ai(ai) if ai.chunk.is_system_only() => {
                ConversationItem::System(SystemGroup {
                    text: ai
                        .chunk
                        .messages
                        .iter()
                        .map(|m| m.content.as_str())
                        .collect::<Vec<_>>()
                        .join("\n"),
                })
            }
            EnhancedChunk::Ai(ai) => ConversationItem::Ai(ai_group(ai)),
        })
        .collect();
    SessionConversation { items }
}

fn user_group(chunk: &UserChunk, tags: &CommandTags) -> UserGroup {
    let message = &chunk.message;
    UserGroup {
        text: message.content.clone(),
        command: message.command.clone(),
        file_references: tags.file_references(&message.content),
        timestamp_ms: message.timestamp_ms,
    }
}

fn ai_group(enhanced: &EnhancedAiChunk) -> AiGroup {
    let steps = &enhanced.steps;

    let status = derive_status(steps);

    let mut summary = AiGroupSummary::default();
    for step in steps {
        match step.kind {
            StepKind::Thinking => {
                if summary.thinking_preview.is_none() {
                    summary.thinking_preview =
                        Some(truncate_chars(&step.content, THINKING_PREVIEW_CHARS));
                }
            }
            StepKind::ToolCall => summary.tool_call_count += 1,
            StepKind::Output => summary.output_count += 1,
            StepKind::Subagent => summary.subagent_count += 1,
            _ => {}
        }
        if step.is_error {
            summary.error_count += 1;
        }
        summary.usage.add(&step.usage);
    }

    summary.duration_ms = match (enhanced.chunk.started_at_ms, enhanced.chunk.ended_at_ms) {
        (Some(start), Some(end)) if end >= start => (end - start) as u64,
        _ => 0,
    };

    AiGroup {
        steps: steps.clone(),
        summary,
        status,
    }
}

fn derive_status(steps: &[SemanticStep]) -> AiGroupStatus {
    if steps.iter().any(|s| s.kind == StepKind::Interruption) {
        AiGroupStatus::Interrupted
    } else if steps
        .iter()
        .any(|s| s.kind == StepKind::ToolResult && s.is_error)
    {
        AiGroupStatus::Error
    } else if steps.iter().any(|s| s.ended_at_ms.is_none()) {
        AiGroupStatus::InProgress
    } else {
        AiGroupStatus::Complete
    }
}
