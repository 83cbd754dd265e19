// crates/timeline/src/session.rs
//! Session assembly: orchestrates reader → sub-agent resolver → chunk
//! builder → step extractor → conversation/waterfall into the outputs the
//! application shell consumes. The same `reconstruct` pipeline applies at
//! any nesting depth, so drilling into a sub-agent (or a sub-agent's own
//! sub-agents) reuses everything above without special-casing.

use crate::chunks::build_chunks;
use crate::conversation::{transform_chunks, SessionConversation};
use crate::process::{collect_task_spawns, resolve_subagents, Process};
use crate::steps::{enhance_chunks_in, EnhancedChunk, StepContext, StepKind};
use crate::waterfall::{build_waterfall, WaterfallData};
use serde::{Deserialize, Serialize};
use session_lens_core::{
    paths::resolve_subagent_path, read_session, ErrorBreakdown, ParseError, ParsedMessage,
    SessionAggregates, TokenUsage,
};
use std::path::Path;
use ts_rs::TS;

/// Rollup metrics for one reconstructed message stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub message_count: usize,
    pub chunk_count: usize,
    pub tool_call_count: usize,
    pub subagent_count: usize,
    pub interruption_count: usize,
    pub usage: TokenUsage,
    pub duration_ms: u64,
    pub error_breakdown: ErrorBreakdown,
}

/// Everything derived from one message stream: chunks with steps, the
/// flat conversation, the waterfall view, and rollup metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct Reconstruction {
    pub chunks: Vec<EnhancedChunk>,
    pub conversation: SessionConversation,
    pub waterfall: WaterfallData,
    pub metrics: SessionMetrics,
}

/// A fully loaded main session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    /// Session id: the file stem of the JSONL path.
    pub session_id: String,
    pub messages: Vec<ParsedMessage>,
    pub aggregates: SessionAggregates,
    pub processes: Vec<Process>,
    #[serde(flatten)]
    pub reconstruction: Reconstruction,
}

/// One resolved sub-agent's own chunked breakdown, for drill-down. Its
/// nested sub-agents resolve through the same pipeline, so arbitrarily
/// deep trees work without extra code paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct SubagentDetail {
    pub agent_id: String,
    pub parent_task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subagent_type: Option<String>,
    pub processes: Vec<Process>,
    #[serde(flatten)]
    pub reconstruction: Reconstruction,
}

/// Run the depth-agnostic pipeline over a classified message stream.
pub fn reconstruct(
    messages: &[ParsedMessage],
    processes: &[Process],
    context: &StepContext,
) -> Reconstruction {
    let chunks = enhance_chunks_in(build_chunks(messages, processes), context);
    let conversation = transform_chunks(&chunks);
    let waterfall = build_waterfall(&chunks);
    let metrics = compute_metrics(messages, &chunks);

    Reconstruction {
        chunks,
        conversation,
        waterfall,
        metrics,
    }
}

fn compute_metrics(messages: &[ParsedMessage], chunks: &[EnhancedChunk]) -> SessionMetrics {
    let mut metrics = SessionMetrics::default();
    metrics.message_count = messages.len();
    metrics.chunk_count = chunks.len();

    for message in messages {
        if let Some(usage) = &message.usage {
            metrics.usage.add(usage);
        }
    }

    let mut first_ts: Option<i64> = None;
    let mut last_ts: Option<i64> = None;
    for message in messages {
        if let Some(ts) = message.timestamp_ms {
            first_ts = Some(first_ts.map_or(ts, |f: i64| f.min(ts)));
            last_ts = Some(last_ts.map_or(ts, |l: i64| l.max(ts)));
        }
    }
    if let (Some(first), Some(last)) = (first_ts, last_ts) {
        if last >= first {
            metrics.duration_ms = (last - first) as u64;
        }
    }

    for chunk in chunks {
        if let EnhancedChunk::Ai(ai) = chunk {
            metrics.subagent_count += ai.chunk.processes.len();
            for step in &ai.steps {
                match step.kind {
                    StepKind::ToolCall => metrics.tool_call_count += 1,
                    StepKind::Interruption => metrics.interruption_count += 1,
                    StepKind::ToolResult if step.is_error => {
                        metrics.error_breakdown.record(&step.content);
                    }
                    _ => {}
                }
            }
        }
    }

    metrics
}

/// Load and reconstruct a main session.
///
/// `Ok(None)` means the session is unavailable (missing file, permission
/// error), not a failure. One corrupt or partially written file never
/// raises: bad lines are skipped inside the reader.
pub async fn load_session(path: &Path) -> Result<Option<SessionDetail>, ParseError> {
    let log = match read_session(path).await {
        Ok(log) => log,
        Err(e) if e.is_unavailable() => return Ok(None),
        Err(e) => return Err(e),
    };

    let spawns = collect_task_spawns(&log.messages);
    let processes = resolve_subagents(path, &spawns).await;
    let reconstruction = reconstruct(&log.messages, &processes, &StepContext::Main);

    let session_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();

    Ok(Some(SessionDetail {
        session_id,
        messages: log.messages,
        aggregates: log.aggregates,
        processes,
        reconstruction,
    }))
}

/// Reconstruct a resolved sub-agent's own breakdown, resolving its nested
/// sub-agents from disk. `parent_jsonl` is the file the process was
/// resolved against (the main session, or an outer sub-agent for deeper
/// levels).
pub async fn load_subagent_detail(parent_jsonl: &Path, process: &Process) -> SubagentDetail {
    let own_path = resolve_subagent_path(parent_jsonl, &process.agent_id);
    let spawns = collect_task_spawns(&process.messages);
    let nested = resolve_subagents(&own_path, &spawns).await;

    let context = StepContext::Subagent {
        agent_id: process.agent_id.clone(),
    };
    let reconstruction = reconstruct(&process.messages, &nested, &context);

    SubagentDetail {
        agent_id: process.agent_id.clone(),
        parent_task_id: process.parent_task_id.clone(),
        description: process.description.clone(),
        subagent_type: process.subagent_type.clone(),
        processes: nested,
        reconstruction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationItem;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    async fn write_lines(path: &PathBuf, lines: &[&str]) {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        let mut content = lines.join("\n");
        content.push('\n');
        tokio::fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_session_missing_is_none() {
        let result = load_session(Path::new("/nowhere/session.jsonl"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_load_session_end_to_end_with_subagents() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("sess-1.jsonl");

        write_lines(
            &session,
            &[
                r#"{"type":"user","uuid":"u1","message":{"role":"user","content":"explore the repo"},"timestamp":"2026-02-03T09:00:00Z"}"#,
                r#"{"type":"assistant","uuid":"a1","message":{"role":"assistant","content":[{"type":"tool_use","id":"task1","name":"Task","input":{"description":"scout modules","subagent_type":"Explore"}}],"usage":{"input_tokens":900,"output_tokens":40}},"timestamp":"2026-02-03T09:00:02Z"}"#,
                r#"{"type":"user","uuid":"u2","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"task1","content":"scouted"}]},"toolUseResult":{"agentId":"abc1234","status":"completed","totalDurationMs":30000},"timestamp":"2026-02-03T09:00:40Z"}"#,
                r#"{"type":"assistant","uuid":"a2","message":{"role":"assistant","content":[{"type":"text","text":"All mapped."}],"usage":{"input_tokens":1000,"output_tokens":30}},"timestamp":"2026-02-03T09:00:45Z"}"#,
            ],
        )
        .await;

        let agent_file = dir
            .path()
            .join("sess-1")
            .join("subagents")
            .join("agent-abc1234.jsonl");
        write_lines(
            &agent_file,
            &[
                r#"{"type":"user","isSidechain":true,"agentId":"abc1234","message":{"role":"user","content":"scout modules"},"timestamp":"2026-02-03T09:00:05Z"}"#,
                r#"{"type":"assistant","isSidechain":true,"agentId":"abc1234","message":{"role":"assistant","content":[{"type":"tool_use","id":"g1","name":"Grep","input":{"pattern":"mod"}}],"usage":{"input_tokens":200,"output_tokens":20}},"timestamp":"2026-02-03T09:00:10Z"}"#,
                r#"{"type":"user","isSidechain":true,"agentId":"abc1234","isMeta":true,"message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"g1","content":"12 matches"}]},"timestamp":"2026-02-03T09:00:20Z"}"#,
                r#"{"type":"assistant","isSidechain":true,"agentId":"abc1234","message":{"role":"assistant","content":[{"type":"text","text":"found 12 modules"}],"usage":{"input_tokens":300,"output_tokens":15}},"timestamp":"2026-02-03T09:00:30Z"}"#,
            ],
        )
        .await;

        let detail = load_session(&session).await.unwrap().unwrap();

        assert_eq!(detail.session_id, "sess-1");
        assert_eq!(detail.messages.len(), 4);
        assert_eq!(detail.processes.len(), 1);

        let process = &detail.processes[0];
        assert_eq!(process.agent_id, "abc1234");
        assert_eq!(process.parent_task_id, "task1");
        assert_eq!(process.description.as_deref(), Some("scout modules"));
        // Span comes from the sub-agent's own messages, not the Task call.
        assert_eq!(process.duration_ms(), Some(25_000));

        // The Task call is suppressed in favor of a subagent step.
        let ai_steps: Vec<_> = detail
            .reconstruction
            .chunks
            .iter()
            .filter_map(|c| match c {
                EnhancedChunk::Ai(ai) => Some(&ai.steps),
                _ => None,
            })
            .flatten()
            .collect();
        assert!(ai_steps.iter().any(|s| s.kind == StepKind::Subagent));
        assert!(ai_steps
            .iter()
            .all(|s| !(s.kind == StepKind::ToolCall && s.id == "task1")));

        assert_eq!(detail.reconstruction.metrics.subagent_count, 1);
        assert_eq!(detail.reconstruction.metrics.message_count, 4);
        assert_eq!(detail.reconstruction.metrics.usage.input_tokens, 1900);

        // Conversation: user turn + AI group.
        assert_eq!(detail.reconstruction.conversation.items.len(), 2);
        assert!(matches!(
            detail.reconstruction.conversation.items[0],
            ConversationItem::User(_)
        ));

        // Drill-down reconstructs the sub-agent with the same pipeline.
        let sub = load_subagent_detail(&session, process).await;
        assert_eq!(sub.agent_id, "abc1234");
        assert_eq!(sub.reconstruction.metrics.message_count, 4);
        assert!(sub.processes.is_empty());
        let sub_steps: Vec<_> = sub
            .reconstruction
            .chunks
            .iter()
            .filter_map(|c| match c {
                EnhancedChunk::Ai(ai) => Some(&ai.steps),
                _ => None,
            })
            .flatten()
            .collect();
        assert!(sub_steps.iter().all(|s| {
            matches!(&s.context, StepContext::Subagent { agent_id } if agent_id == "abc1234")
        }));
    }

    #[tokio::test]
    async fn test_load_session_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("twice.jsonl");
        write_lines(
            &session,
            &[
                r#"{"type":"user","message":{"role":"user","content":"hello"},"timestamp":"2026-02-03T09:00:00Z"}"#,
                r#"{"type":"assistant","message":{"role":"assistant","content":"hi"},"timestamp":"2026-02-03T09:00:01Z"}"#,
            ],
        )
        .await;

        let first = load_session(&session).await.unwrap().unwrap();
        let second = load_session(&session).await.unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_error_breakdown_rolls_up() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("errors.jsonl");
        write_lines(
            &session,
            &[
                r#"{"type":"user","message":{"role":"user","content":"run tests"},"timestamp":"2026-02-03T09:00:00Z"}"#,
                r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"t1","name":"Bash","input":{}}]},"timestamp":"2026-02-03T09:00:01Z"}"#,
                r#"{"type":"user","isMeta":true,"message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"cargo: command not found","is_error":true}]},"timestamp":"2026-02-03T09:00:02Z"}"#,
                r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"t2","name":"Bash","input":{}}]},"timestamp":"2026-02-03T09:00:03Z"}"#,
                r#"{"type":"user","isMeta":true,"message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t2","content":"Exit code 1","is_error":true}]},"timestamp":"2026-02-03T09:00:04Z"}"#,
            ],
        )
        .await;

        let detail = load_session(&session).await.unwrap().unwrap();
        let breakdown = &detail.reconstruction.metrics.error_breakdown;
        assert_eq!(breakdown.total, 2);
        assert_eq!(breakdown.counts.get("Command Not Found"), Some(&1));
        assert_eq!(breakdown.counts.get("Exit Code Error"), Some(&1));
    }

    #[test]
    fn test_reconstruct_empty_stream() {
        let reconstruction = reconstruct(&[], &[], &StepContext::Main);
        assert!(reconstruction.chunks.is_empty());
        assert!(reconstruction.conversation.items.is_empty());
        assert_eq!(reconstruction.metrics.message_count, 0);
    }
}
