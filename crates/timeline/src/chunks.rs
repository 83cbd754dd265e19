// crates/timeline/src/chunks.rs
//! Chunk builder: segment a classified message stream into conversational
//! units: one `UserChunk` per real user input, one `AiChunk` for all the
//! activity until the next one.
//!
//! Two-state machine: `AwaitingUser` scans for the next chunk-starting
//! message; `AccumulatingResponse` buffers everything else into the
//! current AI chunk. Passthrough metadata (summaries, snapshots) never
//! enters a chunk, and noise that precedes the first real content never
//! fabricates one; a session of nothing but command echoes yields zero
//! chunks. The builder never fails: missing fields degrade to file-order
//! grouping.

use crate::process::Process;
use serde::{Deserialize, Serialize};
use session_lens_core::{ParsedMessage, ToolCall, ToolResultPayload};
use std::collections::HashMap;
use ts_rs::TS;

/// Exactly one real user input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct UserChunk {
    pub message: ParsedMessage,
}

/// A tool call paired with its result by id. `result: None` is the
/// orphaned state: valid and common, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    pub call: ToolCall,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResultPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<i64>,
}

impl ToolExecution {
    pub fn is_orphaned(&self) -> bool {
        self.result.is_none()
    }
}

/// All assistant/tool-result/interruption/system activity between one
/// user input and the next, with resolved sub-agents attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct AiChunk {
    pub messages: Vec<ParsedMessage>,
    pub tool_executions: Vec<ToolExecution>,
    pub processes: Vec<Process>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<i64>,
}

impl AiChunk {
    /// True when the chunk holds nothing but system bookkeeping records.
    pub fn is_system_only(&self) -> bool {
        !self.messages.is_empty()
            && self
                .messages
                .iter()
                .all(|m| m.kind == session_lens_core::MessageKind::System)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Chunk {
    User(UserChunk),
    Ai(AiChunk),
}

impl Chunk {
    /// Messages owned by this chunk, in stream order.
    pub fn messages(&self) -> Vec<&ParsedMessage> {
        match self {
            Chunk::User(chunk) => vec![&chunk.message],
            Chunk::Ai(chunk) => chunk.messages.iter().collect(),
        }
    }
}

/// Segment a message stream into chunks, attaching each resolved Process
/// to the chunk that contains its spawning Task call.
pub fn build_chunks(messages: &[ParsedMessage], processes: &[Process]) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut buffer: Vec<ParsedMessage> = Vec::new();

    for message in messages {
        if message.kind.is_passthrough() {
            continue;
        }

        if message.starts_chunk() {
            flush_ai_chunk(&mut chunks, &mut buffer, processes);
            chunks.push(Chunk::User(UserChunk {
                message: message.clone(),
            }));
        } else {
            // Noise ahead of any real content never fabricates a chunk.
            if chunks.is_empty() && buffer.is_empty() && message.is_noise() {
                continue;
            }
            buffer.push(message.clone());
        }
    }

    flush_ai_chunk(&mut chunks, &mut buffer, processes);
    chunks
}

fn flush_ai_chunk(chunks: &mut Vec<Chunk>, buffer: &mut Vec<ParsedMessage>, processes: &[Process]) {
    if buffer.is_empty() {
        return;
    }
    let messages = std::mem::take(buffer);
    chunks.push(Chunk::Ai(assemble_ai_chunk(messages, processes)));
}

fn assemble_ai_chunk(messages: Vec<ParsedMessage>, processes: &[Process]) -> AiChunk {
    // Pair every tool_use with its tool_result by id. Results arrive in
    // later messages of the same chunk; unmatched calls stay orphaned.
    let mut executions: Vec<ToolExecution> = Vec::new();
    let mut call_index: HashMap<String, usize> = HashMap::new();

    for message in &messages {
        for call in &message.tool_calls {
            call_index.insert(call.id.clone(), executions.len());
            executions.push(ToolExecution {
                call: call.clone(),
                result: None,
                started_at_ms: message.timestamp_ms,
                ended_at_ms: None,
            });
        }
        for result in &message.tool_results {
            if let Some(&index) = call_index.get(&result.tool_use_id) {
                let execution = &mut executions[index];
                execution.result = Some(result.clone());
                execution.ended_at_ms = message.timestamp_ms;
            }
        }
    }

    let attached: Vec<Process> = processes
        .iter()
        .filter(|p| call_index.contains_key(&p.parent_task_id))
        .cloned()
        .collect();

    let started_at_ms = messages.iter().filter_map(|m| m.timestamp_ms).min();
    let ended_at_ms = messages.iter().filter_map(|m| m.timestamp_ms).max();

    AiChunk {
        messages,
        tool_executions: executions,
        processes: attached,
        started_at_ms,
        ended_at_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use session_lens_core::{parse_lines, MessageKind, ParsedMessage};

    fn build_from(content: &str) -> Vec<Chunk> {
        build_chunks(&parse_lines(content).messages, &[])
    }

    #[test]
    fn test_simple_turn_pair() {
        let content = concat!(
            r#"{"type":"user","message":{"role":"user","content":"fix bug"},"timestamp":"2026-02-03T09:00:00Z"}"#,
            "\n",
            r#"{"type":"assistant","message":{"role":"assistant","content":"on it"},"timestamp":"2026-02-03T09:00:05Z"}"#,
            "\n",
        );
        let chunks = build_from(content);
        assert_eq!(chunks.len(), 2);
        assert!(matches!(&chunks[0], Chunk::User(c) if c.message.content == "fix bug"));
        assert!(matches!(&chunks[1], Chunk::Ai(c) if c.messages.len() == 1));
    }

    #[test]
    fn test_all_noise_session_yields_zero_chunks() {
        let content = concat!(
            r#"{"type":"user","message":{"role":"user","content":"<command-name>/clear</command-name>"}}"#,
            "\n",
            r#"{"type":"system","subtype":"turn_duration","durationMs":5,"isMeta":true}"#,
            "\n",
            r#"{"type":"summary","summary":"noise only"}"#,
            "\n",
        );
        assert!(build_from(content).is_empty());
    }

    #[test]
    fn test_leading_response_flow_forms_synthetic_chunk() {
        // A resumed session can open mid-response.
        let content = concat!(
            r#"{"type":"assistant","message":{"role":"assistant","content":"continuing"},"timestamp":"2026-02-03T09:00:00Z"}"#,
            "\n",
            r#"{"type":"user","message":{"role":"user","content":"thanks"},"timestamp":"2026-02-03T09:00:10Z"}"#,
            "\n",
        );
        let chunks = build_from(content);
        assert_eq!(chunks.len(), 2);
        assert!(matches!(&chunks[0], Chunk::Ai(_)));
        assert!(matches!(&chunks[1], Chunk::User(_)));
    }

    #[test]
    fn test_tool_pairing_and_orphans() {
        let content = concat!(
            r#"{"type":"user","message":{"role":"user","content":"run it"},"timestamp":"2026-02-03T09:00:00Z"}"#,
            "\n",
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}},{"type":"tool_use","id":"t2","name":"Read","input":{}}]},"timestamp":"2026-02-03T09:00:01Z"}"#,
            "\n",
            r#"{"type":"user","isMeta":true,"message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"file1\nfile2"}]},"timestamp":"2026-02-03T09:00:03Z"}"#,
            "\n",
        );
        let chunks = build_from(content);
        let ai = match &chunks[1] {
            Chunk::Ai(ai) => ai,
            other => panic!("expected AI chunk, got {other:?}"),
        };

        assert_eq!(ai.tool_executions.len(), 2);
        let t1 = &ai.tool_executions[0];
        assert_eq!(t1.call.id, "t1");
        assert!(!t1.is_orphaned());
        assert_eq!(t1.result.as_ref().unwrap().content, "file1\nfile2");
        assert_eq!(t1.started_at_ms, Some(1770109201000));
        assert_eq!(t1.ended_at_ms, Some(1770109203000));

        let t2 = &ai.tool_executions[1];
        assert!(t2.is_orphaned());
        assert_eq!(t2.ended_at_ms, None);
    }

    #[test]
    fn test_process_attachment_by_task_id() {
        let content = concat!(
            r#"{"type":"user","message":{"role":"user","content":"explore"},"timestamp":"2026-02-03T09:00:00Z"}"#,
            "\n",
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"task1","name":"Task","input":{"description":"look around"}}]},"timestamp":"2026-02-03T09:00:01Z"}"#,
            "\n",
        );
        let log = parse_lines(content);
        let process = Process {
            agent_id: "abc".into(),
            parent_task_id: "task1".into(),
            description: Some("look around".into()),
            subagent_type: None,
            messages: Vec::new(),
            started_at_ms: Some(0),
            ended_at_ms: Some(1),
            usage: Default::default(),
            message_count: 0,
            tool_call_count: 0,
            is_parallel: false,
            group_id: None,
        };
        let unrelated = Process {
            parent_task_id: "task-other".into(),
            agent_id: "zzz".into(),
            ..process.clone()
        };

        let chunks = build_chunks(&log.messages, &[process, unrelated]);
        let ai = match &chunks[1] {
            Chunk::Ai(ai) => ai,
            other => panic!("expected AI chunk, got {other:?}"),
        };
        assert_eq!(ai.processes.len(), 1);
        assert_eq!(ai.processes[0].agent_id, "abc");
    }

    #[test]
    fn test_missing_timestamps_degrade_to_file_order() {
        let content = concat!(
            r#"{"type":"user","message":{"role":"user","content":"q"}}"#,
            "\n",
            r#"{"type":"assistant","message":{"role":"assistant","content":"a"}}"#,
            "\n",
        );
        let chunks = build_from(content);
        assert_eq!(chunks.len(), 2);
        if let Chunk::Ai(ai) = &chunks[1] {
            assert_eq!(ai.started_at_ms, None);
            assert_eq!(ai.ended_at_ms, None);
        }
    }

    #[test]
    fn test_empty_input_empty_output() {
        assert!(build_chunks(&[], &[]).is_empty());
    }

    // ========================================================================
    // Partition invariant (property)
    // ========================================================================

    fn arbitrary_message(token: u8) -> ParsedMessage {
        match token % 6 {
            0 => ParsedMessage::user_input(format!("input {token}")),
            1 => ParsedMessage::assistant(format!("reply {token}")),
            2 => ParsedMessage::new(MessageKind::ToolResult, format!("result {token}")),
            3 => ParsedMessage::new(MessageKind::System, "turn_duration: 5ms"),
            4 => {
                let mut echo = ParsedMessage::user_input("");
                echo.is_command_echo = true;
                echo
            }
            _ => ParsedMessage::new(MessageKind::Summary, "summary"),
        }
    }

    proptest! {
        #[test]
        fn prop_chunks_partition_the_stream(tokens in proptest::collection::vec(0u8..=255, 0..64)) {
            let messages: Vec<ParsedMessage> =
                tokens.iter().map(|&t| arbitrary_message(t)).collect();
            let chunks = build_chunks(&messages, &[]);

            let chunked: Vec<&ParsedMessage> =
                chunks.iter().flat_map(|c| c.messages()).collect();

            // Every chunk-starting message heads a UserChunk; nothing in an
            // AI chunk starts one.
            for chunk in &chunks {
                match chunk {
                    Chunk::User(c) => prop_assert!(c.message.starts_chunk()),
                    Chunk::Ai(c) => {
                        prop_assert!(!c.messages.is_empty());
                        prop_assert!(c.messages.iter().all(|m| !m.starts_chunk()));
                    }
                }
            }

            // Every real user input appears exactly once across chunks.
            let inputs_in = messages.iter().filter(|m| m.starts_chunk()).count();
            let inputs_out = chunked.iter().filter(|m| m.starts_chunk()).count();
            prop_assert_eq!(inputs_in, inputs_out);

            // Once a chunk exists, no later non-passthrough message is lost.
            if let Some(first_start) = messages.iter().position(|m| m.starts_chunk()) {
                let expected = messages[first_start..]
                    .iter()
                    .filter(|m| !m.kind.is_passthrough())
                    .count();
                let counted = chunked.len()
                    - chunked
                        .iter()
                        .take_while(|m| !m.starts_chunk())
                        .count();
                prop_assert_eq!(expected, counted);
            }

            // Passthrough records never enter any chunk.
            prop_assert!(chunked.iter().all(|m| !m.kind.is_passthrough()));
        }
    }
}
