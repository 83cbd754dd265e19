// crates/timeline/src/steps.rs
//! Semantic-step extraction: explode an AI chunk into the smallest
//! addressable units of execution (thinking, tool calls, tool results,
//! sub-agent runs, output text, interruptions), ordered, timed, and
//! token-attributed for timeline rendering.

use crate::chunks::{AiChunk, Chunk, UserChunk};
use serde::{Deserialize, Serialize};
use session_lens_core::{categorize_error, ContentBlock, ErrorCategory, MessageKind, TokenUsage};
use std::collections::HashMap;
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Thinking,
    ToolCall,
    ToolResult,
    Subagent,
    Output,
    Interruption,
}

/// Where a step executed: the main session, or inside a sub-agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(tag = "scope", rename_all = "camelCase")]
pub enum StepContext {
    Main,
    Subagent { agent_id: String },
}

/// Smallest addressable unit of AI activity.
///
/// For tool_call / tool_result / subagent steps the id equals the
/// underlying `tool_use` id, so a call and its result share an id; that
/// is the join key the UI links them by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct SemanticStep {
    pub id: String,
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<i64>,
    /// Recorded end time. `None` means the step never completed in the
    /// log (an orphaned call at the live edge of a session).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<i64>,
    /// Gap-filled end time for rendering: extended to the next step's
    /// start so the timeline shows no holes. Recorded times above stay
    /// untouched so duration metrics are not corrupted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_ended_at_ms: Option<i64>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<serde_json::Value>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    #[serde(default)]
    pub usage: TokenUsage,
    /// Estimated context-window tokens consumed by all prior steps of
    /// this session. Monotonically non-decreasing; resets per load.
    pub accumulated_context: u64,
    #[serde(default)]
    pub is_parallel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub context: StepContext,
}

impl SemanticStep {
    /// Recorded wall-clock duration (zero when either endpoint is
    /// missing or the step is zero-width).
    pub fn duration_ms(&self) -> u64 {
        match (self.started_at_ms, self.ended_at_ms) {
            (Some(start), Some(end)) if end > start => (end - start) as u64,
            _ => 0,
        }
    }

    pub fn display_duration_ms(&self) -> u64 {
        match (self.started_at_ms, self.display_ended_at_ms) {
            (Some(start), Some(end)) if end > start => (end - start) as u64,
            _ => 0,
        }
    }
}

/// An AI chunk plus its extracted steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct EnhancedAiChunk {
    pub chunk: AiChunk,
    pub steps: Vec<SemanticStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EnhancedChunk {
    User(UserChunk),
    Ai(EnhancedAiChunk),
}

/// Extract one chunk's steps in the main-session context with a fresh
/// context-token counter.
pub fn extract_steps(chunk: &AiChunk) -> Vec<SemanticStep> {
    extract_steps_in(chunk, &StepContext::Main, 0).0
}

/// Enhance a chunk list, threading the accumulated-context counter
/// across AI chunks so the running sum is session-wide.
pub fn enhance_chunks(chunks: Vec<Chunk>) -> Vec<EnhancedChunk> {
    enhance_chunks_in(chunks, &StepContext::Main)
}

pub fn enhance_chunks_in(chunks: Vec<Chunk>, context: &StepContext) -> Vec<EnhancedChunk> {
    let mut context_tokens: u64 = 0;
    chunks
        .into_iter()
        .map(|chunk| match chunk {
            Chunk::User(user) => EnhancedChunk::User(user),
            Chunk::Ai(ai) => {
                let (steps, total) = extract_steps_in(&ai, context, context_tokens);
                context_tokens = total;
                EnhancedChunk::Ai(EnhancedAiChunk { chunk: ai, steps })
            }
        })
        .collect()
}

/// Walk one chunk's messages in order and emit typed steps. Returns the
/// steps plus the updated running context-token total.
pub fn extract_steps_in(
    chunk: &AiChunk,
    context: &StepContext,
    context_base: u64,
) -> (Vec<SemanticStep>, u64) {
    let processes_by_task: HashMap<&str, &crate::process::Process> = chunk
        .processes
        .iter()
        .map(|p| (p.parent_task_id.as_str(), p))
        .collect();
    let result_times: HashMap<&str, Option<i64>> = chunk
        .tool_executions
        .iter()
        .map(|e| (e.call.id.as_str(), e.ended_at_ms))
        .collect();

    let mut steps: Vec<SemanticStep> = Vec::new();
    let mut seq: usize = 0;

    for message in &chunk.messages {
        let ts = message.timestamp_ms;
        match message.kind {
            MessageKind::Assistant => {
                let mut emitted_for_message: Vec<usize> = Vec::new();
                // Only trailing text (after the last tool call of the
                // message) is a real answer; text ahead of a tool call is
                // preamble narration and emits no step.
                let last_tool_use = message
                    .blocks
                    .iter()
                    .rposition(|b| matches!(b, ContentBlock::ToolUse { .. }));
                for (block_index, block) in message.blocks.iter().enumerate() {
                    match block {
                        ContentBlock::Thinking { thinking } => {
                            // No block-local timing exists; zero recorded
                            // width, gap-filling gives it display width.
                            emitted_for_message.push(steps.len());
                            steps.push(base_step(
                                format!("thinking-{seq}"),
                                StepKind::Thinking,
                                thinking.clone(),
                                ts,
                                ts,
                                context,
                            ));
                            seq += 1;
                        }
                        ContentBlock::ToolUse { id, name, input } => {
                            emitted_for_message.push(steps.len());
                            if let Some(process) = processes_by_task.get(id.as_str()) {
                                // A resolved sub-agent stands in for its
                                // spawning Task call.
                                steps.push(subagent_step(id, process, context));
                            } else {
                                let mut step = base_step(
                                    id.clone(),
                                    StepKind::ToolCall,
                                    name.clone(),
                                    ts,
                                    result_times.get(id.as_str()).copied().flatten(),
                                    context,
                                );
                                step.tool_name = Some(name.clone());
                                if !input.is_null() {
                                    step.tool_input = Some(input.clone());
                                }
                                steps.push(step);
                            }
                            seq += 1;
                        }
                        ContentBlock::Text { text } => {
                            let trailing = last_tool_use.map_or(true, |t| block_index > t);
                            if trailing && !text.trim().is_empty() {
                                emitted_for_message.push(steps.len());
                                steps.push(base_step(
                                    format!("output-{seq}"),
                                    StepKind::Output,
                                    text.clone(),
                                    ts,
                                    ts,
                                    context,
                                ));
                                seq += 1;
                            }
                        }
                        _ => {}
                    }
                }
                // String-content assistant records have no blocks.
                if message.blocks.is_empty() && !message.content.trim().is_empty() {
                    emitted_for_message.push(steps.len());
                    steps.push(base_step(
                        format!("output-{seq}"),
                        StepKind::Output,
                        message.content.clone(),
                        ts,
                        ts,
                        context,
                    ));
                    seq += 1;
                }
                // The message's token usage is attributed to the step
                // that concluded it.
                if let (Some(usage), Some(&last)) = (&message.usage, emitted_for_message.last()) {
                    steps[last].usage.add(usage);
                }
            }
            MessageKind::ToolResult => {
                for payload in &message.tool_results {
                    let mut step = base_step(
                        payload.tool_use_id.clone(),
                        StepKind::ToolResult,
                        payload.content.clone(),
                        ts,
                        ts,
                        context,
                    );
                    step.is_error = payload.is_error;
                    if payload.is_error {
                        step.error_category = Some(categorize_error(&payload.content));
                    }
                    steps.push(step);
                    seq += 1;
                }
            }
            MessageKind::Interruption => {
                steps.push(base_step(
                    format!("interruption-{seq}"),
                    StepKind::Interruption,
                    String::new(),
                    ts,
                    ts,
                    context,
                ));
                seq += 1;
            }
            // System bookkeeping and noise produce no steps.
            _ => {}
        }
    }

    sort_by_start(&mut steps);
    fill_gaps(&mut steps);
    let total = accumulate_context(&mut steps, context_base);
    (steps, total)
}

fn base_step(
    id: String,
    kind: StepKind,
    content: String,
    started_at_ms: Option<i64>,
    ended_at_ms: Option<i64>,
    context: &StepContext,
) -> SemanticStep {
    SemanticStep {
        id,
        kind,
        started_at_ms,
        ended_at_ms,
        display_ended_at_ms: ended_at_ms,
        content,
        tool_name: None,
        tool_input: None,
        is_error: false,
        error_category: None,
        usage: TokenUsage::default(),
        accumulated_context: 0,
        is_parallel: false,
        group_id: None,
        context: context.clone(),
    }
}

fn subagent_step(
    task_id: &str,
    process: &crate::process::Process,
    context: &StepContext,
) -> SemanticStep {
    let mut step = base_step(
        task_id.to_string(),
        StepKind::Subagent,
        process.description.clone().unwrap_or_default(),
        process.started_at_ms,
        process.ended_at_ms,
        context,
    );
    step.tool_name = process.subagent_type.clone();
    step.usage = process.usage;
    step.is_parallel = process.is_parallel;
    step.group_id = process.group_id.clone();
    step
}

/// Stable sort by start time; ties and missing timestamps keep original
/// emission order (a step with no timestamp inherits its predecessor's).
fn sort_by_start(steps: &mut Vec<SemanticStep>) {
    let mut last_seen = i64::MIN;
    let keys: Vec<i64> = steps
        .iter()
        .map(|s| {
            if let Some(start) = s.started_at_ms {
                last_seen = start;
            }
            last_seen
        })
        .collect();

    let mut order: Vec<usize> = (0..steps.len()).collect();
    order.sort_by_key(|&i| (keys[i], i));

    let mut sorted = Vec::with_capacity(steps.len());
    for i in order {
        sorted.push(steps[i].clone());
    }
    *steps = sorted;
}

/// Extend each step's display end to the next step's start when the
/// recorded range is zero-width or leaves a hole. Genuine overlaps
/// (parallel sub-agents) are preserved.
fn fill_gaps(steps: &mut [SemanticStep]) {
    for i in 0..steps.len() {
        let next_start = steps.get(i + 1).and_then(|n| n.started_at_ms);
        let step = &mut steps[i];
        let Some(start) = step.started_at_ms else {
            continue;
        };
        let mut display_end = step.ended_at_ms.unwrap_or(start).max(start);
        if let Some(next_start) = next_start {
            if display_end < next_start {
                display_end = next_start;
            }
        }
        step.display_ended_at_ms = Some(display_end);
    }
}

/// Assign the exclusive prior-step token sum to each step; returns the
/// inclusive total for threading into the next chunk.
fn accumulate_context(steps: &mut [SemanticStep], base: u64) -> u64 {
    let mut running = base;
    for step in steps {
        step.accumulated_context = running;
        running = running.saturating_add(step.usage.context_weight());
    }
    running
}
