// crates/timeline/src/process.rs
//! Sub-agent resolution: link Task tool calls in a parent session to the
//! sub-agent transcript files they spawned, and detect which resolved
//! executions ran concurrently.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use session_lens_core::{
    paths::resolve_subagent_path, read_session, ParsedMessage, SessionLog, TokenUsage,
};
use std::path::Path;
use tracing::debug;
use ts_rs::TS;

/// Width of the dispatch-batch bucketing window.
///
/// Sub-agents launched from one assistant turn (a single message emitting
/// multiple Task blocks) start near-simultaneously, so a small fixed
/// window is a cheap proxy for "same dispatch batch". It is a heuristic,
/// not a concurrency proof: two sequential sub-agents that happen to
/// start within the window are misclassified as parallel.
pub const PARALLEL_WINDOW_MS: i64 = 500;

/// A Task tool call observed in a session, with the completion fields
/// needed to locate its transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpawn {
    /// The Task `tool_use` id.
    pub tool_use_id: String,
    pub description: Option<String>,
    pub subagent_type: Option<String>,
    /// Short-hash agent id reported by the Task completion. Absent while
    /// the sub-agent is still running or when no completion was logged.
    pub agent_id: Option<String>,
}

/// Scan a classified message stream for Task spawns. Descriptions and
/// agent types come from the call's input; the agent id comes from the
/// matching completion's enrichment.
pub fn collect_task_spawns(messages: &[ParsedMessage]) -> Vec<TaskSpawn> {
    let mut spawns: Vec<TaskSpawn> = Vec::new();

    for message in messages {
        for call in &message.tool_calls {
            if call.is_task() {
                spawns.push(TaskSpawn {
                    tool_use_id: call.id.clone(),
                    description: call.description().map(String::from),
                    subagent_type: call.subagent_type().map(String::from),
                    agent_id: None,
                });
            }
        }
        for result in &message.tool_results {
            if let Some(agent_id) = result
                .enrichment
                .as_ref()
                .and_then(|e| e.agent_id.as_deref())
            {
                if let Some(spawn) = spawns
                    .iter_mut()
                    .find(|s| s.tool_use_id == result.tool_use_id)
                {
                    spawn.agent_id = Some(agent_id.to_string());
                }
            }
        }
    }

    spawns
}

/// One resolved sub-agent execution.
///
/// Immutable after construction; never written back to disk. Start and
/// end come from the sub-agent's own first/last message timestamps, not
/// from the Task call (dispatch is asynchronous). Description and agent
/// type come from the parent Task call's input; the sub-agent file has
/// no knowledge of why it was invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct Process {
    /// Agent identifier from the transcript file name.
    pub agent_id: String,
    /// The `tool_use` id of the Task call that spawned this execution.
    pub parent_task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subagent_type: Option<String>,
    pub messages: Vec<ParsedMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<i64>,
    pub usage: TokenUsage,
    pub message_count: usize,
    pub tool_call_count: usize,
    pub is_parallel: bool,
    /// Shared by all members of one parallel dispatch batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl Process {
    pub fn from_log(spawn: &TaskSpawn, agent_id: String, log: SessionLog) -> Self {
        let tool_call_count = log
            .messages
            .iter()
            .map(|m| m.tool_calls.len())
            .sum::<usize>();
        Self {
            agent_id,
            parent_task_id: spawn.tool_use_id.clone(),
            description: spawn.description.clone(),
            subagent_type: spawn.subagent_type.clone(),
            started_at_ms: log.aggregates.first_timestamp_ms,
            ended_at_ms: log.aggregates.last_timestamp_ms,
            usage: log.aggregates.usage,
            message_count: log.messages.len(),
            tool_call_count,
            messages: log.messages,
            is_parallel: false,
            group_id: None,
        }
    }

    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at_ms, self.ended_at_ms) {
            (Some(start), Some(end)) if end >= start => Some((end - start) as u64),
            _ => None,
        }
    }
}

/// Resolve sub-agent transcripts for a set of Task spawns.
///
/// A spawn with no matching file yields no Process; the Task call stays
/// orphaned and is preserved as a plain tool-call step downstream. The
/// independent file reads run concurrently; results keep spawn order.
pub async fn resolve_subagents(parent_jsonl: &Path, spawns: &[TaskSpawn]) -> Vec<Process> {
    let reads = spawns.iter().map(|spawn| async move {
        // The file is named by the reported agent id; fall back to the
        // tool-call id for transcripts whose completion never landed.
        let agent_id = spawn
            .agent_id
            .clone()
            .unwrap_or_else(|| spawn.tool_use_id.clone());
        let path = resolve_subagent_path(parent_jsonl, &agent_id);
        match read_session(&path).await {
            Ok(log) if !log.is_empty() => Some(Process::from_log(spawn, agent_id, log)),
            Ok(_) => None,
            Err(e) => {
                debug!("No transcript for task {}: {}", spawn.tool_use_id, e);
                None
            }
        }
    });

    let mut processes: Vec<Process> = join_all(reads).await.into_iter().flatten().collect();
    detect_parallel(&mut processes);
    processes
}

/// Mark processes that started within the same [`PARALLEL_WINDOW_MS`]
/// bucket as one parallel group sharing a synthetic group id.
pub fn detect_parallel(processes: &mut [Process]) {
    processes.sort_by_key(|p| p.started_at_ms.unwrap_or(i64::MAX));

    let mut index = 0;
    while index < processes.len() {
        let bucket = match processes[index].started_at_ms {
            Some(start) => start.div_euclid(PARALLEL_WINDOW_MS),
            None => {
                index += 1;
                continue;
            }
        };

        let mut end = index + 1;
        while end < processes.len() {
            match processes[end].started_at_ms {
                Some(start) if start.div_euclid(PARALLEL_WINDOW_MS) == bucket => end += 1,
                _ => break,
            }
        }

        if end - index > 1 {
            let group_id = uuid::Uuid::new_v4().to_string();
            for process in &mut processes[index..end] {
                process.is_parallel = true;
                process.group_id = Some(group_id.clone());
            }
        }
        index = end;
    }
}
