// crates/timeline/src/waterfall.rs
//! Waterfall projection: flatten enhanced chunks into time-scaled rows a
//! Gantt renderer can draw directly. Pure projection over already-built
//! chunks and steps; no independent reconstruction logic.

use crate::steps::{EnhancedChunk, StepKind};
use serde::{Deserialize, Serialize};
use session_lens_core::truncate_chars;
use std::collections::HashMap;
use ts_rs::TS;

const LABEL_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "snake_case")]
pub enum WaterfallRowKind {
    UserInput,
    Step,
    Subagent,
}

/// One renderable row. Offsets are relative to the session start so the
/// renderer scales without re-deriving epochs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct WaterfallItem {
    pub id: String,
    pub row_kind: WaterfallRowKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_kind: Option<StepKind>,
    pub label: String,
    /// Index of the chunk this row belongs to.
    pub chunk_index: usize,
    /// Swim lane: 0 is the main session; parallel sub-agents of one
    /// group fan out to 1..n.
    pub lane: u32,
    pub offset_ms: u64,
    pub duration_ms: u64,
    #[serde(default)]
    pub is_parallel: bool,
    #[serde(default)]
    pub is_error: bool,
}

/// Gantt-ready view of one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct WaterfallData {
    pub items: Vec<WaterfallItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<i64>,
    pub total_duration_ms: u64,
}

/// Flatten chunks into waterfall rows using gap-filled display times.
pub fn build_waterfall(chunks: &[EnhancedChunk]) -> WaterfallData {
    let origin = chunks
        .iter()
        .filter_map(|chunk| match chunk {
            EnhancedChunk::User(user) => user.message.timestamp_ms,
            EnhancedChunk::Ai(ai) => ai.chunk.started_at_ms,
        })
        .min();

    let Some(origin) = origin else {
        return WaterfallData::default();
    };

    let mut items: Vec<WaterfallItem> = Vec::new();
    let mut latest_end = origin;

    for (chunk_index, chunk) in chunks.iter().enumerate() {
        match chunk {
            EnhancedChunk::User(user) => {
                if let Some(ts) = user.message.timestamp_ms {
                    latest_end = latest_end.max(ts);
                    items.push(WaterfallItem {
                        id: user
                            .message
                            .uuid
                            .clone()
                            .unwrap_or_else(|| format!("user-{chunk_index}")),
                        row_kind: WaterfallRowKind::UserInput,
                        step_kind: None,
                        label: truncate_chars(&user.message.content, LABEL_CHARS),
                        chunk_index,
                        lane: 0,
                        offset_ms: (ts - origin).max(0) as u64,
                        duration_ms: 0,
                        is_parallel: false,
                        is_error: false,
                    });
                }
            }
            EnhancedChunk::Ai(ai) => {
                // Lane assignment: members of one parallel group each get
                // their own lane, so overlapping bars don't collide.
                let mut lanes_taken: HashMap<&str, u32> = HashMap::new();

                for step in &ai.steps {
                    let Some(start) = step.started_at_ms else {
                        continue;
                    };
                    let end = step.display_ended_at_ms.unwrap_or(start);
                    latest_end = latest_end.max(end);

                    let lane = match (&step.group_id, step.is_parallel) {
                        (Some(group), true) => {
                            let taken = lanes_taken.entry(group.as_str()).or_insert(0);
                            *taken += 1;
                            *taken
                        }
                        _ => 0,
                    };

                    let row_kind = if step.kind == StepKind::Subagent {
                        WaterfallRowKind::Subagent
                    } else {
                        WaterfallRowKind::Step
                    };

                    items.push(WaterfallItem {
                        id: step.id.clone(),
                        row_kind,
                        step_kind: Some(step.kind),
                        label: truncate_chars(
                            step.tool_name.as_deref().unwrap_or(&step.content),
                            LABEL_CHARS,
                        ),
                        chunk_index,
                        lane,
                        offset_ms: (start - origin).max(0) as u64,
                        duration_ms: (end - start).max(0) as u64,
                        is_parallel: step.is_parallel,
                        is_error: step.is_error,
                    });
                }
            }
        }
    }

    WaterfallData {
        items,
        started_at_ms: Some(origin),
        total_duration_ms: (latest_end - origin).max(0) as u64,
    }
}
