// crates/core/src/paths.rs
//! Sub-agent JSONL file locations.
//!
//! A parent session's sub-agents live under a sibling directory named
//! after the session file:
//!
//! ```text
//! Parent: {projects_root}/{project}/{sessionId}.jsonl
//! Agent:  {projects_root}/{project}/{sessionId}/subagents/agent-{agentId}.jsonl
//! ```
//!
//! The same convention applies recursively: a sub-agent file is itself a
//! valid "parent" for resolving nested sub-agents. Directory scanning for
//! project discovery is the application shell's job; this module only
//! encodes the naming convention and a directory listing for one session.

use std::path::{Path, PathBuf};

const AGENT_FILE_PREFIX: &str = "agent-";
const JSONL_EXT: &str = "jsonl";

/// Conventional projects root (`~/.claude/projects`). The entry points
/// all accept explicit paths; this is only the default for callers that
/// address sessions by project and session id.
pub fn projects_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("projects"))
}

/// Resolve a session file path from project and session ids.
pub fn session_path(project_id: &str, session_id: &str) -> Option<PathBuf> {
    projects_root().map(|root| root.join(project_id).join(format!("{session_id}.{JSONL_EXT}")))
}

/// Directory holding a session's sub-agent files.
pub fn subagents_dir(parent_jsonl: &Path) -> PathBuf {
    let parent_dir = parent_jsonl.parent().unwrap_or(Path::new("."));
    let session_stem = parent_jsonl
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    parent_dir.join(session_stem).join("subagents")
}

/// Resolve the path to one sub-agent's JSONL file.
pub fn resolve_subagent_path(parent_jsonl: &Path, agent_id: &str) -> PathBuf {
    subagents_dir(parent_jsonl).join(format!("{AGENT_FILE_PREFIX}{agent_id}.{JSONL_EXT}"))
}

/// Extract the agent id from an `agent-{id}.jsonl` path.
pub fn agent_id_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let id = stem.strip_prefix(AGENT_FILE_PREFIX)?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// List a session's sub-agent files. A missing directory is the common
/// case (most sessions spawn no sub-agents) and yields an empty list.
pub async fn list_subagent_files(parent_jsonl: &Path) -> Vec<PathBuf> {
    let dir = subagents_dir(parent_jsonl);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut files = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_agent_file = path.extension().and_then(|e| e.to_str()) == Some(JSONL_EXT)
            && agent_id_from_path(&path).is_some();
        if is_agent_file {
            files.push(path);
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_subagent_path() {
        let parent = PathBuf::from("/home/user/.claude/projects/my-project/abc123-def456.jsonl");
        let resolved = resolve_subagent_path(&parent, "a951849");
        assert_eq!(
            resolved,
            PathBuf::from(
                "/home/user/.claude/projects/my-project/abc123-def456/subagents/agent-a951849.jsonl"
            )
        );
    }

    #[test]
    fn test_resolve_strips_extension() {
        let parent = PathBuf::from("/path/to/session.jsonl");
        assert_eq!(
            resolve_subagent_path(&parent, "b789012"),
            PathBuf::from("/path/to/session/subagents/agent-b789012.jsonl")
        );
    }

    #[test]
    fn test_nested_convention_is_recursive() {
        let agent = PathBuf::from("/p/session/subagents/agent-aaa.jsonl");
        assert_eq!(
            resolve_subagent_path(&agent, "bbb"),
            PathBuf::from("/p/session/subagents/agent-aaa/subagents/agent-bbb.jsonl")
        );
    }

    #[test]
    fn test_agent_id_from_path() {
        assert_eq!(
            agent_id_from_path(Path::new("/x/subagents/agent-a951849.jsonl")),
            Some("a951849".to_string())
        );
        assert_eq!(agent_id_from_path(Path::new("/x/subagents/other.jsonl")), None);
        assert_eq!(agent_id_from_path(Path::new("/x/subagents/agent-.jsonl")), None);
    }

    #[test]
    fn test_session_path_shape() {
        // Home-relative; only the suffix is stable across machines.
        if let Some(path) = session_path("my-project", "abc-123") {
            assert!(path.ends_with(".claude/projects/my-project/abc-123.jsonl"));
        }
    }

    #[tokio::test]
    async fn test_list_subagent_files_missing_dir_is_empty() {
        let files = list_subagent_files(Path::new("/nope/session.jsonl")).await;
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_list_subagent_files() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("sess.jsonl");
        tokio::fs::write(&parent, "").await.unwrap();

        let sub_dir = dir.path().join("sess").join("subagents");
        tokio::fs::create_dir_all(&sub_dir).await.unwrap();
        tokio::fs::write(sub_dir.join("agent-aaa.jsonl"), "").await.unwrap();
        tokio::fs::write(sub_dir.join("agent-bbb.jsonl"), "").await.unwrap();
        tokio::fs::write(sub_dir.join("notes.txt"), "").await.unwrap();

        let files = list_subagent_files(&parent).await;
        assert_eq!(files.len(), 2);
        assert_eq!(agent_id_from_path(&files[0]).unwrap(), "aaa");
        assert_eq!(agent_id_from_path(&files[1]).unwrap(), "bbb");
    }
}
