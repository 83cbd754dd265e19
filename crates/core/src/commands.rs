// crates/core/src/commands.rs
//! Slash-command tag handling for user messages.
//!
//! Local slash commands are logged as tag-wrapped echoes:
//!
//! ```text
//! <command-name>/review</command-name>
//! <command-message>review a pull request</command-message>
//! <command-args>123</command-args>
//! ```
//!
//! The user-visible text is the `<command-args>` payload when present,
//! otherwise the remaining text after stripping the other tags.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A slash-command invocation parsed out of a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct ParsedCommand {
    /// Command name including the leading slash, e.g. `/review`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
}

/// Compiled command-tag patterns. Build once per classifier, reuse per line.
pub struct CommandTags {
    name_regex: Regex,
    args_regex: Regex,
    message_regex: Regex,
    file_ref_regex: Regex,
}

/// Injected prefixes that mark a user-type line as machine noise rather
/// than a real prompt.
const NOISE_PREFIXES: &[&str] = &[
    "<command-name>",
    "<local-command-stdout>",
    "<local-command-caveat>",
    "<task-notification>",
    "Caveat: the messages below were generated by the user while running a local command",
    "This session is being continued",
];

impl CommandTags {
    pub fn new() -> Self {
        // Dotall so tags spanning multiple lines still match.
        Self {
            name_regex: Regex::new(r"(?s)<command-name>(.*?)</command-name>\s*").unwrap(),
            args_regex: Regex::new(r"(?s)<command-args>(.*?)</command-args>").unwrap(),
            message_regex: Regex::new(r"(?s)<command-message>.*?</command-message>\s*").unwrap(),
            file_ref_regex: Regex::new(r"@([A-Za-z0-9_./~-]+)").unwrap(),
        }
    }

    /// Whether raw user content is a local-command echo or other injected
    /// marker that must never start a chunk.
    pub fn is_noise(&self, content: &str) -> bool {
        let trimmed = content.trim_start();
        NOISE_PREFIXES.iter().any(|p| trimmed.starts_with(p))
    }

    /// Extract the command invocation, if the content carries command tags.
    pub fn parse_command(&self, content: &str) -> Option<ParsedCommand> {
        let name = self
            .name_regex
            .captures(content)?
            .get(1)
            .map(|m| m.as_str().trim().to_string())?;
        let args = self
            .args_regex
            .captures(content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty());
        Some(ParsedCommand { name, args })
    }

    /// Clean command tags from user content.
    ///
    /// `<command-args>` content wins when present; otherwise the text with
    /// `<command-name>` and `<command-message>` tags stripped.
    pub fn clean(&self, content: &str) -> String {
        if let Some(caps) = self.args_regex.captures(content) {
            if let Some(args) = caps.get(1) {
                let extracted = args.as_str().trim();
                if !extracted.is_empty() {
                    return extracted.to_string();
                }
            }
        }

        let cleaned = self.name_regex.replace_all(content, "");
        let cleaned = self.message_regex.replace_all(&cleaned, "");
        cleaned.trim().to_string()
    }

    /// `@path` file references mentioned in a user prompt.
    pub fn file_references(&self, content: &str) -> Vec<String> {
        self.file_ref_regex
            .captures_iter(content)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }
}

impl Default for CommandTags {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_basic() {
        let tags = CommandTags::new();
        let input = "<command-name>/commit</command-name>\nPlease commit";
        assert_eq!(tags.clean(input), "Please commit");
    }

    #[test]
    fn test_clean_args_win() {
        let tags = CommandTags::new();
        let input =
            "<command-name>/review</command-name>\n<command-args>123</command-args>\nReview PR";
        assert_eq!(tags.clean(input), "123");
    }

    #[test]
    fn test_clean_multiline_args() {
        let tags = CommandTags::new();
        let input = "<command-name>/review</command-name>\n<command-args>Fix the <T> generic\nacross files</command-args>";
        assert_eq!(tags.clean(input), "Fix the <T> generic\nacross files");
    }

    #[test]
    fn test_clean_message_tag() {
        let tags = CommandTags::new();
        let input = "<command-name>/commit</command-name>\n<command-message>commit helper</command-message>\nPlease commit";
        assert_eq!(tags.clean(input), "Please commit");
    }

    #[test]
    fn test_clean_no_tags() {
        let tags = CommandTags::new();
        assert_eq!(
            tags.clean("Normal message without tags"),
            "Normal message without tags"
        );
    }

    #[test]
    fn test_parse_command() {
        let tags = CommandTags::new();
        let input = "<command-name>/review</command-name>\n<command-args>123</command-args>";
        let cmd = tags.parse_command(input).unwrap();
        assert_eq!(cmd.name, "/review");
        assert_eq!(cmd.args.as_deref(), Some("123"));

        let bare = "<command-name>/help</command-name>";
        let cmd = tags.parse_command(bare).unwrap();
        assert_eq!(cmd.name, "/help");
        assert_eq!(cmd.args, None);

        assert!(tags.parse_command("no tags here").is_none());
    }

    #[test]
    fn test_noise_detection() {
        let tags = CommandTags::new();
        assert!(tags.is_noise("<command-name>/clear</command-name>"));
        assert!(tags.is_noise("<local-command-stdout>ok</local-command-stdout>"));
        assert!(tags.is_noise("  <task-notification>agent done</task-notification>"));
        assert!(tags.is_noise("This session is being continued from a previous session"));
        assert!(!tags.is_noise("please fix @src/main.rs"));
    }

    #[test]
    fn test_file_references() {
        let tags = CommandTags::new();
        let refs = tags.file_references("look at @src/main.rs and @docs/README.md please");
        assert_eq!(refs, vec!["src/main.rs", "docs/README.md"]);
        assert!(tags.file_references("no refs").is_empty());
    }
}
