// crates/core/src/errcat.rs
//! Categorization of errored tool results.
//!
//! Errored results (`is_error: true`) are bucketed by content pattern so a
//! session view can summarize what went wrong without rendering every
//! payload. First matching pattern wins; unmatched content lands in
//! `Other`.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ExitCode,
    FileNotFound,
    DirectoryOperation,
    PermissionDenied,
    FileExists,
    CommandNotFound,
    SyntaxError,
    TypeError,
    NotFound,
    Timeout,
    Connection,
    Other,
}

impl ErrorCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ExitCode => "Exit Code Error",
            Self::FileNotFound => "File Not Found",
            Self::DirectoryOperation => "Directory Operation Error",
            Self::PermissionDenied => "Permission Denied",
            Self::FileExists => "File Already Exists",
            Self::CommandNotFound => "Command Not Found",
            Self::SyntaxError => "Syntax Error",
            Self::TypeError => "Type Error",
            Self::NotFound => "Not Found Error",
            Self::Timeout => "Timeout Error",
            Self::Connection => "Connection Error",
            Self::Other => "Other Error",
        }
    }
}

// Ordered: more specific patterns before catch-alls.
fn patterns() -> &'static [(Regex, ErrorCategory)] {
    static PATTERNS: OnceLock<Vec<(Regex, ErrorCategory)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"Exit code \d+", ErrorCategory::ExitCode),
            (r"ENOENT", ErrorCategory::FileNotFound),
            (r"EISDIR", ErrorCategory::DirectoryOperation),
            (r"EACCES", ErrorCategory::PermissionDenied),
            (r"EEXIST", ErrorCategory::FileExists),
            (r"(?i)File does not exist", ErrorCategory::FileNotFound),
            (r"(?i)command not found", ErrorCategory::CommandNotFound),
            (r"(?i)No such file or directory", ErrorCategory::FileNotFound),
            (r"(?i)permission denied", ErrorCategory::PermissionDenied),
            (r"(?i)syntax error", ErrorCategory::SyntaxError),
            (r"(?i)type.*Error", ErrorCategory::TypeError),
            (r"(?i)Cannot find", ErrorCategory::NotFound),
            (r"(?i)timeout", ErrorCategory::Timeout),
            (r"(?i)connection", ErrorCategory::Connection),
        ]
        .into_iter()
        .map(|(pattern, category)| (Regex::new(pattern).unwrap(), category))
        .collect()
    })
}

/// Categorize an errored tool result by its content.
pub fn categorize_error(content: &str) -> ErrorCategory {
    for (re, category) in patterns() {
        if re.is_match(content) {
            return *category;
        }
    }
    ErrorCategory::Other
}

/// Running per-session rollup of error categories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
pub struct ErrorBreakdown {
    /// Count per category label, sorted for stable output.
    pub counts: BTreeMap<String, usize>,
    pub total: usize,
}

impl ErrorBreakdown {
    pub fn record(&mut self, content: &str) -> ErrorCategory {
        let category = categorize_error(content);
        *self.counts.entry(category.label().to_string()).or_insert(0) += 1;
        self.total += 1;
        category
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
