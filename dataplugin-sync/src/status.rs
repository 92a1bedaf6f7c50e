//! Status lines and the final outcome of an action.
//!
//! The wording of every line is stable; callers and tests match on it.

use serde::Serialize;

use dataplugin_archive::ArchiveError;
use dataplugin_core::LedgerError;

use crate::action::Action;
use crate::error::SyncError;

/// How a line should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Info,
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub tone: Tone,
    pub text: String,
}

impl StatusLine {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            tone: Tone::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            tone: Tone::Success,
            text: text.into(),
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            tone: Tone::Failure,
            text: text.into(),
        }
    }
}

/// Result of one orchestrated action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub action: Action,
    /// 0 on success, 1 on failure.
    pub code: u8,
    pub lines: Vec<StatusLine>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Line texts only, in emission order.
    pub fn texts(&self) -> Vec<&str> {
        self.lines.iter().map(|l| l.text.as_str()).collect()
    }
}

/// The single failure line reported for `err` at the end of `action`.
pub(crate) fn failure_text(action: Action, err: &SyncError) -> String {
    match err {
        SyncError::Archive(ArchiveError::DirectoryNotFound { path }) => {
            format!("Directory does not exist {}", path.display())
        }
        SyncError::LedgerMissing | SyncError::SignatureMissing { .. } => err.to_string(),
        SyncError::Ledger(LedgerError::SignatureNotFound { path }) => {
            SyncError::SignatureMissing { path: path.clone() }.to_string()
        }
        SyncError::HashMismatch { .. } => "Archive failed verification!".to_string(),
        other => format!("{action} failed: {other}"),
    }
}
