//! The closed set of actions an invocation can perform.

use std::fmt;

use serde::Serialize;

/// Exactly one action runs per invocation; `Noop` does nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Noop,
    Create,
    Extract,
    Upload,
    Download,
    Verify,
}

/// Raw action requests as a command surface delivers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionFlags {
    pub create: bool,
    pub extract: bool,
    pub upload: bool,
    pub download: bool,
    pub verify: bool,
}

impl Action {
    /// Every runnable action, in precedence order.
    pub const ALL: [Action; 5] = [
        Action::Create,
        Action::Extract,
        Action::Upload,
        Action::Download,
        Action::Verify,
    ];

    /// The first requested action in precedence order, or `Noop`.
    pub fn from_flags(flags: &ActionFlags) -> Self {
        Self::ALL
            .into_iter()
            .find(|action| flags.is_set(*action))
            .unwrap_or(Action::Noop)
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::Noop => "noop",
            Action::Create => "create",
            Action::Extract => "extract",
            Action::Upload => "upload",
            Action::Download => "download",
            Action::Verify => "verify",
        }
    }

    pub fn is_noop(self) -> bool {
        self == Action::Noop
    }
}

impl ActionFlags {
    fn is_set(&self, action: Action) -> bool {
        match action {
            Action::Noop => false,
            Action::Create => self.create,
            Action::Extract => self.extract,
            Action::Upload => self.upload,
            Action::Download => self.download,
            Action::Verify => self.verify,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
