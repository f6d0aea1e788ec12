//! Enumeration types shared by the engine, the host and its control API.

use serde::{Deserialize, Serialize};

/// Which decision maker drives the crane during an asynchronous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// The engine makes its own simple scheduling decisions.
    Automatic,
    /// The engine applies its built-in rule-based policy.
    RuleBased,
    /// No embedded policy; schedules arrive from an external agent.
    External,
}

impl PolicyMode {
    /// Stable lowercase name used in logs and query strings.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::RuleBased => "rule_based",
            Self::External => "external",
        }
    }
}

impl core::fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a session.
///
/// `Created → Running → {Completed | Aborted | Failed}`. The three
/// terminal states are final; a new start request creates a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Settings decoded and engine constructed; the run has not begun.
    Created,
    /// The engine is running.
    Running,
    /// The engine reached the end of the simulation horizon.
    Completed,
    /// An operator stop ended the run.
    Aborted,
    /// The engine reported an abnormal termination.
    Failed,
}

impl SessionState {
    /// Whether no further transitions are possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Failed)
    }
}
