//! Lifecycle status of a chain run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one chain run.
///
/// A run starts `Idle`, moves to `Running` when the executor begins and ends in
/// exactly one of the two stopped states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    #[default]
    Idle,
    Running,
    StoppedNormal,
    StoppedError,
}

impl ChainStatus {
    /// Whether the run has reached a terminal state.
    pub fn is_stopped(self) -> bool {
        matches!(self, ChainStatus::StoppedNormal | ChainStatus::StoppedError)
    }
}

impl fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChainStatus::Idle => "idle",
            ChainStatus::Running => "running",
            ChainStatus::StoppedNormal => "stopped_normal",
            ChainStatus::StoppedError => "stopped_error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_idle() {
        assert_eq!(ChainStatus::default(), ChainStatus::Idle);
    }

    #[test]
    fn stopped_states() {
        assert!(!ChainStatus::Idle.is_stopped());
        assert!(!ChainStatus::Running.is_stopped());
        assert!(ChainStatus::StoppedNormal.is_stopped());
        assert!(ChainStatus::StoppedError.is_stopped());
    }

    #[test]
    fn display_matches_serde_name() {
        let json = serde_json::to_string(&ChainStatus::StoppedNormal).unwrap();
        assert_eq!(json, "\"stopped_normal\"");
        assert_eq!(ChainStatus::StoppedNormal.to_string(), "stopped_normal");
    }
}
