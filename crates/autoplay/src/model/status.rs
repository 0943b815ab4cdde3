use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Coarse lifecycle state of the control loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Stopped,
    Running,
    Paused,
}

/// Snapshot of what the loop is doing, as seen by external pollers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub running: bool,
    pub paused: bool,
    pub last_step: u64,
    #[serde(default)]
    pub last_state: Map<String, Value>,
    #[serde(default)]
    pub last_action: Option<Value>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// RFC 3339 time of the last completed step.
    #[serde(default)]
    pub last_action_t: Option<String>,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self {
            running: false,
            paused: true,
            last_step: 0,
            last_state: Map::new(),
            last_action: None,
            last_error: None,
            last_action_t: None,
        }
    }
}

impl AgentStatus {
    #[must_use]
    pub fn state(&self) -> AgentState {
        match (self.running, self.paused) {
            (false, _) => AgentState::Stopped,
            (true, true) => AgentState::Paused,
            (true, false) => AgentState::Running,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_stopped() {
        let status = AgentStatus::default();
        assert_eq!(status.state(), AgentState::Stopped);
        assert!(status.paused);
    }

    #[test]
    fn state_follows_flags() {
        let mut status = AgentStatus {
            running: true,
            paused: false,
            ..AgentStatus::default()
        };
        assert_eq!(status.state(), AgentState::Running);
        status.paused = true;
        assert_eq!(status.state(), AgentState::Paused);
    }
}
