//! The perceive, decide, act loop and its lifecycle controls.

pub mod collaborators;
mod controller;
pub mod standins;

pub use collaborators::{
    Actuator, DecisionProvider, DecisionRequest, EventDispatch, GameBridge, NoopEvents,
    ScreenCapture,
};
pub use controller::{AgentContext, AgentController};
pub use standins::{DryRunActuator, ScriptedDecisions, StaticCapture};

use crate::config::AgentConfig;
use crate::rate_limit::DEFAULT_WINDOW;
use std::time::Duration;

/// Most recent actions shown to the decision provider.
pub const RECENT_ACTIONS: usize = 10;

/// Runtime timings of the loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopConfig {
    pub step_delay: Duration,
    /// `0` disables rate limiting.
    pub max_actions: u32,
    pub rate_window: Duration,
    /// Sleep slice while paused, rate limited or between steps.
    pub idle_poll: Duration,
    pub stop_timeout: Duration,
    /// Pause after a failed actuation.
    pub input_error_backoff: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for LoopConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            step_delay: Duration::from_millis(config.step_delay_ms),
            max_actions: config.max_actions_per_minute,
            rate_window: DEFAULT_WINDOW,
            idle_poll: Duration::from_millis(config.idle_poll_ms),
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
            input_error_backoff: Duration::from_millis(250),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn loop_config_follows_agent_config() {
        let config = LoopConfig::from(&AgentConfig {
            step_delay_ms: 0,
            max_actions_per_minute: 12,
            rules_text: None,
            idle_poll_ms: 20,
            stop_timeout_ms: 100,
        });
        assert_eq!(config.step_delay, Duration::ZERO);
        assert_eq!(config.max_actions, 12);
        assert_eq!(config.rate_window, Duration::from_secs(60));
        assert_eq!(config.idle_poll, Duration::from_millis(20));
        assert_eq!(config.stop_timeout, Duration::from_millis(100));
    }
}
