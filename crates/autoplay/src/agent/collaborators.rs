//! Call contracts for everything the loop drives but does not implement.

use crate::bridge::BridgeClient;
use crate::error::AgentResult;
use crate::model::ButtonPress;
use serde_json::{Map, Value};
use std::time::Duration;

/// Source of game state and pending events.
pub trait GameBridge: Send + Sync {
    fn fetch_state(&self) -> AgentResult<Map<String, Value>>;
    fn fetch_events(&self) -> AgentResult<Vec<Map<String, Value>>>;
}

impl GameBridge for BridgeClient {
    fn fetch_state(&self) -> AgentResult<Map<String, Value>> {
        self.get_state()
    }

    fn fetch_events(&self) -> AgentResult<Vec<Map<String, Value>>> {
        self.get_events()
    }
}

/// Produces the current frame as encoded image bytes.
pub trait ScreenCapture: Send + Sync {
    fn capture(&self) -> AgentResult<Vec<u8>>;
}

/// Everything the decision provider sees for one step.
#[derive(Clone, Copy, Debug)]
pub struct DecisionRequest<'a> {
    pub screenshot: &'a [u8],
    pub state: &'a Map<String, Value>,
    /// Serialized actions, oldest first.
    pub recent_actions: &'a [Value],
    pub rules_text: Option<&'a str>,
}

/// Picks the next action.
///
/// The returned value is untrusted; the loop validates it into an
/// [`Action`](crate::model::Action) and substitutes the fallback when it does
/// not fit.
pub trait DecisionProvider: Send + Sync {
    fn decide(&self, request: &DecisionRequest<'_>) -> AgentResult<Value>;
}

/// Executes inputs against the game.
pub trait Actuator: Send + Sync {
    /// Press each button in order, then idle for `wait_ms`.
    fn press_sequence(&self, buttons: &[ButtonPress], wait_ms: u64) -> AgentResult<()>;

    fn wait(&self, ms: u64) -> AgentResult<()> {
        std::thread::sleep(Duration::from_millis(ms));
        Ok(())
    }
}

/// Receives non-empty event batches before the decision is made.
pub trait EventDispatch: Send + Sync {
    fn dispatch(
        &self,
        events: &[Map<String, Value>],
        state: &Map<String, Value>,
        screenshot: &[u8],
    ) -> AgentResult<()>;
}

impl<F> EventDispatch for F
where
    F: Fn(&[Map<String, Value>], &Map<String, Value>, &[u8]) -> AgentResult<()> + Send + Sync,
{
    fn dispatch(
        &self,
        events: &[Map<String, Value>],
        state: &Map<String, Value>,
        screenshot: &[u8],
    ) -> AgentResult<()> {
        self(events, state, screenshot)
    }
}

/// Discards every event batch.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEvents;

impl EventDispatch for NoopEvents {
    fn dispatch(
        &self,
        _events: &[Map<String, Value>],
        _state: &Map<String, Value>,
        _screenshot: &[u8],
    ) -> AgentResult<()> {
        Ok(())
    }
}
