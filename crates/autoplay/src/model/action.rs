use crate::error::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Maximum presses in a single `buttons` action.
pub const MAX_BUTTONS: usize = 20;
/// Maximum hold duration for one press.
pub const MAX_PRESS_MS: u64 = 1_500;
/// Maximum settle wait after a press sequence.
pub const MAX_BUTTONS_WAIT_MS: u64 = 10_000;
/// Maximum duration of a `wait` action.
pub const MAX_WAIT_MS: u64 = 60_000;
/// Maximum note length in characters.
pub const MAX_NOTE_CHARS: usize = 240;
/// Wait used when no valid action is available.
pub const FALLBACK_WAIT_MS: u64 = 500;

const DEFAULT_PRESS_MS: u64 = 80;
const DEFAULT_BUTTONS_WAIT_MS: u64 = 200;

/// The fixed set of keys the actuator may press.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Z,
    X,
    C,
    A,
    S,
    D,
    Q,
    W,
}

impl Key {
    pub const ALL: [Key; 12] = [
        Key::Up,
        Key::Down,
        Key::Left,
        Key::Right,
        Key::Z,
        Key::X,
        Key::C,
        Key::A,
        Key::S,
        Key::D,
        Key::Q,
        Key::W,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Key::Up => "UP",
            Key::Down => "DOWN",
            Key::Left => "LEFT",
            Key::Right => "RIGHT",
            Key::Z => "Z",
            Key::X => "X",
            Key::C => "C",
            Key::A => "A",
            Key::S => "S",
            Key::D => "D",
            Key::Q => "Q",
            Key::W => "W",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One key press held for `ms` milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ButtonPress {
    pub key: Key,
    #[serde(default = "default_press_ms")]
    pub ms: u64,
}

impl ButtonPress {
    #[must_use]
    pub fn new(key: Key, ms: u64) -> Self {
        Self { key, ms }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ButtonsAction {
    #[serde(default)]
    pub buttons: Vec<ButtonPress>,
    #[serde(default = "default_buttons_wait_ms")]
    pub wait_ms: u64,
    #[serde(default)]
    pub note: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitAction {
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,
    #[serde(default)]
    pub note: String,
}

/// A validated action, discriminated on the JSON `type` field.
///
/// Values from a decision provider are untrusted: build them with
/// [`Action::from_value`] or [`Action::from_json_str`], which reject anything
/// outside the documented bounds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Buttons(ButtonsAction),
    Wait(WaitAction),
}

impl Action {
    #[must_use]
    pub fn wait(wait_ms: u64, note: impl Into<String>) -> Self {
        Action::Wait(WaitAction {
            wait_ms,
            note: note.into(),
        })
    }

    #[must_use]
    pub fn buttons(buttons: Vec<ButtonPress>, wait_ms: u64, note: impl Into<String>) -> Self {
        Action::Buttons(ButtonsAction {
            buttons,
            wait_ms,
            note: note.into(),
        })
    }

    /// The safe action substituted for any failed or invalid decision.
    #[must_use]
    pub fn fallback(note: impl Into<String>) -> Self {
        Self::wait(FALLBACK_WAIT_MS, note)
    }

    pub fn from_value(value: Value) -> AgentResult<Self> {
        let action: Action = serde_json::from_value(value)
            .map_err(|err| AgentError::io(crate::ErrorCode::Decision, "invalid action", err))?;
        action.validate()?;
        Ok(action)
    }

    pub fn from_json_str(text: &str) -> AgentResult<Self> {
        let value: Value = serde_json::from_str(text).map_err(|err| {
            AgentError::io(crate::ErrorCode::Decision, "action is not valid json", err)
        })?;
        Self::from_value(value)
    }

    /// Check numeric and length bounds that serde cannot express.
    pub fn validate(&self) -> AgentResult<()> {
        match self {
            Action::Buttons(action) => {
                if action.buttons.len() > MAX_BUTTONS {
                    return Err(out_of_range("buttons", action.buttons.len(), MAX_BUTTONS));
                }
                if let Some(press) = action.buttons.iter().find(|p| p.ms > MAX_PRESS_MS) {
                    return Err(out_of_range("buttons[].ms", press.ms, MAX_PRESS_MS));
                }
                if action.wait_ms > MAX_BUTTONS_WAIT_MS {
                    return Err(out_of_range("wait_ms", action.wait_ms, MAX_BUTTONS_WAIT_MS));
                }
                check_note(&action.note)
            }
            Action::Wait(action) => {
                if action.wait_ms > MAX_WAIT_MS {
                    return Err(out_of_range("wait_ms", action.wait_ms, MAX_WAIT_MS));
                }
                check_note(&action.note)
            }
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Action::Buttons(_) => "buttons",
            Action::Wait(_) => "wait",
        }
    }

    #[must_use]
    pub fn note(&self) -> &str {
        match self {
            Action::Buttons(action) => &action.note,
            Action::Wait(action) => &action.note,
        }
    }

    #[must_use]
    pub const fn wait_ms(&self) -> u64 {
        match self {
            Action::Buttons(action) => action.wait_ms,
            Action::Wait(action) => action.wait_ms,
        }
    }

    pub fn to_value(&self) -> AgentResult<Value> {
        serde_json::to_value(self)
            .map_err(|err| AgentError::io(crate::ErrorCode::FatalLoop, "failed to encode action", err))
    }
}

fn check_note(note: &str) -> AgentResult<()> {
    let chars = note.chars().count();
    if chars > MAX_NOTE_CHARS {
        return Err(out_of_range("note", chars, MAX_NOTE_CHARS));
    }
    Ok(())
}

fn out_of_range(field: &str, got: impl fmt::Display, max: impl fmt::Display) -> AgentError {
    AgentError::new(
        crate::ErrorCode::Decision,
        format!("action field '{field}' out of range: {got} > {max}"),
        Some(serde_json::json!({ "field": field })),
    )
}

fn default_press_ms() -> u64 {
    DEFAULT_PRESS_MS
}

fn default_buttons_wait_ms() -> u64 {
    DEFAULT_BUTTONS_WAIT_MS
}

fn default_wait_ms() -> u64 {
    FALLBACK_WAIT_MS
}
