//! File-backed collaborators for running the loop without a live game.

use super::collaborators::{Actuator, DecisionProvider, DecisionRequest, ScreenCapture};
use crate::error::{AgentError, AgentResult, ErrorCode};
use crate::model::action::{MAX_BUTTONS, MAX_PRESS_MS};
use crate::model::ButtonPress;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Serves the bytes of one image file, re-read on every capture.
#[derive(Clone, Debug)]
pub struct StaticCapture {
    path: PathBuf,
}

impl StaticCapture {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScreenCapture for StaticCapture {
    fn capture(&self) -> AgentResult<Vec<u8>> {
        fs::read(&self.path)
            .map_err(|err| AgentError::io(ErrorCode::Capture, "failed to read screenshot", err))
    }
}

/// Replays decisions from an NDJSON script, one line per step.
///
/// Lines are handed to the loop as parsed JSON without validation, so a
/// script can exercise the fallback path. A line that is not JSON at all is
/// reported as a decision error.
#[derive(Debug)]
pub struct ScriptedDecisions {
    lines: Vec<String>,
    cycle: bool,
    cursor: Mutex<usize>,
}

impl ScriptedDecisions {
    pub fn load(path: &Path, cycle: bool) -> AgentResult<Self> {
        let data = fs::read_to_string(path)
            .map_err(|err| AgentError::io(ErrorCode::Io, "failed to read decisions file", err))?;
        Ok(Self::from_lines(data.lines(), cycle))
    }

    pub fn from_lines<I, S>(lines: I, cycle: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lines = lines
            .into_iter()
            .map(|line| line.as_ref().trim().to_string())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();
        Self {
            lines,
            cycle,
            cursor: Mutex::new(0),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn next_line(&self) -> Option<String> {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        if *cursor >= self.lines.len() {
            if !self.cycle || self.lines.is_empty() {
                return None;
            }
            *cursor = 0;
        }
        let line = self.lines.get(*cursor).cloned();
        *cursor += 1;
        line
    }
}

impl DecisionProvider for ScriptedDecisions {
    fn decide(&self, _request: &DecisionRequest<'_>) -> AgentResult<Value> {
        let line = self
            .next_line()
            .ok_or_else(|| AgentError::decision("scripted decisions exhausted"))?;
        serde_json::from_str(&line)
            .map_err(|err| AgentError::io(ErrorCode::Decision, "scripted decision is not json", err))
    }
}

/// Logs inputs instead of injecting them.
///
/// Sequences are clamped the way a real input driver would: at most
/// [`MAX_BUTTONS`] presses, each held at most [`MAX_PRESS_MS`].
#[derive(Debug)]
pub struct DryRunActuator {
    sleep: bool,
    presses: AtomicU64,
    actions: AtomicU64,
}

impl Default for DryRunActuator {
    fn default() -> Self {
        Self::new()
    }
}

impl DryRunActuator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sleep: true,
            presses: AtomicU64::new(0),
            actions: AtomicU64::new(0),
        }
    }

    /// Skip the hold and wait sleeps.
    #[must_use]
    pub fn instant() -> Self {
        Self {
            sleep: false,
            ..Self::new()
        }
    }

    /// Presses performed so far.
    #[must_use]
    pub fn presses(&self) -> u64 {
        self.presses.load(Ordering::SeqCst)
    }

    /// Actions (press sequences and waits) performed so far.
    #[must_use]
    pub fn actions(&self) -> u64 {
        self.actions.load(Ordering::SeqCst)
    }

    fn idle(&self, ms: u64) {
        if self.sleep && ms > 0 {
            std::thread::sleep(Duration::from_millis(ms));
        }
    }
}

impl Actuator for DryRunActuator {
    fn press_sequence(&self, buttons: &[ButtonPress], wait_ms: u64) -> AgentResult<()> {
        for press in buttons.iter().take(MAX_BUTTONS) {
            let ms = press.ms.min(MAX_PRESS_MS);
            tracing::info!(key = %press.key, ms, "press");
            self.presses.fetch_add(1, Ordering::SeqCst);
            self.idle(ms);
        }
        self.idle(wait_ms);
        self.actions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wait(&self, ms: u64) -> AgentResult<()> {
        tracing::debug!(ms, "wait");
        self.idle(ms);
        self.actions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
