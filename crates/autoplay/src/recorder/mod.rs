//! Durable per-step trail.
//!
//! Layout under the logs directory:
//!
//! ```text
//! <logs_dir>/<run_id>/run.log
//! <logs_dir>/<run_id>/steps/000000.png
//! <logs_dir>/<run_id>/steps/000000.json
//! ```

use crate::error::{AgentError, AgentResult, ErrorCode};
use crate::model::step::step_file_stem;
use crate::model::{utc_now_rfc3339, Action, RunId, StepRecord};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const STEPS_DIR: &str = "steps";
pub const RUN_LOG: &str = "run.log";
pub const SCREENSHOT_EXT: &str = "png";

/// Directories for one run, created up front.
#[derive(Clone, Debug)]
pub struct RunPaths {
    pub run_id: RunId,
    pub run_dir: PathBuf,
    pub steps_dir: PathBuf,
}

impl RunPaths {
    /// Create `<logs_dir>/<run_id>/steps`, generating a run id if none is given.
    pub fn create(logs_dir: &Path, run_id: Option<RunId>) -> AgentResult<Self> {
        let run_id = run_id.unwrap_or_default();
        let run_dir = logs_dir.join(run_id.as_str());
        let steps_dir = run_dir.join(STEPS_DIR);
        fs::create_dir_all(&steps_dir).map_err(|err| {
            AgentError::io(ErrorCode::Persistence, "failed to create run directory", err)
        })?;
        Ok(Self {
            run_id,
            run_dir,
            steps_dir,
        })
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.run_dir.join(RUN_LOG)
    }

    #[must_use]
    pub fn screenshot_path(&self, step: u64) -> PathBuf {
        self.steps_dir
            .join(format!("{}.{SCREENSHOT_EXT}", step_file_stem(step)))
    }

    #[must_use]
    pub fn record_path(&self, step: u64) -> PathBuf {
        self.steps_dir.join(format!("{}.json", step_file_stem(step)))
    }
}

/// Writes one screenshot and one JSON sidecar per step.
#[derive(Clone, Debug)]
pub struct StepRecorder {
    paths: RunPaths,
}

impl StepRecorder {
    #[must_use]
    pub fn new(paths: RunPaths) -> Self {
        Self { paths }
    }

    #[must_use]
    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    /// Persist the step. Re-logging a step index replaces both files.
    pub fn log_step(
        &self,
        step: u64,
        state: &Map<String, Value>,
        events: &[Map<String, Value>],
        action: &Action,
        screenshot: &[u8],
    ) -> AgentResult<()> {
        let image_path = self.paths.screenshot_path(step);
        write_replacing(&image_path, screenshot)?;

        let record = StepRecord {
            step,
            t: utc_now_rfc3339(),
            state: state.clone(),
            events: events.to_vec(),
            action: action.to_value()?,
            screenshot: file_name(&image_path),
        };
        write_json(&self.paths.record_path(step), &record)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> AgentResult<()> {
    let data = serde_json::to_vec_pretty(value)
        .map_err(|err| AgentError::io(ErrorCode::Persistence, "failed to serialize", err))?;
    write_replacing(path, &data)
}

/// Write through a sibling temp file and rename over the target, so readers
/// only ever see a complete file.
fn write_replacing(path: &Path, data: &[u8]) -> AgentResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, data)
        .map_err(|err| AgentError::io(ErrorCode::Persistence, "failed to write artifact", err))?;
    fs::rename(&tmp, path).map_err(|err| {
        let _ = fs::remove_file(&tmp);
        AgentError::io(ErrorCode::Persistence, "failed to replace artifact", err)
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
