use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON sidecar written next to each step screenshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: u64,
    /// RFC 3339 time the record was written.
    pub t: String,
    pub state: Map<String, Value>,
    pub events: Vec<Map<String, Value>>,
    pub action: Value,
    /// File name of the screenshot, relative to the steps directory.
    pub screenshot: String,
}

/// Base file name (without extension) for a step index.
#[must_use]
pub fn step_file_stem(step: u64) -> String {
    format!("{step:06}")
}
