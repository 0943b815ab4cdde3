pub mod action;
pub mod ids;
pub mod status;
pub mod step;

pub use action::{Action, ButtonPress, ButtonsAction, Key, WaitAction};
pub use ids::RunId;
pub use status::{AgentState, AgentStatus};
pub use step::StepRecord;

/// Timestamp format used in status and step records.
#[must_use]
pub fn utc_now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
