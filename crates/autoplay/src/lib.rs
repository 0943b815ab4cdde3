//! Autoplay: a perceive, decide, act control loop for driving a game.
//!
//! Each iteration reads state and events from a line-delimited JSON bridge,
//! captures the screen, asks a decision provider for the next [`Action`],
//! executes it through an input actuator under a sliding-window rate budget,
//! and persists a step record. Per-step failures are isolated and surfaced in
//! [`AgentStatus::last_error`]; the loop keeps running.

#![forbid(unsafe_code)]
// Public API types have docs; internal helpers are documented where useful.
#![allow(missing_docs)]

pub mod agent;
pub mod bridge;
pub mod config;
pub mod error;
pub mod model;
pub mod rate_limit;
pub mod recorder;
pub mod status;

pub use crate::agent::{AgentContext, AgentController, LoopConfig};
pub use crate::bridge::{BridgeClient, BridgeClientConfig};
pub use crate::config::{load_config, AppConfig};
pub use crate::error::{AgentError, AgentResult, ErrorCode, ErrorInfo};
pub use crate::model::*;
pub use crate::rate_limit::RateLimiter;
pub use crate::recorder::{RunPaths, StepRecorder};
pub use crate::status::StatusStore;
