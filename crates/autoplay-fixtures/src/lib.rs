//! Test utilities and fixtures for autoplay integration tests.
//!
//! - [`FakeBridge`] - Scripted in-process bridge server speaking the
//!   line-delimited JSON protocol on `127.0.0.1`
//! - [`temp_dir`] - Create unique temporary directories
//! - [`write_file`] / [`write_json`] - Drop fixture files into a directory
//!
//! # Example
//!
//! ```ignore
//! use autoplay_fixtures::{temp_dir, FakeBridge};
//! use serde_json::json;
//!
//! let bridge = FakeBridge::start();
//! bridge.set_state(json!({"map_id": 3}));
//! bridge.push_events(vec![json!({"type": "badge_earned"})]);
//!
//! let dir = temp_dir("loop");
//! // point a BridgeClient at bridge.port() ...
//! ```

// Test fixtures crate - relaxed lints for test utilities
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]
#![allow(missing_docs)]

pub mod bridge;
pub mod helpers;

pub use bridge::FakeBridge;
pub use helpers::{temp_dir, write_file, write_json};
