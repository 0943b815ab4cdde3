//! Error taxonomy shared by the bridge client, the control loop and the CLI.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub type AgentResult<T> = Result<T, AgentError>;

/// Stable machine-readable error codes.
///
/// Each code maps to a process exit code for the CLI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Bridge transport failure (connect, write, read) after the retry.
    #[serde(rename = "E_CONNECTION")]
    Connection,
    /// Bridge answered with a malformed or unsuccessful response.
    #[serde(rename = "E_PROTOCOL")]
    Protocol,
    /// Decision provider failed or produced an invalid action.
    #[serde(rename = "E_DECISION")]
    Decision,
    /// Input execution failed.
    #[serde(rename = "E_ACTUATION")]
    Actuation,
    /// Screenshot acquisition failed.
    #[serde(rename = "E_CAPTURE")]
    Capture,
    /// Step trail could not be written.
    #[serde(rename = "E_PERSISTENCE")]
    Persistence,
    /// Anything the loop does not isolate; terminates the worker.
    #[serde(rename = "E_FATAL_LOOP")]
    FatalLoop,
    /// Invalid or unreadable configuration.
    #[serde(rename = "E_CONFIG")]
    Config,
    /// Filesystem or other local I/O failure.
    #[serde(rename = "E_IO")]
    Io,
    /// Invalid command-line usage.
    #[serde(rename = "E_CLI_INVALID_ARG")]
    CliInvalidArg,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 10] = [
        ErrorCode::Connection,
        ErrorCode::Protocol,
        ErrorCode::Decision,
        ErrorCode::Actuation,
        ErrorCode::Capture,
        ErrorCode::Persistence,
        ErrorCode::FatalLoop,
        ErrorCode::Config,
        ErrorCode::Io,
        ErrorCode::CliInvalidArg,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Connection => "E_CONNECTION",
            ErrorCode::Protocol => "E_PROTOCOL",
            ErrorCode::Decision => "E_DECISION",
            ErrorCode::Actuation => "E_ACTUATION",
            ErrorCode::Capture => "E_CAPTURE",
            ErrorCode::Persistence => "E_PERSISTENCE",
            ErrorCode::FatalLoop => "E_FATAL_LOOP",
            ErrorCode::Config => "E_CONFIG",
            ErrorCode::Io => "E_IO",
            ErrorCode::CliInvalidArg => "E_CLI_INVALID_ARG",
        }
    }

    /// Parse a code string such as `E_PROTOCOL`.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == code)
    }

    /// Process exit code used by the CLI.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            ErrorCode::Config | ErrorCode::CliInvalidArg => 2,
            ErrorCode::Connection => 3,
            ErrorCode::Protocol => 4,
            ErrorCode::Decision => 5,
            ErrorCode::Actuation => 6,
            ErrorCode::Capture => 7,
            ErrorCode::Persistence => 8,
            ErrorCode::FatalLoop => 9,
            ErrorCode::Io => 10,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable error payload for JSON output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AgentError {
    pub code: ErrorCode,
    pub message: String,
    pub context: Option<Value>,
}

impl AgentError {
    pub fn new(code: ErrorCode, message: impl Into<String>, context: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            context,
        }
    }

    /// Wrap a foreign error, keeping its text under `context.source`.
    pub fn io(code: ErrorCode, message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self {
            code,
            message: message.into(),
            context: Some(serde_json::json!({ "source": err.to_string() })),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Connection, message, None)
    }

    pub fn protocol(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::Protocol, message, context.into())
    }

    pub fn decision(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Decision, message, None)
    }

    pub fn actuation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Actuation, message, None)
    }

    pub fn config(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::Config, message, context.into())
    }

    pub fn cli_invalid_arg(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CliInvalidArg, message, None)
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }

    #[must_use]
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code.as_str().to_string(),
            message: self.message.clone(),
            context: self.context.clone(),
        }
    }

    /// Message plus the wrapped source text, if any.
    #[must_use]
    pub fn detail(&self) -> String {
        match self
            .context
            .as_ref()
            .and_then(|ctx| ctx.get("source"))
            .and_then(Value::as_str)
        {
            Some(source) => format!("{}: {source}", self.message),
            None => self.message.clone(),
        }
    }
}

impl Diagnostic for AgentError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.code))
    }
}
