//! Mapping from execution outcomes to response payloads
//!
//! Compile and runtime failures travel inside a successful response, carried
//! by `stdout`/`stderr`. Only a missing toolchain, an unsupported language and
//! internal errors use a failure status.

use serde::Serialize;

use crate::executor::ExecutionOutcome;
use crate::registry::NotSupportedError;

/// Message returned for timed out executions
pub const TIMEOUT_MESSAGE: &str = "Execution timed out";

/// Message returned for internal errors; details stay in the logs
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal error while executing code";

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_INTERNAL_ERROR: u16 = 500;

/// Body of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// Captured program (or compiler) output
    Output { stdout: String, stderr: String },

    /// An error message, with installation guidance for missing toolchains
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        remediation: Option<String>,
    },
}

/// Status code and body handed to the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub status: u16,
    #[serde(rename = "body")]
    pub payload: ResponsePayload,
}

impl Response {
    fn ok(payload: ResponsePayload) -> Self {
        Self {
            status: STATUS_OK,
            payload,
        }
    }

    fn error(status: u16, error: impl Into<String>, remediation: Option<String>) -> Self {
        Self {
            status,
            payload: ResponsePayload::Error {
                error: error.into(),
                remediation,
            },
        }
    }

    /// Check for a 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Serialize the payload alone, as an HTTP body
    pub fn body_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.payload)
    }
}

/// Map an outcome to its response
pub fn classify(outcome: &ExecutionOutcome) -> Response {
    match outcome {
        ExecutionOutcome::Success { stdout, stderr, .. }
        | ExecutionOutcome::BuildFailed { stdout, stderr, .. }
        | ExecutionOutcome::RuntimeFailed { stdout, stderr, .. } => {
            Response::ok(ResponsePayload::Output {
                stdout: stdout.clone(),
                stderr: stderr.clone(),
            })
        }
        ExecutionOutcome::TimedOut => Response::ok(ResponsePayload::Error {
            error: TIMEOUT_MESSAGE.to_owned(),
            remediation: None,
        }),
        ExecutionOutcome::PreflightFailed {
            reason,
            remediation,
        } => Response::error(
            STATUS_INTERNAL_ERROR,
            reason.clone(),
            Some(remediation.clone()),
        ),
    }
}

/// Response for a language without a registered toolchain
pub fn not_supported(err: &NotSupportedError) -> Response {
    Response::error(STATUS_BAD_REQUEST, err.to_string(), None)
}

/// Response for a request body that could not be understood
pub fn bad_request(message: impl Into<String>) -> Response {
    Response::error(STATUS_BAD_REQUEST, message, None)
}

/// Response for a failure of the orchestrator itself
pub fn internal_error() -> Response {
    Response::error(STATUS_INTERNAL_ERROR, INTERNAL_ERROR_MESSAGE, None)
}
