//! Request dispatch for the transport layer
//!
//! Takes the `{ language, code }` document a client sends and produces the
//! status and payload to send back.

use serde::Deserialize;
use tracing::{debug, error, instrument};

use crate::report::{self, Response};
use crate::runner::{ExecutionRequest, RunError, Runner};

/// Request body sent by clients
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DispatchRequest {
    pub language: String,
    pub code: String,
}

impl From<DispatchRequest> for ExecutionRequest {
    fn from(request: DispatchRequest) -> Self {
        ExecutionRequest::new(request.language, request.code)
    }
}

impl Runner {
    /// Execute a request and map the result to a response
    ///
    /// The execution runs in its own task. If the caller stops waiting (the
    /// client disconnected), the task still runs to completion or timeout and
    /// cleans up; its result is then dropped.
    #[instrument(skip_all, fields(language = %request.language))]
    pub async fn dispatch(&self, request: DispatchRequest) -> Response {
        let runner = self.clone();
        let task = tokio::spawn(async move { runner.execute(request.into()).await });

        let result = task.await.map_err(RunError::from).and_then(|result| result);
        match result {
            Ok(outcome) => report::classify(&outcome),
            Err(RunError::NotSupported(e)) => {
                debug!(error = %e, "rejected request");
                report::not_supported(&e)
            }
            Err(e) => {
                error!(error = %e, "execution failed");
                report::internal_error()
            }
        }
    }

    /// Parse a JSON request body and dispatch it
    pub async fn dispatch_json(&self, body: &str) -> Response {
        match serde_json::from_str::<DispatchRequest>(body) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                debug!(error = %e, "malformed request body");
                report::bad_request(format!("invalid request body: {e}"))
            }
        }
    }
}
