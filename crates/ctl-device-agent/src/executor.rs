//! Operation executor shared by remote commands and job documents.
//!
//! Both carry a JSON document of the form
//! `{"operation": "<name>", "parameters": {...}}`. Operations run on the
//! task that drives the event loop, so none of them may block.

use std::time::Instant;

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OperationError {
    #[error("document has no operation")]
    Missing,

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
}

impl OperationError {
    /// Machine-readable code for reply reason fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Missing => "MISSING_OPERATION",
            Self::Unsupported(_) => "UNSUPPORTED_OPERATION",
            Self::InvalidParameters(_) => "INVALID_PARAMETERS",
        }
    }
}

#[derive(Debug, Deserialize)]
struct OperationDocument {
    #[serde(default)]
    operation: Option<String>,
    #[serde(default)]
    parameters: Value,
}

/// Executes built-in operations.
pub struct OperationExecutor {
    thing_name: String,
    started_at: Instant,
}

impl OperationExecutor {
    pub fn new(thing_name: impl Into<String>) -> Self {
        Self {
            thing_name: thing_name.into(),
            started_at: Instant::now(),
        }
    }

    /// Run the operation named by `document`, returning its result.
    pub fn execute(&self, document: &Value) -> Result<Value, OperationError> {
        let doc = OperationDocument::deserialize(document)
            .map_err(|e| OperationError::InvalidParameters(e.to_string()))?;
        let operation = doc.operation.ok_or(OperationError::Missing)?;
        tracing::debug!(operation = %operation, "executing operation");

        match operation.as_str() {
            "ping" => Ok(json!({"pong": true, "thing": self.thing_name})),
            "echo" => Ok(doc.parameters),
            "uptime" => Ok(json!({"uptime_secs": self.started_at.elapsed().as_secs()})),
            other => Err(OperationError::Unsupported(other.to_string())),
        }
    }
}
