//! Error types for fleet orchestration

use crate::agent::AgentState;
use std::time::Duration;
use thiserror::Error;

/// Result type for fleet operations
pub type FleetResult<T> = Result<T, FleetError>;

/// Errors that can occur while configuring or driving a fleet
#[derive(Error, Debug)]
pub enum FleetError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Lifecycle state would move backwards or skip a stage
    #[error("Agent {index}: invalid state transition {from} -> {to}")]
    InvalidTransition {
        index: usize,
        from: AgentState,
        to: AgentState,
    },

    /// Malformed repository or service URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FleetError {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        FleetError::InvalidConfig(msg.into())
    }
}

/// The agent image could not be built
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Image build failed for {image}:\n{output}")]
pub struct BuildFailure {
    pub image: String,
    /// Diagnostic output of the build tool
    pub output: String,
}

/// One agent's container could not be started
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Agent {index} failed to launch: {cause}")]
pub struct LaunchFailure {
    pub index: usize,
    pub cause: String,
}

/// Errors talking to an agent's HTTP service
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection refused, DNS, protocol errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Agent answered with a non-success status
    #[error("Agent returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body was not valid JSON
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// No response within the per-request deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Create a non-success status error
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        TransportError::Status {
            status,
            body: body.into(),
        }
    }

    /// Create a malformed response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        TransportError::Malformed(msg.into())
    }
}
