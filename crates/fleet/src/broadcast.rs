//! Concurrent prompt broadcast

use crate::error::TransportError;
use crate::spec::PromptOptions;
use crate::transport::{AgentResponse, AgentTransport, PromptRequest};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Agent addressed by a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastTarget {
    pub index: usize,
    pub port: u16,
}

/// What came back from one agent
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Success(AgentResponse),
    Failure(String),
}

/// Per-agent broadcast record
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastResult {
    pub index: usize,
    pub port: u16,
    pub outcome: SendOutcome,
}

impl BroadcastResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, SendOutcome::Success(_))
    }
}

/// Sends one prompt to many agents at once
pub struct BroadcastCoordinator {
    transport: Arc<dyn AgentTransport>,
    timeout: Duration,
    options: PromptOptions,
}

impl BroadcastCoordinator {
    pub fn new(
        transport: Arc<dyn AgentTransport>,
        timeout: Duration,
        options: PromptOptions,
    ) -> Self {
        Self {
            transport,
            timeout,
            options,
        }
    }

    /// Send `prompt` to every target concurrently.
    ///
    /// Returns exactly one result per target, in target order. Each request is
    /// bounded by its own timeout; one agent's failure never affects another.
    pub async fn broadcast(
        &self,
        prompt: &str,
        targets: &[BroadcastTarget],
    ) -> Vec<BroadcastResult> {
        let total = targets.len();
        info!(target: "fleet::broadcast", agents = total, "Broadcasting prompt");

        let sends = targets.iter().enumerate().map(|(position, target)| {
            let text = self.options.compose(prompt, position + 1, total);
            self.send(*target, PromptRequest::json(text))
        });
        join_all(sends).await
    }

    async fn send(&self, target: BroadcastTarget, request: PromptRequest) -> BroadcastResult {
        let call = self.transport.submit(target.port, &request);
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        };

        let outcome = match result {
            Ok(response) => {
                info!(
                    target: "fleet::broadcast",
                    index = target.index,
                    port = target.port,
                    status = response.status,
                    "Agent responded"
                );
                SendOutcome::Success(response)
            }
            Err(e) => {
                warn!(
                    target: "fleet::broadcast",
                    index = target.index,
                    port = target.port,
                    error = %e,
                    "Agent request failed"
                );
                SendOutcome::Failure(e.to_string())
            }
        };

        BroadcastResult {
            index: target.index,
            port: target.port,
            outcome,
        }
    }
}
