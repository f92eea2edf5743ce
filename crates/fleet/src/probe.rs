//! Readiness probing

use crate::error::TransportError;
use crate::spec::ProbePolicy;
use crate::transport::AgentTransport;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of probing one agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready { attempts: u32 },
    Unreachable { attempts: u32, last_error: String },
}

impl ProbeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeOutcome::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ProbeOutcome::Ready { attempts } | ProbeOutcome::Unreachable { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Polls an agent's health endpoint until it answers or the budget runs out
pub struct ReadinessProber {
    transport: Arc<dyn AgentTransport>,
    policy: ProbePolicy,
}

impl ReadinessProber {
    pub fn new(transport: Arc<dyn AgentTransport>, policy: ProbePolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &ProbePolicy {
        &self.policy
    }

    /// Probe the agent on `port`.
    ///
    /// Makes at most `max_attempts` checks, each bounded by `attempt_timeout`,
    /// with `interval` between failures. Never sleeps after the final attempt.
    pub async fn probe(&self, index: usize, port: u16) -> ProbeOutcome {
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            let check =
                tokio::time::timeout(self.policy.attempt_timeout, self.transport.health(port));
            match check.await {
                Ok(Ok(())) => {
                    info!(target: "fleet::probe", index, port, attempts = attempt, "Agent ready");
                    return ProbeOutcome::Ready { attempts: attempt };
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = TransportError::Timeout(self.policy.attempt_timeout).to_string();
                }
            }

            debug!(
                target: "fleet::probe",
                index,
                port,
                attempt,
                error = %last_error,
                "Health check failed"
            );

            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.interval).await;
            }
        }

        warn!(
            target: "fleet::probe",
            index,
            port,
            attempts = self.policy.max_attempts,
            error = %last_error,
            "Agent never became ready"
        );
        ProbeOutcome::Unreachable {
            attempts: self.policy.max_attempts,
            last_error,
        }
    }
}
