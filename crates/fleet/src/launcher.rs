//! Container launch stage

use crate::agent::{AgentHandle, AgentSpec, AgentState};
use crate::error::LaunchFailure;
use crate::spec::FleetSpec;
use sandbox::ContainerBackend;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Starts one detached container per agent
pub struct AgentLauncher {
    backend: Arc<dyn ContainerBackend>,
}

impl AgentLauncher {
    pub fn new(backend: Arc<dyn ContainerBackend>) -> Self {
        Self { backend }
    }

    /// Replace any stale container named after the agent's port, then start a fresh one.
    ///
    /// On success the handle is `LAUNCHED` and carries the container id.
    pub async fn launch(
        &self,
        fleet: &FleetSpec,
        agent: &AgentSpec,
    ) -> Result<AgentHandle, LaunchFailure> {
        let mut handle = AgentHandle::new(agent.index, agent.port);
        handle
            .transition(AgentState::Launching)
            .map_err(|e| failure(agent, e))?;

        // Leftovers from an earlier run would hold the name and the port.
        if let Err(e) = self.backend.remove(&agent.name).await {
            debug!(
                target: "fleet::launch",
                index = agent.index,
                name = %agent.name,
                error = %e,
                "No stale container removed"
            );
        }

        let config = agent.container_config(fleet);
        match self.backend.run_detached(&config).await {
            Ok(id) => {
                info!(
                    target: "fleet::launch",
                    index = agent.index,
                    port = agent.port,
                    container = id.short(),
                    "Agent container started"
                );
                handle.container_id = Some(id);
                handle
                    .transition(AgentState::Launched)
                    .map_err(|e| failure(agent, e))?;
                Ok(handle)
            }
            Err(e) => {
                warn!(
                    target: "fleet::launch",
                    index = agent.index,
                    port = agent.port,
                    error = %e,
                    "Agent container failed to start"
                );
                Err(failure(agent, e))
            }
        }
    }
}

fn failure(agent: &AgentSpec, cause: impl std::fmt::Display) -> LaunchFailure {
    LaunchFailure {
        index: agent.index,
        cause: cause.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_launch_failure_names_agent() {
        let launcher = AgentLauncher::new(Arc::new(sandbox::NoOpBackend));
        let spec = FleetSpec::builder("hi").count(2).build().unwrap();
        let agent = AgentSpec::render(&spec, 1);

        let failure = launcher.launch(&spec, &agent).await.unwrap_err();
        assert_eq!(failure.index, 1);
        assert!(failure.cause.contains("not available"), "{}", failure.cause);
    }
}
