//! Per-agent configuration and lifecycle state

use crate::error::{FleetError, FleetResult};
use crate::identity::{RepoIdentity, TrackerIdentity};
use crate::spec::{AGENT_CONTAINER_PORT, FleetSpec};
use sandbox::{ContainerConfig, ContainerId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Where an agent is in the fleet pipeline.
///
/// `PENDING -> LAUNCHING -> LAUNCHED -> PROBING -> READY | UNREACHABLE`,
/// then `READY -> BROADCASTING -> RESPONDED | FAILED`. Any non-terminal state
/// may drop to `ERRORED`. There are no backward edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    Pending,
    Launching,
    Launched,
    Probing,
    Ready,
    Unreachable,
    Broadcasting,
    Responded,
    Failed,
    Errored,
}

impl AgentState {
    /// No further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentState::Unreachable
                | AgentState::Responded
                | AgentState::Failed
                | AgentState::Errored
        )
    }

    /// Whether `self -> next` is an edge of the lifecycle
    pub fn can_transition_to(self, next: AgentState) -> bool {
        use AgentState::*;
        match (self, next) {
            (from, Errored) => !from.is_terminal(),
            (Pending, Launching)
            | (Launching, Launched)
            | (Launched, Probing)
            | (Probing, Ready)
            | (Probing, Unreachable)
            | (Ready, Broadcasting)
            | (Broadcasting, Responded)
            | (Broadcasting, Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentState::Pending => "PENDING",
            AgentState::Launching => "LAUNCHING",
            AgentState::Launched => "LAUNCHED",
            AgentState::Probing => "PROBING",
            AgentState::Ready => "READY",
            AgentState::Unreachable => "UNREACHABLE",
            AgentState::Broadcasting => "BROADCASTING",
            AgentState::Responded => "RESPONDED",
            AgentState::Failed => "FAILED",
            AgentState::Errored => "ERRORED",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime handle for one fleet member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentHandle {
    pub index: usize,
    pub port: u16,
    /// Container name (`agent-<port>`)
    pub name: String,
    /// Assigned once the container starts
    pub container_id: Option<ContainerId>,
    state: AgentState,
}

impl AgentHandle {
    pub fn new(index: usize, port: u16) -> Self {
        Self {
            index,
            port,
            name: container_name(port),
            container_id: None,
            state: AgentState::Pending,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Advance the lifecycle; backward or skipping moves are rejected
    pub fn transition(&mut self, next: AgentState) -> FleetResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(FleetError::InvalidTransition {
                index: self.index,
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(
            target: "fleet::agent",
            index = self.index,
            from = %self.state,
            to = %next,
            "State transition"
        );
        self.state = next;
        Ok(())
    }

    /// Drop to `ERRORED` unless the agent already finished
    pub fn mark_errored(&mut self) {
        if !self.state.is_terminal() {
            self.state = AgentState::Errored;
        }
    }

    /// A container exists for this agent
    pub fn is_launched(&self) -> bool {
        self.container_id.is_some()
    }
}

/// Name of the container bound to `port`
pub fn container_name(port: u16) -> String {
    format!("agent-{port}")
}

/// Fleet template rendered for a single agent
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub index: usize,
    pub port: u16,
    pub name: String,
    pub repo_identity: RepoIdentity,
    pub tracker_identity: TrackerIdentity,
}

impl AgentSpec {
    /// Render the template for `index`, generating fresh passwords
    pub fn render(fleet: &FleetSpec, index: usize) -> Self {
        let port = fleet.port_for(index);
        let repo_identity =
            RepoIdentity::generate(&fleet.template.user_prefix, index, &fleet.run_suffix);
        let tracker_identity = TrackerIdentity::generate(&repo_identity.username);
        Self {
            index,
            port,
            name: container_name(port),
            repo_identity,
            tracker_identity,
        }
    }

    /// Environment injected into the agent's container
    pub fn env(&self, fleet: &FleetSpec) -> BTreeMap<String, String> {
        let template = &fleet.template;
        let mut env = BTreeMap::new();

        env.insert("AGENT_NAME".to_string(), self.name.clone());
        env.insert("AGENT_ID".to_string(), self.index.to_string());

        let repo_password = self.repo_identity.password.expose_secret();
        env.insert("GITEA_USERNAME".to_string(), self.repo_identity.username.clone());
        env.insert("GITEA_PASSWORD".to_string(), repo_password.to_string());
        env.insert("GITEA_REPO_SECRET".to_string(), repo_password.to_string());
        env.insert("LEANTIME_USERNAME".to_string(), self.tracker_identity.email.clone());
        env.insert(
            "LEANTIME_PASSWORD".to_string(),
            self.tracker_identity.password.expose_secret().to_string(),
        );

        let optional = [
            ("GITEA_MCP_TOKEN", template.repo_token.as_ref().map(|t| t.expose_secret())),
            ("LEANTIME_MCP_TOKEN", template.tracker_token.as_ref().map(|t| t.expose_secret())),
            ("GITEA_REPO", template.repo_url.as_deref()),
            ("LEANTIME_MCP_URL", template.tracker_mcp_url.as_deref()),
            ("OPENCODE_MODEL", template.model.as_deref()),
            ("OPENAI_API_KEY", template.openai_token.as_ref().map(|t| t.expose_secret())),
        ];
        for (key, value) in optional {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                env.insert(key.to_string(), value.to_string());
            }
        }

        if let Some(content) = mcp_config_content(fleet) {
            env.insert("OPENCODE_CONFIG_CONTENT".to_string(), content);
        }

        env
    }

    /// Container configuration for launching this agent
    pub fn container_config(&self, fleet: &FleetSpec) -> ContainerConfig {
        let mut config = ContainerConfig::new(&fleet.image)
            .name(&self.name)
            .publish(self.port, AGENT_CONTAINER_PORT);
        config.env = self.env(fleet);

        if let Some(dir) = &fleet.template.config_host {
            config = config.volume_mount(format!("{}:/root/.config/opencode", dir.display()));
        }
        if let Some(dir) = &fleet.template.auth_host {
            config = config.volume_mount(format!("{}:/root/.local/share/opencode", dir.display()));
        }
        config
    }
}

/// opencode MCP client config pointing at the git host and tracker servers
fn mcp_config_content(fleet: &FleetSpec) -> Option<String> {
    let template = &fleet.template;
    let mut servers = serde_json::Map::new();

    if let Some(url) = &template.repo_mcp_url {
        servers.insert(
            "gitea_mcp".to_string(),
            serde_json::json!({
                "type": "remote",
                "url": url,
                "enabled": true,
                "headers": {},
            }),
        );
    }

    if let Some(url) = &template.tracker_mcp_url {
        let mut headers = serde_json::Map::new();
        if let Some(token) = &template.tracker_token {
            headers.insert(
                "Authorization".to_string(),
                serde_json::Value::String(format!("Bearer {}", token.expose_secret())),
            );
        }
        servers.insert(
            "leantime_mcp".to_string(),
            serde_json::json!({
                "type": "remote",
                "url": url,
                "enabled": true,
                "headers": headers,
            }),
        );
    }

    if servers.is_empty() {
        return None;
    }

    let config = serde_json::json!({
        "$schema": "https://opencode.ai/config.json",
        "mcp": servers,
    });
    Some(config.to_string())
}
