//! Fleet run report

use crate::agent::AgentState;
use crate::error::FleetResult;
use sandbox::ContainerId;
use serde::Serialize;
use std::fmt::Write as _;

/// Responses longer than this are cut in the text report
pub const RESPONSE_PREVIEW_CHARS: usize = 800;

/// Fleet-wide result of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FleetOutcome {
    /// Every stage ran; individual agents may still have failed
    Completed,
    /// The image build failed and nothing was launched
    BuildFailed { output: String },
    /// Every launch failed
    NoAgentsLaunched,
    /// No agent passed its readiness check
    NoAgentsReady,
    /// The run was cut short; agents show the last stage they finished
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LaunchOutcome {
    NotAttempted,
    Launched { container_id: ContainerId },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReadinessOutcome {
    NotProbed,
    Ready { attempts: u32 },
    Unreachable { attempts: u32, last_error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BootstrapOutcome {
    Skipped,
    Completed,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BroadcastOutcome {
    /// Agent did not take part in the broadcast
    NotSent,
    Responded {
        http_status: u16,
        response: serde_json::Value,
    },
    Failed { error: String },
}

/// Everything that happened to one agent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentReport {
    pub index: usize,
    pub port: u16,
    pub name: String,
    pub state: AgentState,
    pub launch: LaunchOutcome,
    pub readiness: ReadinessOutcome,
    pub bootstrap: BootstrapOutcome,
    pub broadcast: BroadcastOutcome,
}

impl AgentReport {
    /// Report for an agent no stage has touched yet
    pub fn pending(index: usize, port: u16, name: impl Into<String>) -> Self {
        Self {
            index,
            port,
            name: name.into(),
            state: AgentState::Pending,
            launch: LaunchOutcome::NotAttempted,
            readiness: ReadinessOutcome::NotProbed,
            bootstrap: BootstrapOutcome::Skipped,
            broadcast: BroadcastOutcome::NotSent,
        }
    }

    pub fn container_id(&self) -> Option<&ContainerId> {
        match &self.launch {
            LaunchOutcome::Launched { container_id } => Some(container_id),
            _ => None,
        }
    }

    pub fn responded(&self) -> bool {
        matches!(self.broadcast, BroadcastOutcome::Responded { .. })
    }

    /// One-line summary of where the agent ended up
    fn summary(&self) -> String {
        match (&self.launch, &self.readiness, &self.bootstrap, &self.broadcast) {
            (LaunchOutcome::NotAttempted, ..) => "launch not attempted".to_string(),
            (LaunchOutcome::Failed { error }, ..) => format!("ERROR at launch - {error}"),
            (_, ReadinessOutcome::Unreachable { attempts, last_error }, ..) => {
                format!("UNREACHABLE after {attempts} health checks - {last_error}")
            }
            (_, _, BootstrapOutcome::Failed { error }, _) => {
                format!("ERROR at bootstrap - {error}")
            }
            (.., BroadcastOutcome::Responded { http_status, .. }) => {
                format!("status {http_status}")
            }
            (.., BroadcastOutcome::Failed { error }) => format!("ERROR - {error}"),
            (.., BroadcastOutcome::NotSent) => "not reached".to_string(),
        }
    }
}

/// Report of a whole run: always one entry per agent, in index order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetReport {
    pub outcome: FleetOutcome,
    pub agents: Vec<AgentReport>,
}

impl FleetReport {
    pub fn responded_count(&self) -> usize {
        self.agents.iter().filter(|a| a.responded()).count()
    }

    /// At least one agent responded
    pub fn is_success(&self) -> bool {
        self.responded_count() > 0
    }

    pub fn to_json(&self) -> FleetResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable report
    pub fn render_text(&self) -> String {
        let mut out = String::new();

        match &self.outcome {
            FleetOutcome::Completed => {}
            FleetOutcome::BuildFailed { output } => {
                let _ = writeln!(out, "Image build failed:\n{}", output.trim_end());
            }
            FleetOutcome::NoAgentsLaunched => {
                let _ = writeln!(out, "No agents could be launched.");
            }
            FleetOutcome::NoAgentsReady => {
                let _ = writeln!(out, "No agents became healthy; prompt not sent.");
            }
            FleetOutcome::Interrupted => {
                let _ = writeln!(
                    out,
                    "Interrupted; containers already started are left running."
                );
            }
        }

        let _ = writeln!(
            out,
            "Responses ({}/{} responded):",
            self.responded_count(),
            self.agents.len()
        );
        for agent in &self.agents {
            let _ = writeln!(
                out,
                "- agent {} ({}): {} [{}]",
                agent.index,
                agent.port,
                agent.summary(),
                agent.state
            );
            if let BroadcastOutcome::Responded { response, .. } = &agent.broadcast {
                let _ = writeln!(out, "    {}", preview(response));
            }
        }
        out
    }
}

fn preview(response: &serde_json::Value) -> String {
    let text = response.to_string();
    match text.char_indices().nth(RESPONSE_PREVIEW_CHARS) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text,
    }
}
