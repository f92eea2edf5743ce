//! Staged fleet pipeline
//!
//! `build -> launch -> probe -> bootstrap -> broadcast -> teardown`. Each stage
//! fans out one future per participating agent and joins them all before the
//! next stage starts. Per-agent results land in index-keyed slots, so the
//! report always has one entry per agent in index order.
//!
//! Per-agent progress is published at every stage boundary so an interrupted
//! run can still report how far each agent got.

use crate::agent::{AgentHandle, AgentSpec, AgentState};
use crate::bootstrap::RepoBootstrapper;
use crate::broadcast::{BroadcastCoordinator, BroadcastTarget, SendOutcome};
use crate::builder::ImageBuilder;
use crate::launcher::AgentLauncher;
use crate::probe::{ProbeOutcome, ReadinessProber};
use crate::report::{
    AgentReport, BootstrapOutcome, BroadcastOutcome, FleetOutcome, FleetReport, LaunchOutcome,
    ReadinessOutcome,
};
use crate::spec::{FleetSpec, TeardownPolicy};
use crate::transport::AgentTransport;
use futures::future::join_all;
use sandbox::ContainerBackend;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

/// Drives one fleet run end to end
pub struct FleetOrchestrator {
    spec: FleetSpec,
    agents: Vec<AgentSpec>,
    backend: Arc<dyn ContainerBackend>,
    transport: Arc<dyn AgentTransport>,
    progress: Mutex<Vec<AgentReport>>,
}

/// Mutable per-run bookkeeping, one slot per agent
struct RunState {
    handles: Vec<AgentHandle>,
    reports: Vec<AgentReport>,
}

impl RunState {
    fn advance(&mut self, index: usize, next: AgentState) {
        if let Err(e) = self.handles[index].transition(next) {
            error!(target: "fleet::orchestrator", index, error = %e, "Lifecycle violation");
            self.handles[index].mark_errored();
        }
    }

    fn errored(&mut self, index: usize) {
        self.handles[index].mark_errored();
    }

    /// Reports with the current lifecycle state filled in
    fn snapshot(&self) -> Vec<AgentReport> {
        self.reports
            .iter()
            .zip(&self.handles)
            .map(|(report, handle)| AgentReport {
                state: handle.state(),
                ..report.clone()
            })
            .collect()
    }

    fn finish(mut self, outcome: FleetOutcome) -> FleetReport {
        for (report, handle) in self.reports.iter_mut().zip(&self.handles) {
            report.state = handle.state();
        }
        FleetReport {
            outcome,
            agents: self.reports,
        }
    }
}

impl FleetOrchestrator {
    /// Render every agent from `spec`. Identities are generated here, once per run.
    pub fn new(
        spec: FleetSpec,
        backend: Arc<dyn ContainerBackend>,
        transport: Arc<dyn AgentTransport>,
    ) -> Self {
        let agents: Vec<AgentSpec> = (0..spec.count)
            .map(|index| AgentSpec::render(&spec, index))
            .collect();
        let progress = agents
            .iter()
            .map(|a| AgentReport::pending(a.index, a.port, &a.name))
            .collect();
        Self {
            spec,
            agents,
            backend,
            transport,
            progress: Mutex::new(progress),
        }
    }

    pub fn spec(&self) -> &FleetSpec {
        &self.spec
    }

    pub fn agents(&self) -> &[AgentSpec] {
        &self.agents
    }

    /// Report of the progress published so far, for a run that was cut short.
    ///
    /// Agents keep the outcome of the last stage boundary they crossed.
    pub fn snapshot(&self) -> FleetReport {
        let agents = self
            .progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        FleetReport {
            outcome: FleetOutcome::Interrupted,
            agents,
        }
    }

    fn publish(&self, state: &RunState) {
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = state.snapshot();
    }

    /// Run every stage and report on every agent
    pub async fn run(&self) -> FleetReport {
        let mut state = RunState {
            handles: self
                .agents
                .iter()
                .map(|a| AgentHandle::new(a.index, a.port))
                .collect(),
            reports: self
                .agents
                .iter()
                .map(|a| AgentReport::pending(a.index, a.port, &a.name))
                .collect(),
        };

        info!(
            target: "fleet::orchestrator",
            agents = self.spec.count,
            start_port = self.spec.start_port,
            image = %self.spec.image,
            "Starting fleet"
        );

        if let Err(failure) = ImageBuilder::new(self.backend.clone()).build(&self.spec).await {
            return state.finish(FleetOutcome::BuildFailed {
                output: failure.output,
            });
        }

        let launched = self.launch_all(&mut state).await;
        self.publish(&state);
        if launched.is_empty() {
            error!(target: "fleet::orchestrator", "No agents launched");
            return state.finish(FleetOutcome::NoAgentsLaunched);
        }

        let mut ready = self.probe_all(&mut state, &launched).await;
        self.publish(&state);

        if self.spec.bootstrap_repo && !ready.is_empty() {
            if let Some(repo_url) = self.spec.template.repo_url.as_deref() {
                ready = self.bootstrap_all(&mut state, repo_url, &ready).await;
                self.publish(&state);
            }
        }

        let outcome = if ready.is_empty() {
            warn!(target: "fleet::orchestrator", "No agents ready; skipping broadcast");
            FleetOutcome::NoAgentsReady
        } else {
            self.broadcast_all(&mut state, &ready).await;
            self.publish(&state);
            FleetOutcome::Completed
        };

        self.teardown(&state.reports).await;

        let report = state.finish(outcome);
        info!(
            target: "fleet::orchestrator",
            responded = report.responded_count(),
            agents = report.agents.len(),
            "Fleet run finished"
        );
        report
    }

    /// Launch every agent concurrently; returns indices that launched
    async fn launch_all(&self, state: &mut RunState) -> Vec<usize> {
        let launcher = AgentLauncher::new(self.backend.clone());
        let results = join_all(
            self.agents
                .iter()
                .map(|agent| launcher.launch(&self.spec, agent)),
        )
        .await;

        let mut launched = Vec::new();
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(handle) => {
                    if let Some(id) = &handle.container_id {
                        state.reports[index].launch = LaunchOutcome::Launched {
                            container_id: id.clone(),
                        };
                    }
                    state.handles[index] = handle;
                    launched.push(index);
                }
                Err(failure) => {
                    state.errored(index);
                    state.reports[index].launch = LaunchOutcome::Failed {
                        error: failure.cause,
                    };
                }
            }
        }
        launched
    }

    /// Probe launched agents concurrently; returns indices that became ready
    async fn probe_all(&self, state: &mut RunState, launched: &[usize]) -> Vec<usize> {
        let prober = ReadinessProber::new(self.transport.clone(), self.spec.probe.clone());
        for &index in launched {
            state.advance(index, AgentState::Probing);
        }
        self.publish(state);

        let outcomes = join_all(
            launched
                .iter()
                .map(|&index| prober.probe(index, self.agents[index].port)),
        )
        .await;

        let mut ready = Vec::new();
        for (&index, outcome) in launched.iter().zip(outcomes) {
            match outcome {
                ProbeOutcome::Ready { attempts } => {
                    state.advance(index, AgentState::Ready);
                    state.reports[index].readiness = ReadinessOutcome::Ready { attempts };
                    ready.push(index);
                }
                ProbeOutcome::Unreachable {
                    attempts,
                    last_error,
                } => {
                    state.advance(index, AgentState::Unreachable);
                    state.reports[index].readiness = ReadinessOutcome::Unreachable {
                        attempts,
                        last_error,
                    };
                }
            }
        }
        ready
    }

    /// Prepare the repository in ready agents; returns indices that succeeded
    async fn bootstrap_all(
        &self,
        state: &mut RunState,
        repo_url: &str,
        ready: &[usize],
    ) -> Vec<usize> {
        let bootstrapper = RepoBootstrapper::new(self.backend.clone(), repo_url);
        let results = join_all(
            ready
                .iter()
                .map(|&index| bootstrapper.bootstrap(&self.agents[index])),
        )
        .await;

        let mut bootstrapped = Vec::new();
        for (&index, result) in ready.iter().zip(results) {
            match result {
                Ok(()) => {
                    state.reports[index].bootstrap = BootstrapOutcome::Completed;
                    bootstrapped.push(index);
                }
                Err(error) => {
                    state.errored(index);
                    state.reports[index].bootstrap = BootstrapOutcome::Failed { error };
                }
            }
        }
        bootstrapped
    }

    async fn broadcast_all(&self, state: &mut RunState, ready: &[usize]) {
        let targets: Vec<BroadcastTarget> = ready
            .iter()
            .map(|&index| BroadcastTarget {
                index,
                port: self.agents[index].port,
            })
            .collect();
        for &index in ready {
            state.advance(index, AgentState::Broadcasting);
        }
        self.publish(state);

        let coordinator = BroadcastCoordinator::new(
            self.transport.clone(),
            self.spec.request_timeout,
            self.spec.prompt_options.clone(),
        );
        for result in coordinator.broadcast(&self.spec.prompt, &targets).await {
            let index = result.index;
            match result.outcome {
                SendOutcome::Success(response) => {
                    state.advance(index, AgentState::Responded);
                    state.reports[index].broadcast = BroadcastOutcome::Responded {
                        http_status: response.status,
                        response: response.body,
                    };
                }
                SendOutcome::Failure(error) => {
                    state.advance(index, AgentState::Failed);
                    state.reports[index].broadcast = BroadcastOutcome::Failed { error };
                }
            }
        }
    }

    /// Remove containers selected by the teardown policy. Failures are only logged.
    async fn teardown(&self, reports: &[AgentReport]) {
        let names = teardown_targets(self.spec.teardown, reports);
        if names.is_empty() {
            return;
        }

        info!(
            target: "fleet::teardown",
            policy = ?self.spec.teardown,
            containers = names.len(),
            "Removing containers"
        );
        let removals = names.iter().map(|name| async move {
            if let Err(e) = self.backend.remove(name).await {
                warn!(
                    target: "fleet::teardown",
                    name = %name,
                    error = %e,
                    "Failed to remove container"
                );
            }
        });
        join_all(removals).await;
    }
}

/// Names of containers `policy` removes, in index order
pub fn teardown_targets(policy: TeardownPolicy, reports: &[AgentReport]) -> Vec<String> {
    reports
        .iter()
        .filter(|r| r.container_id().is_some())
        .filter(|r| match policy {
            TeardownPolicy::Keep => false,
            TeardownPolicy::Unhealthy => !r.responded(),
            TeardownPolicy::All => true,
        })
        .map(|r| r.name.clone())
        .collect()
}
