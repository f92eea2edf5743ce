//! Fleet orchestration for containerized coding agents
//!
//! Launches N identical agent containers on consecutive host ports, waits for
//! each to report healthy, broadcasts one prompt to every ready agent at once,
//! and collects a per-agent report.
//!
//! ```text
//! ImageBuilder -> AgentLauncher -> ReadinessProber -> RepoBootstrapper
//!              -> BroadcastCoordinator -> teardown -> FleetReport
//! ```
//!
//! The container runtime sits behind [`sandbox::ContainerBackend`] and the
//! agents' HTTP service behind [`AgentTransport`], so every stage can run
//! against stubs.

pub mod agent;
pub mod auth;
pub mod bootstrap;
pub mod broadcast;
pub mod builder;
pub mod error;
pub mod identity;
pub mod launcher;
pub mod orchestrator;
pub mod probe;
pub mod report;
pub mod spec;
pub mod transport;

pub use agent::{AgentHandle, AgentSpec, AgentState};
pub use bootstrap::RepoBootstrapper;
pub use broadcast::{BroadcastCoordinator, BroadcastResult, BroadcastTarget, SendOutcome};
pub use builder::ImageBuilder;
pub use error::{BuildFailure, FleetError, FleetResult, LaunchFailure, TransportError};
pub use identity::{RepoIdentity, TrackerIdentity};
pub use launcher::AgentLauncher;
pub use orchestrator::{FleetOrchestrator, teardown_targets};
pub use probe::{ProbeOutcome, ReadinessProber};
pub use report::{
    AgentReport, BootstrapOutcome, BroadcastOutcome, FleetOutcome, FleetReport, LaunchOutcome,
    ReadinessOutcome,
};
pub use spec::{
    AgentTemplate, BuildSpec, FleetSpec, FleetSpecBuilder, ProbePolicy, PromptOptions,
    TeardownPolicy,
};
pub use transport::{AgentResponse, AgentTransport, HttpTransport, PromptRequest};
