//! Fleet-wide configuration
//!
//! A [`FleetSpec`] is assembled once per invocation through
//! [`FleetSpecBuilder`] and shared read-only by every stage.

use crate::error::{FleetError, FleetResult};
use clap::ValueEnum;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use telemetry::SecretString;

/// First host port used when none is given
pub const DEFAULT_START_PORT: u16 = 28000;
/// Port the agent service listens on inside its container
pub const AGENT_CONTAINER_PORT: u16 = 8000;
/// Default agent image tag
pub const DEFAULT_IMAGE: &str = "codex-agent:latest";
/// Default number of agents
pub const DEFAULT_AGENT_COUNT: usize = 4;
/// Default per-agent broadcast timeout; agents run tasks for up to 300s
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(360);
/// Default username prefix for per-agent repository identities
pub const DEFAULT_USER_PREFIX: &str = "agent-fun";

/// How long to wait for an agent's health endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePolicy {
    /// Health checks before giving up
    pub max_attempts: u32,
    /// Pause between failed checks
    pub interval: Duration,
    /// Timeout for a single health request
    pub attempt_timeout: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 40,
            interval: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(3),
        }
    }
}

impl ProbePolicy {
    /// Upper bound on time spent probing one agent
    pub fn deadline(&self) -> Duration {
        (self.interval + self.attempt_timeout) * self.max_attempts
    }
}

/// What to do with containers once the run is over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TeardownPolicy {
    /// Leave every container running
    #[default]
    Keep,
    /// Remove containers of agents that did not respond
    Unhealthy,
    /// Remove every launched container
    All,
}

/// Where and how to build the agent image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    pub context_dir: PathBuf,
    pub dockerfile: Option<PathBuf>,
}

impl Default for BuildSpec {
    fn default() -> Self {
        Self {
            context_dir: PathBuf::from("docker/agent"),
            dockerfile: Some(PathBuf::from("docker/agent/Dockerfile")),
        }
    }
}

/// Extra text appended to the prompt for each agent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptOptions {
    /// Append "You are agent i of n."
    pub identity_note: bool,
    /// One-time rules appended after the identity note
    pub rules: Option<String>,
    /// Closing instruction, e.g. how to open a pull request
    pub footer: Option<String>,
}

impl PromptOptions {
    /// Prompt for the agent at `position` (1-based) out of `total` participants
    pub fn compose(&self, prompt: &str, position: usize, total: usize) -> String {
        let mut text = prompt.to_string();
        if self.identity_note {
            text.push_str(&format!("\nYou are agent {position} of {total}."));
        }
        if let Some(rules) = self.rules.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            text.push_str("\nRULES (one-time):\n");
            text.push_str(rules);
        }
        if let Some(footer) = self.footer.as_deref().filter(|f| !f.trim().is_empty()) {
            text.push('\n');
            text.push_str(footer.trim());
        }
        text
    }
}

/// Instruction for opening a pull request through the git host's REST API.
///
/// Credentials are referenced through the agent's environment, never inlined.
/// Returns `None` when `repo_url` has no `<owner>/<repo>` path.
pub fn pull_request_note(host_url: &str, repo_url: &str) -> Option<String> {
    let url = url::Url::parse(repo_url).ok()?;
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    let host = host_url.trim_end_matches('/');

    Some(format!(
        "After pushing, if gh is unavailable, create a PR via the Gitea API: \
         curl -u \"$GITEA_USERNAME:$GITEA_PASSWORD\" -H 'Content-Type: application/json' \
         -d '{{\"title\":\"<title>\",\"head\":\"<branch>\",\"base\":\"main\",\"body\":\"<body>\"}}' \
         {host}/api/v1/repos/{owner}/{repo}/pulls"
    ))
}

/// Values rendered into every agent's launch configuration.
///
/// Tokens are opaque and only passed through.
#[derive(Debug, Clone, Default)]
pub struct AgentTemplate {
    /// Prefix for generated repository usernames (`<prefix><n>-<suffix>`)
    pub user_prefix: String,
    /// Repository agents clone and push to
    pub repo_url: Option<String>,
    /// Token for the git host MCP server
    pub repo_token: Option<SecretString>,
    /// Git host MCP endpoint
    pub repo_mcp_url: Option<String>,
    /// Token for the task tracker MCP server
    pub tracker_token: Option<SecretString>,
    /// Task tracker MCP endpoint
    pub tracker_mcp_url: Option<String>,
    /// Model identifier (`provider/model`)
    pub model: Option<String>,
    /// OpenAI access token
    pub openai_token: Option<SecretString>,
    /// Host directory mounted as the agent's opencode config
    pub config_host: Option<PathBuf>,
    /// Host directory mounted as the agent's opencode auth store
    pub auth_host: Option<PathBuf>,
}

/// Immutable configuration for one fleet run
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct FleetSpec {
    /// Number of agents
    pub count: usize,
    /// Host port of agent 0
    pub start_port: u16,
    /// Image every agent runs
    pub image: String,
    /// `None` skips the build stage
    pub build: Option<BuildSpec>,
    /// Prompt broadcast to every ready agent
    pub prompt: String,
    pub prompt_options: PromptOptions,
    pub template: AgentTemplate,
    pub probe: ProbePolicy,
    /// Per-agent broadcast timeout
    pub request_timeout: Duration,
    pub teardown: TeardownPolicy,
    /// Clone the repository into each ready agent before broadcasting
    pub bootstrap_repo: bool,
    /// Suffix that keeps generated usernames unique across runs
    pub run_suffix: String,
}

impl FleetSpec {
    /// Start building a spec for the given prompt
    pub fn builder(prompt: impl Into<String>) -> FleetSpecBuilder {
        FleetSpecBuilder::new(prompt)
    }

    /// Host port of the agent at `index`
    pub fn port_for(&self, index: usize) -> u16 {
        // Builder guarantees start_port + count - 1 fits in u16.
        self.start_port + index as u16
    }

    /// Every assigned host port, in index order
    pub fn ports(&self) -> Vec<u16> {
        (0..self.count).map(|index| self.port_for(index)).collect()
    }

    /// Whether the image build stage runs
    pub fn builds_image(&self) -> bool {
        self.build.is_some()
    }
}

/// Builder for [`FleetSpec`]
#[derive(Debug, Clone)]
pub struct FleetSpecBuilder {
    count: usize,
    start_port: u16,
    image: String,
    build: Option<BuildSpec>,
    prompt: String,
    prompt_options: PromptOptions,
    template: AgentTemplate,
    probe: ProbePolicy,
    request_timeout: Duration,
    teardown: TeardownPolicy,
    bootstrap_repo: bool,
    run_suffix: Option<String>,
}

impl FleetSpecBuilder {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            count: DEFAULT_AGENT_COUNT,
            start_port: DEFAULT_START_PORT,
            image: DEFAULT_IMAGE.to_string(),
            build: Some(BuildSpec::default()),
            prompt: prompt.into(),
            prompt_options: PromptOptions::default(),
            template: AgentTemplate {
                user_prefix: DEFAULT_USER_PREFIX.to_string(),
                ..AgentTemplate::default()
            },
            probe: ProbePolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            teardown: TeardownPolicy::default(),
            bootstrap_repo: false,
            run_suffix: None,
        }
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn start_port(mut self, port: u16) -> Self {
        self.start_port = port;
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Build the image from this context before launching
    pub fn build_from(mut self, build: BuildSpec) -> Self {
        self.build = Some(build);
        self
    }

    /// Assume the image already exists
    pub fn skip_build(mut self) -> Self {
        self.build = None;
        self
    }

    pub fn prompt_options(mut self, options: PromptOptions) -> Self {
        self.prompt_options = options;
        self
    }

    pub fn template(mut self, template: AgentTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn probe(mut self, probe: ProbePolicy) -> Self {
        self.probe = probe;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn teardown(mut self, teardown: TeardownPolicy) -> Self {
        self.teardown = teardown;
        self
    }

    pub fn bootstrap_repo(mut self, enabled: bool) -> Self {
        self.bootstrap_repo = enabled;
        self
    }

    pub fn run_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.run_suffix = Some(suffix.into());
        self
    }

    /// Validate and freeze the configuration
    pub fn build(self) -> FleetResult<FleetSpec> {
        if self.count == 0 {
            return Err(FleetError::invalid_config("agent count must be at least 1"));
        }
        let last_port = self.start_port as usize + self.count - 1;
        if last_port > u16::MAX as usize {
            return Err(FleetError::invalid_config(format!(
                "{} agents starting at port {} would exceed port 65535",
                self.count, self.start_port
            )));
        }
        if self.start_port == 0 {
            return Err(FleetError::invalid_config("start port must be non-zero"));
        }
        if self.image.trim().is_empty() {
            return Err(FleetError::invalid_config("image reference is empty"));
        }
        if self.prompt.trim().is_empty() {
            return Err(FleetError::invalid_config("prompt is empty"));
        }
        if self.probe.max_attempts == 0 {
            return Err(FleetError::invalid_config(
                "health checks need at least one attempt",
            ));
        }

        let run_suffix = self
            .run_suffix
            .unwrap_or_else(|| chrono::Utc::now().timestamp().to_string());

        Ok(FleetSpec {
            count: self.count,
            start_port: self.start_port,
            image: self.image,
            build: self.build,
            prompt: self.prompt,
            prompt_options: self.prompt_options,
            template: self.template,
            probe: self.probe,
            request_timeout: self.request_timeout,
            teardown: self.teardown,
            bootstrap_repo: self.bootstrap_repo,
            run_suffix,
        })
    }
}
