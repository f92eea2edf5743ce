//! agent-fleet: start N agent containers and broadcast a prompt to all of them

use anyhow::{Context, Result};
use clap::Parser;
use fleet::spec::{
    AGENT_CONTAINER_PORT, DEFAULT_AGENT_COUNT, DEFAULT_IMAGE, DEFAULT_START_PORT,
    DEFAULT_USER_PREFIX, pull_request_note,
};
use fleet::{
    AgentTemplate, BuildSpec, FleetOrchestrator, FleetReport, FleetSpec, HttpTransport,
    ProbePolicy, PromptOptions, TeardownPolicy,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use telemetry::SecretString;
use tracing::{info, warn};

const DEFAULT_PROMPT: &str = "Say hello and include your agent name and id.";

/// Run multiple agent containers and broadcast a prompt
#[derive(Parser, Debug)]
#[command(name = "agent-fleet")]
#[command(about = "Run multiple agent containers and broadcast a prompt")]
struct Args {
    /// Prompt sent to every agent
    #[arg(default_value = DEFAULT_PROMPT)]
    prompt: String,

    /// Number of agents to start
    #[arg(short = 'n', long, default_value_t = DEFAULT_AGENT_COUNT)]
    count: usize,

    /// Host port of the first agent
    #[arg(long, default_value_t = DEFAULT_START_PORT)]
    start_port: u16,

    /// Docker image tag to run
    #[arg(long, default_value = DEFAULT_IMAGE)]
    image: String,

    /// Skip building the image
    #[arg(long)]
    no_build: bool,

    /// Dockerfile; its directory is the build context
    #[arg(long, default_value = "docker/agent/Dockerfile")]
    dockerfile: PathBuf,

    /// Host opencode config directory (default: ~/.config/opencode)
    #[arg(long)]
    config_host: Option<PathBuf>,

    /// Host opencode auth directory (default: ~/.local/share/opencode)
    #[arg(long)]
    auth_host: Option<PathBuf>,

    /// Token for the Gitea MCP server
    #[arg(long, env = "GITEA_MCP_TOKEN", hide_env_values = true)]
    gitea_token: Option<String>,

    /// Token for the Leantime MCP server
    #[arg(long, env = "LEANTIME_MCP_TOKEN", hide_env_values = true)]
    leantime_token: Option<String>,

    /// Leantime MCP endpoint
    #[arg(long, env = "LEANTIME_MCP_URL", default_value = "http://172.17.0.1:3101/mcp/call")]
    leantime_mcp_url: String,

    /// Gitea base URL, used in the pull request instruction
    #[arg(long, env = "GITEA_URL", default_value = "http://172.17.0.1:3000")]
    gitea_url: String,

    /// Prefix for generated Gitea usernames
    #[arg(long, env = "GITEA_USER_PREFIX", default_value = DEFAULT_USER_PREFIX)]
    gitea_user_prefix: String,

    /// Repository agents work on
    #[arg(
        long,
        env = "GITEA_REPO",
        default_value = "http://172.17.0.1:3000/wa/agentic_playground.git"
    )]
    gitea_repo: String,

    /// Gitea MCP endpoint
    #[arg(long, env = "GITEA_MCP_URL", default_value = "http://172.17.0.1:8082")]
    gitea_mcp_url: String,

    /// Model identifier passed to every agent
    #[arg(long, env = "OPENCODE_MODEL", default_value = "openai/gpt-5.1-codex-mini")]
    model: String,

    /// Do not clone the repository into agents before broadcasting
    #[arg(long)]
    skip_repo_init: bool,

    /// Rules appended to the prompt once, if the file exists
    #[arg(long, default_value = "AGENT_RULE.md")]
    rules_file: PathBuf,

    /// Do not tell agents their position in the fleet
    #[arg(long)]
    no_identity_note: bool,

    /// What to do with containers after the broadcast
    #[arg(long, value_enum, default_value_t = TeardownPolicy::Keep)]
    teardown: TeardownPolicy,

    /// Health checks per agent before giving up
    #[arg(long, default_value_t = 40)]
    health_attempts: u32,

    /// Pause between health checks in milliseconds
    #[arg(long, default_value_t = 500)]
    health_interval_ms: u64,

    /// Per-agent prompt timeout in seconds
    #[arg(long, default_value_t = 360)]
    request_timeout_secs: u64,

    /// Host the agents' ports are published on
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn home_dir(relative: &str) -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(relative))
        .unwrap_or_else(|| PathBuf::from(relative))
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Rules text, or `None` when the file is absent or blank
async fn read_rules(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(non_empty(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read rules file {}", path.display())),
    }
}

async fn build_spec(args: Args) -> Result<FleetSpec> {
    let config_host = args
        .config_host
        .as_deref()
        .map(expand_tilde)
        .unwrap_or_else(|| home_dir(".config/opencode"));
    let auth_host = args
        .auth_host
        .as_deref()
        .map(expand_tilde)
        .unwrap_or_else(|| home_dir(".local/share/opencode"));

    let openai_token = match fleet::auth::read_openai_token(&auth_host).await {
        Ok(token) => token,
        Err(e) => {
            warn!(
                path = %fleet::auth::auth_file(&auth_host).display(),
                error = %e,
                "Ignoring unreadable auth file"
            );
            None
        }
    };

    let rules = read_rules(&args.rules_file).await?;
    let repo_url = non_empty(args.gitea_repo);
    let footer = repo_url
        .as_deref()
        .and_then(|repo| pull_request_note(&args.gitea_url, repo));

    let template = AgentTemplate {
        user_prefix: args.gitea_user_prefix,
        repo_url,
        repo_token: args.gitea_token.and_then(SecretString::non_empty),
        repo_mcp_url: non_empty(args.gitea_mcp_url),
        tracker_token: args.leantime_token.and_then(SecretString::non_empty),
        tracker_mcp_url: non_empty(args.leantime_mcp_url),
        model: non_empty(args.model),
        openai_token,
        config_host: Some(config_host),
        auth_host: Some(auth_host),
    };

    let mut builder = FleetSpec::builder(args.prompt)
        .count(args.count)
        .start_port(args.start_port)
        .image(args.image)
        .template(template)
        .prompt_options(PromptOptions {
            identity_note: !args.no_identity_note,
            rules,
            footer,
        })
        .probe(ProbePolicy {
            max_attempts: args.health_attempts,
            interval: Duration::from_millis(args.health_interval_ms),
            ..ProbePolicy::default()
        })
        .request_timeout(Duration::from_secs(args.request_timeout_secs))
        .teardown(args.teardown)
        .bootstrap_repo(!args.skip_repo_init);

    builder = if args.no_build {
        builder.skip_build()
    } else {
        let context_dir = args
            .dockerfile
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        builder.build_from(BuildSpec {
            context_dir,
            dockerfile: Some(args.dockerfile),
        })
    };

    Ok(builder.build()?)
}

fn print_report(report: &FleetReport, json: bool) -> Result<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

/// Exits 0 when at least one agent responded and 1 otherwise.
///
/// Ctrl-C cuts the run short: the progress reached so far is printed as an
/// `interrupted` report and the process exits 130. Containers that already
/// started keep running.
#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    if let Err(e) = telemetry::init_default("agent_fleet") {
        eprintln!("failed to initialize logging: {e}");
    }

    let host = args.host.clone();
    let json = args.json;
    let spec = build_spec(args).await?;

    let backend = sandbox::detect_backend().await;
    let transport = HttpTransport::new(host, spec.request_timeout)?
        .with_health_timeout(spec.probe.attempt_timeout);

    info!(
        agents = spec.count,
        ports = %format!("{}-{}", spec.start_port, spec.port_for(spec.count - 1)),
        container_port = AGENT_CONTAINER_PORT,
        "Launching agent fleet"
    );

    let orchestrator = FleetOrchestrator::new(spec, backend, Arc::new(transport));
    let (report, code) = tokio::select! {
        report = orchestrator.run() => {
            let code = if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
            (report, code)
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; containers already started are left running");
            (orchestrator.snapshot(), ExitCode::from(130))
        }
    };

    print_report(&report, json)?;
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let args = Args::try_parse_from(["agent-fleet"]).unwrap();
        assert_eq!(args.prompt, DEFAULT_PROMPT);
        assert_eq!(args.count, 4);
        assert_eq!(args.start_port, 28000);
        assert_eq!(args.image, "codex-agent:latest");
        assert!(!args.no_build);
        assert_eq!(args.teardown, TeardownPolicy::Keep);
        assert_eq!(args.health_attempts, 40);
        assert_eq!(args.request_timeout_secs, 360);
    }

    #[test]
    fn test_cli_flags() {
        let args = Args::try_parse_from([
            "agent-fleet",
            "write tests",
            "-n",
            "2",
            "--start-port",
            "9000",
            "--no-build",
            "--teardown",
            "unhealthy",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.prompt, "write tests");
        assert_eq!(args.count, 2);
        assert_eq!(args.start_port, 9000);
        assert!(args.no_build);
        assert!(args.json);
        assert_eq!(args.teardown, TeardownPolicy::Unhealthy);
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde(Path::new("/abs/dir")), PathBuf::from("/abs/dir"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/x")), home.join("x"));
        }
    }

    #[tokio::test]
    async fn test_read_rules() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("AGENT_RULE.md");
        assert_eq!(read_rules(&path).await.unwrap(), None);

        std::fs::write(&path, "\n  keep commits small\n").unwrap();
        assert_eq!(
            read_rules(&path).await.unwrap(),
            Some("keep commits small".to_string())
        );
    }
}
