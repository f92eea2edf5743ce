//! End-to-end fleet runs against in-memory container and agent stubs

use async_trait::async_trait;
use fleet::{
    AgentResponse, AgentState, AgentTemplate, AgentTransport, BootstrapOutcome,
    BroadcastOutcome, FleetOrchestrator, FleetOutcome, FleetSpec, FleetSpecBuilder,
    LaunchOutcome, ProbePolicy, PromptRequest, ReadinessOutcome, TeardownPolicy,
    TransportError,
};
use pretty_assertions::assert_eq;
use sandbox::{
    BuildOptions, ContainerBackend, ContainerConfig, ContainerError, ContainerId,
    ContainerResult, ExecResult,
};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Container runtime that keeps containers in memory
#[derive(Default)]
struct StubBackend {
    fail_build: bool,
    fail_launch_ports: HashSet<u16>,
    fail_exec_names: HashSet<String>,
    launch_delay: Duration,
    builds: Mutex<u32>,
    launches: Mutex<Vec<ContainerConfig>>,
    running: Mutex<BTreeSet<String>>,
    execs: Mutex<Vec<(String, Vec<String>)>>,
}

impl StubBackend {
    fn running(&self) -> Vec<String> {
        self.running.lock().unwrap().iter().cloned().collect()
    }

    fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }
}

#[async_trait]
impl ContainerBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn build(
        &self,
        _context_dir: &Path,
        tag: &str,
        _options: Option<BuildOptions>,
    ) -> ContainerResult<()> {
        *self.builds.lock().unwrap() += 1;
        if self.fail_build {
            return Err(ContainerError::build_failed(tag, "COPY failed: no such file"));
        }
        Ok(())
    }

    async fn run_detached(&self, config: &ContainerConfig) -> ContainerResult<ContainerId> {
        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }
        self.launches.lock().unwrap().push(config.clone());
        let name = config.name.clone().unwrap_or_default();
        let port = config.ports[0].host;
        if self.fail_launch_ports.contains(&port) {
            return Err(ContainerError::start_failed(&name, "port is already allocated"));
        }
        self.running.lock().unwrap().insert(name.clone());
        Ok(ContainerId::new(format!("id-{name}")))
    }

    async fn exec(&self, container: &str, command: &[String]) -> ContainerResult<ExecResult> {
        self.execs
            .lock()
            .unwrap()
            .push((container.to_string(), command.to_vec()));
        let exit_code = if self.fail_exec_names.contains(container) {
            128
        } else {
            0
        };
        Ok(ExecResult {
            exit_code,
            stdout: String::new(),
            stderr: if exit_code == 0 {
                String::new()
            } else {
                "fatal: repository not found".to_string()
            },
        })
    }

    async fn remove(&self, container: &str) -> ContainerResult<()> {
        if self.running.lock().unwrap().remove(container) {
            Ok(())
        } else {
            Err(ContainerError::command_failed(
                format!("rm -f {container}"),
                "No such container",
            ))
        }
    }
}

/// Agents that echo the prompt back
#[derive(Default)]
struct EchoTransport {
    unhealthy_ports: HashSet<u16>,
    erroring_ports: HashSet<u16>,
    health_delay: Duration,
    submit_delay: Duration,
    submitted: Mutex<Vec<u16>>,
}

#[async_trait]
impl AgentTransport for EchoTransport {
    async fn health(&self, port: u16) -> Result<(), TransportError> {
        if !self.health_delay.is_zero() {
            tokio::time::sleep(self.health_delay).await;
        }
        if self.unhealthy_ports.contains(&port) {
            Err(TransportError::malformed("connection refused"))
        } else {
            Ok(())
        }
    }

    async fn submit(
        &self,
        port: u16,
        request: &PromptRequest,
    ) -> Result<AgentResponse, TransportError> {
        self.submitted.lock().unwrap().push(port);
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        if self.erroring_ports.contains(&port) {
            return Err(TransportError::status(500, "internal error"));
        }
        Ok(AgentResponse {
            status: 200,
            body: serde_json::Value::String(request.prompt.clone()),
        })
    }
}

fn spec(count: usize) -> FleetSpecBuilder {
    FleetSpec::builder("hello")
        .count(count)
        .start_port(9000)
        .skip_build()
        .run_suffix("1")
        .probe(ProbePolicy {
            max_attempts: 3,
            interval: Duration::from_millis(10),
            attempt_timeout: Duration::from_millis(100),
        })
        .request_timeout(Duration::from_secs(5))
}

async fn run(
    spec: FleetSpec,
    backend: Arc<StubBackend>,
    transport: Arc<EchoTransport>,
) -> fleet::FleetReport {
    telemetry::init_test();
    FleetOrchestrator::new(spec, backend, transport).run().await
}

#[tokio::test]
async fn test_echo_fleet_all_respond() {
    let backend = Arc::new(StubBackend::default());
    let transport = Arc::new(EchoTransport::default());

    let report = run(spec(3).build().unwrap(), backend.clone(), transport).await;

    assert_eq!(report.outcome, FleetOutcome::Completed);
    assert_eq!(
        report.agents.iter().map(|a| a.port).collect::<Vec<_>>(),
        vec![9000, 9001, 9002]
    );
    for agent in &report.agents {
        assert_eq!(agent.state, AgentState::Responded);
        assert_eq!(
            agent.broadcast,
            BroadcastOutcome::Responded {
                http_status: 200,
                response: serde_json::Value::String("hello".to_string()),
            }
        );
    }
    assert_eq!(report.responded_count(), 3);
    assert_eq!(*backend.builds.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_launch_failure_is_isolated() {
    let backend = Arc::new(StubBackend {
        fail_launch_ports: HashSet::from([9002]),
        ..StubBackend::default()
    });
    let transport = Arc::new(EchoTransport::default());

    let report = run(spec(4).build().unwrap(), backend.clone(), transport.clone()).await;

    assert_eq!(report.outcome, FleetOutcome::Completed);
    assert_eq!(report.agents.len(), 4);
    assert_eq!(
        report.agents.iter().map(|a| a.index).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );

    let failed = &report.agents[2];
    assert_eq!(failed.state, AgentState::Errored);
    assert!(matches!(
        &failed.launch,
        LaunchOutcome::Failed { error } if error.contains("already allocated")
    ));
    assert_eq!(failed.readiness, ReadinessOutcome::NotProbed);
    assert_eq!(failed.broadcast, BroadcastOutcome::NotSent);

    assert_eq!(report.responded_count(), 3);
    let mut submitted = transport.submitted.lock().unwrap().clone();
    submitted.sort();
    assert_eq!(submitted, vec![9000, 9001, 9003]);
}

#[tokio::test]
async fn test_build_failure_stops_before_launch() {
    let backend = Arc::new(StubBackend {
        fail_build: true,
        ..StubBackend::default()
    });
    let transport = Arc::new(EchoTransport::default());
    let spec = spec(2)
        .build_from(fleet::BuildSpec::default())
        .build()
        .unwrap();

    let report = run(spec, backend.clone(), transport).await;

    match &report.outcome {
        FleetOutcome::BuildFailed { output } => assert!(output.contains("COPY failed")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(*backend.builds.lock().unwrap(), 1);
    assert_eq!(backend.launch_count(), 0);
    assert_eq!(report.agents.len(), 2);
    for agent in &report.agents {
        assert_eq!(agent.state, AgentState::Pending);
        assert_eq!(agent.launch, LaunchOutcome::NotAttempted);
    }
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_build_runs_once_before_launch() {
    let backend = Arc::new(StubBackend::default());
    let transport = Arc::new(EchoTransport::default());
    let spec = spec(3)
        .build_from(fleet::BuildSpec::default())
        .build()
        .unwrap();

    let report = run(spec, backend.clone(), transport).await;

    assert_eq!(report.outcome, FleetOutcome::Completed);
    assert_eq!(*backend.builds.lock().unwrap(), 1);
    assert_eq!(backend.launch_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_agent_is_skipped() {
    let backend = Arc::new(StubBackend::default());
    let transport = Arc::new(EchoTransport {
        unhealthy_ports: HashSet::from([9001]),
        ..EchoTransport::default()
    });

    let report = run(spec(2).build().unwrap(), backend, transport.clone()).await;

    assert_eq!(report.outcome, FleetOutcome::Completed);
    assert_eq!(report.agents[0].state, AgentState::Responded);

    let unreachable = &report.agents[1];
    assert_eq!(unreachable.state, AgentState::Unreachable);
    assert!(matches!(
        unreachable.readiness,
        ReadinessOutcome::Unreachable { attempts: 3, .. }
    ));
    assert_eq!(unreachable.broadcast, BroadcastOutcome::NotSent);
    assert_eq!(*transport.submitted.lock().unwrap(), vec![9000]);
}

#[tokio::test]
async fn test_server_error_fails_only_that_agent() {
    let backend = Arc::new(StubBackend::default());
    let transport = Arc::new(EchoTransport {
        erroring_ports: HashSet::from([9001]),
        ..EchoTransport::default()
    });

    let report = run(spec(3).build().unwrap(), backend, transport).await;

    assert_eq!(report.agents[0].state, AgentState::Responded);
    assert_eq!(report.agents[1].state, AgentState::Failed);
    assert!(matches!(
        &report.agents[1].broadcast,
        BroadcastOutcome::Failed { error } if error.contains("500")
    ));
    assert_eq!(report.agents[2].state, AgentState::Responded);
    assert!(report.is_success());
}

#[tokio::test]
async fn test_no_agents_launched() {
    let backend = Arc::new(StubBackend {
        fail_launch_ports: HashSet::from([9000, 9001]),
        ..StubBackend::default()
    });
    let transport = Arc::new(EchoTransport::default());

    let report = run(spec(2).build().unwrap(), backend, transport.clone()).await;

    assert_eq!(report.outcome, FleetOutcome::NoAgentsLaunched);
    assert!(report.agents.iter().all(|a| a.state == AgentState::Errored));
    assert!(transport.submitted.lock().unwrap().is_empty());
    assert!(!report.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_no_agents_ready_skips_broadcast() {
    let backend = Arc::new(StubBackend::default());
    let transport = Arc::new(EchoTransport {
        unhealthy_ports: HashSet::from([9000, 9001]),
        ..EchoTransport::default()
    });
    let spec = spec(2).teardown(TeardownPolicy::Unhealthy).build().unwrap();

    let report = run(spec, backend.clone(), transport.clone()).await;

    assert_eq!(report.outcome, FleetOutcome::NoAgentsReady);
    assert!(report.agents.iter().all(|a| a.state == AgentState::Unreachable));
    assert!(transport.submitted.lock().unwrap().is_empty());
    assert!(backend.running().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_teardown_policies() {
    let cases = [
        (
            TeardownPolicy::Keep,
            vec!["agent-9000", "agent-9001", "agent-9002"],
        ),
        (TeardownPolicy::Unhealthy, vec!["agent-9000"]),
        (TeardownPolicy::All, vec![]),
    ];

    for (policy, expected) in cases {
        let backend = Arc::new(StubBackend::default());
        let transport = Arc::new(EchoTransport {
            unhealthy_ports: HashSet::from([9001]),
            erroring_ports: HashSet::from([9002]),
            ..EchoTransport::default()
        });
        let spec = spec(3).teardown(policy).build().unwrap();

        let report = run(spec, backend.clone(), transport).await;

        assert_eq!(report.responded_count(), 1, "{policy:?}");
        assert_eq!(backend.running(), expected, "{policy:?}");
    }
}

#[tokio::test]
async fn test_launch_config_carries_agent_identity() {
    let backend = Arc::new(StubBackend::default());
    let transport = Arc::new(EchoTransport::default());
    let spec = spec(2)
        .template(AgentTemplate {
            user_prefix: "bot".to_string(),
            model: Some("openai/gpt-5.1-codex-mini".to_string()),
            ..AgentTemplate::default()
        })
        .build()
        .unwrap();

    run(spec, backend.clone(), transport).await;

    let mut launches = backend.launches.lock().unwrap().clone();
    launches.sort_by_key(|config| config.ports[0].host);
    assert_eq!(launches.len(), 2);
    for (index, config) in launches.iter().enumerate() {
        let port = 9000 + index as u16;
        assert_eq!(config.name.as_deref(), Some(format!("agent-{port}").as_str()));
        assert_eq!(config.ports[0].container, 8000);
        assert_eq!(config.env["AGENT_ID"], index.to_string());
        assert_eq!(config.env["GITEA_USERNAME"], format!("bot{}-1", index + 1));
        assert_eq!(config.env["OPENCODE_MODEL"], "openai/gpt-5.1-codex-mini");
    }
}

#[tokio::test]
async fn test_bootstrap_failure_excludes_agent() {
    let backend = Arc::new(StubBackend {
        fail_exec_names: HashSet::from(["agent-9001".to_string()]),
        ..StubBackend::default()
    });
    let transport = Arc::new(EchoTransport::default());
    let spec = spec(2)
        .template(AgentTemplate {
            user_prefix: "agent-fun".to_string(),
            repo_url: Some("http://git.local/wa/repo.git".to_string()),
            ..AgentTemplate::default()
        })
        .bootstrap_repo(true)
        .build()
        .unwrap();

    let report = run(spec, backend.clone(), transport.clone()).await;

    assert_eq!(report.agents[0].bootstrap, BootstrapOutcome::Completed);
    assert_eq!(report.agents[0].state, AgentState::Responded);

    let failed = &report.agents[1];
    assert_eq!(failed.state, AgentState::Errored);
    assert!(matches!(
        &failed.bootstrap,
        BootstrapOutcome::Failed { error } if error.contains("repository not found")
    ));
    assert_eq!(failed.broadcast, BroadcastOutcome::NotSent);
    assert_eq!(*transport.submitted.lock().unwrap(), vec![9000]);

    let execs = backend.execs.lock().unwrap();
    let agent0: Vec<&Vec<String>> = execs
        .iter()
        .filter(|(name, _)| name == "agent-9000")
        .map(|(_, command)| command)
        .collect();
    assert_eq!(agent0.len(), 6);
    assert_eq!(agent0[0][..2], ["sh".to_string(), "-c".to_string()]);
    assert!(agent0[0][2].contains("git clone 'http://agent-fun1-1:"));
}

#[tokio::test]
async fn test_bootstrap_skipped_without_flag() {
    let backend = Arc::new(StubBackend::default());
    let transport = Arc::new(EchoTransport::default());
    let spec = spec(1)
        .template(AgentTemplate {
            repo_url: Some("http://git.local/wa/repo.git".to_string()),
            ..AgentTemplate::default()
        })
        .build()
        .unwrap();

    let report = run(spec, backend.clone(), transport).await;

    assert_eq!(report.agents[0].bootstrap, BootstrapOutcome::Skipped);
    assert!(backend.execs.lock().unwrap().is_empty());
}

const STAGE_DELAY: Duration = Duration::from_secs(1);

fn assert_all_responded(report: &fleet::FleetReport) {
    assert_eq!(report.outcome, FleetOutcome::Completed);
    assert_eq!(report.responded_count(), report.agents.len());
}

#[tokio::test(start_paused = true)]
async fn test_slow_launches_run_concurrently() {
    let backend = Arc::new(StubBackend {
        launch_delay: STAGE_DELAY,
        ..StubBackend::default()
    });
    let transport = Arc::new(EchoTransport::default());

    let started = tokio::time::Instant::now();
    let report = run(spec(3).build().unwrap(), backend.clone(), transport).await;
    let elapsed = started.elapsed();

    assert_all_responded(&report);
    assert_eq!(backend.launch_count(), 3);
    assert!(elapsed >= STAGE_DELAY, "{elapsed:?}");
    assert!(elapsed < STAGE_DELAY * 2, "launches ran one after another: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_slow_health_checks_run_concurrently() {
    let backend = Arc::new(StubBackend::default());
    let transport = Arc::new(EchoTransport {
        health_delay: STAGE_DELAY,
        ..EchoTransport::default()
    });
    let spec = spec(3)
        .probe(ProbePolicy {
            max_attempts: 3,
            interval: Duration::from_millis(10),
            attempt_timeout: STAGE_DELAY * 5,
        })
        .build()
        .unwrap();

    let started = tokio::time::Instant::now();
    let report = run(spec, backend, transport).await;
    let elapsed = started.elapsed();

    assert_all_responded(&report);
    for agent in &report.agents {
        assert_eq!(agent.readiness, ReadinessOutcome::Ready { attempts: 1 });
    }
    assert!(elapsed >= STAGE_DELAY, "{elapsed:?}");
    assert!(elapsed < STAGE_DELAY * 2, "health checks ran one after another: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_slow_agents_answer_concurrently() {
    let backend = Arc::new(StubBackend::default());
    let transport = Arc::new(EchoTransport {
        submit_delay: STAGE_DELAY,
        ..EchoTransport::default()
    });

    let started = tokio::time::Instant::now();
    let report = run(spec(3).build().unwrap(), backend, transport.clone()).await;
    let elapsed = started.elapsed();

    assert_all_responded(&report);
    assert_eq!(transport.submitted.lock().unwrap().len(), 3);
    assert!(elapsed >= STAGE_DELAY, "{elapsed:?}");
    assert!(elapsed < STAGE_DELAY * 2, "prompts were sent one after another: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_run_reports_progress() {
    telemetry::init_test();
    let backend = Arc::new(StubBackend::default());
    let transport = Arc::new(EchoTransport {
        submit_delay: Duration::from_secs(60),
        ..EchoTransport::default()
    });
    let orchestrator = FleetOrchestrator::new(spec(2).build().unwrap(), backend, transport);

    let before = orchestrator.snapshot();
    assert_eq!(before.outcome, FleetOutcome::Interrupted);
    assert!(before.agents.iter().all(|a| a.state == AgentState::Pending));

    let finished = tokio::select! {
        _ = orchestrator.run() => true,
        _ = tokio::time::sleep(STAGE_DELAY) => false,
    };
    assert!(!finished);

    let report = orchestrator.snapshot();
    assert_eq!(report.outcome, FleetOutcome::Interrupted);
    assert_eq!(
        report.agents.iter().map(|a| a.port).collect::<Vec<_>>(),
        vec![9000, 9001]
    );
    for agent in &report.agents {
        assert!(agent.container_id().is_some());
        assert_eq!(agent.readiness, ReadinessOutcome::Ready { attempts: 1 });
        assert_eq!(agent.state, AgentState::Broadcasting);
        assert_eq!(agent.broadcast, BroadcastOutcome::NotSent);
    }
    assert!(!report.is_success());
}
