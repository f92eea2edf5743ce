//! Docker CLI backend

use crate::{
    BuildOptions, ContainerBackend, ContainerConfig, ContainerError, ContainerId,
    ContainerResult, ExecResult,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;

/// Backend that shells out to the `docker` binary
#[derive(Debug, Clone)]
pub struct DockerBackend {
    binary: PathBuf,
}

impl Default for DockerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerBackend {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("docker"),
        }
    }

    /// Use a specific docker-compatible binary (e.g. `podman`)
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null());
        cmd
    }
}

/// Arguments for `docker build`
pub fn build_args(context_dir: &Path, tag: &str, options: &BuildOptions) -> Vec<String> {
    let mut args = vec!["build".to_string()];

    if let Some(file) = &options.file {
        args.push("-f".to_string());
        args.push(file.display().to_string());
    }

    args.push("-t".to_string());
    args.push(tag.to_string());

    for (key, value) in &options.build_args {
        args.push("--build-arg".to_string());
        args.push(format!("{}={}", key, value));
    }

    args.push(context_dir.display().to_string());
    args
}

/// Arguments for `docker run -d`
pub fn run_args(config: &ContainerConfig) -> Vec<String> {
    let mut args = vec!["run".to_string(), "-d".to_string()];

    if config.auto_remove {
        args.push("--rm".to_string());
    }

    if let Some(name) = &config.name {
        args.push("--name".to_string());
        args.push(name.clone());
    }

    for port in &config.ports {
        args.push("-p".to_string());
        args.push(port.to_string());
    }

    for (key, value) in &config.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }

    for mount in &config.volume_mounts {
        args.push("-v".to_string());
        args.push(mount.clone());
    }

    args.push(config.image.clone());
    args
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text
}

#[async_trait]
impl ContainerBackend for DockerBackend {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn is_available(&self) -> bool {
        self.command()
            .args(["version", "--format", "{{.Server.Version}}"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn build(
        &self,
        context_dir: &Path,
        tag: &str,
        options: Option<BuildOptions>,
    ) -> ContainerResult<()> {
        let options = options.unwrap_or_default();
        let args = build_args(context_dir, tag, &options);

        tracing::info!(
            target: "sandbox::docker",
            tag,
            context = %context_dir.display(),
            "Building image"
        );

        let mut cmd = self.command();
        cmd.args(&args);
        if std::env::var_os("DOCKER_BUILDKIT").is_none() {
            cmd.env("DOCKER_BUILDKIT", "1");
        }

        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(ContainerError::build_failed(tag, combined_output(&output)));
        }

        tracing::debug!(target: "sandbox::docker", tag, "Image built");
        Ok(())
    }

    async fn run_detached(&self, config: &ContainerConfig) -> ContainerResult<ContainerId> {
        let args = run_args(config);
        let label = config.name.clone().unwrap_or_else(|| config.image.clone());

        // Env values may hold credentials; never log them.
        tracing::debug!(
            target: "sandbox::docker",
            container = %label,
            image = %config.image,
            ports = ?config.ports,
            "Starting container"
        );

        let output = self.command().args(&args).output().await?;
        if !output.status.success() {
            return Err(ContainerError::start_failed(label, combined_output(&output)));
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(ContainerError::start_failed(
                label,
                "docker run returned no container id",
            ));
        }
        Ok(ContainerId::new(id))
    }

    async fn exec(&self, container: &str, command: &[String]) -> ContainerResult<ExecResult> {
        let output = self
            .command()
            .arg("exec")
            .arg(container)
            .args(command)
            .output()
            .await?;

        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn remove(&self, container: &str) -> ContainerResult<()> {
        let output = self
            .command()
            .args(["rm", "-f", container])
            .output()
            .await?;

        if !output.status.success() {
            return Err(ContainerError::command_failed(
                format!("docker rm -f {}", container),
                combined_output(&output),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args() {
        let options = BuildOptions::new()
            .file("/repo/docker/agent/Dockerfile")
            .build_arg("OPENCODE_CONFIG_HOST", "/home/me/.config/opencode");

        let args = build_args(Path::new("/repo/docker/agent"), "codex-agent:latest", &options);
        assert_eq!(
            args,
            vec![
                "build",
                "-f",
                "/repo/docker/agent/Dockerfile",
                "-t",
                "codex-agent:latest",
                "--build-arg",
                "OPENCODE_CONFIG_HOST=/home/me/.config/opencode",
                "/repo/docker/agent",
            ]
        );
    }

    #[test]
    fn test_run_args() {
        let config = ContainerConfig::new("codex-agent:latest")
            .name("agent-28001")
            .publish(28001, 8000)
            .env("AGENT_NAME", "agent-28001")
            .env("AGENT_ID", "1")
            .volume_mount("/home/me/.local/share/opencode:/root/.local/share/opencode");

        let args = run_args(&config);
        assert_eq!(
            args,
            vec![
                "run",
                "-d",
                "--rm",
                "--name",
                "agent-28001",
                "-p",
                "28001:8000",
                "-e",
                "AGENT_ID=1",
                "-e",
                "AGENT_NAME=agent-28001",
                "-v",
                "/home/me/.local/share/opencode:/root/.local/share/opencode",
                "codex-agent:latest",
            ]
        );
    }

    #[test]
    fn test_run_args_without_auto_remove() {
        let args = run_args(&ContainerConfig::new("img").keep_on_exit());
        assert_eq!(args, vec!["run", "-d", "img"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let backend = DockerBackend::with_binary("/nonexistent/docker-binary");
        assert!(!backend.is_available().await);

        let err = backend
            .run_detached(&ContainerConfig::new("img"))
            .await
            .unwrap_err();
        assert!(matches!(err, ContainerError::Io(_)));
    }
}
