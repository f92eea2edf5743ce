//! Container launch configuration

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Host port published to a port inside the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

/// Identifier returned by the runtime for a started container
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form used by `docker ps`
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration for a long-running, detached container.
///
/// Environment values frequently carry credentials, so the `Debug` impl only
/// lists variable names.
#[derive(Clone, Default)]
pub struct ContainerConfig {
    /// Image reference (e.g. "codex-agent:latest")
    pub image: String,
    /// Container name; a stale container with the same name may be replaced
    pub name: Option<String>,
    /// Published ports
    pub ports: Vec<PortMapping>,
    /// Environment variables, ordered for stable argument rendering
    pub env: BTreeMap<String, String>,
    /// Volume mounts in `host:container` form
    pub volume_mounts: Vec<String>,
    /// Remove the container once it exits
    pub auto_remove: bool,
}

impl ContainerConfig {
    /// Create a config for the given image
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            auto_remove: true,
            ..Default::default()
        }
    }

    /// Set the container name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Publish a host port to a container port
    pub fn publish(mut self, host: u16, container: u16) -> Self {
        self.ports.push(PortMapping { host, container });
        self
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add a volume mount (`host:container`)
    pub fn volume_mount(mut self, mount: impl Into<String>) -> Self {
        self.volume_mounts.push(mount.into());
        self
    }

    /// Keep the container after it exits
    pub fn keep_on_exit(mut self) -> Self {
        self.auto_remove = false;
        self
    }
}

impl fmt::Debug for ContainerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerConfig")
            .field("image", &self.image)
            .field("name", &self.name)
            .field("ports", &self.ports)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("volume_mounts", &self.volume_mounts)
            .field("auto_remove", &self.auto_remove)
            .finish()
    }
}

/// Output of a command executed inside a running container
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ContainerConfig::new("codex-agent:latest")
            .name("agent-28000")
            .publish(28000, 8000)
            .env("AGENT_ID", "0")
            .volume_mount("/home/me/.config/opencode:/root/.config/opencode");

        assert_eq!(config.image, "codex-agent:latest");
        assert_eq!(config.name.as_deref(), Some("agent-28000"));
        assert_eq!(config.ports, vec![PortMapping { host: 28000, container: 8000 }]);
        assert_eq!(config.env.get("AGENT_ID").map(String::as_str), Some("0"));
        assert!(config.auto_remove);
        assert!(!config.keep_on_exit().auto_remove);
    }

    #[test]
    fn test_debug_hides_env_values() {
        let config = ContainerConfig::new("img").env("OPENAI_API_KEY", "sk-live-123");
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("OPENAI_API_KEY"));
        assert!(!rendered.contains("sk-live-123"));
    }

    #[test]
    fn test_short_container_id() {
        let id = ContainerId::new("0123456789abcdef0123");
        assert_eq!(id.short(), "0123456789ab");
        assert_eq!(ContainerId::new("abc").short(), "abc");
    }
}
