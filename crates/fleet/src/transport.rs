//! HTTP transport to agent services
//!
//! Every agent container serves two endpoints on its published port:
//! `GET /health` for readiness and `POST /opencode_run` for prompts.

use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Readiness endpoint path
pub const HEALTH_PATH: &str = "/health";
/// Prompt endpoint path
pub const RUN_PATH: &str = "/opencode_run";

const CONNECT_TIMEOUT_SECS: u64 = 3;
const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Body of a prompt submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
    /// Output format requested from the agent runtime
    pub format: String,
}

impl PromptRequest {
    /// Request JSON-formatted output
    pub fn json(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            format: "json".to_string(),
        }
    }
}

/// Successful reply from an agent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl AgentResponse {
    /// Body as display text; JSON strings are shown without quotes
    pub fn text(&self) -> String {
        match &self.body {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// How the orchestrator talks to agents
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Single readiness check against the agent on `port`
    async fn health(&self, port: u16) -> Result<(), TransportError>;

    /// Submit a prompt and wait for the agent's reply
    async fn submit(&self, port: u16, request: &PromptRequest)
    -> Result<AgentResponse, TransportError>;
}

/// [`AgentTransport`] over plain HTTP to `http://<host>:<port>`
#[derive(Clone)]
pub struct HttpTransport {
    host: String,
    http: Client,
    health_timeout: Duration,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Transport to agents published on `host`
    pub fn new(host: impl Into<String>, request_timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            host: host.into(),
            http,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            request_timeout,
        })
    }

    /// Timeout for each health check
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Base URL of the agent on `port`
    pub fn base_url(&self, port: u16) -> String {
        format!("http://{}:{}", self.host, port)
    }

    fn url(&self, port: u16, path: &str) -> String {
        format!("{}{}", self.base_url(port), path)
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Http(err)
    }
}

#[async_trait]
impl AgentTransport for HttpTransport {
    async fn health(&self, port: u16) -> Result<(), TransportError> {
        let response = self
            .http
            .get(self.url(port, HEALTH_PATH))
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| classify(e, self.health_timeout))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(TransportError::status(status.as_u16(), body))
        }
    }

    async fn submit(
        &self,
        port: u16,
        request: &PromptRequest,
    ) -> Result<AgentResponse, TransportError> {
        let response = self
            .http
            .post(self.url(port, RUN_PATH))
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| classify(e, self.request_timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify(e, self.request_timeout))?;

        if !status.is_success() {
            return Err(TransportError::status(status.as_u16(), text));
        }

        let body = serde_json::from_str(&text)
            .map_err(|e| TransportError::malformed(format!("{e}: {text}")))?;
        Ok(AgentResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_request_shape() {
        let request = PromptRequest::json("hello");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"prompt": "hello", "format": "json"})
        );
    }

    #[test]
    fn test_response_text() {
        let plain = AgentResponse {
            status: 200,
            body: json!("hi there"),
        };
        assert_eq!(plain.text(), "hi there");

        let object = AgentResponse {
            status: 200,
            body: json!({"agent": "agent-9000"}),
        };
        assert_eq!(object.text(), r#"{"agent":"agent-9000"}"#);
    }

    #[test]
    fn test_urls() {
        let transport = HttpTransport::new("localhost", Duration::from_secs(1)).unwrap();
        assert_eq!(transport.base_url(28000), "http://localhost:28000");
        assert_eq!(transport.url(28001, HEALTH_PATH), "http://localhost:28001/health");
    }
}
