use crate::config::ModelConfig;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion endpoint is not configured: {0}")]
    NotConfigured(String),
    #[error("completion endpoint is unreachable: {0}")]
    Unreachable(String),
    #[error("completion request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("completion endpoint returned status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("completion response envelope is malformed: {0}")]
    Envelope(String),
}

impl CompletionError {
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            CompletionError::NotConfigured(_) | CompletionError::Unreachable(_)
        )
    }
}

pub trait CompletionClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError>;
}

#[derive(Debug, Deserialize)]
struct CompletionEnvelope {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

pub struct HttpCompletionClient {
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
    max_output_tokens: u32,
}

impl HttpCompletionClient {
    pub fn from_config(config: &ModelConfig) -> Result<Self, CompletionError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            CompletionError::NotConfigured(format!(
                "environment variable `{}` is not set",
                config.api_key_env
            ))
        })?;
        if api_key.trim().is_empty() {
            return Err(CompletionError::NotConfigured(format!(
                "environment variable `{}` is empty",
                config.api_key_env
            )));
        }
        Ok(Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            timeout: Duration::from_secs(config.timeout_seconds),
            max_output_tokens: config.max_output_tokens,
        })
    }
}

impl CompletionClient for HttpCompletionClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let body = json!({
            "model": self.model,
            "temperature": 0.0,
            "max_tokens": self.max_output_tokens,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let response = agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body);

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                return Err(CompletionError::Status {
                    code,
                    body: response.into_string().unwrap_or_default(),
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(match transport.kind() {
                    ureq::ErrorKind::Io => CompletionError::Timeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    },
                    _ => CompletionError::Unreachable(transport.to_string()),
                })
            }
        };

        let envelope: CompletionEnvelope = response
            .into_json()
            .map_err(|err| CompletionError::Envelope(err.to_string()))?;
        let choice = envelope
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CompletionError::Envelope("response has no choices".to_string()))?;
        Ok(choice.message.content)
    }
}
