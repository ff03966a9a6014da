
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::GenerationConfig;

const DEFAULT_TIMEOUT_SECONDS: u64 = 120;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation backend returned HTTP {0}")]
    Status(u16),

    #[error("model output did not match the expected schema: {0}")]
    Schema(String),
}

/// One strict-JSON generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
}

/// Seam for the model backend: the answer and suggestion engines only need
/// "prompt in, JSON object out".
pub trait GenerationProvider: Send + Sync {
    fn generate_json(&self, request: &GenerationRequest<'_>) -> Result<Value, GenerationError>;
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for an Ollama-compatible `/api/generate` endpoint, run in JSON
/// mode so the model is constrained to emit a single JSON object.
pub struct OllamaGenerator {
    base_url: Url,
    model: String,
    agent: ureq::Agent,
}

impl OllamaGenerator {
    #[inline]
    pub fn new(config: &GenerationConfig) -> crate::Result<Self> {
        let base_url = config
            .base_url()
            .map_err(|e| crate::HandbookError::Config(e.to_string()))?;
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            agent,
        })
    }
}

impl GenerationProvider for OllamaGenerator {
    #[inline]
    fn generate_json(&self, request: &GenerationRequest<'_>) -> Result<Value, GenerationError> {
        let url = self
            .base_url
            .join("/api/generate")
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        let body = GenerateBody {
            model: &self.model,
            system: request.system,
            prompt: request.prompt,
            stream: false,
            format: "json",
            options: GenerateOptions {
                temperature: request.temperature,
            },
        };
        let body = serde_json::to_string(&body).map_err(|e| GenerationError::Request(e.to_string()))?;

        debug!("generation request to {} (model {})", url, self.model);
        let raw = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&body)
            .and_then(|mut response| response.body_mut().read_to_string())
            .map_err(|error| match error {
                ureq::Error::StatusCode(code) => GenerationError::Status(code),
                other => GenerationError::Request(other.to_string()),
            })?;

        let response: GenerateResponse = serde_json::from_str(&raw)
            .map_err(|e| GenerationError::Request(format!("unexpected response envelope: {e}")))?;
        serde_json::from_str(&response.response)
            .map_err(|e| GenerationError::Schema(format!("model did not emit valid JSON: {e}")))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Scripted provider for tests: pops one queued response per call and
    /// errors once the script runs out.
    pub struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<Value, GenerationError>>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub fn new(responses: Vec<Result<Value, GenerationError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self::new(Vec::new())
        }
    }

    impl GenerationProvider for ScriptedProvider {
        fn generate_json(
            &self,
            request: &GenerationRequest<'_>,
        ) -> Result<Value, GenerationError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(request.prompt.to_string());
            let next = self.responses.lock().expect("responses lock").pop_front();
            next.unwrap_or_else(|| {
                Err(GenerationError::Request("no scripted response left".to_string()))
            })
        }
    }
}
