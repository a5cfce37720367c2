//! LLM Client implementations
//!
//! Blocking clients for the Ollama and OpenAI-compatible APIs. Both carry a
//! request timeout from config; a timeout surfaces as an ordinary error.

use std::time::Duration;

use reqwest::blocking::Client;
use scrantenna_core::{LlmClient, LlmConfig, LlmProvider, Result, ScrantennaError};
use serde::{Deserialize, Serialize};
use tracing::debug;

fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ScrantennaError::Llm(format!("Failed to build HTTP client: {e}")))
}

// ============================================================================
// OpenAI Client
// ============================================================================

/// OpenAI API client (also works with compatible servers)
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            temperature,
        })
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ScrantennaError::Config("OpenAI API key required".to_string()))?;

        let client = Self::new(
            api_key.clone(),
            config.model.clone(),
            config.temperature,
            config.timeout_secs,
        )?;

        Ok(match &config.openai_base_url {
            Some(url) => client.with_base_url(url.clone()),
            None => client,
        })
    }

    /// Set custom base URL (for compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

impl LlmClient for OpenAiClient {
    fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = OpenAiRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| ScrantennaError::Llm(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().unwrap_or_default();
            return Err(ScrantennaError::Llm(format!("OpenAI error: {error_text}")));
        }

        let result: OpenAiResponse = response
            .json()
            .map_err(|e| ScrantennaError::Llm(format!("Failed to parse response: {e}")))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ScrantennaError::Llm("No response generated".to_string()))
    }

    fn is_available(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct OllamaShowRequest<'a> {
    model: &'a str,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature,
        })
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(
            config.ollama_url.clone(),
            config.model.clone(),
            config.temperature,
            config.timeout_secs,
        )
    }
}

impl LlmClient for OllamaClient {
    fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                top_p: 0.9,
                num_predict: max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .map_err(|e| ScrantennaError::Llm(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().unwrap_or_default();
            return Err(ScrantennaError::Llm(format!("Ollama error: {error_text}")));
        }

        let result: OllamaResponse = response
            .json()
            .map_err(|e| ScrantennaError::Llm(format!("Failed to parse Ollama response: {e}")))?;

        Ok(result.response)
    }

    /// The server answers and has the configured model pulled
    fn is_available(&self) -> bool {
        let result = self
            .client
            .post(format!("{}/api/show", self.base_url))
            .json(&OllamaShowRequest { model: &self.model })
            .send();

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(url = %self.base_url, error = %e, "Ollama not reachable");
                false
            }
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an LLM client from config
pub fn create_llm_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Box::new(OpenAiClient::from_config(config)?)),
        LlmProvider::Ollama => Ok(Box::new(OllamaClient::from_config(config)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_client_creation() {
        let client = OpenAiClient::new("test-key", "gpt-4o-mini", 0.1, 5)
            .unwrap()
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(client.model(), "gpt-4o-mini");
        assert_eq!(client.base_url, "http://localhost:8080/v1");
        assert!(client.is_available());
    }

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaClient::new("http://localhost:11434/", "llama3.2:3b", 0.1, 5).unwrap();
        assert_eq!(client.model(), "llama3.2:3b");
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_openai_requires_key() {
        let config = LlmConfig {
            provider: LlmProvider::OpenAI,
            openai_api_key: Some("  ".to_string()),
            ..LlmConfig::default()
        };
        assert!(create_llm_client(&config).is_err());
    }

    #[test]
    fn test_factory_defaults_to_ollama() {
        let client = create_llm_client(&LlmConfig::default()).unwrap();
        assert_eq!(client.model(), "llama3.2:3b");
    }
}
