//! Scrantenna Configuration Management
//!
//! Handles configuration from environment variables and TOML files with
//! defaults suited to a local Ollama install and the Scranton news feed.
//! The config is built once at startup and passed by reference; nothing in
//! here caches backend availability.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Language-model backend
    pub llm: LlmConfig,

    /// Statistical NER backend
    pub tagger: TaggerConfig,

    /// Extraction pipeline tuning
    pub extraction: ExtractionConfig,

    /// Knowledge vault
    pub knowledge: KnowledgeConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.llm.ollama_url = url;
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            self.llm.model = model;
        }
        if let Ok(temp) = std::env::var("OLLAMA_TEMPERATURE") {
            self.llm.temperature = parse_value("OLLAMA_TEMPERATURE", &temp)?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.llm.openai_base_url = Some(url);
        }

        // Tagger
        if let Ok(token) = std::env::var("HF_API_TOKEN") {
            self.tagger.api_token = Some(token);
        }
        if let Ok(model) = std::env::var("HF_NER_MODEL") {
            self.tagger.model = model;
        }

        // Extraction
        if let Ok(anchor) = std::env::var("SCRANTENNA_ANCHOR") {
            self.extraction.anchor_entity = anchor;
        }
        if let Ok(min) = std::env::var("EXTRACTION_MIN_CONFIDENCE") {
            self.extraction.min_confidence = parse_value("EXTRACTION_MIN_CONFIDENCE", &min)?;
        }
        if let Ok(preferred) = std::env::var("EXTRACTION_PREFERRED") {
            self.extraction.preferred = preferred.parse()?;
        }

        // Knowledge vault
        if let Ok(path) = std::env::var("SCRANTENNA_ENTITY_VAULT") {
            self.knowledge.vault_path = PathBuf::from(path);
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// Ollama server URL
    pub ollama_url: String,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for compatible APIs)
    pub openai_base_url: Option<String>,

    /// Model name to use
    pub model: String,

    /// Temperature for generation
    pub temperature: f32,

    /// Token budget for the entity prompt
    pub max_tokens: u32,

    /// Token budget for the relationship prompt
    pub relationship_max_tokens: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            ollama_url: "http://localhost:11434".to_string(),
            openai_api_key: None,
            openai_base_url: None,
            model: "llama3.2:3b".to_string(),
            temperature: 0.1,
            max_tokens: 300,
            relationship_max_tokens: 150,
            timeout_secs: 60,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    OpenAI,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Statistical NER (token classification) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggerConfig {
    /// Inference endpoint base URL; the model id is appended
    pub endpoint: String,

    /// Pretrained model id
    pub model: String,

    /// API token; the tagger is unavailable without one
    pub api_token: Option<String>,

    /// Minimum span score to keep
    pub min_score: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api-inference.huggingface.co/models".to_string(),
            model: "dbmdz/bert-large-cased-finetuned-conll03-english".to_string(),
            api_token: None,
            min_score: 0.7,
            timeout_secs: 30,
        }
    }
}

/// Extraction pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Which strategy to try first
    pub preferred: StrategyPreference,

    /// Always-relevant entity used to ground relationships
    pub anchor_entity: String,

    /// Minimum confidence for rule-based entities
    pub min_confidence: f32,

    /// Maximum entities per extraction
    pub max_entities: usize,

    /// Maximum relationships per extraction
    pub max_relationships: usize,

    /// Run the relationship deriver when the winning strategy found none
    pub enrich_relationships: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            preferred: StrategyPreference::Auto,
            anchor_entity: "Scranton".to_string(),
            min_confidence: 0.6,
            max_entities: 10,
            max_relationships: 15,
            enrich_relationships: true,
        }
    }
}

/// Preferred head of the strategy chain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyPreference {
    /// llm -> statistical -> rule_based
    #[default]
    Auto,
    Llm,
    Statistical,
    RuleBased,
}

impl std::str::FromStr for StrategyPreference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "auto" => Ok(Self::Auto),
            "llm" | "ollama" | "openai" => Ok(Self::Llm),
            "statistical" | "ner" | "huggingface" => Ok(Self::Statistical),
            "rule_based" | "rules" => Ok(Self::RuleBased),
            _ => Err(ConfigError::InvalidValue {
                key: "EXTRACTION_PREFERRED".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Knowledge vault configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Root directory of the entity vault
    pub vault_path: PathBuf,

    /// Minimum similarity for a fuzzy match (exclusive)
    pub fuzzy_threshold: f64,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            vault_path: PathBuf::from("entities"),
            fuzzy_threshold: 0.8,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.extraction.anchor_entity, "Scranton");
        assert_eq!(config.extraction.max_entities, 10);
        assert_eq!(config.tagger.min_score, 0.7);
        assert_eq!(config.knowledge.fuzzy_threshold, 0.8);
    }

    #[test]
    fn test_llm_provider_parse() {
        assert_eq!(
            "ollama".parse::<LlmProvider>().unwrap(),
            LlmProvider::Ollama
        );
        assert_eq!(
            "OpenAI".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAI
        );
        assert!("invalid".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_strategy_preference_parse() {
        assert_eq!(
            "rule-based".parse::<StrategyPreference>().unwrap(),
            StrategyPreference::RuleBased
        );
        assert_eq!(
            "ollama".parse::<StrategyPreference>().unwrap(),
            StrategyPreference::Llm
        );
        assert!("magic".parse::<StrategyPreference>().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [extraction]
            anchor_entity = "Wilkes-Barre"
            preferred = "rule_based"

            [knowledge]
            vault_path = "/tmp/vault"
            "#,
        )
        .unwrap();

        assert_eq!(config.extraction.anchor_entity, "Wilkes-Barre");
        assert_eq!(config.extraction.preferred, StrategyPreference::RuleBased);
        assert_eq!(config.extraction.max_relationships, 15);
        assert_eq!(config.llm.model, "llama3.2:3b");
    }
}
