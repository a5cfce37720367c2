//! Scrantenna Extractor - Knowledge extraction pipeline
//!
//! Turns short news text into typed entities and relationships using a
//! priority-ordered chain of strategies:
//! - LLM-based: prompt engineering against Ollama or an OpenAI-compatible API
//! - Statistical: a pretrained token-classification tagger
//! - Rule-based: regex tables plus verb-driven relationship synthesis

use scrantenna_core::{Entity, ExtractionResult, Relationship, Result};
use tracing::warn;

pub mod client;
pub mod llm;
pub mod ner;
pub mod orchestrator;
pub mod relation;
pub mod tagger;

pub use client::{create_llm_client, OllamaClient, OpenAiClient};
pub use llm::PromptedLlmStrategy;
pub use ner::{PatternTable, RuleBasedStrategy};
pub use orchestrator::{ExtractorOrchestrator, StrategyStatus};
pub use relation::RelationshipDeriver;
pub use tagger::{HuggingFaceTagger, StatisticalNerStrategy};

/// Which family a strategy belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Llm,
    Statistical,
    RuleBased,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Statistical => "statistical",
            Self::RuleBased => "rule_based",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One way of turning text into an [`ExtractionResult`]
pub trait ExtractionStrategy: Send + Sync {
    /// Method tag recorded on results, e.g. `rule_based` or `llm_llama3.2:3b`
    fn name(&self) -> String;

    fn kind(&self) -> StrategyKind;

    /// Whether the backend can be used right now. Checked on every call.
    fn is_available(&self) -> bool;

    /// Fallible extraction body.
    fn try_extract(&self, text: &str) -> Result<ExtractionResult>;

    /// Extraction that never fails: errors are logged and become an empty
    /// result carrying this strategy's method tag.
    fn extract(&self, text: &str) -> ExtractionResult {
        match self.try_extract(text) {
            Ok(result) => result,
            Err(e) => {
                warn!(strategy = %self.name(), error = %e, "extraction failed");
                ExtractionResult::empty(self.name())
            }
        }
    }
}

/// Trait for relation extractors working over already-found entities
pub trait RelationExtractor: Send + Sync {
    fn extract(&self, text: &str, entities: &[Entity]) -> Vec<Relationship>;
}

/// Blank input never reaches a backend.
pub(crate) fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}
