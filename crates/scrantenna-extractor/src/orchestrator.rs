//! Strategy chain
//!
//! Tries each configured strategy in priority order. A strategy that is
//! unavailable, fails, or finds nothing hands over to the next one; the first
//! non-empty entity list wins. Errors never leave this module.

use scrantenna_core::{AppConfig, ExtractionResult, Result, StrategyPreference};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::create_llm_client;
use crate::llm::PromptedLlmStrategy;
use crate::ner::RuleBasedStrategy;
use crate::relation::RelationshipDeriver;
use crate::tagger::{HuggingFaceTagger, StatisticalNerStrategy};
use crate::{is_blank, ExtractionStrategy, RelationExtractor, StrategyKind};

/// Availability report for one strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyStatus {
    pub name: String,
    pub kind: &'static str,
    pub available: bool,
}

/// Chain order for a configured preference
pub fn strategy_order(preference: StrategyPreference) -> Vec<StrategyKind> {
    use StrategyKind::*;

    match preference {
        StrategyPreference::Auto | StrategyPreference::Llm => vec![Llm, Statistical, RuleBased],
        StrategyPreference::Statistical => vec![Statistical, Llm, RuleBased],
        StrategyPreference::RuleBased => vec![RuleBased],
    }
}

fn build_strategy(kind: StrategyKind, config: &AppConfig) -> Result<Box<dyn ExtractionStrategy>> {
    Ok(match kind {
        StrategyKind::Llm => Box::new(PromptedLlmStrategy::from_config(
            create_llm_client(&config.llm)?,
            &config.llm,
            &config.extraction,
        )),
        StrategyKind::Statistical => Box::new(StatisticalNerStrategy::from_config(
            Box::new(HuggingFaceTagger::from_config(&config.tagger)?),
            &config.tagger,
            &config.extraction,
        )),
        StrategyKind::RuleBased => Box::new(RuleBasedStrategy::from_config(&config.extraction)),
    })
}

/// Priority-ordered extraction with fallback
pub struct ExtractorOrchestrator {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    enrichment: Option<Box<dyn RelationExtractor>>,
}

impl ExtractorOrchestrator {
    /// Create from an explicit chain
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self {
            strategies,
            enrichment: None,
        }
    }

    /// Assemble the chain from config. Strategies whose backend cannot be
    /// configured (e.g. OpenAI without a key) are left out with a warning.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut strategies = Vec::new();

        for kind in strategy_order(config.extraction.preferred) {
            match build_strategy(kind, config) {
                Ok(strategy) => strategies.push(strategy),
                Err(e) => warn!(strategy = %kind, error = %e, "strategy not configured"),
            }
        }

        let orchestrator = Self::new(strategies);
        if config.extraction.enrich_relationships {
            orchestrator.with_enrichment(Box::new(RelationshipDeriver::from_config(
                &config.extraction,
            )))
        } else {
            orchestrator
        }
    }

    /// Derive relationships when the winning strategy returned none
    pub fn with_enrichment(mut self, extractor: Box<dyn RelationExtractor>) -> Self {
        self.enrichment = Some(extractor);
        self
    }

    pub fn strategies(&self) -> &[Box<dyn ExtractionStrategy>] {
        &self.strategies
    }

    /// Current availability of every strategy, checked now
    pub fn availability(&self) -> Vec<StrategyStatus> {
        self.strategies
            .iter()
            .map(|s| StrategyStatus {
                name: s.name(),
                kind: s.kind().as_str(),
                available: s.is_available(),
            })
            .collect()
    }

    /// Run the chain. Never fails; total failure is an empty result tagged
    /// with the last strategy attempted, or `none`.
    pub fn extract(&self, text: &str) -> ExtractionResult {
        if is_blank(text) {
            return ExtractionResult::empty("none");
        }

        let mut last_attempted: Option<String> = None;

        for strategy in &self.strategies {
            let name = strategy.name();
            if !strategy.is_available() {
                debug!(strategy = %name, "strategy unavailable, skipping");
                continue;
            }

            debug!(strategy = %name, "trying extraction strategy");
            last_attempted = Some(name.clone());

            match strategy.try_extract(text) {
                Ok(result) if !result.is_empty() => {
                    info!(
                        strategy = %name,
                        entities = result.entities.len(),
                        relationships = result.relationships.len(),
                        "extraction succeeded"
                    );
                    return self.enrich(text, result);
                }
                Ok(_) => debug!(strategy = %name, "no entities found, falling back"),
                Err(e) => warn!(strategy = %name, error = %e, "strategy failed, falling back"),
            }
        }

        ExtractionResult::empty(last_attempted.unwrap_or_else(|| "none".to_string()))
    }

    fn enrich(&self, text: &str, result: ExtractionResult) -> ExtractionResult {
        let Some(extractor) = &self.enrichment else {
            return result;
        };
        if !result.relationships.is_empty() {
            return result;
        }

        let relationships = extractor.extract(text, &result.entities);
        if relationships.is_empty() {
            return result;
        }
        debug!(count = relationships.len(), "enriched relationships");

        ExtractionResult::new(
            result.entities,
            relationships,
            result.method,
            result.confidence,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
