//! Statistical NER
//!
//! Wraps a pretrained token-classification model behind [`SequenceTagger`].
//! The bundled backend is a Hugging Face inference endpoint.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::blocking::Client;
use scrantenna_core::{
    mean_confidence, Entity, EntityType, ExtractionConfig, ExtractionResult, Result,
    ScrantennaError, SequenceTagger, TaggedSpan, TaggerConfig,
};
use serde::Deserialize;
use serde_json::json;

use crate::{is_blank, ExtractionStrategy, StrategyKind};

// ============================================================================
// Hugging Face Tagger
// ============================================================================

/// Token classification via the Hugging Face inference API
pub struct HuggingFaceTagger {
    client: Client,
    endpoint: String,
    model: String,
    api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HfSpan {
    /// Present with `aggregation_strategy`
    entity_group: Option<String>,
    /// Present for raw token output
    entity: Option<String>,
    score: f32,
    word: String,
}

impl HuggingFaceTagger {
    /// Create from config
    pub fn from_config(config: &TaggerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ScrantennaError::Tagger(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_token: config.api_token.clone().filter(|t| !t.trim().is_empty()),
        })
    }
}

impl SequenceTagger for HuggingFaceTagger {
    fn tag(&self, text: &str) -> Result<Vec<TaggedSpan>> {
        let token = self
            .api_token
            .as_ref()
            .ok_or_else(|| ScrantennaError::StrategyUnavailable("no tagger API token".to_string()))?;

        let response = self
            .client
            .post(format!("{}/{}", self.endpoint, self.model))
            .bearer_auth(token)
            .json(&json!({
                "inputs": text,
                "parameters": { "aggregation_strategy": "simple" }
            }))
            .send()
            .map_err(|e| ScrantennaError::Tagger(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().unwrap_or_default();
            return Err(ScrantennaError::Tagger(format!("Inference error: {error_text}")));
        }

        let spans: Vec<HfSpan> = response
            .json()
            .map_err(|e| ScrantennaError::Tagger(format!("Failed to parse response: {e}")))?;

        Ok(spans
            .into_iter()
            .filter_map(|s| {
                let label = s.entity_group.or(s.entity)?;
                Some(TaggedSpan {
                    word: s.word,
                    label,
                    score: s.score,
                })
            })
            .collect())
    }

    fn is_available(&self) -> bool {
        self.api_token.is_some() && !self.endpoint.is_empty()
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Statistical Strategy
// ============================================================================

/// Map a tagger label (PER, B-ORG, I-LOC, MISC) to an entity type
pub fn map_label(label: &str) -> Option<EntityType> {
    let bare = label
        .strip_prefix("B-")
        .or_else(|| label.strip_prefix("I-"))
        .unwrap_or(label);

    match bare.to_uppercase().as_str() {
        "PER" | "PERSON" => Some(EntityType::Person),
        "ORG" => Some(EntityType::Organization),
        "LOC" => Some(EntityType::Location),
        "MISC" => Some(EntityType::Other),
        _ => None,
    }
}

/// Join word pieces and drop `##` continuation markers
fn clean_word(word: &str) -> String {
    word.replace(" ##", "").replace("##", "").trim().to_string()
}

/// Extraction with a pretrained sequence tagger
pub struct StatisticalNerStrategy {
    tagger: Box<dyn SequenceTagger>,
    min_score: f32,
    max_entities: usize,
}

impl StatisticalNerStrategy {
    pub fn new(tagger: Box<dyn SequenceTagger>) -> Self {
        Self::from_config(tagger, &TaggerConfig::default(), &ExtractionConfig::default())
    }

    pub fn from_config(
        tagger: Box<dyn SequenceTagger>,
        config: &TaggerConfig,
        extraction: &ExtractionConfig,
    ) -> Self {
        Self {
            tagger,
            min_score: config.min_score,
            max_entities: extraction.max_entities,
        }
    }
}

impl ExtractionStrategy for StatisticalNerStrategy {
    fn name(&self) -> String {
        format!("ner_{}", self.tagger.model())
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Statistical
    }

    fn is_available(&self) -> bool {
        self.tagger.is_available()
    }

    fn try_extract(&self, text: &str) -> Result<ExtractionResult> {
        if is_blank(text) {
            return Ok(ExtractionResult::empty(self.name()));
        }

        let spans = self.tagger.tag(text)?;

        let mut seen = HashSet::new();
        let mut entities = Vec::new();
        let mut scores = Vec::new();

        for span in spans {
            if span.score < self.min_score {
                continue;
            }
            let Some(entity_type) = map_label(&span.label) else {
                continue;
            };
            let name = clean_word(&span.word);
            if name.chars().count() <= 2 || !seen.insert(name.to_lowercase()) {
                continue;
            }
            scores.push(span.score);
            entities.push(Entity::new(name, entity_type, span.score));
        }

        entities.truncate(self.max_entities);
        scores.truncate(self.max_entities);

        if entities.is_empty() {
            return Ok(ExtractionResult::empty(self.name()));
        }

        Ok(ExtractionResult::new(
            entities,
            Vec::new(),
            self.name(),
            mean_confidence(scores),
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTagger(Vec<TaggedSpan>);

    impl SequenceTagger for FixedTagger {
        fn tag(&self, _text: &str) -> Result<Vec<TaggedSpan>> {
            Ok(self.0.clone())
        }

        fn is_available(&self) -> bool {
            true
        }

        fn model(&self) -> &str {
            "conll03"
        }
    }

    fn span(word: &str, label: &str, score: f32) -> TaggedSpan {
        TaggedSpan {
            word: word.to_string(),
            label: label.to_string(),
            score,
        }
    }

    #[test]
    fn test_map_label() {
        assert_eq!(map_label("PER"), Some(EntityType::Person));
        assert_eq!(map_label("B-ORG"), Some(EntityType::Organization));
        assert_eq!(map_label("I-LOC"), Some(EntityType::Location));
        assert_eq!(map_label("MISC"), Some(EntityType::Other));
        assert_eq!(map_label("O"), None);
    }

    #[test]
    fn test_clean_word() {
        assert_eq!(clean_word("Cog ##netti"), "Cognetti");
        assert_eq!(clean_word("##ton"), "ton");
        assert_eq!(clean_word("Lackawanna County"), "Lackawanna County");
    }

    #[test]
    fn test_statistical_extraction() {
        let strategy = StatisticalNerStrategy::new(Box::new(FixedTagger(vec![
            span("Paige Cognetti", "PER", 0.99),
            span("Scranton", "LOC", 0.95),
            span("scranton", "B-LOC", 0.9),
            span("Electric", "MISC", 0.4),
            span("PA", "LOC", 0.9),
        ])));

        let result = strategy.extract("Mayor Paige Cognetti of Scranton");
        assert_eq!(result.method, "ner_conll03");
        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.entities[0].entity_type, EntityType::Person);
        assert!((result.confidence - 0.97).abs() < 1e-6);
    }

    #[test]
    fn test_low_scores_give_empty_result() {
        let strategy =
            StatisticalNerStrategy::new(Box::new(FixedTagger(vec![span("Dunmore", "LOC", 0.3)])));
        let result = strategy.extract("Dunmore");
        assert!(result.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_hf_tagger_unavailable_without_token() {
        let tagger = HuggingFaceTagger::from_config(&TaggerConfig::default()).unwrap();
        assert!(!tagger.is_available());
        assert!(tagger.tag("Scranton").is_err());
    }
}
