//! LLM-based extraction
//!
//! Two prompts per call: one for entities, one for relationships among the
//! entities found. Model output is free text; the first well-formed JSON array
//! in it is used and everything around it is ignored.

use scrantenna_core::{
    dedupe_entities, dedupe_relationships, mean_confidence, Entity, EntityType,
    ExtractionConfig, ExtractionResult, LlmClient, LlmConfig, Relationship, Result,
    ScrantennaError,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{is_blank, ExtractionStrategy, StrategyKind};

const ENTITY_PROMPT: &str = include_str!("prompts/entity_prompt.txt");
const RELATION_PROMPT: &str = include_str!("prompts/relation_prompt.txt");

/// Confidence when the model gives none
const DEFAULT_ENTITY_CONFIDENCE: f32 = 0.8;
const DEFAULT_RELATIONSHIP_CONFIDENCE: f32 = 0.7;

/// Stands in for the relationship side of the aggregate when there are none
const NO_RELATIONSHIP_CONFIDENCE: f32 = 0.5;

/// Entity structure for LLM JSON output
#[derive(Debug, Deserialize)]
struct LlmEntity {
    name: String,
    #[serde(rename = "type")]
    entity_type: String,
    confidence: Option<f32>,
}

/// Relationship structure for LLM JSON output
#[derive(Debug, Deserialize)]
struct LlmRelationship {
    from: String,
    to: String,
    #[serde(rename = "type")]
    relationship_type: String,
    verb: Option<String>,
    confidence: Option<f32>,
}

/// Find the first substring of `response` that parses as a JSON array.
///
/// Each `[` is tried as a start position; the streaming deserializer stops at
/// the end of the first complete value, so trailing prose is ignored and
/// nested brackets are handled by the parser.
pub fn first_json_array(response: &str) -> Option<Vec<Value>> {
    response.match_indices('[').find_map(|(start, _)| {
        let mut stream = serde_json::Deserializer::from_str(&response[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Array(items))) => Some(items),
            _ => None,
        }
    })
}

/// Extraction by prompting a language model
pub struct PromptedLlmStrategy {
    client: Box<dyn LlmClient>,
    entity_max_tokens: u32,
    relationship_max_tokens: u32,
    max_entities: usize,
    max_relationships: usize,
}

impl PromptedLlmStrategy {
    /// Create with default token budgets and caps
    pub fn new(client: Box<dyn LlmClient>) -> Self {
        Self::from_config(client, &LlmConfig::default(), &ExtractionConfig::default())
    }

    /// Create from config sections
    pub fn from_config(
        client: Box<dyn LlmClient>,
        llm: &LlmConfig,
        extraction: &ExtractionConfig,
    ) -> Self {
        Self {
            client,
            entity_max_tokens: llm.max_tokens,
            relationship_max_tokens: llm.relationship_max_tokens,
            max_entities: extraction.max_entities,
            max_relationships: extraction.max_relationships,
        }
    }

    /// Build the entity prompt
    pub fn build_entity_prompt(&self, text: &str) -> String {
        let types: Vec<&str> = EntityType::ALL
            .iter()
            .filter(|t| !t.is_unknown())
            .map(|t| t.as_str())
            .collect();

        ENTITY_PROMPT
            .replace("{types}", &types.join(", "))
            .replace("{text}", text)
    }

    /// Build the relationship prompt
    pub fn build_relationship_prompt(&self, text: &str, entities: &[Entity]) -> String {
        let names: Vec<String> = entities.iter().map(|e| format!("\"{}\"", e.name)).collect();

        RELATION_PROMPT
            .replace("{entities}", &format!("[{}]", names.join(", ")))
            .replace("{text}", text)
    }

    /// Parse entity objects; elements without a name or a known type are skipped
    pub fn parse_entities(&self, items: Vec<Value>) -> Vec<Entity> {
        let entities = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<LlmEntity>(item).ok())
            .filter_map(|e| {
                let entity_type = EntityType::parse(&e.entity_type)?;
                Some(Entity::new(
                    e.name.trim(),
                    entity_type,
                    e.confidence.unwrap_or(DEFAULT_ENTITY_CONFIDENCE),
                ))
            })
            .collect();

        let mut entities = dedupe_entities(entities);
        entities.truncate(self.max_entities);
        entities
    }

    /// Parse relationship tuples; both endpoints must exactly name an entity
    pub fn parse_relationships(&self, items: Vec<Value>, entities: &[Entity]) -> Vec<Relationship> {
        let known = |name: &str| entities.iter().any(|e| e.name == name);

        let relationships = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<LlmRelationship>(item).ok())
            .filter(|r| known(&r.from) && known(&r.to))
            .map(|r| {
                let relationship_type = r.relationship_type.trim().to_uppercase().replace(' ', "_");
                let rel = Relationship::new(
                    r.from,
                    r.to,
                    relationship_type,
                    r.confidence.unwrap_or(DEFAULT_RELATIONSHIP_CONFIDENCE),
                );
                match r.verb.filter(|v| !v.trim().is_empty()) {
                    Some(verb) => rel.with_verb(verb),
                    None => rel,
                }
            })
            .collect();

        dedupe_relationships(relationships, self.max_relationships)
    }

    fn extract_relationships(&self, text: &str, entities: &[Entity]) -> Vec<Relationship> {
        let prompt = self.build_relationship_prompt(text, entities);
        match self.client.generate(&prompt, self.relationship_max_tokens) {
            Ok(response) => match first_json_array(&response) {
                Some(items) => self.parse_relationships(items, entities),
                None => {
                    debug!(model = %self.client.model(), "no JSON array in relationship output");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(model = %self.client.model(), error = %e, "relationship prompt failed");
                Vec::new()
            }
        }
    }
}

fn aggregate_confidence(entities: &[Entity], relationships: &[Relationship]) -> f32 {
    let entity_scores = entities.iter().map(|e| e.confidence);
    if relationships.is_empty() {
        mean_confidence(entity_scores.chain(std::iter::once(NO_RELATIONSHIP_CONFIDENCE)))
    } else {
        mean_confidence(entity_scores.chain(relationships.iter().map(|r| r.confidence)))
    }
}

impl ExtractionStrategy for PromptedLlmStrategy {
    fn name(&self) -> String {
        format!("llm_{}", self.client.model())
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Llm
    }

    fn is_available(&self) -> bool {
        self.client.is_available()
    }

    fn try_extract(&self, text: &str) -> Result<ExtractionResult> {
        if is_blank(text) {
            return Ok(ExtractionResult::empty(self.name()));
        }

        let prompt = self.build_entity_prompt(text);
        let response = self.client.generate(&prompt, self.entity_max_tokens)?;

        let items = first_json_array(&response).ok_or_else(|| {
            let preview: String = response.chars().take(80).collect();
            ScrantennaError::MalformedModelOutput(preview)
        })?;

        let entities = self.parse_entities(items);
        if entities.is_empty() {
            return Ok(ExtractionResult::empty(self.name()));
        }

        let relationships = self.extract_relationships(text, &entities);
        let confidence = aggregate_confidence(&entities, &relationships);

        Ok(ExtractionResult::new(
            entities,
            relationships,
            self.name(),
            confidence,
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================
