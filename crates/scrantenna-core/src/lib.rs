//! Scrantenna Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout Scrantenna:
//! - Extraction models (entities, relationships, extraction results)
//! - The entity type vocabulary
//! - Common error types
//! - Seams for language-model and sequence-tagger backends
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, ExtractionConfig, KnowledgeConfig, LlmConfig, LlmProvider,
    LoggingConfig, StrategyPreference, TaggerConfig,
};

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Scrantenna operations
#[derive(Error, Debug)]
pub enum ScrantennaError {
    #[error("Strategy unavailable: {0}")]
    StrategyUnavailable(String),

    #[error("Malformed model output: {0}")]
    MalformedModelOutput(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to access record {path}: {source}")]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record {path}: {message}")]
    StoreFormat { path: PathBuf, message: String },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tagger error: {0}")]
    Tagger(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ConfigError> for ScrantennaError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScrantennaError>;

// ============================================================================
// Entity Types
// ============================================================================

/// Entity types recognized across all extraction strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Event,
    Work,
    Date,
    /// Anything else, including types the producer could not name
    Other,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        Self::Person,
        Self::Organization,
        Self::Location,
        Self::Event,
        Self::Work,
        Self::Date,
        Self::Other,
    ];

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Organization => "ORGANIZATION",
            Self::Location => "LOCATION",
            Self::Event => "EVENT",
            Self::Work => "WORK",
            Self::Date => "DATE",
            Self::Other => "OTHER",
        }
    }

    /// Strict, case-insensitive parse. Returns `None` for anything outside
    /// the vocabulary.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PERSON" => Some(Self::Person),
            "ORGANIZATION" | "ORGANISATION" => Some(Self::Organization),
            "LOCATION" => Some(Self::Location),
            "EVENT" => Some(Self::Event),
            "WORK" => Some(Self::Work),
            "DATE" => Some(Self::Date),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }

    /// `Other` doubles as "type unknown" during resolution
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Other)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = ScrantennaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| ScrantennaError::Validation(format!("unknown entity type: {s}")))
    }
}

// Lenient conversion used when reading persisted records: legacy values such
// as "UNKNOWN" map to `Other` instead of failing the whole record.
impl From<String> for EntityType {
    fn from(s: String) -> Self {
        Self::parse(&s).unwrap_or(Self::Other)
    }
}

impl From<EntityType> for String {
    fn from(t: EntityType) -> Self {
        t.as_str().to_string()
    }
}

// ============================================================================
// Extraction Models
// ============================================================================

/// Clamp a confidence score into [0, 1]; NaN becomes 0.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// An entity found in a piece of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,

    #[serde(rename = "type")]
    pub entity_type: EntityType,

    pub confidence: f32,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub aliases: BTreeSet<String>,
}

impl Entity {
    /// Create a new entity
    pub fn new(name: impl Into<String>, entity_type: EntityType, confidence: f32) -> Self {
        Self {
            name: name.into(),
            entity_type,
            confidence: clamp_confidence(confidence),
            aliases: BTreeSet::new(),
        }
    }

    /// Add an alias
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    /// Case-folded key used for uniqueness checks
    pub fn key(&self) -> String {
        self.name.trim().to_lowercase()
    }
}

/// A typed, directed edge between two entity names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,

    pub to: String,

    #[serde(rename = "type")]
    pub relationship_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verb: Option<String>,

    #[serde(default = "default_relationship_confidence")]
    pub confidence: f32,
}

fn default_relationship_confidence() -> f32 {
    0.7
}

impl Relationship {
    /// Create a new relationship
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        relationship_type: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            relationship_type: relationship_type.into(),
            verb: None,
            confidence: clamp_confidence(confidence),
        }
    }

    /// Set the verb that produced this edge
    pub fn with_verb(mut self, verb: impl Into<String>) -> Self {
        self.verb = Some(verb.into());
        self
    }

    /// Deduplication key: (from, to, type)
    pub fn key(&self) -> (String, String, String) {
        (
            self.from.clone(),
            self.to.clone(),
            self.relationship_type.clone(),
        )
    }
}

/// Output of one extraction call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub method: String,
    pub confidence: f32,
}

impl ExtractionResult {
    /// Build a normalized result.
    ///
    /// Entities are deduplicated case-insensitively (first occurrence wins)
    /// and names of two characters or fewer are dropped. Relationships whose
    /// endpoints are not among the entities, or that point at themselves, are
    /// dropped; surviving endpoints take the entity's spelling.
    pub fn new(
        entities: Vec<Entity>,
        relationships: Vec<Relationship>,
        method: impl Into<String>,
        confidence: f32,
    ) -> Self {
        let entities = dedupe_entities(entities);

        let names: HashMap<String, &str> = entities
            .iter()
            .map(|e| (e.key(), e.name.as_str()))
            .collect();

        let relationships = relationships
            .into_iter()
            .filter_map(|mut rel| {
                let from = names.get(&rel.from.trim().to_lowercase())?;
                let to = names.get(&rel.to.trim().to_lowercase())?;
                if from == to {
                    return None;
                }
                rel.from = from.to_string();
                rel.to = to.to_string();
                Some(rel)
            })
            .collect();

        Self {
            entities,
            relationships,
            method: method.into(),
            confidence: clamp_confidence(confidence),
        }
    }

    /// An empty result tagged with the producing method
    pub fn empty(method: impl Into<String>) -> Self {
        Self {
            entities: Vec::new(),
            relationships: Vec::new(),
            method: method.into(),
            confidence: 0.0,
        }
    }

    /// True when no entities were found
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Case-insensitive entity lookup
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        let key = name.trim().to_lowercase();
        self.entities.iter().find(|e| e.key() == key)
    }
}

/// Remove duplicate entities by case-folded name, keeping the first.
pub fn dedupe_entities(entities: Vec<Entity>) -> Vec<Entity> {
    let mut seen = HashSet::new();
    entities
        .into_iter()
        .filter(|e| {
            let key = e.key();
            key.chars().count() > 2 && seen.insert(key)
        })
        .collect()
}

/// Remove duplicate relationships by (from, to, type) and cap the list,
/// preserving insertion order.
pub fn dedupe_relationships(relationships: Vec<Relationship>, max: usize) -> Vec<Relationship> {
    let mut seen = HashSet::new();
    relationships
        .into_iter()
        .filter(|r| seen.insert(r.key()))
        .take(max)
        .collect()
}

/// Mean of a set of confidence scores, 0.0 when empty
pub fn mean_confidence(scores: impl IntoIterator<Item = f32>) -> f32 {
    let (sum, count) = scores
        .into_iter()
        .fold((0.0f32, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        clamp_confidence(sum / count as f32)
    }
}

// ============================================================================
// Backend Traits
// ============================================================================

/// Trait for language-model backends (blocking)
pub trait LlmClient: Send + Sync {
    /// Generate a completion for a prompt
    fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String>;

    /// Probe whether the backend can serve requests right now
    fn is_available(&self) -> bool;

    /// Model identifier, used in method tags
    fn model(&self) -> &str;
}

/// A span produced by a sequence tagger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedSpan {
    /// Surface text of the span
    pub word: String,
    /// Tagger label (e.g. PER, B-ORG)
    pub label: String,
    /// Tagger score
    pub score: f32,
}

/// Trait for pretrained sequence taggers (blocking)
pub trait SequenceTagger: Send + Sync {
    /// Tag a text, returning aggregated spans
    fn tag(&self, text: &str) -> Result<Vec<TaggedSpan>>;

    /// Probe whether the tagger can serve requests right now
    fn is_available(&self) -> bool;

    /// Model identifier, used in method tags
    fn model(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================
