//! Entity resolution
//!
//! Maps extracted surface forms onto canonical vault records, creating
//! records for entities seen for the first time and keeping the typed edges
//! between records up to date.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use scrantenna_core::{
    dedupe_relationships, Entity, EntityType, ExtractionResult, KnowledgeConfig, Relationship,
    Result, ScrantennaError,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::record::KnowledgeRecord;
use crate::store::{KnowledgeStore, RecordId};

/// Default minimum similarity for a fuzzy match (exclusive)
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.8;

/// How an entity was tied to its record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMethod {
    Exact,
    Pattern,
    Fuzzy,
    Created,
}

impl ResolutionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Pattern => "pattern",
            Self::Fuzzy => "fuzzy",
            Self::Created => "created",
        }
    }
}

impl std::fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An extracted entity bound to a vault record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEntity {
    /// Canonical name of the record
    pub name: String,

    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Confidence reported by extraction
    pub confidence: f32,

    pub path: PathBuf,

    /// Surface form, when it differs from the canonical name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_alias: Option<String>,

    pub resolution: ResolutionMethod,

    #[serde(skip)]
    pub record: RecordId,
}

/// An entity that could not be resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionFailure {
    pub name: String,
    pub error: String,
}

/// Extraction output rewritten onto canonical names
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedExtractionResult {
    pub entities: Vec<ResolvedEntity>,
    pub relationships: Vec<Relationship>,
    pub method: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ResolutionFailure>,
}

/// Inverse edge written onto the target record
pub fn reverse_relationship(relationship_type: &str) -> Option<&'static str> {
    match relationship_type.to_uppercase().as_str() {
        "MAYOR_OF" => Some("HAS_MAYOR"),
        "HAS_MAYOR" => Some("MAYOR_OF"),
        "COMMISSIONER_OF" => Some("HAS_COMMISSIONER"),
        "HAS_COMMISSIONER" => Some("COMMISSIONER_OF"),
        "WORKS_FOR" => Some("EMPLOYS"),
        "EMPLOYS" => Some("WORKS_FOR"),
        "LEADS" => Some("LED_BY"),
        "LED_BY" => Some("LEADS"),
        "OVERSEES" => Some("OVERSEEN_BY"),
        "OVERSEEN_BY" => Some("OVERSEES"),
        "LOCATED_IN" => Some("CONTAINS"),
        "CONTAINS" => Some("LOCATED_IN"),
        "FILMED_AT" => Some("FILMING_LOCATION_FOR"),
        "FILMING_LOCATION_FOR" => Some("FILMED_AT"),
        "STARS_IN" | "APPEARS_IN" => Some("FEATURES"),
        _ => None,
    }
}

fn type_fits(record: &KnowledgeRecord, wanted: EntityType) -> bool {
    wanted.is_unknown() || record.entity_type() == wanted
}

// ============================================================================
// Entity Resolver
// ============================================================================

/// Resolves entities against a mutably borrowed [`KnowledgeStore`]
pub struct EntityResolver<'a> {
    store: &'a mut KnowledgeStore,
    fuzzy_threshold: f64,
}

impl<'a> EntityResolver<'a> {
    pub fn new(store: &'a mut KnowledgeStore) -> Self {
        Self {
            store,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }

    pub fn from_config(store: &'a mut KnowledgeStore, config: &KnowledgeConfig) -> Self {
        Self::new(store).with_fuzzy_threshold(config.fuzzy_threshold)
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    pub fn store(&self) -> &KnowledgeStore {
        &*self.store
    }

    /// Bind an entity to a record, creating one when nothing matches.
    /// Matched records are updated and persisted before returning.
    pub fn resolve(&mut self, entity: &Entity) -> Result<ResolvedEntity> {
        let surface = entity.name.trim();
        if surface.is_empty() {
            return Err(ScrantennaError::Validation("Entity name is empty".to_string()));
        }
        let now = Utc::now();

        let Some((id, method)) = self.find_match(surface, entity.entity_type) else {
            let id = self
                .store
                .create(surface, entity.entity_type, entity.confidence, now)?;
            return self.resolved(id, entity, ResolutionMethod::Created);
        };

        let mut record = self.store.stage(id)?;
        if self.store.lookup(surface).is_none() {
            record.front.aliases.push(surface.to_string());
        }
        record.front.mention_count += 1;
        record.front.last_mentioned = Some(now);
        if entity.confidence > record.front.confidence {
            record.front.confidence = entity.confidence;
        }
        self.store.commit(id, record)?;

        debug!(surface, canonical = %record_name(self.store, id), method = %method, "Resolved entity");
        self.resolved(id, entity, method)
    }

    fn resolved(
        &self,
        id: RecordId,
        entity: &Entity,
        resolution: ResolutionMethod,
    ) -> Result<ResolvedEntity> {
        let record = self
            .store
            .get(id)
            .ok_or_else(|| ScrantennaError::Validation(format!("Unknown record for {}", entity.name)))?;
        let surface = entity.name.trim();

        Ok(ResolvedEntity {
            name: record.name().to_string(),
            entity_type: record.entity_type(),
            confidence: entity.confidence,
            path: record.path.clone(),
            matched_alias: (surface.to_lowercase() != record.name().to_lowercase())
                .then(|| surface.to_string()),
            resolution,
            record: id,
        })
    }

    /// Exact, then pattern, then fuzzy. A name indexed under another type is
    /// still taken when nothing of the wanted type matches, so canonical
    /// names stay unique.
    fn find_match(&self, name: &str, wanted: EntityType) -> Option<(RecordId, ResolutionMethod)> {
        let exact = self.store.lookup(name);
        if let Some(id) = exact {
            if self.store.get(id).is_some_and(|r| type_fits(r, wanted)) {
                return Some((id, ResolutionMethod::Exact));
            }
        }

        if let Some((id, _)) = self
            .store
            .records()
            .find(|(_, r)| type_fits(r, wanted) && r.matches_pattern(name))
        {
            return Some((id, ResolutionMethod::Pattern));
        }

        if let Some(id) = self.fuzzy_match(name, wanted) {
            return Some((id, ResolutionMethod::Fuzzy));
        }

        exact.map(|id| (id, ResolutionMethod::Exact))
    }

    /// Highest normalized Levenshtein similarity strictly above the
    /// threshold; the first record wins a tie.
    fn fuzzy_match(&self, name: &str, wanted: EntityType) -> Option<RecordId> {
        let needle = name.to_lowercase();
        let mut best: Option<(RecordId, f64)> = None;

        for (id, record) in self.store.records().filter(|(_, r)| type_fits(r, wanted)) {
            for candidate in record.names() {
                let score = strsim::normalized_levenshtein(&needle, &candidate.to_lowercase());
                if score > best.map_or(self.fuzzy_threshold, |(_, s)| s) {
                    best = Some((id, score));
                }
            }
        }

        best.map(|(id, _)| id)
    }

    /// Store an edge between two resolved names, plus its inverse when one
    /// is defined. Returns the number of edges added.
    pub fn merge_relationship(&mut self, relationship: &Relationship) -> Result<usize> {
        let (Some(from), Some(to)) = (
            self.store.lookup(&relationship.from),
            self.store.lookup(&relationship.to),
        ) else {
            debug!(from = %relationship.from, to = %relationship.to, "Relationship endpoint not in vault");
            return Ok(0);
        };
        if from == to {
            return Ok(0);
        }

        let from_name = record_name(self.store, from);
        let to_name = record_name(self.store, to);
        let mut added = 0;

        let mut record = self.store.stage(from)?;
        if record.add_relationship(
            &to_name,
            &relationship.relationship_type,
            relationship.confidence,
        ) {
            self.store.commit(from, record)?;
            added += 1;
        }

        if let Some(reverse) = reverse_relationship(&relationship.relationship_type) {
            let mut record = self.store.stage(to)?;
            if record.add_relationship(&from_name, reverse, relationship.confidence) {
                self.store.commit(to, record)?;
                added += 1;
            }
        }

        Ok(added)
    }

    /// Resolve a whole extraction. Failures are collected per entity and the
    /// batch carries on; relationships are rewritten onto canonical names
    /// before being merged.
    pub fn resolve_extraction(&mut self, result: &ExtractionResult) -> ResolvedExtractionResult {
        let mut entities = Vec::new();
        let mut failures = Vec::new();
        let mut canonical: HashMap<String, String> = HashMap::new();

        for entity in &result.entities {
            match self.resolve(entity) {
                Ok(resolved) => {
                    canonical.insert(entity.key(), resolved.name.clone());
                    entities.push(resolved);
                }
                Err(e) => {
                    warn!(entity = %entity.name, error = %e, "Entity resolution failed");
                    failures.push(ResolutionFailure {
                        name: entity.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let rewritten: Vec<Relationship> = result
            .relationships
            .iter()
            .filter_map(|rel| {
                let from = canonical.get(&rel.from.trim().to_lowercase())?;
                let to = canonical.get(&rel.to.trim().to_lowercase())?;
                if from.to_lowercase() == to.to_lowercase() {
                    return None;
                }
                Some(Relationship {
                    from: from.clone(),
                    to: to.clone(),
                    ..rel.clone()
                })
            })
            .collect();
        let relationships = dedupe_relationships(rewritten, usize::MAX);

        for rel in &relationships {
            if let Err(e) = self.merge_relationship(rel) {
                warn!(from = %rel.from, to = %rel.to, error = %e, "Relationship merge failed");
                failures.push(ResolutionFailure {
                    name: rel.from.clone(),
                    error: e.to_string(),
                });
            }
        }

        ResolvedExtractionResult {
            entities,
            relationships,
            method: result.method.clone(),
            confidence: result.confidence,
            failures,
        }
    }
}

fn record_name(store: &KnowledgeStore, id: RecordId) -> String {
    store
        .get(id)
        .map(|r| r.name().to_string())
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vault(files: &[(&str, &str)]) -> (TempDir, KnowledgeStore) {
        let dir = TempDir::new().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        let store = KnowledgeStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_reverse_relationship() {
        assert_eq!(reverse_relationship("MAYOR_OF"), Some("HAS_MAYOR"));
        assert_eq!(reverse_relationship("contains"), Some("LOCATED_IN"));
        assert_eq!(reverse_relationship("APPEARS_IN"), Some("FEATURES"));
        assert_eq!(reverse_relationship("FEATURES"), None);
        assert_eq!(reverse_relationship("ANNOUNCED"), None);
    }

    #[test]
    fn test_unknown_type_matches_any_record() {
        let (_dir, mut store) = vault(&[(
            "locations/scranton.md",
            "---\nname: Scranton\nentity_type: LOCATION\n---\n",
        )]);
        let mut resolver = EntityResolver::new(&mut store);

        let resolved = resolver
            .resolve(&Entity::new("Scranton", EntityType::Other, 0.5))
            .unwrap();
        assert_eq!(resolved.resolution, ResolutionMethod::Exact);
        assert_eq!(resolved.entity_type, EntityType::Location);
    }

    #[test]
    fn test_type_mismatch_does_not_duplicate_name() {
        let (_dir, mut store) = vault(&[(
            "locations/scranton.md",
            "---\nname: Scranton\nentity_type: LOCATION\n---\n",
        )]);
        let mut resolver = EntityResolver::new(&mut store);

        let resolved = resolver
            .resolve(&Entity::new("Scranton", EntityType::Organization, 0.6))
            .unwrap();
        assert_eq!(resolved.resolution, ResolutionMethod::Exact);
        assert_eq!(resolver.store().len(), 1);
    }

    #[test]
    fn test_fuzzy_match_respects_threshold_and_type() {
        let (_dir, mut store) = vault(&[
            ("people/paige-cognetti.md", "---\nname: Paige Cognetti\nentity_type: PERSON\n---\n"),
            ("other/paige-cognetti.md", "---\nname: Paige Cognetti Fund\nentity_type: ORGANIZATION\n---\n"),
        ]);
        let mut resolver = EntityResolver::new(&mut store);

        let resolved = resolver
            .resolve(&Entity::new("Paige Cognettii", EntityType::Person, 0.7))
            .unwrap();
        assert_eq!(resolved.resolution, ResolutionMethod::Fuzzy);
        assert_eq!(resolved.name, "Paige Cognetti");
        assert_eq!(resolved.matched_alias.as_deref(), Some("Paige Cognettii"));

        let mut strict = EntityResolver::new(&mut store).with_fuzzy_threshold(0.99);
        let created = strict
            .resolve(&Entity::new("Paige Conetti", EntityType::Person, 0.7))
            .unwrap();
        assert_eq!(created.resolution, ResolutionMethod::Created);
    }

    #[test]
    fn test_alias_owned_elsewhere_is_not_stolen() {
        let (_dir, mut store) = vault(&[
            ("organizations/uofs.md", "---\nname: University of Scranton\nentity_type: ORGANIZATION\naliases: [U of S]\n---\n"),
            ("events/commencement.md", "---\nname: U of S Commencement\nentity_type: EVENT\nsearch_patterns: ['^u of s$']\n---\n"),
        ]);
        let mut resolver = EntityResolver::new(&mut store);

        let resolved = resolver
            .resolve(&Entity::new("U of S", EntityType::Event, 0.7))
            .unwrap();
        assert_eq!(resolved.name, "U of S Commencement");
        assert_eq!(resolved.resolution, ResolutionMethod::Pattern);

        let store = resolver.store();
        assert!(store.find("U of S Commencement").unwrap().front.aliases.is_empty());
        assert_eq!(store.find("u of s").unwrap().name(), "University of Scranton");
    }

    #[test]
    fn test_merge_relationship_skips_unknown_and_self_loops() {
        let (_dir, mut store) = vault(&[(
            "locations/scranton.md",
            "---\nname: Scranton\nentity_type: LOCATION\naliases: [Electric City]\n---\n",
        )]);
        let mut resolver = EntityResolver::new(&mut store);

        let self_loop = Relationship::new("Scranton", "Electric City", "LOCATED_IN", 0.7);
        assert_eq!(resolver.merge_relationship(&self_loop).unwrap(), 0);

        let dangling = Relationship::new("Scranton", "Wilkes-Barre", "LOCATED_NEAR", 0.6);
        assert_eq!(resolver.merge_relationship(&dangling).unwrap(), 0);
    }

    #[test]
    fn test_failed_write_leaves_match_untouched() {
        let (dir, mut store) = vault(&[(
            "locations/scranton.md",
            "---\nname: Scranton\nentity_type: LOCATION\nmention_count: 1\nconfidence: 0.5\nsearch_patterns: ['^scranton,?\\s+pa$']\n---\n",
        )]);
        // A directory where the temporary file goes makes the write fail
        std::fs::create_dir_all(dir.path().join("locations/scranton.md.tmp")).unwrap();
        let mut resolver = EntityResolver::new(&mut store);

        let result = resolver.resolve(&Entity::new("SCRANTON PA", EntityType::Location, 0.9));
        assert!(matches!(result, Err(ScrantennaError::StoreIo { .. })));

        let store = resolver.store();
        let record = store.find("Scranton").unwrap();
        assert_eq!(record.front.mention_count, 1);
        assert!((record.front.confidence - 0.5).abs() < 1e-6);
        assert!(record.front.aliases.is_empty());
        assert!(record.front.last_mentioned.is_none());
        assert_eq!(store.lookup("scranton pa"), None);
    }

    #[test]
    fn test_failed_write_drops_unsaved_edge() {
        let (dir, mut store) = vault(&[
            ("people/jane-doe.md", "---\nname: Jane Doe\nentity_type: PERSON\n---\n"),
            ("locations/scranton.md", "---\nname: Scranton\nentity_type: LOCATION\n---\n"),
        ]);
        std::fs::create_dir_all(dir.path().join("people/jane-doe.md.tmp")).unwrap();
        let mut resolver = EntityResolver::new(&mut store);

        let edge = Relationship::new("Jane Doe", "Scranton", "MAYOR_OF", 0.8);
        assert!(resolver.merge_relationship(&edge).is_err());
        assert!(resolver.store().find("Jane Doe").unwrap().front.relationships.is_empty());
        assert!(resolver.store().find("Scranton").unwrap().front.relationships.is_empty());

        // Once the path is clear the same edge is added exactly once
        std::fs::remove_dir(dir.path().join("people/jane-doe.md.tmp")).unwrap();
        assert_eq!(resolver.merge_relationship(&edge).unwrap(), 2);
        let reloaded = KnowledgeStore::open(dir.path()).unwrap();
        assert_eq!(reloaded.find("Jane Doe").unwrap().front.relationships.len(), 1);
    }
}
