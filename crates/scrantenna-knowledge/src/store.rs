//! Knowledge store
//!
//! The vault is a directory tree of markdown records, one folder per entity
//! type. It is read once on open and kept in memory; every mutation goes back
//! to disk record by record.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;
use scrantenna_core::{clamp_confidence, EntityType, KnowledgeConfig, Result, ScrantennaError};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::record::{split_front_matter, FrontMatter, KnowledgeRecord, ParsedDocument};

/// Directories that hold vault furniture rather than records
pub const SKIPPED_DIRS: [&str; 3] = ["templates", "meta", "dashboards"];

const DEFAULT_TEMPLATE: &str = include_str!("templates/default.md");

/// Front matter keys owned by [`FrontMatter`]; templates cannot set them
const TYPED_KEYS: [&str; 9] = [
    "name",
    "entity_type",
    "aliases",
    "search_patterns",
    "mention_count",
    "first_mentioned",
    "last_mentioned",
    "confidence",
    "relationships",
];

/// Position of a record in load order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(usize);

// ============================================================================
// Naming
// ============================================================================

/// Vault folder for an entity type
pub fn folder_for(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Person => "people",
        EntityType::Organization => "organizations",
        EntityType::Location => "locations",
        EntityType::Event => "events",
        EntityType::Work => "works",
        EntityType::Date => "dates",
        EntityType::Other => "other",
    }
}

/// File-name slug: lowercase words joined by `-`, punctuation dropped
pub fn slugify(name: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;

    for c in name.to_lowercase().chars() {
        if c.is_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "entity".to_string()
    } else {
        slug
    }
}

/// `{{ name }}` template placeholder
const PLACEHOLDER: &str = r"\{\{\s*(\w+)\s*\}\}";

/// Replace placeholders; unknown placeholders render empty
fn render_template(placeholder: &Regex, template: &str, vars: &[(&str, String)]) -> String {
    placeholder
        .replace_all(template, |caps: &regex::Captures| {
            vars.iter()
                .find(|(key, _)| *key == &caps[1])
                .map(|(_, value)| value.clone())
                .unwrap_or_default()
        })
        .into_owned()
}

fn template_vars(
    name: &str,
    entity_type: EntityType,
    confidence: f32,
    now: DateTime<Utc>,
) -> Vec<(&'static str, String)> {
    let today = now.format("%Y-%m-%d").to_string();
    vec![
        ("entity_name", name.to_string()),
        ("entity_type", entity_type.as_str().to_string()),
        ("entity_category", folder_for(entity_type).to_string()),
        ("confidence_score", format!("{confidence:.2}")),
        ("first_mentioned_date", today.clone()),
        ("last_mentioned_date", today.clone()),
        ("last_updated_date", today),
        ("mention_count", "1".to_string()),
        ("current_month", now.format("%B").to_string()),
        ("current_year", now.format("%Y").to_string()),
    ]
}

// ============================================================================
// Statistics
// ============================================================================

/// Summary of the vault contents
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VaultStatistics {
    pub total_records: usize,
    pub by_type: BTreeMap<String, usize>,
    pub total_mentions: u64,
    /// Records with confidence >= 0.8
    pub high_confidence: usize,
    /// Records with confidence < 0.6
    pub low_confidence: usize,
    pub total_relationships: usize,
}

// ============================================================================
// Knowledge Store
// ============================================================================

/// In-memory view of the vault with a case-folded name and alias index
pub struct KnowledgeStore {
    root: PathBuf,
    records: Vec<KnowledgeRecord>,
    index: HashMap<String, RecordId>,
    placeholder: Regex,
}

impl KnowledgeStore {
    /// Open a vault, loading every record under `root`. A missing root is an
    /// empty vault; it is created on the first write.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self {
            root: root.into(),
            records: Vec::new(),
            index: HashMap::new(),
            placeholder: Regex::new(PLACEHOLDER).map_err(|e| ScrantennaError::Other(e.into()))?,
        };
        store.load();
        Ok(store)
    }

    /// Open the vault named in config
    pub fn from_config(config: &KnowledgeConfig) -> Result<Self> {
        Self::open(config.vault_path.clone())
    }

    fn load(&mut self) {
        if !self.root.is_dir() {
            info!(root = %self.root.display(), "Vault directory not found, starting empty");
            return;
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(e.file_type().is_dir()
                        && e.file_name()
                            .to_str()
                            .is_some_and(|n| SKIPPED_DIRS.contains(&n)))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable vault entry");
                    continue;
                }
            };

            let path = entry.path();
            let is_markdown = path.extension().and_then(|e| e.to_str()) == Some("md");
            if !entry.file_type().is_file() || !is_markdown {
                continue;
            }

            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable record");
                    continue;
                }
            };

            match KnowledgeRecord::parse(path, &content) {
                Ok(ParsedDocument::Record(record)) => {
                    self.insert(record);
                }
                Ok(ParsedDocument::NotARecord) => {
                    debug!(path = %path.display(), "No front matter name, skipping");
                }
                Err(e) => warn!(error = %e, "Skipping malformed record"),
            }
        }

        info!(root = %self.root.display(), records = self.records.len(), "Vault loaded");
    }

    /// Index a record under its name and aliases. An alias already owned by
    /// another record keeps pointing there; a record whose name is already a
    /// key, as a name or an alias, is skipped.
    fn insert(&mut self, record: KnowledgeRecord) -> Option<RecordId> {
        let key = record.name().to_lowercase();
        if let Some(owner) = self.index.get(&key).copied() {
            warn!(
                name = %record.name(),
                path = %record.path.display(),
                owner = %self.records[owner.0].path.display(),
                "Name already indexed, skipping record"
            );
            return None;
        }

        let id = RecordId(self.records.len());
        self.index.insert(key, id);

        for alias in &record.front.aliases {
            let alias_key = alias.trim().to_lowercase();
            if alias_key.is_empty() {
                continue;
            }
            match self.index.get(&alias_key).copied() {
                Some(owner) if owner != id => warn!(
                    alias = %alias,
                    record = %record.name(),
                    owner = %self.records[owner.0].name(),
                    "Alias already belongs to another record"
                ),
                Some(_) => {}
                None => {
                    self.index.insert(alias_key, id);
                }
            }
        }

        self.records.push(record);
        Some(id)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in load order
    pub fn records(&self) -> impl Iterator<Item = (RecordId, &KnowledgeRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, record)| (RecordId(i), record))
    }

    pub fn get(&self, id: RecordId) -> Option<&KnowledgeRecord> {
        self.records.get(id.0)
    }

    /// Case-insensitive lookup by canonical name or alias
    pub fn lookup(&self, name: &str) -> Option<RecordId> {
        self.index.get(&name.trim().to_lowercase()).copied()
    }

    pub fn find(&self, name: &str) -> Option<&KnowledgeRecord> {
        self.lookup(name).and_then(|id| self.get(id))
    }

    /// Working copy of a record, to be written back with [`Self::commit`]
    pub(crate) fn stage(&self, id: RecordId) -> Result<KnowledgeRecord> {
        self.get(id)
            .cloned()
            .ok_or_else(|| ScrantennaError::Validation(format!("Unknown record id {}", id.0)))
    }

    /// Persist a staged record, then swap it in and index its new aliases.
    /// A failed write leaves the store as it was.
    pub(crate) fn commit(&mut self, id: RecordId, record: KnowledgeRecord) -> Result<()> {
        if id.0 >= self.records.len() {
            return Err(ScrantennaError::Validation(format!("Unknown record id {}", id.0)));
        }
        record.persist()?;

        for alias in &record.front.aliases {
            let key = alias.trim().to_lowercase();
            if !key.is_empty() {
                self.index.entry(key).or_insert(id);
            }
        }
        self.records[id.0] = record;
        Ok(())
    }

    /// Create, persist and index a new record
    pub fn create(
        &mut self,
        name: &str,
        entity_type: EntityType,
        confidence: f32,
        now: DateTime<Utc>,
    ) -> Result<RecordId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ScrantennaError::Validation("Entity name is empty".to_string()));
        }
        if self.lookup(name).is_some() {
            return Err(ScrantennaError::Validation(format!(
                "Record already exists: {name}"
            )));
        }

        let confidence = clamp_confidence(confidence);
        let rendered = render_template(
            &self.placeholder,
            &self.load_template(entity_type),
            &template_vars(name, entity_type, confidence, now),
        );
        let path = self.record_path(entity_type, name);

        let (template_keys, body) = match split_front_matter(&rendered) {
            Some((yaml, body)) => match serde_yaml::from_str::<serde_yaml::Value>(yaml) {
                Ok(serde_yaml::Value::Mapping(mapping)) => (mapping, body.to_string()),
                Ok(_) => (serde_yaml::Mapping::new(), body.to_string()),
                Err(e) => {
                    warn!(entity_type = %entity_type, error = %e, "Template front matter is not valid YAML");
                    (serde_yaml::Mapping::new(), body.to_string())
                }
            },
            None => (serde_yaml::Mapping::new(), rendered.clone()),
        };

        let mut front = FrontMatter::new(name, entity_type);
        front.extra = template_keys
            .into_iter()
            .filter(|(key, _)| !key.as_str().is_some_and(|k| TYPED_KEYS.contains(&k)))
            .collect();
        front.confidence = confidence;
        front.mention_count = 1;
        front.first_mentioned = Some(now);
        front.last_mentioned = Some(now);

        let record = KnowledgeRecord::new(path, front, body);
        record.persist()?;
        info!(name, entity_type = %entity_type, path = %record.path.display(), "Created record");

        self.insert(record)
            .ok_or_else(|| ScrantennaError::Validation(format!("Record already exists: {name}")))
    }

    /// Type-specific template from the vault, or the built-in default
    fn load_template(&self, entity_type: EntityType) -> String {
        let path = self.root.join("templates").join(format!(
            "{}-template.md",
            entity_type.as_str().to_lowercase()
        ));
        std::fs::read_to_string(&path).unwrap_or_else(|_| DEFAULT_TEMPLATE.to_string())
    }

    /// First free `<folder>/<slug>[-n].md` path
    fn record_path(&self, entity_type: EntityType, name: &str) -> PathBuf {
        let dir = self.root.join(folder_for(entity_type));
        let slug = slugify(name);

        let mut path = dir.join(format!("{slug}.md"));
        let mut n = 2;
        while path.exists() || self.records.iter().any(|r| r.path == path) {
            path = dir.join(format!("{slug}-{n}.md"));
            n += 1;
        }
        path
    }

    /// Summarise the vault
    pub fn statistics(&self) -> VaultStatistics {
        let mut stats = VaultStatistics {
            total_records: self.records.len(),
            ..VaultStatistics::default()
        };

        for record in &self.records {
            *stats
                .by_type
                .entry(record.entity_type().as_str().to_string())
                .or_insert(0) += 1;
            stats.total_mentions += record.front.mention_count;
            stats.total_relationships += record.front.relationships.len();

            if record.front.confidence >= 0.8 {
                stats.high_confidence += 1;
            } else if record.front.confidence < 0.6 {
                stats.low_confidence += 1;
            }
        }

        stats
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Paige Cognetti"), "paige-cognetti");
        assert_eq!(slugify("St. Mary's  -- Church"), "st-marys-church");
        assert_eq!(slugify("  Nay Aug Park! "), "nay-aug-park");
        assert_eq!(slugify("!!!"), "entity");
    }

    #[test]
    fn test_render_template() {
        let placeholder = Regex::new(PLACEHOLDER).unwrap();
        let out = render_template(
            &placeholder,
            "# {{entity_name}} ({{ entity_type }}) {{missing}}",
            &[
                ("entity_name", "Scranton".to_string()),
                ("entity_type", "LOCATION".to_string()),
            ],
        );
        assert_eq!(out, "# Scranton (LOCATION) ");
    }

    #[test]
    fn test_missing_vault_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = KnowledgeStore::open(dir.path().join("nowhere")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_skips_furniture_and_non_records() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "locations/scranton.md", "---\nname: Scranton\nentity_type: LOCATION\naliases: [Electric City]\n---\n");
        write(root, "templates/location-template.md", "---\nname: \"{{entity_name}}\"\n---\n");
        write(root, "dashboards/overview.md", "---\nname: Overview\n---\n");
        write(root, "notes/readme.md", "# Notes\n");
        write(root, "people/broken.md", "---\nname: [oops\n---\n");
        write(root, "people/data.json", "{}");

        let store = KnowledgeStore::open(root).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.find("electric city").unwrap().name(), "Scranton");
        assert_eq!(store.find("SCRANTON").unwrap().name(), "Scranton");
    }

    #[test]
    fn test_alias_collision_keeps_first_owner() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "a/first.md", "---\nname: Lackawanna County\naliases: [The County]\n---\n");
        write(root, "b/second.md", "---\nname: Luzerne County\naliases: [The County]\n---\n");

        let store = KnowledgeStore::open(root).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.find("the county").unwrap().name(), "Lackawanna County");
    }

    #[test]
    fn test_name_indexed_as_earlier_alias_is_skipped() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "a/scranton.md", "---\nname: Scranton\naliases: [Electric City]\n---\n");
        write(root, "b/electric-city.md", "---\nname: Electric City\n---\n");

        let store = KnowledgeStore::open(root).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.find("Electric City").unwrap().name(), "Scranton");
        assert!(root.join("b/electric-city.md").exists());
    }

    #[test]
    fn test_create_uses_vault_template() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(
            root,
            "templates/organization-template.md",
            "---\nname: ignored\nsector: \"{{entity_category}}\"\n---\n# {{entity_name}} profile\n",
        );

        let mut store = KnowledgeStore::open(root).unwrap();
        let id = store
            .create("Scranton School District", EntityType::Organization, 0.7, Utc::now())
            .unwrap();

        let record = store.get(id).unwrap();
        assert_eq!(record.path, root.join("organizations/scranton-school-district.md"));
        assert_eq!(record.body, "# Scranton School District profile\n");
        assert_eq!(record.front.mention_count, 1);

        let content = std::fs::read_to_string(&record.path).unwrap();
        assert!(content.contains("sector: organizations"));
        assert!(content.contains("name: Scranton School District"));
        assert!(!content.contains("ignored"));
    }

    #[test]
    fn test_create_with_default_template_and_slug_collision() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "events/la-festa-italiana.md", "# hand-written notes\n");

        let mut store = KnowledgeStore::open(root).unwrap();
        let id = store
            .create("La Festa Italiana", EntityType::Event, 0.8, Utc::now())
            .unwrap();
        let record = store.get(id).unwrap();

        assert_eq!(record.path, root.join("events/la-festa-italiana-2.md"));
        assert!(record.body.starts_with("# La Festa Italiana\n"));
        assert!(!record.body.contains("{{"));
        assert!(store.create("la festa italiana", EntityType::Event, 0.8, Utc::now()).is_err());
    }

    #[test]
    fn test_statistics() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "locations/scranton.md", "---\nname: Scranton\nentity_type: LOCATION\nconfidence: 0.9\nmention_count: 3\n---\n");
        write(root, "people/jane-doe.md", "---\nname: Jane Doe\nentity_type: PERSON\nconfidence: 0.5\nmention_count: 1\nrelationships:\n- target: \"[[Scranton]]\"\n  type: LOCATED_IN\n  confidence: 0.7\n---\n");
        write(root, "people/john-roe.md", "---\nname: John Roe\nentity_type: PERSON\nconfidence: 0.7\n---\n");

        let stats = KnowledgeStore::open(root).unwrap().statistics();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.by_type["PERSON"], 2);
        assert_eq!(stats.total_mentions, 4);
        assert_eq!(stats.high_confidence, 1);
        assert_eq!(stats.low_confidence, 1);
        assert_eq!(stats.total_relationships, 1);
    }
}
