//! Vault records
//!
//! A record is a markdown file whose YAML front matter holds the typed entity
//! data. Keys this crate does not know about are kept and written back
//! untouched, as is the markdown body.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use regex::{Regex, RegexBuilder};
use scrantenna_core::{clamp_confidence, EntityType, Result, ScrantennaError};
use serde::{Deserialize, Serialize};
use tracing::warn;

// ============================================================================
// Front Matter
// ============================================================================

/// A typed edge stored on the source record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRelationship {
    /// Wiki link to the target, `[[Name]]`
    pub target: String,

    #[serde(rename = "type")]
    pub relationship_type: String,

    #[serde(default)]
    pub confidence: f32,
}

impl RecordRelationship {
    pub fn new(target: &str, relationship_type: impl Into<String>, confidence: f32) -> Self {
        Self {
            target: format!("[[{target}]]"),
            relationship_type: relationship_type.into(),
            confidence: clamp_confidence(confidence),
        }
    }

    /// Target canonical name without the wiki-link brackets
    pub fn target_name(&self) -> &str {
        self.target
            .trim()
            .strip_prefix("[[")
            .and_then(|t| t.strip_suffix("]]"))
            .unwrap_or(self.target.trim())
    }

    /// Same target and type, compared case-insensitively
    pub fn same_edge(&self, target: &str, relationship_type: &str) -> bool {
        self.target_name().eq_ignore_ascii_case(target)
            && self.relationship_type.eq_ignore_ascii_case(relationship_type)
    }
}

fn unknown_type() -> EntityType {
    EntityType::Other
}

fn default_confidence() -> f32 {
    0.5
}

/// Front matter of a vault record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontMatter {
    pub name: String,

    #[serde(default = "unknown_type")]
    pub entity_type: EntityType,

    #[serde(default)]
    pub aliases: Vec<String>,

    #[serde(default)]
    pub search_patterns: Vec<String>,

    #[serde(default)]
    pub mention_count: u64,

    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub first_mentioned: Option<DateTime<Utc>>,

    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub last_mentioned: Option<DateTime<Utc>>,

    #[serde(default = "default_confidence")]
    pub confidence: f32,

    #[serde(default)]
    pub relationships: Vec<RecordRelationship>,

    /// Keys owned by templates or by hand edits
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

impl FrontMatter {
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            name: name.into(),
            entity_type,
            aliases: Vec::new(),
            search_patterns: Vec::new(),
            mention_count: 0,
            first_mentioned: None,
            last_mentioned: None,
            confidence: default_confidence(),
            relationships: Vec::new(),
            extra: serde_yaml::Mapping::new(),
        }
    }
}

/// Timestamps are written as RFC 3339 and read leniently: a bare
/// `YYYY-MM-DD` date is midnight UTC, anything unparseable is dropped.
mod timestamp {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
        let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(|v| v.as_str()).and_then(parse))
    }

    pub fn parse(s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }
}

// ============================================================================
// Document Split
// ============================================================================

/// Split a document into its front matter YAML and the body after the
/// closing `---` line. `None` when the document has no front matter.
pub fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

// ============================================================================
// Knowledge Record
// ============================================================================

/// One entity as stored in the vault
#[derive(Debug, Clone)]
pub struct KnowledgeRecord {
    pub path: PathBuf,
    pub front: FrontMatter,
    pub body: String,
    patterns: Vec<Regex>,
}

/// Outcome of reading a vault file
#[derive(Debug)]
pub enum ParsedDocument {
    Record(KnowledgeRecord),
    /// No front matter, or front matter without a `name`
    NotARecord,
}

impl KnowledgeRecord {
    pub fn new(path: impl Into<PathBuf>, front: FrontMatter, body: impl Into<String>) -> Self {
        let patterns = compile_patterns(&front.name, &front.search_patterns);
        Self {
            path: path.into(),
            front,
            body: body.into(),
            patterns,
        }
    }

    /// Parse a vault document
    pub fn parse(path: &Path, content: &str) -> Result<ParsedDocument> {
        let Some((yaml, body)) = split_front_matter(content) else {
            return Ok(ParsedDocument::NotARecord);
        };

        let value: serde_yaml::Value =
            serde_yaml::from_str(yaml).map_err(|e| ScrantennaError::StoreFormat {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let has_name = value
            .get("name")
            .and_then(|n| n.as_str())
            .is_some_and(|n| !n.trim().is_empty());
        if !has_name {
            return Ok(ParsedDocument::NotARecord);
        }

        let mut front: FrontMatter =
            serde_yaml::from_value(value).map_err(|e| ScrantennaError::StoreFormat {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        front.name = front.name.trim().to_string();
        front.confidence = clamp_confidence(front.confidence);

        Ok(ParsedDocument::Record(Self::new(path, front, body)))
    }

    /// Render the full document
    pub fn render(&self) -> Result<String> {
        let yaml = serde_yaml::to_string(&self.front).map_err(|e| ScrantennaError::StoreFormat {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        Ok(format!("---\n{yaml}---\n{}", self.body))
    }

    /// Write the record atomically: temporary sibling, then rename
    pub fn persist(&self) -> Result<()> {
        let content = self.render()?;
        let io_err = |source| ScrantennaError::StoreIo {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = self.path.with_extension("md.tmp");
        std::fs::write(&tmp, content).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)
    }

    pub fn name(&self) -> &str {
        &self.front.name
    }

    pub fn entity_type(&self) -> EntityType {
        self.front.entity_type
    }

    /// Whether any stored search pattern matches `text`
    pub fn matches_pattern(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }

    /// Canonical name followed by aliases
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.front.name.as_str()).chain(self.front.aliases.iter().map(String::as_str))
    }

    /// Append an edge unless an identical target+type edge exists
    pub fn add_relationship(&mut self, target: &str, relationship_type: &str, confidence: f32) -> bool {
        if self
            .front
            .relationships
            .iter()
            .any(|r| r.same_edge(target, relationship_type))
        {
            return false;
        }
        self.front
            .relationships
            .push(RecordRelationship::new(target, relationship_type, confidence));
        true
    }
}

fn compile_patterns(name: &str, patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match RegexBuilder::new(p).case_insensitive(true).build() {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(record = %name, pattern = %p, error = %e, "Ignoring invalid search pattern");
                None
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "---\nname: Paige Cognetti\nentity_type: PERSON\naliases:\n- Mayor Cognetti\nsearch_patterns:\n- \"mayor\\\\s+cognetti\"\n- \"([unclosed\"\nmention_count: 4\nfirst_mentioned: 2024-03-01\nconfidence: 0.85\nrelationships:\n- target: \"[[Scranton]]\"\n  type: MAYOR_OF\n  confidence: 0.9\ntags:\n- politics\n---\n# Paige Cognetti\n\nNotes.\n";

    fn parse(content: &str) -> ParsedDocument {
        KnowledgeRecord::parse(Path::new("people/paige-cognetti.md"), content).unwrap()
    }

    #[test]
    fn test_split_front_matter() {
        let (yaml, body) = split_front_matter("---\nname: A\n---\nbody\n").unwrap();
        assert_eq!(yaml, "name: A\n");
        assert_eq!(body, "body\n");
        assert!(split_front_matter("# no front matter").is_none());
        assert!(split_front_matter("---\nname: A\n").is_none());
    }

    #[test]
    fn test_parse_record() {
        let ParsedDocument::Record(record) = parse(DOC) else {
            panic!("expected a record");
        };
        assert_eq!(record.name(), "Paige Cognetti");
        assert_eq!(record.entity_type(), EntityType::Person);
        assert_eq!(record.front.mention_count, 4);
        assert_eq!(
            record.front.first_mentioned.unwrap().to_rfc3339(),
            "2024-03-01T00:00:00+00:00"
        );
        assert_eq!(record.front.relationships[0].target_name(), "Scranton");
        assert!(record.front.extra.contains_key("tags"));
        assert_eq!(record.body, "# Paige Cognetti\n\nNotes.\n");

        // Invalid pattern ignored, valid one case-insensitive
        assert!(record.matches_pattern("MAYOR COGNETTI"));
        assert!(!record.matches_pattern("Cognetti"));
    }

    #[test]
    fn test_render_preserves_unknown_keys_and_body() {
        let ParsedDocument::Record(record) = parse(DOC) else {
            panic!("expected a record");
        };
        let rendered = record.render().unwrap();
        assert!(rendered.starts_with("---\nname: Paige Cognetti\n"));
        assert!(rendered.contains("tags:"));
        assert!(rendered.ends_with("---\n# Paige Cognetti\n\nNotes.\n"));

        let ParsedDocument::Record(again) = parse(&rendered) else {
            panic!("expected a record");
        };
        assert_eq!(again.front, record.front);
    }

    #[test]
    fn test_documents_without_name_are_not_records() {
        assert!(matches!(parse("# Just notes\n"), ParsedDocument::NotARecord));
        assert!(matches!(
            parse("---\ntitle: Dashboard\n---\n"),
            ParsedDocument::NotARecord
        ));
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        let result = KnowledgeRecord::parse(Path::new("bad.md"), "---\nname: [unclosed\n---\n");
        assert!(matches!(result, Err(ScrantennaError::StoreFormat { .. })));
    }

    #[test]
    fn test_lenient_fields() {
        let ParsedDocument::Record(record) = parse("---\nname: Steamtown\nentity_type: venue\nlast_mentioned: sometime\n---\n") else {
            panic!("expected a record");
        };
        assert_eq!(record.entity_type(), EntityType::Other);
        assert!(record.front.last_mentioned.is_none());
        assert_eq!(record.front.confidence, 0.5);
    }

    #[test]
    fn test_add_relationship_dedupes() {
        let mut record = KnowledgeRecord::new(
            "people/x.md",
            FrontMatter::new("Paige Cognetti", EntityType::Person),
            "",
        );
        assert!(record.add_relationship("Scranton", "MAYOR_OF", 0.9));
        assert!(!record.add_relationship("scranton", "mayor_of", 0.5));
        assert!(record.add_relationship("Scranton", "LOCATED_IN", 0.7));
        assert_eq!(record.front.relationships.len(), 2);
        assert_eq!(record.front.relationships[0].target, "[[Scranton]]");
    }
}
