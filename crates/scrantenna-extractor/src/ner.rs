//! Named Entity Recognition (NER) module
//!
//! Rule-based extraction for local news: quoted and parenthetical titles,
//! then an ordered table of regex rules per entity type, then a catch-all
//! proper-name rule. Deterministic and always available, so it closes the
//! strategy chain.

use std::collections::HashSet;
use std::ops::Range;

use regex::Regex;
use scrantenna_core::{Entity, EntityType, ExtractionConfig, ExtractionResult, Result};

use crate::relation::RelationshipDeriver;
use crate::{is_blank, ExtractionStrategy, StrategyKind};

/// Capitalized name word, allowing O'Malley and Wilkes-Barre
const N: &str = r"[A-Z][a-z]+(?:['’\-][A-Za-z][a-z]+)*";

/// Aggregate confidence when anything was found
const RULE_CONFIDENCE: f32 = 0.7;

/// Words that mark a phrase as a run-on headline fragment
const MALFORMED: &[&str] = &[
    "announces",
    "announced",
    "says",
    "said",
    "states",
    "stated",
    "issues",
    "issued",
    "releases",
    "released",
    "joined",
    "joins",
];

const PERSON_BLACKLIST: &[&str] = &[
    "service",
    "county",
    "office",
    "department",
    "road",
    "street",
    "underway",
    "producer",
    "actress",
    "horror",
    "filming",
    "project",
    "infrastructure",
    "paranormal",
    // honorifics
    "mayor",
    "judge",
    "commissioner",
    "rep",
    "representative",
    "senator",
    "sen",
    "dr",
    "president",
    "councilman",
    "councilwoman",
    "sheriff",
    "gov",
    "governor",
    "actor",
    "director",
    "chief",
];

const LOCATION_BLACKLIST: &[&str] = &["million", "project", "improvement", "targeting"];

/// Parenthetical words that mark a broadcaster credit, not a title
const MEDIA_WORDS: &[&str] = &["news", "weather", "wbre", "wyou", "wnep"];

fn word_cap(entity_type: EntityType) -> usize {
    match entity_type {
        EntityType::Person | EntityType::Date => 4,
        EntityType::Location => 6,
        _ => 8,
    }
}

fn words(name: &str) -> impl Iterator<Item = String> + '_ {
    name.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
}

fn is_malformed(name: &str) -> bool {
    words(name).any(|w| MALFORMED.contains(&w.as_str()))
}

/// WKRP, WBRE-TV, KYW
fn is_call_sign(word: &str) -> bool {
    let base = word
        .strip_suffix("-TV")
        .or_else(|| word.strip_suffix("-FM"))
        .unwrap_or(word);
    (3..=4).contains(&base.len())
        && base.starts_with(['W', 'K'])
        && base.chars().all(|c| c.is_ascii_uppercase())
}

// ============================================================================
// Pattern Table
// ============================================================================

/// One (regex, entity type, confidence) rule
pub struct EntityRule {
    regex: Regex,
    entity_type: EntityType,
    confidence: f32,
    /// Reject a match when the text right after it matches
    not_followed_by: Option<Regex>,
}

/// Ordered regex rules. Typed rules run first, in insertion order, then the
/// fallback rules.
pub struct PatternTable {
    rules: Vec<EntityRule>,
    fallback: Vec<EntityRule>,
}

impl PatternTable {
    /// A table with no rules
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            fallback: Vec::new(),
        }
    }

    /// Rules tuned for northeastern Pennsylvania local news
    pub fn news() -> Self {
        let mut table = Self::empty();
        table.init_news_patterns();
        table
    }

    fn init_news_patterns(&mut self) {
        // Works
        self.add_pattern(
            &format!(r"\b({N}(?:\s+{N})*)\s+\((?:film|movie|TV series|book|album)\)"),
            EntityType::Work,
            0.8,
        );
        self.add_pattern(
            &format!(
                r"\b(?:independent film|horror-thriller|film|movie|TV series|documentary|novel|album)\s+({N}(?:\s+{N})*)"
            ),
            EntityType::Work,
            0.8,
        );

        // People
        self.add_pattern(
            &format!(
                r"\b(?:Mayor|Judge|Commissioner|Rep\.|Representative|Senator|Sen\.|Dr\.|President|Councilman|Councilwoman|Sheriff|Gov\.|Governor)\s+({N}(?:\s+[A-Z]\.)?(?:\s+{N})*)"
            ),
            EntityType::Person,
            0.9,
        );
        self.add_pattern(
            &format!(r"\b({N}\s+{N})\s+(?:announced|said|stated|declared)\b"),
            EntityType::Person,
            0.8,
        );
        self.add_pattern(
            &format!(r"\b(?:Actress|Actor|Director|Producer)\s+({N}(?:\s+{N})*)"),
            EntityType::Person,
            0.8,
        );
        self.add_pattern(
            &format!(r"\b({N}(?:\s+{N}){{1,2}})\s+\([^)]*(?:actor|actress|director|producer)[^)]*\)"),
            EntityType::Person,
            0.9,
        );

        // Locations
        self.add_pattern(r"\b(Pennsylvania)\b", EntityType::Location, 0.8);
        self.add_pattern(&format!(r"\b({N}\s+County)\b"), EntityType::Location, 0.9);
        self.add_pattern(
            &format!(
                r"\b({N}(?:\s+{N}){{0,2}}\s+(?:Road|Street|Avenue|Drive|Lane|Boulevard|Highway|Square))\b"
            ),
            EntityType::Location,
            0.8,
        );
        self.add_pattern(r"\b(City Hall)\b", EntityType::Location, 0.9);
        self.add_pattern(
            &format!(r"\bfilming at the ({N}\s+(?:Theater|Theatre|Hall))\b"),
            EntityType::Location,
            0.8,
        );
        self.add_guarded_pattern(
            &format!(r"\b({N}(?:\s+{N})?\s+(?:Theater|Theatre|Hall|Park|Lake|River|Mall))\b"),
            EntityType::Location,
            0.7,
            r"^\s+and\b",
        );

        // Organizations
        self.add_pattern(
            &format!(r"\b(Department of {N}(?:\s+{N})*)"),
            EntityType::Organization,
            0.8,
        );
        self.add_pattern(
            &format!(
                r"\b({N}(?:\s+{N})*\s+(?:Department|Office|Service|Agency|Bureau|Administration))\b"
            ),
            EntityType::Organization,
            0.8,
        );
        self.add_pattern(
            &format!(r"\b({N}(?:\s+{N})*\s+(?:Company|Corporation|Inc\.|LLC|Corp\.))"),
            EntityType::Organization,
            0.8,
        );
        self.add_pattern(
            &format!(r"\b({N}(?:\s+{N})*\s+(?:University|College|School))\b"),
            EntityType::Organization,
            0.8,
        );
        self.add_pattern(
            &format!(r"\b((?:University|College) of {N}(?:\s+{N})*)"),
            EntityType::Organization,
            0.8,
        );
        self.add_pattern(
            &format!(r"\b({N}(?:\s+{N})*\s+(?:Council|Commission|Board|Authority|District))\b"),
            EntityType::Organization,
            0.75,
        );
        self.add_pattern(
            r"\b(CNN|NBC|ABC|CBS|FOX|NPR|WBRE|WYOU|WNEP|PennDOT)\b",
            EntityType::Organization,
            0.9,
        );
        self.add_pattern(
            r"\b(National Weather Service|NWS)\b",
            EntityType::Organization,
            0.9,
        );
        self.add_pattern(r"\b(FBI|CIA|NSA|EPA|FDA)\b", EntityType::Organization, 0.9);

        // Events
        self.add_pattern(
            r"\b(Flash Flood (?:Warning|Watch)|Heat Advisory|Winter Storm Warning)\b",
            EntityType::Event,
            0.9,
        );
        self.add_pattern(
            r"\b(Pride Month|Memorial Day|Labor Day|Independence Day)\b",
            EntityType::Event,
            0.9,
        );
        self.add_pattern(
            &format!(
                r"\b({N}(?:\s+{N})*\s+(?:Festival|Celebration|Conference|Summit|Game|Tournament|Parade|Fair))\b"
            ),
            EntityType::Event,
            0.8,
        );
        self.add_pattern(
            &format!(r"\b({N}(?:\s+{N})*\s+(?:Warning|Alert|Advisory|Emergency))\b"),
            EntityType::Event,
            0.8,
        );

        // Dates
        self.add_pattern(
            r"\b((?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2}(?:,\s*\d{4})?)\b",
            EntityType::Date,
            0.8,
        );
        self.add_pattern(r"\b(\d{4}-\d{2}-\d{2})\b", EntityType::Date, 0.9);

        // Catch-all proper name
        self.add_fallback_pattern(
            &format!(r"\b({N}\s+{N})\b"),
            EntityType::Person,
            0.6,
            r"^\s+(?:Department|Office|Service|Agency|Theater|Theatre|Hall|Park|Road|Street|Avenue)\b",
        );
    }

    /// Add a regex rule. Invalid patterns are skipped.
    pub fn add_pattern(&mut self, pattern: &str, entity_type: EntityType, confidence: f32) {
        if let Some(rule) = build_rule(pattern, entity_type, confidence, None) {
            self.rules.push(rule);
        }
    }

    /// Add a rule that is rejected when `not_followed_by` matches the text
    /// right after the match.
    pub fn add_guarded_pattern(
        &mut self,
        pattern: &str,
        entity_type: EntityType,
        confidence: f32,
        not_followed_by: &str,
    ) {
        if let Some(rule) = build_rule(pattern, entity_type, confidence, Some(not_followed_by)) {
            self.rules.push(rule);
        }
    }

    /// Add a rule that runs after every typed rule
    pub fn add_fallback_pattern(
        &mut self,
        pattern: &str,
        entity_type: EntityType,
        confidence: f32,
        not_followed_by: &str,
    ) {
        if let Some(rule) = build_rule(pattern, entity_type, confidence, Some(not_followed_by)) {
            self.fallback.push(rule);
        }
    }

    /// All rules in application order
    pub fn rules(&self) -> impl Iterator<Item = &EntityRule> {
        self.rules.iter().chain(self.fallback.iter())
    }

    pub fn len(&self) -> usize {
        self.rules.len() + self.fallback.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PatternTable {
    fn default() -> Self {
        Self::news()
    }
}

fn build_rule(
    pattern: &str,
    entity_type: EntityType,
    confidence: f32,
    not_followed_by: Option<&str>,
) -> Option<EntityRule> {
    let regex = Regex::new(pattern).ok()?;
    let not_followed_by = match not_followed_by {
        Some(guard) => Some(Regex::new(guard).ok()?),
        None => None,
    };
    Some(EntityRule {
        regex,
        entity_type,
        confidence,
        not_followed_by,
    })
}

// ============================================================================
// Rule-based Strategy
// ============================================================================

/// Entities accepted so far in one extraction call
struct Accepted {
    entities: Vec<Entity>,
    seen: HashSet<String>,
    covered: HashSet<usize>,
}

impl Accepted {
    fn new() -> Self {
        Self {
            entities: Vec::new(),
            seen: HashSet::new(),
            covered: HashSet::new(),
        }
    }

    fn overlaps(&self, span: &Range<usize>) -> bool {
        span.clone().any(|i| self.covered.contains(&i))
    }

    /// Apply the acceptance filters; returns whether the entity was kept
    fn offer(
        &mut self,
        name: &str,
        entity_type: EntityType,
        confidence: f32,
        span: Range<usize>,
    ) -> bool {
        let name = name.trim();
        let key = name.to_lowercase();

        if name.chars().count() <= 2 || self.seen.contains(&key) || is_malformed(name) {
            return false;
        }
        if words(name).count() > word_cap(entity_type) {
            return false;
        }
        let blacklist: &[&str] = match entity_type {
            EntityType::Person => PERSON_BLACKLIST,
            EntityType::Location => LOCATION_BLACKLIST,
            _ => &[],
        };
        if words(name).any(|w| blacklist.contains(&w.as_str())) {
            return false;
        }
        if self.overlaps(&span) {
            return false;
        }

        self.covered.extend(span);
        self.seen.insert(key);
        self.entities
            .push(Entity::new(name, entity_type, confidence));
        true
    }
}

/// Deterministic regex-driven extraction
pub struct RuleBasedStrategy {
    table: PatternTable,
    deriver: RelationshipDeriver,
    anchor: Option<(String, Regex)>,
    min_confidence: f32,
    max_entities: usize,
    quoted: Vec<Regex>,
    parenthetical: Option<Regex>,
}

impl RuleBasedStrategy {
    /// Create with the news table and default tuning
    pub fn new() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }

    /// Create from the extraction section of the app config
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let quoted = [
            r#""([^"\n]+)""#,
            r"“([^”\n]+)”",
            r"(?:^|\s)'([^'\n]+)'(?:\W|$)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect();

        Self {
            table: PatternTable::news(),
            deriver: RelationshipDeriver::from_config(config),
            anchor: anchor_pattern(&config.anchor_entity),
            min_confidence: config.min_confidence,
            max_entities: config.max_entities,
            quoted,
            parenthetical: Regex::new(r"\(([^)\n]+)\)").ok(),
        }
    }

    /// Replace the pattern table
    pub fn with_table(mut self, table: PatternTable) -> Self {
        self.table = table;
        self
    }

    /// Entities only, in acceptance order
    pub fn extract_entities(&self, text: &str) -> Vec<Entity> {
        let mut accepted = Accepted::new();

        // Quoted titles, then parentheticals
        for regex in &self.quoted {
            for caps in regex.captures_iter(text) {
                if let Some(m) = caps.get(1) {
                    if is_title_candidate(m.as_str()) {
                        accepted.offer(m.as_str(), EntityType::Work, 0.8, m.range());
                    }
                }
            }
        }
        if let Some(regex) = &self.parenthetical {
            for caps in regex.captures_iter(text) {
                if let Some(m) = caps.get(1) {
                    let inner = m.as_str().trim();
                    if is_title_candidate(inner) && !is_media_credit(inner) {
                        accepted.offer(inner, EntityType::Work, 0.7, m.range());
                    }
                }
            }
        }

        for rule in self.table.rules() {
            for caps in rule.regex.captures_iter(text) {
                let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                    continue;
                };
                if let (Some(guard), Some(whole)) = (&rule.not_followed_by, caps.get(0)) {
                    if guard.is_match(&text[whole.end()..]) {
                        continue;
                    }
                }
                accepted.offer(m.as_str(), rule.entity_type, rule.confidence, m.range());
            }
        }

        let mut entities = accepted.entities;
        entities.retain(|e| e.confidence >= self.min_confidence);

        // The anchor always keeps a slot under the cap
        if let Some((anchor, pattern)) = &self.anchor {
            if pattern.is_match(text) {
                let key = anchor.to_lowercase();
                match entities.iter().position(|e| e.key() == key) {
                    Some(i) if i < self.max_entities => {}
                    found => {
                        let grounding = match found {
                            Some(i) => entities.remove(i),
                            None => Entity::new(anchor.clone(), EntityType::Location, 0.9),
                        };
                        entities.truncate(self.max_entities.saturating_sub(1));
                        entities.push(grounding);
                    }
                }
            }
        }

        entities.truncate(self.max_entities);
        entities
    }
}

impl Default for RuleBasedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionStrategy for RuleBasedStrategy {
    fn name(&self) -> String {
        "rule_based".to_string()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::RuleBased
    }

    fn is_available(&self) -> bool {
        true
    }

    fn try_extract(&self, text: &str) -> Result<ExtractionResult> {
        if is_blank(text) {
            return Ok(ExtractionResult::empty(self.name()));
        }

        let entities = self.extract_entities(text);
        if entities.is_empty() {
            return Ok(ExtractionResult::empty(self.name()));
        }

        let relationships = self.deriver.derive(text, &entities);
        Ok(ExtractionResult::new(
            entities,
            relationships,
            self.name(),
            RULE_CONFIDENCE,
        ))
    }
}

fn anchor_pattern(anchor: &str) -> Option<(String, Regex)> {
    let anchor = anchor.trim();
    if anchor.is_empty() {
        return None;
    }
    let regex = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(anchor))).ok()?;
    Some((anchor.to_string(), regex))
}

fn is_title_candidate(span: &str) -> bool {
    let span = span.trim();
    let len = span.chars().count();
    (3..50).contains(&len) && span.starts_with(|c: char| c.is_uppercase())
}

fn is_media_credit(span: &str) -> bool {
    span.split_whitespace().any(|w| {
        let lower = w.to_lowercase();
        MEDIA_WORDS.iter().any(|m| lower.contains(m)) || is_call_sign(w)
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn names(entities: &[Entity]) -> Vec<&str> {
        entities.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_mayor_scenario() {
        let strategy = RuleBasedStrategy::new();
        let text = "Mayor Jane Doe announced a $2 million road project on Main Street in Scranton.";
        let result = strategy.extract(text);

        assert_eq!(result.method, "rule_based");
        assert_eq!(result.confidence, 0.7);

        let jane = result.entity("Jane Doe").expect("person extracted");
        assert_eq!(jane.entity_type, EntityType::Person);
        let scranton = result.entity("Scranton").expect("anchor included");
        assert_eq!(scranton.entity_type, EntityType::Location);
        assert!(result.entity("Mayor Jane Doe").is_none());
        assert!(result.entity("Mayor Jane").is_none());

        assert!(result.relationships.iter().any(|r| r.to == "Scranton"));
    }

    #[test]
    fn test_mayor_scenario_verbatim() {
        let strategy = RuleBasedStrategy::new();
        let text = "Mayor Jane Doe announced a $2 million project on Main Street in Scranton.";
        let result = strategy.extract(text);

        let jane = result.entity("Jane Doe").expect("title stripped");
        assert_eq!(jane.entity_type, EntityType::Person);
        let scranton = result.entity("Scranton").expect("anchor included");
        assert_eq!(scranton.entity_type, EntityType::Location);
        assert!(result.entity("Mayor Jane Doe").is_none());
        assert!(result.relationships.iter().any(|r| r.to == "Scranton"));
    }

    #[test]
    fn test_quoted_and_parenthetical_works() {
        let strategy = RuleBasedStrategy::new();
        let text = "Filming of \"Final Act\" wrapped at the Ritz Theater (WBRE/WYOU) this week";
        let entities = strategy.extract_entities(text);

        let work = entities.iter().find(|e| e.name == "Final Act").unwrap();
        assert_eq!(work.entity_type, EntityType::Work);
        assert!(!entities
            .iter()
            .any(|e| e.entity_type == EntityType::Work && e.name.contains("WBRE")));
        assert!(names(&entities).contains(&"Ritz Theater"));
    }

    #[test]
    fn test_malformed_and_blacklisted_rejected() {
        let strategy = RuleBasedStrategy::new();
        let text = "Cognetti Announces New Infrastructure Project downtown";
        let entities = strategy.extract_entities(text);

        assert!(entities.iter().all(|e| !is_malformed(&e.name)));
        assert!(!names(&entities).contains(&"New Infrastructure"));
    }

    #[test]
    fn test_typed_rules_claim_spans_first() {
        let strategy = RuleBasedStrategy::new();
        let text = "The Department of Public Works will close Nay Aug Park on Friday";
        let entities = strategy.extract_entities(text);

        let dpw = entities
            .iter()
            .find(|e| e.name == "Department of Public Works")
            .unwrap();
        assert_eq!(dpw.entity_type, EntityType::Organization);
        let park = entities.iter().find(|e| e.name == "Nay Aug Park").unwrap();
        assert_eq!(park.entity_type, EntityType::Location);
        assert!(!names(&entities).contains(&"Public Works"));
        assert!(!names(&entities).contains(&"Nay Aug"));
    }

    #[test]
    fn test_anchor_not_duplicated() {
        let strategy = RuleBasedStrategy::new();
        let entities = strategy.extract_entities("Storm damage reported across scranton and Dunmore");

        let anchors: Vec<_> = entities
            .iter()
            .filter(|e| e.key() == "scranton")
            .collect();
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].name, "Scranton");
    }

    #[test]
    fn test_max_entities_cap() {
        let config = ExtractionConfig {
            max_entities: 2,
            ..ExtractionConfig::default()
        };
        let strategy = RuleBasedStrategy::from_config(&config);
        let text = "Jane Doe met John Roe and Mary Major on Main Street and Oak Avenue in Scranton";
        assert_eq!(strategy.extract_entities(text).len(), 2);
    }

    #[test]
    fn test_anchor_survives_full_cap() {
        let strategy = RuleBasedStrategy::new();
        let text = "Jane Doe, John Roe, Mary Major, Paul Minor, Ruth Baker, Carl Mason, \
                    Anna Lopez, Frank Moore, Nora Quinn, Owen Reyes and Gus Gray met in Scranton.";
        let result = strategy.extract(text);

        assert_eq!(result.entities.len(), 10);
        let scranton = result.entity("Scranton").expect("anchor kept under the cap");
        assert_eq!(scranton.entity_type, EntityType::Location);
        assert!(result.entity("Jane Doe").is_some());
        assert!(result.entity("Gus Gray").is_none());
        assert!(result.relationships.iter().any(|r| r.to == "Scranton"));
    }

    #[test]
    fn test_empty_input() {
        let strategy = RuleBasedStrategy::new();
        let result = strategy.extract("   ");
        assert!(result.is_empty());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.method, "rule_based");

        let result = strategy.extract("nothing capitalized here at all");
        assert!(result.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_call_sign() {
        assert!(is_call_sign("WNEP"));
        assert!(is_call_sign("WBRE-TV"));
        assert!(!is_call_sign("NASA"));
        assert!(!is_call_sign("Wolf"));
    }

    #[test]
    fn test_custom_table() {
        let mut table = PatternTable::empty();
        table.add_pattern(r"\b(Electric City)\b", EntityType::Location, 0.9);
        table.add_pattern(r"(unclosed", EntityType::Location, 0.9);
        assert_eq!(table.len(), 1);

        let strategy = RuleBasedStrategy::new().with_table(table);
        let entities = strategy.extract_entities("Welcome to the Electric City");
        assert_eq!(names(&entities), vec!["Electric City"]);
    }
}

#[cfg(test)]
mod props {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn rule_based_is_deterministic(text in "[A-Za-z .,'\"()]{0,120}") {
            let strategy = RuleBasedStrategy::new();
            let first = strategy.extract(&text);
            let second = strategy.extract(&text);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn confidences_stay_in_range(text in "[A-Z][a-z]{2,8}( [A-Z][a-z]{2,8}){0,6}") {
            let strategy = RuleBasedStrategy::new();
            let result = strategy.extract(&text);
            prop_assert!((0.0..=1.0).contains(&result.confidence));
            for e in &result.entities {
                prop_assert!((0.0..=1.0).contains(&e.confidence));
            }
        }
    }
}
