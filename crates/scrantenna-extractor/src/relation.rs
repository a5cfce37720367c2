//! Relation Extraction (RE) module
//!
//! Derives typed edges between entities that were already extracted from a
//! text. Three sources are combined, in this order:
//! - Templated two-slot patterns ("X announced Y", "X in Y", ...)
//! - A verb-anchored pairwise scan over a fixed verb lexicon
//! - Structural edges tying locations and organizations to the anchor entity
//!
//! The result is deduplicated by (from, to, type) and truncated, keeping
//! insertion order.

use regex::Regex;
use scrantenna_core::{dedupe_relationships, Entity, EntityType, ExtractionConfig, Relationship};

use crate::RelationExtractor;

/// Confidence for templated and verb-derived edges
const DERIVED_CONFIDENCE: f32 = 0.7;

/// Confidence for structural edges to the anchor
const STRUCTURAL_CONFIDENCE: f32 = 0.6;

/// Capitalized phrase: one or more capitalized words
const CAP: &str = r"[A-Z][\w'’\-]*(?:[ \t]+[A-Z][\w'’\-]*)*";

// ============================================================================
// Verb Lexicon
// ============================================================================

/// Semantic grouping of lexicon verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerbClass {
    Communication,
    Employment,
    Creation,
    Finance,
    Movement,
    Legal,
    Social,
    Performance,
    Competition,
}

impl VerbClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Communication => "communication",
            Self::Employment => "employment",
            Self::Creation => "creation",
            Self::Finance => "finance",
            Self::Movement => "movement",
            Self::Legal => "legal",
            Self::Social => "social",
            Self::Performance => "performance",
            Self::Competition => "competition",
        }
    }
}

/// Verb form as it appears in active voice, plus its passive participle
#[derive(Debug, Clone, Copy)]
pub struct VerbEntry {
    pub verb: &'static str,
    pub participle: &'static str,
    pub class: VerbClass,
}

const fn verb(verb: &'static str, participle: &'static str, class: VerbClass) -> VerbEntry {
    VerbEntry {
        verb,
        participle,
        class,
    }
}

use VerbClass::*;

/// Scanned in order; the first verb found between two mentions wins.
pub const VERB_LEXICON: &[VerbEntry] = &[
    // communication
    verb("announced", "announced", Communication),
    verb("said", "said", Communication),
    verb("stated", "stated", Communication),
    verb("declared", "declared", Communication),
    verb("reported", "reported", Communication),
    verb("confirmed", "confirmed", Communication),
    verb("revealed", "revealed", Communication),
    verb("unveiled", "unveiled", Communication),
    verb("warned", "warned", Communication),
    verb("urged", "urged", Communication),
    verb("praised", "praised", Communication),
    // employment
    verb("joined", "joined", Employment),
    verb("left", "left", Employment),
    verb("hired", "hired", Employment),
    verb("fired", "fired", Employment),
    verb("promoted", "promoted", Employment),
    verb("works", "employed", Employment),
    verb("serves", "served", Employment),
    verb("leads", "led", Employment),
    verb("manages", "managed", Employment),
    verb("heads", "headed", Employment),
    verb("oversees", "overseen", Employment),
    verb("directs", "directed", Employment),
    verb("represents", "represented", Employment),
    verb("retired", "retired", Employment),
    // creation
    verb("created", "created", Creation),
    verb("built", "built", Creation),
    verb("designed", "designed", Creation),
    verb("developed", "developed", Creation),
    verb("launched", "launched", Creation),
    verb("started", "started", Creation),
    verb("founded", "founded", Creation),
    verb("opened", "opened", Creation),
    verb("closed", "closed", Creation),
    verb("wrote", "written", Creation),
    verb("produced", "produced", Creation),
    verb("filmed", "filmed", Creation),
    verb("renovated", "renovated", Creation),
    verb("constructed", "constructed", Creation),
    // finance
    verb("bought", "bought", Finance),
    verb("sold", "sold", Finance),
    verb("acquired", "acquired", Finance),
    verb("purchased", "purchased", Finance),
    verb("invested", "invested", Finance),
    verb("funded", "funded", Finance),
    verb("sponsored", "sponsored", Finance),
    verb("owns", "owned", Finance),
    verb("awarded", "awarded", Finance),
    verb("donated", "donated", Finance),
    verb("paid", "paid", Finance),
    // movement
    verb("moved", "moved", Movement),
    verb("relocated", "relocated", Movement),
    verb("visited", "visited", Movement),
    verb("traveled", "traveled", Movement),
    verb("arrived", "arrived", Movement),
    verb("returned", "returned", Movement),
    verb("lives", "lived", Movement),
    verb("resides", "resided", Movement),
    verb("toured", "toured", Movement),
    // legal
    verb("sued", "sued", Legal),
    verb("charged", "charged", Legal),
    verb("arrested", "arrested", Legal),
    verb("sentenced", "sentenced", Legal),
    verb("convicted", "convicted", Legal),
    verb("accused", "accused", Legal),
    verb("elected", "elected", Legal),
    verb("nominated", "nominated", Legal),
    verb("appointed", "appointed", Legal),
    verb("indicted", "indicted", Legal),
    verb("fined", "fined", Legal),
    // social
    verb("married", "married", Social),
    verb("met", "met", Social),
    verb("befriended", "befriended", Social),
    verb("partnered", "partnered", Social),
    verb("supports", "supported", Social),
    verb("opposes", "opposed", Social),
    verb("endorses", "endorsed", Social),
    verb("thanked", "thanked", Social),
    verb("honored", "honored", Social),
    // performance
    verb("plays", "played", Performance),
    verb("performs", "performed", Performance),
    verb("stars", "starred", Performance),
    verb("appears", "appeared", Performance),
    verb("features", "featured", Performance),
    verb("hosts", "hosted", Performance),
    verb("portrays", "portrayed", Performance),
    // competition
    verb("won", "won", Competition),
    verb("lost", "lost", Competition),
    verb("defeated", "defeated", Competition),
    verb("beat", "beaten", Competition),
    verb("competed", "competed", Competition),
    verb("participated", "participated", Competition),
    verb("attended", "attended", Competition),
    verb("graduated", "graduated", Competition),
    verb("faces", "faced", Competition),
];

const AUXILIARIES: &[&str] = &["is", "are", "was", "were", "been", "be"];

impl VerbEntry {
    /// Active (`verb`, `verb`+s) or simple passive (auxiliary + participle)
    fn occurs_in(&self, segment: &[Token]) -> bool {
        let inflected = format!("{}s", self.verb);
        segment
            .iter()
            .any(|t| t.text == self.verb || t.text == inflected)
            || segment.windows(2).any(|pair| {
                AUXILIARIES.contains(&pair[0].text.as_str()) && pair[1].text == self.participle
            })
    }
}

/// Map a lexicon verb to a relationship type. Verbs without a directional
/// form keep their own name (`said` becomes `SAID`).
pub fn relationship_type_for(verb: &str) -> String {
    let mapped = match verb {
        "works" => "WORKS_FOR",
        "bought" => "PURCHASED",
        "moved" => "MOVED_TO",
        "relocated" => "RELOCATED_TO",
        "traveled" => "TRAVELED_TO",
        "lives" => "LIVES_IN",
        "resides" => "RESIDES_IN",
        "met" => "MET_WITH",
        "stars" => "STARS_IN",
        "appears" => "APPEARS_IN",
        "competed" => "COMPETED_AGAINST",
        "participated" => "PARTICIPATED_IN",
        "graduated" => "GRADUATED_FROM",
        _ => return verb.to_uppercase().replace([' ', '-'], "_"),
    };
    mapped.to_string()
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    kind: TokenKind,
}

/// Words whose trailing period does not end a sentence
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "rep", "sen", "gov", "st", "jr", "sr", "inc", "corp", "co", "ltd",
    "no", "vs", "lt", "sgt", "capt",
];

/// Lower-cased word tokens plus sentence terminals.
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_alphanumeric() || (!current.is_empty() && matches!(c, '\'' | '’' | '-')) {
            current.extend(c.to_lowercase());
            continue;
        }

        // 2.5 or 1,200 stay one token
        if matches!(c, '.' | ',')
            && current.ends_with(|l: char| l.is_ascii_digit())
            && chars.peek().is_some_and(|n| n.is_ascii_digit())
        {
            current.push(c);
            continue;
        }

        flush_word(&mut tokens, &mut current);

        if matches!(c, '.' | '!' | '?') {
            let abbreviated = c == '.'
                && tokens.last().is_some_and(|t| {
                    t.kind == TokenKind::Word
                        && (t.text.chars().count() == 1 || ABBREVIATIONS.contains(&t.text.as_str()))
                });
            if !abbreviated {
                tokens.push(Token {
                    text: c.to_string(),
                    kind: TokenKind::Terminal,
                });
            }
        }
    }
    flush_word(&mut tokens, &mut current);

    tokens
}

fn flush_word(tokens: &mut Vec<Token>, current: &mut String) {
    if current.is_empty() {
        return;
    }
    let mut word = std::mem::take(current);
    for suffix in ["'s", "’s"] {
        if word.len() > suffix.len() && word.ends_with(suffix) {
            word.truncate(word.len() - suffix.len());
        }
    }
    let word = word.trim_end_matches(['\'', '’', '-']).to_string();
    if !word.is_empty() {
        tokens.push(Token {
            text: word,
            kind: TokenKind::Word,
        });
    }
}

/// Token ranges `[start, end)` where `needle` occurs as consecutive words.
fn find_mentions(tokens: &[Token], needle: &[Token]) -> Vec<(usize, usize)> {
    let needle: Vec<&str> = needle
        .iter()
        .filter(|t| t.kind == TokenKind::Word)
        .map(|t| t.text.as_str())
        .collect();
    if needle.is_empty() || needle.len() > tokens.len() {
        return Vec::new();
    }

    tokens
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| {
            window
                .iter()
                .zip(&needle)
                .all(|(t, n)| t.kind == TokenKind::Word && t.text == *n)
        })
        .map(|(start, _)| (start, start + needle.len()))
        .collect()
}

// ============================================================================
// Relationship Deriver
// ============================================================================

/// Templated two-slot rule
struct RelationTemplate {
    regex: Regex,
    relationship_type: &'static str,
}

/// Derives relationships among a fixed set of entities
pub struct RelationshipDeriver {
    templates: Vec<RelationTemplate>,
    anchor: String,
    max_relationships: usize,
}

impl RelationshipDeriver {
    /// Create a deriver grounded on the given anchor entity name
    pub fn new(anchor: impl Into<String>) -> Self {
        let mut deriver = Self {
            templates: Vec::new(),
            anchor: anchor.into(),
            max_relationships: 15,
        };
        deriver.init_templates();
        deriver
    }

    /// Build from the extraction section of the app config
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.anchor_entity.clone()).with_max_relationships(config.max_relationships)
    }

    /// Set the relationship cap
    pub fn with_max_relationships(mut self, max: usize) -> Self {
        self.max_relationships = max;
        self
    }

    fn init_templates(&mut self) {
        self.add_template(
            r"(?:announced|unveiled|declared)\s+(?:(?:a|an|the)\s+)?",
            "ANNOUNCED",
        );
        self.add_template(
            r"(?:joined|stars\s+in|starred\s+in|appears\s+in|appeared\s+in|cast\s+in)\s+(?:the\s+)?",
            "PARTICIPATES_IN",
        );
        self.add_template(r"(?:directed|produced|created)\s+(?:the\s+)?", "CREATED");
        self.add_template(r"(?:issued|released)\s+(?:(?:a|an|the)\s+)?", "ISSUED");
        self.add_template(
            r"(?:sued|filed\s+(?:a\s+)?lawsuit\s+against)\s+",
            "LEGAL_DISPUTE",
        );
        self.add_template(
            r"(?:works\s+for|works\s+at|employed\s+by)\s+(?:the\s+)?",
            "WORKS_FOR",
        );
        self.add_template(
            r"(?:chooses|commits\s+to|committed\s+to|signed\s+with)\s+",
            "COMMITTED_TO",
        );
        self.add_template(r"(?:named\s+to|selected\s+for)\s+(?:the\s+)?", "SELECTED_FOR");
        self.add_template(r"(?:plays|portrays|acts\s+as)\s+", "PORTRAYS");
        self.add_template(
            r"(?:based\s+in|located\s+in|in|at)\s+(?:the\s+)?",
            "LOCATED_IN",
        );
    }

    /// Add a template; `middle` sits between two capitalized phrases
    fn add_template(&mut self, middle: &str, relationship_type: &'static str) {
        let pattern = format!(r"\b({CAP})\s+{middle}({CAP})");
        if let Ok(regex) = Regex::new(&pattern) {
            self.templates.push(RelationTemplate {
                regex,
                relationship_type,
            });
        }
    }

    /// Run all three sources, dedupe and truncate
    pub fn derive(&self, text: &str, entities: &[Entity]) -> Vec<Relationship> {
        let mut relationships = self.templated(text, entities);
        relationships.extend(self.verb_pairs(text, entities));
        relationships.extend(self.structural(text, entities));
        dedupe_relationships(relationships, self.max_relationships)
    }

    /// Two-slot template matches resolved onto entities
    pub fn templated(&self, text: &str, entities: &[Entity]) -> Vec<Relationship> {
        let mut relationships = Vec::new();

        for template in &self.templates {
            for caps in template.regex.captures_iter(text) {
                let (Some(first), Some(second)) = (caps.get(1), caps.get(2)) else {
                    continue;
                };
                let (Some(from), Some(to)) = (
                    match_entity(first.as_str(), entities),
                    match_entity(second.as_str(), entities),
                ) else {
                    continue;
                };
                if from.key() == to.key() {
                    continue;
                }
                relationships.push(Relationship::new(
                    &from.name,
                    &to.name,
                    template.relationship_type,
                    DERIVED_CONFIDENCE,
                ));
            }
        }

        relationships
    }

    /// Verb-anchored scan over every entity pair
    pub fn verb_pairs(&self, text: &str, entities: &[Entity]) -> Vec<Relationship> {
        let tokens = tokenize(text);
        let mentions: Vec<Vec<(usize, usize)>> = entities
            .iter()
            .map(|e| find_mentions(&tokens, &tokenize(&e.name)))
            .collect();

        let mut relationships = Vec::new();

        for i in 0..entities.len() {
            for j in (i + 1)..entities.len() {
                let segments = between_segments(&tokens, &mentions[i], &mentions[j]);
                if segments.is_empty() {
                    continue;
                }

                let hit = VERB_LEXICON.iter().find_map(|entry| {
                    segments
                        .iter()
                        .find(|(_, segment)| entry.occurs_in(segment))
                        .map(|(i_first, _)| (entry, *i_first))
                });

                if let Some((entry, i_first)) = hit {
                    let (from, to) = if i_first {
                        (&entities[i], &entities[j])
                    } else {
                        (&entities[j], &entities[i])
                    };
                    relationships.push(
                        Relationship::new(
                            &from.name,
                            &to.name,
                            relationship_type_for(entry.verb),
                            DERIVED_CONFIDENCE,
                        )
                        .with_verb(entry.verb),
                    );
                }
            }
        }

        relationships
    }

    /// Edges from locations and organizations to the anchor entity
    pub fn structural(&self, text: &str, entities: &[Entity]) -> Vec<Relationship> {
        let anchor_key = self.anchor.trim().to_lowercase();
        let Some(anchor) = entities.iter().find(|e| e.key() == anchor_key) else {
            return Vec::new();
        };
        let anchor_in_text = text.to_lowercase().contains(&anchor_key);

        entities
            .iter()
            .filter(|e| e.key() != anchor_key)
            .filter_map(|e| match e.entity_type {
                EntityType::Location => Some(Relationship::new(
                    &e.name,
                    &anchor.name,
                    "LOCATED_NEAR",
                    STRUCTURAL_CONFIDENCE,
                )),
                EntityType::Organization if anchor_in_text => Some(Relationship::new(
                    &e.name,
                    &anchor.name,
                    "OPERATES_IN",
                    STRUCTURAL_CONFIDENCE,
                )),
                _ => None,
            })
            .collect()
    }
}

impl Default for RelationshipDeriver {
    fn default() -> Self {
        Self::new("Scranton")
    }
}

impl RelationExtractor for RelationshipDeriver {
    fn extract(&self, text: &str, entities: &[Entity]) -> Vec<Relationship> {
        self.derive(text, entities)
    }
}

/// First entity whose name contains, or is contained in, the phrase.
fn match_entity<'a>(phrase: &str, entities: &'a [Entity]) -> Option<&'a Entity> {
    let phrase = phrase.trim().to_lowercase();
    entities.iter().find(|e| {
        let name = e.key();
        (phrase.contains(&name) && name.chars().count() > 3)
            || (name.contains(&phrase) && phrase.chars().count() > 3)
    })
}

/// Token spans lying strictly between a mention of `a` and a mention of `b`
/// without crossing a sentence terminal. The flag is true when `a` comes first.
fn between_segments<'t>(
    tokens: &'t [Token],
    a: &[(usize, usize)],
    b: &[(usize, usize)],
) -> Vec<(bool, &'t [Token])> {
    let mut segments = Vec::new();

    for &(a_start, a_end) in a {
        for &(b_start, b_end) in b {
            let (a_first, range) = if a_end <= b_start {
                (true, a_end..b_start)
            } else if b_end <= a_start {
                (false, b_end..a_start)
            } else {
                continue;
            };
            let segment = &tokens[range];
            if !segment.is_empty() && segment.iter().all(|t| t.kind == TokenKind::Word) {
                segments.push((a_first, segment));
            }
        }
    }

    segments
}

// ============================================================================
// Tests
// ============================================================================
