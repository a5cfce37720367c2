//! Article pipeline
//!
//! One article at a time: extraction through the strategy chain, then
//! resolution against the vault when one is attached.

use std::collections::BTreeMap;

use scrantenna_core::ExtractionResult;
use scrantenna_extractor::ExtractorOrchestrator;
use scrantenna_knowledge::{EntityResolver, ResolutionMethod, ResolvedExtractionResult};
use serde::Serialize;
use tracing::{debug, info};

use crate::news::Article;

/// Output for a single article
#[derive(Debug, Serialize)]
pub struct ArticleReport {
    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,

    pub extraction: ExtractionResult,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolvedExtractionResult>,
}

/// Totals over a batch
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct IngestSummary {
    pub articles: usize,
    /// Articles without a title
    pub skipped: usize,
    pub entities: usize,
    pub relationships: usize,
    pub records_created: usize,
    pub resolution_failures: usize,
    /// Winning strategy per article
    pub methods: BTreeMap<String, usize>,
}

pub struct Pipeline<'a> {
    orchestrator: &'a ExtractorOrchestrator,
    resolver: Option<EntityResolver<'a>>,
}

impl<'a> Pipeline<'a> {
    /// Extraction only
    pub fn new(orchestrator: &'a ExtractorOrchestrator) -> Self {
        Self {
            orchestrator,
            resolver: None,
        }
    }

    /// Extraction followed by vault resolution
    pub fn with_resolver(mut self, resolver: EntityResolver<'a>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn process_text(&mut self, text: &str) -> (ExtractionResult, Option<ResolvedExtractionResult>) {
        let extraction = self.orchestrator.extract(text);
        let resolution = self
            .resolver
            .as_mut()
            .map(|resolver| resolver.resolve_extraction(&extraction));
        (extraction, resolution)
    }

    /// `None` for articles without a title
    pub fn process(&mut self, article: &Article) -> Option<ArticleReport> {
        let text = article.text()?;
        let (extraction, resolution) = self.process_text(&text);

        Some(ArticleReport {
            title: article.title.clone().unwrap_or_default(),
            url: article.url.clone(),
            published_at: article.published_at.clone(),
            extraction,
            resolution,
        })
    }

    pub fn run(&mut self, articles: &[Article]) -> (Vec<ArticleReport>, IngestSummary) {
        let mut reports = Vec::new();
        let mut summary = IngestSummary::default();

        for (i, article) in articles.iter().enumerate() {
            let Some(report) = self.process(article) else {
                debug!(index = i, "Skipping article without title");
                summary.skipped += 1;
                continue;
            };

            summary.articles += 1;
            summary.entities += report.extraction.entities.len();
            summary.relationships += report.extraction.relationships.len();
            *summary
                .methods
                .entry(report.extraction.method.clone())
                .or_insert(0) += 1;

            if let Some(resolution) = &report.resolution {
                summary.records_created += resolution
                    .entities
                    .iter()
                    .filter(|e| e.resolution == ResolutionMethod::Created)
                    .count();
                summary.resolution_failures += resolution.failures.len();
            }

            reports.push(report);
        }

        info!(
            articles = summary.articles,
            skipped = summary.skipped,
            entities = summary.entities,
            created = summary.records_created,
            "Batch processed"
        );
        (reports, summary)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use scrantenna_extractor::{ExtractionStrategy, RelationshipDeriver, RuleBasedStrategy};
    use scrantenna_knowledge::KnowledgeStore;
    use tempfile::TempDir;

    fn rule_chain() -> ExtractorOrchestrator {
        let strategies: Vec<Box<dyn ExtractionStrategy>> = vec![Box::new(RuleBasedStrategy::new())];
        ExtractorOrchestrator::new(strategies)
            .with_enrichment(Box::new(RelationshipDeriver::new("Scranton")))
    }

    fn article(title: Option<&str>, description: &str) -> Article {
        Article {
            title: title.map(str::to_string),
            description: Some(description.to_string()),
            ..Article::default()
        }
    }

    #[test]
    fn test_extract_only() {
        let orchestrator = rule_chain();
        let mut pipeline = Pipeline::new(&orchestrator);

        let (extraction, resolution) =
            pipeline.process_text("Jane Doe announced a new park on Main Street in Scranton.");
        assert_eq!(extraction.method, "rule_based");
        assert!(extraction.entity("Jane Doe").is_some());
        assert!(extraction.entity("Scranton").is_some());
        assert!(resolution.is_none());
    }

    #[test]
    fn test_batch_resolves_into_vault() {
        let dir = TempDir::new().unwrap();
        let orchestrator = rule_chain();
        let mut store = KnowledgeStore::open(dir.path()).unwrap();

        let articles = vec![
            article(
                Some("Jane Doe announced a new park"),
                "The park opens on Main Street in Scranton.",
            ),
            article(None, "No headline here"),
            article(Some("Scranton crews repave Main Street"), ""),
        ];

        let (reports, summary) = {
            let mut pipeline =
                Pipeline::new(&orchestrator).with_resolver(EntityResolver::new(&mut store));
            pipeline.run(&articles)
        };

        assert_eq!(reports.len(), 2);
        assert_eq!(summary.articles, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.resolution_failures, 0);
        assert_eq!(summary.methods.get("rule_based"), Some(&2));

        // Scranton is created by the first article and matched by the second
        let scranton = store.find("scranton").unwrap();
        assert_eq!(scranton.front.mention_count, 2);

        let second = reports[1].resolution.as_ref().unwrap();
        let city = second.entities.iter().find(|e| e.name == "Scranton").unwrap();
        assert_eq!(city.resolution, ResolutionMethod::Exact);
        assert_eq!(summary.records_created, store.len());
    }

    #[test]
    fn test_blank_text_is_empty() {
        let orchestrator = rule_chain();
        let (extraction, _) = Pipeline::new(&orchestrator).process_text("   ");
        assert!(extraction.is_empty());
        assert_eq!(extraction.method, "none");
        assert_eq!(extraction.confidence, 0.0);
    }
}
