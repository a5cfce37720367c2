//! News file input
//!
//! Accepts the NewsAPI response shape (`{"articles": [...]}`) or a bare array
//! of articles.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default, rename = "publishedAt")]
    pub published_at: Option<String>,
}

impl Article {
    /// Title and description joined by a space; `None` without a title
    pub fn text(&self) -> Option<String> {
        let title = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        match self.description.as_deref().map(str::trim) {
            Some(description) if !description.is_empty() => Some(format!("{title} {description}")),
            _ => Some(title.to_string()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NewsFile {
    Wrapped { articles: Vec<Article> },
    Bare(Vec<Article>),
}

pub fn parse_articles(content: &str) -> serde_json::Result<Vec<Article>> {
    Ok(match serde_json::from_str(content)? {
        NewsFile::Wrapped { articles } => articles,
        NewsFile::Bare(articles) => articles,
    })
}

pub fn load_articles(path: &Path) -> anyhow::Result<Vec<Article>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read news file {}", path.display()))?;
    parse_articles(&content).with_context(|| format!("Invalid news file {}", path.display()))
}
